//! Synthetic sequencer output for exercising the pipeline end to end.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use anyhow::Result;
use rand::Rng;
use rand::rngs::StdRng;
use crate::config::defs::{ReadRole, LANE_CHUNK_TAG};
use crate::utils::fastx::write_fastq_record;
use crate::utils::sequence::{normal_phred_qual_string, DNA};

/// Writes one synthetic lane (R1 forward, R2 index, R3 reverse) under `dir`.
/// Each barcode gets `reads_per_barcode` clusters; index reads carry the
/// barcode as given, and `unmatched` extra clusters carry a barcode of
/// all `N`.
///
/// # Arguments
///
/// * `dir` - Output directory.
/// * `lane_prefix` - e.g. `run_L001`.
/// * `barcodes` - Barcodes to emit, in order.
/// * `reads_per_barcode` - Clusters per barcode.
/// * `unmatched` - Clusters with an unassignable barcode.
/// * `read_len` - Length of forward and reverse reads.
/// * `rng` - Seeded RNG.
///
/// # Returns
/// Total clusters written.
///
pub fn write_synthetic_lane(
    dir: &Path,
    lane_prefix: &str,
    barcodes: &[&str],
    reads_per_barcode: usize,
    unmatched: usize,
    read_len: usize,
    rng: &mut StdRng,
) -> Result<u64> {
    let mut writers = Vec::with_capacity(ReadRole::all().len());
    for role in ReadRole::all() {
        let path = dir.join(format!("{}_{}_{}.fastq", lane_prefix, role.lane_tag(), LANE_CHUNK_TAG));
        writers.push((*role, BufWriter::new(File::create(path)?)));
    }

    let unmatched_bc = barcodes
        .first()
        .map(|bc| "N".repeat(bc.len()))
        .unwrap_or_else(|| "NNNNNNNNNNNN".to_string());

    let mut cluster_barcodes: Vec<&str> = Vec::new();
    for bc in barcodes {
        cluster_barcodes.extend(std::iter::repeat(*bc).take(reads_per_barcode));
    }
    cluster_barcodes.extend(std::iter::repeat(unmatched_bc.as_str()).take(unmatched));

    let mut total = 0u64;
    for (i, barcode) in cluster_barcodes.iter().enumerate() {
        let tile: u32 = rng.random_range(1101..1120);
        let id = format!("{}:{}:{}", lane_prefix, tile, i);
        for (role, writer) in writers.iter_mut() {
            let (read_num, seq) = match role {
                ReadRole::Forward => (1, DNA::random_sequence(read_len, rng)),
                ReadRole::Index => (2, barcode.to_string()),
                ReadRole::Reverse => (3, DNA::random_sequence(read_len, rng)),
            };
            let qual = normal_phred_qual_string(seq.len(), 35.0, 3.0, rng)?;
            let desc = format!("{}:N:0:0", read_num);
            write_fastq_record(writer, &id, Some(&desc), seq.as_bytes(), qual.as_bytes())?;
        }
        total += 1;
    }

    for (_, writer) in writers.iter_mut() {
        writer.flush()?;
    }
    Ok(total)
}

//! In-process barcode demultiplexing with split_libraries_fastq.py semantics.
//!
//! Reads and barcode (index) reads are walked in lockstep. Each barcode is
//! oriented, assigned to a sample through the mapping file, and the read is
//! quality filtered and written to `seqs.fastq` with a QIIME style header:
//! `@<SampleID>_<n> <read id> orig_bc=<bc> new_bc=<bc> bc_diffs=<d>`.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use log::{debug, info};
use seq_io::fastq::Record;
use crate::config::defs::{PipelineError, QualityParams, DEMUX_FASTQ};
use crate::utils::fastx::{compare_read_ids, fastq_reader, parse_header, write_fastq_record};
use crate::utils::mapping::MappingFile;
use crate::utils::sequence::{phred_score, reverse_complement};
use crate::utils::stats::DemuxStats;

#[derive(Debug, Clone)]
pub struct DemuxConfig {
    pub reads: PathBuf,
    pub barcodes: PathBuf,
    pub out_dir: PathBuf,
    pub quality: QualityParams,
    pub rev_comp_barcode: bool,
    pub rev_comp_mapping_barcodes: bool,
    pub max_barcode_errors: usize,
}

impl DemuxConfig {
    pub fn output_path(&self) -> PathBuf {
        self.out_dir.join(DEMUX_FASTQ)
    }
}

/// What the quality filter decided for one read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QualityOutcome {
    Pass,
    Truncated(usize),
    Rejected,
}

/// Applies the split_libraries_fastq.py quality filter.
///
/// A base is bad when its Phred score is at or below the threshold. The read
/// is cut at the start of the first run longer than `max_bad_run_length`
/// bad bases, then rejected if what remains is empty, shorter than
/// `min_per_read_length_fraction` of the input, or holds more than
/// `sequence_max_n` N bases.
pub fn quality_filter(seq: &[u8], qual: &[u8], params: &QualityParams) -> QualityOutcome {
    let mut keep = seq.len();
    let mut bad_run = 0usize;
    for (i, &q) in qual.iter().enumerate() {
        if phred_score(q) <= params.phred_quality_threshold {
            bad_run += 1;
            if bad_run > params.max_bad_run_length {
                keep = i + 1 - bad_run;
                break;
            }
        } else {
            bad_run = 0;
        }
    }

    if keep == 0 || (keep as f64) < params.min_per_read_length_fraction * seq.len() as f64 {
        return QualityOutcome::Rejected;
    }
    let n_count = seq[..keep].iter().filter(|b| b.eq_ignore_ascii_case(&b'N')).count();
    if n_count > params.sequence_max_n {
        return QualityOutcome::Rejected;
    }

    if keep < seq.len() {
        QualityOutcome::Truncated(keep)
    } else {
        QualityOutcome::Pass
    }
}

fn format_error(path: &PathBuf, e: impl std::fmt::Display) -> PipelineError {
    PipelineError::InvalidFastqFormat(format!("{}: {}", path.display(), e))
}

/// Demultiplexes `config.reads` by the barcodes in `config.barcodes`.
///
/// # Arguments
///
/// * `config` - Inputs, output directory and filter settings.
/// * `mapping` - Parsed mapping file.
///
/// # Returns
/// DemuxStats for the pass. Unassigned and rejected reads are counted and dropped.
///
pub fn demultiplex(config: &DemuxConfig, mapping: &MappingFile) -> Result<DemuxStats, PipelineError> {
    for input in [&config.reads, &config.barcodes] {
        if !input.is_file() {
            return Err(PipelineError::MissingInput(input.clone()));
        }
    }
    fs::create_dir_all(&config.out_dir)?;

    let table = mapping.barcode_table(config.rev_comp_mapping_barcodes, config.max_barcode_errors);
    let mut reads = fastq_reader(&config.reads)?;
    let mut barcodes = fastq_reader(&config.barcodes)?;
    let output_path = config.output_path();
    let mut writer = BufWriter::new(File::create(&output_path)?);

    let mut stats = DemuxStats::default();
    for sample_id in mapping.sample_ids() {
        stats.per_sample.insert(sample_id.to_string(), 0);
    }

    loop {
        let (read, bc) = match (reads.next(), barcodes.next()) {
            (None, None) => break,
            (Some(read), Some(bc)) => (
                read.map_err(|e| format_error(&config.reads, e))?,
                bc.map_err(|e| format_error(&config.barcodes, e))?,
            ),
            (Some(_), None) | (None, Some(_)) => {
                return Err(PipelineError::InvalidFastqFormat(format!(
                    "{} and {} hold different numbers of records (diverged after {})",
                    config.reads.display(),
                    config.barcodes.display(),
                    stats.total_reads
                )));
            }
        };
        stats.total_reads += 1;

        if !compare_read_ids(read.head(), bc.head()) {
            return Err(PipelineError::InvalidFastqFormat(format!(
                "Read and barcode ids differ at record {}: {} vs {}",
                stats.total_reads,
                String::from_utf8_lossy(read.head()),
                String::from_utf8_lossy(bc.head())
            )));
        }

        let observed = if config.rev_comp_barcode {
            reverse_complement(bc.seq())
        } else {
            bc.seq().to_ascii_uppercase()
        };

        let Some(hit) = table.assign(&observed) else {
            stats.unassigned += 1;
            continue;
        };

        let (seq, qual) = match quality_filter(read.seq(), read.qual(), &config.quality) {
            QualityOutcome::Rejected => {
                stats.quality_rejected += 1;
                continue;
            }
            QualityOutcome::Truncated(len) => {
                stats.truncated += 1;
                (&read.seq()[..len], &read.qual()[..len])
            }
            QualityOutcome::Pass => (read.seq(), read.qual()),
        };

        if hit.diffs > 0 {
            stats.barcodes_corrected += 1;
        }

        let (read_id, _) = parse_header(read.head(), '@');
        let id = format!("{}_{}", hit.sample_id, stats.assigned);
        let desc = format!(
            "{} orig_bc={} new_bc={} bc_diffs={}",
            read_id,
            String::from_utf8_lossy(&observed),
            hit.barcode,
            hit.diffs
        );
        write_fastq_record(&mut writer, &id, Some(&desc), seq, qual)?;

        stats.assigned += 1;
        *stats.per_sample.entry(hit.sample_id.to_string()).or_insert(0) += 1;
    }
    writer.flush()?;

    info!(
        "Demultiplexed {}: {} reads, {} assigned, {} unassigned, {} quality rejected",
        config.reads.display(),
        stats.total_reads,
        stats.assigned,
        stats.unassigned,
        stats.quality_rejected
    );
    for (sample, count) in &stats.per_sample {
        debug!("  {}: {}", sample, count);
    }

    Ok(stats)
}

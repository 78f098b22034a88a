//! Splits a demultiplexed stream into one file per sample.

use std::collections::{BTreeMap, HashMap};
use std::collections::hash_map::Entry;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use log::info;
use crate::config::defs::PipelineError;
use crate::utils::fastx::{typed_sequence_reader, FastxType};
use crate::utils::file::{prepare_empty_dir, WriteToFile};

/// Sample id of a demultiplexed read id: everything before the last `_`.
pub fn sample_id_from_read_id(id: &str) -> &str {
    match id.rsplit_once('_') {
        Some((sample, _)) if !sample.is_empty() => sample,
        _ => id,
    }
}

/// Writes `<out_dir>/<SampleID>.<file_type>` for every sample found in `input`,
/// keeping records in input order.
///
/// # Arguments
///
/// * `input` - Demultiplexed sequence file.
/// * `file_type` - Declared type of `input`; also the output extension.
/// * `out_dir` - Target directory, created if missing, must be empty.
///
/// # Returns
/// Records written per sample.
///
pub fn split_by_sample(input: &Path, file_type: FastxType, out_dir: &Path) -> Result<BTreeMap<String, u64>, PipelineError> {
    if !input.is_file() {
        return Err(PipelineError::MissingInput(input.to_path_buf()));
    }
    prepare_empty_dir(out_dir)?;

    let reader = typed_sequence_reader(input, file_type)?;
    let mut writers: HashMap<String, BufWriter<File>> = HashMap::new();
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();

    for record in reader.into_sequence_records() {
        let record = record.map_err(|e| PipelineError::InvalidFastqFormat(format!("{}: {}", input.display(), e)))?;
        let sample = sample_id_from_read_id(record.id()).to_string();
        if sample.contains(['/', '\\']) {
            return Err(PipelineError::InvalidFastqFormat(format!(
                "{}: sample id '{}' is not a valid file name",
                input.display(),
                sample
            )));
        }

        let writer = match writers.entry(sample.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let path = sample_path(out_dir, &sample, file_type);
                entry.insert(BufWriter::new(File::create(path)?))
            }
        };
        record.write_to_file(writer)?;
        *counts.entry(sample).or_insert(0) += 1;
    }

    for writer in writers.values_mut() {
        writer.flush()?;
    }

    info!("Split {} into {} sample files in {}", input.display(), counts.len(), out_dir.display());
    Ok(counts)
}

fn sample_path(out_dir: &Path, sample: &str, file_type: FastxType) -> PathBuf {
    out_dir.join(format!("{}.{}", sample, file_type))
}

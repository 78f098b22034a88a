/// Run statistics and the JSON summary written at the end of a run
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use crate::utils::fastx::record_counter;

/// Counts from one native demultiplexing pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DemuxStats {
    pub total_reads: u64,
    pub assigned: u64,
    pub unassigned: u64,
    pub quality_rejected: u64,
    pub truncated: u64,
    pub barcodes_corrected: u64,
    pub per_sample: BTreeMap<String, u64>,
}

/// Line and record counts of the two demultiplexed streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountCheck {
    pub forward_lines: u64,
    pub reverse_lines: u64,
    pub forward_records: u64,
    pub reverse_records: u64,
}

impl CountCheck {
    pub fn is_consistent(&self) -> bool {
        self.forward_records == self.reverse_records
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectionSummary {
    pub demux: Option<DemuxStats>,
    pub files: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub lanes: Vec<String>,
    pub backend: String,
    pub work_dir: PathBuf,
    pub concatenated_bytes: BTreeMap<String, u64>,
    pub count_check: Option<CountCheck>,
    pub forward: DirectionSummary,
    pub reverse: DirectionSummary,
}

/// Record counts keyed by file name.
pub fn count_records_per_file(files: &[PathBuf]) -> io::Result<BTreeMap<String, u64>> {
    let mut counts = BTreeMap::new();
    for file in files {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string());
        counts.insert(name, record_counter(file)?);
    }
    Ok(counts)
}

pub fn write_summary(path: &Path, summary: &PipelineSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(path, json)?;
    Ok(())
}

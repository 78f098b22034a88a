//! QIIME sample mapping files and barcode lookup.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use crate::config::defs::PipelineError;
use crate::utils::sequence::{hamming_distance, reverse_complement, DNA};

const SAMPLE_ID_HEADER: &str = "#SampleID";
const BARCODE_HEADER: &str = "BarcodeSequence";

/// Sample ids become read id prefixes and file names downstream.
fn is_sample_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.' || c == '_'
}

#[derive(Debug, Clone, PartialEq)]
pub struct MappingEntry {
    pub sample_id: String,
    pub barcode: String,
}

#[derive(Debug, Clone)]
pub struct MappingFile {
    pub entries: Vec<MappingEntry>,
}

/// Outcome of looking up one observed barcode.
#[derive(Debug, Clone, PartialEq)]
pub struct BarcodeMatch<'a> {
    pub sample_id: &'a str,
    pub barcode: &'a str,
    pub diffs: usize,
}

impl MappingFile {
    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        if !path.is_file() {
            return Err(PipelineError::MissingInput(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parses mapping text: a `#SampleID` header row with a
    /// `BarcodeSequence` column, then one tab-separated row per sample.
    pub fn parse(text: &str) -> Result<Self, PipelineError> {
        let mut lines = text
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.trim().is_empty());

        let header = lines
            .next()
            .ok_or_else(|| PipelineError::InvalidMapping("mapping file is empty".to_string()))?;
        let columns: Vec<&str> = header.split('\t').map(str::trim).collect();
        if columns.first() != Some(&SAMPLE_ID_HEADER) {
            return Err(PipelineError::InvalidMapping(format!(
                "first column must be {}, found '{}'",
                SAMPLE_ID_HEADER,
                columns.first().unwrap_or(&"")
            )));
        }
        let bc_col = columns
            .iter()
            .position(|c| *c == BARCODE_HEADER)
            .ok_or_else(|| PipelineError::InvalidMapping(format!("missing {} column", BARCODE_HEADER)))?;

        let mut entries = Vec::new();
        let mut sample_ids = HashSet::new();
        let mut barcodes = HashSet::new();
        for line in lines {
            if line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
            let sample_id = fields[0];
            let barcode = fields
                .get(bc_col)
                .map(|b| b.to_ascii_uppercase())
                .unwrap_or_default();

            if sample_id.is_empty() {
                return Err(PipelineError::InvalidMapping(format!("empty sample id in row '{}'", line)));
            }
            if !sample_id.chars().all(is_sample_id_char) {
                return Err(PipelineError::InvalidMapping(format!(
                    "sample id '{}' may only hold letters, digits, '.' and '_'",
                    sample_id
                )));
            }
            if barcode.is_empty() {
                return Err(PipelineError::InvalidMapping(format!("sample {} has no barcode", sample_id)));
            }
            if !barcode.bytes().all(|b| DNA::from_byte(b).is_some()) {
                return Err(PipelineError::InvalidMapping(format!(
                    "sample {} has invalid barcode '{}'",
                    sample_id, barcode
                )));
            }
            if !sample_ids.insert(sample_id.to_string()) {
                return Err(PipelineError::InvalidMapping(format!("duplicate sample id {}", sample_id)));
            }
            if !barcodes.insert(barcode.clone()) {
                return Err(PipelineError::InvalidMapping(format!("duplicate barcode {}", barcode)));
            }
            entries.push(MappingEntry {
                sample_id: sample_id.to_string(),
                barcode,
            });
        }

        if entries.is_empty() {
            return Err(PipelineError::InvalidMapping("no samples listed".to_string()));
        }
        Ok(MappingFile { entries })
    }

    pub fn sample_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.sample_id.as_str()).collect()
    }

    /// Builds the lookup used while demultiplexing.
    pub fn barcode_table(&self, rev_comp_mapping_barcodes: bool, max_barcode_errors: usize) -> BarcodeTable {
        let entries = self
            .entries
            .iter()
            .map(|e| {
                let barcode = if rev_comp_mapping_barcodes {
                    String::from_utf8_lossy(&reverse_complement(e.barcode.as_bytes())).into_owned()
                } else {
                    e.barcode.clone()
                };
                (barcode, e.sample_id.clone())
            })
            .collect::<Vec<_>>();
        let exact = entries
            .iter()
            .enumerate()
            .map(|(i, (bc, _))| (bc.clone(), i))
            .collect();
        BarcodeTable {
            entries,
            exact,
            max_barcode_errors,
        }
    }
}

/// Barcode -> sample lookup with Hamming-distance correction.
#[derive(Debug, Clone)]
pub struct BarcodeTable {
    entries: Vec<(String, String)>,
    exact: HashMap<String, usize>,
    max_barcode_errors: usize,
}

impl BarcodeTable {
    /// Assigns an observed barcode: exact hit, else the unique closest
    /// barcode within `max_barcode_errors`.
    pub fn assign(&self, observed: &[u8]) -> Option<BarcodeMatch<'_>> {
        let observed = String::from_utf8_lossy(observed).to_ascii_uppercase();
        if let Some(&i) = self.exact.get(&observed) {
            let (barcode, sample_id) = &self.entries[i];
            return Some(BarcodeMatch { sample_id: sample_id.as_str(), barcode: barcode.as_str(), diffs: 0 });
        }
        if self.max_barcode_errors == 0 {
            return None;
        }

        let mut best: Option<(usize, usize)> = None;
        let mut tied = false;
        for (i, (barcode, _)) in self.entries.iter().enumerate() {
            let Some(d) = hamming_distance(observed.as_bytes(), barcode.as_bytes()) else {
                continue;
            };
            match best {
                Some((_, best_d)) if d > best_d => {}
                Some((_, best_d)) if d == best_d => tied = true,
                _ => {
                    best = Some((i, d));
                    tied = false;
                }
            }
        }

        match best {
            Some((i, d)) if !tied && d <= self.max_barcode_errors => {
                let (barcode, sample_id) = &self.entries[i];
                Some(BarcodeMatch { sample_id: sample_id.as_str(), barcode: barcode.as_str(), diffs: d })
            }
            _ => None,
        }
    }
}

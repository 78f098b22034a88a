use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use lazy_static::lazy_static;
use thiserror::Error;
use crate::cli::Arguments;

// External software
pub const SPLIT_LIBRARIES_FASTQ_TAG: &str = "split_libraries_fastq.py";
pub const SPLIT_ON_SAMPLE_IDS_TAG: &str = "split_sequence_file_on_sample_ids.py";

// Static Filenames
pub const FWD_FASTQ: &str = "fwd.fastq";
pub const INDEX_FASTQ: &str = "index.fastq";
pub const REV_FASTQ: &str = "rev.fastq";
pub const DEMUX_FASTQ: &str = "seqs.fastq";
pub const SUMMARY_JSON: &str = "pipeline_summary.json";

// Lane file layout, e.g. Relman_Hypo1a_NoIndex_L001_R1_001.fastq
pub const LANE_CHUNK_TAG: &str = "001";
pub const LANE_FILE_EXTS: &[&'static str] = &["fastq", "fq", "fastq.gz", "fq.gz"];

// Static Parameters
// split_libraries_fastq.py -q 0 -n 200 -r 200 -p 0: quality filtering disabled
pub const PHRED_QUALITY_THRESHOLD: u8 = 0;
pub const SEQUENCE_MAX_N: usize = 200;
pub const MAX_BAD_RUN_LENGTH: usize = 200;
pub const MIN_PER_READ_LENGTH_FRACTION: f64 = 0.0;
pub const PHRED_OFFSET: u8 = 33;
pub const DEFAULT_MAX_BARCODE_ERRORS: usize = 1;

pub const FASTA_TAG : &str = "fasta";
pub const FASTQ_TAG : &str = "fastq";
pub const FASTA_EXTS: &[&'static str] = &["fasta", "fa", "fna"];
pub const FASTQ_EXTS: &[&'static str] = &["fastq", "fq"];

lazy_static! {
    pub static ref LANE_ROLE_TAGS: HashMap<ReadRole, &'static str> = {
        let mut m = HashMap::new();
        m.insert(ReadRole::Forward, "R1");
        m.insert(ReadRole::Index, "R2");
        m.insert(ReadRole::Reverse, "R3");
        m
    };
}

/// The three files a lane contributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadRole {
    Forward,
    Index,
    Reverse,
}

impl ReadRole {
    pub fn all() -> &'static [ReadRole] {
        &[ReadRole::Forward, ReadRole::Index, ReadRole::Reverse]
    }

    /// Name of the concatenated file in the work dir.
    pub fn concatenated_name(&self) -> &'static str {
        match self {
            ReadRole::Forward => FWD_FASTQ,
            ReadRole::Index => INDEX_FASTQ,
            ReadRole::Reverse => REV_FASTQ,
        }
    }

    pub fn lane_tag(&self) -> &'static str {
        LANE_ROLE_TAGS[self]
    }
}

/// Read direction for demultiplexing and splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    pub fn all() -> &'static [Direction] {
        &[Direction::Forward, Direction::Reverse]
    }

    pub fn read_role(&self) -> ReadRole {
        match self {
            Direction::Forward => ReadRole::Forward,
            Direction::Reverse => ReadRole::Reverse,
        }
    }

    /// Demultiplexing output directory, relative to the work dir.
    pub fn demux_dir(&self) -> &'static str {
        match self {
            Direction::Forward => "f",
            Direction::Reverse => "r",
        }
    }

    /// Per-sample split directory, relative to the demux dir.
    pub fn split_dir(&self) -> &'static str {
        match self {
            Direction::Forward => "splitf",
            Direction::Reverse => "splitr",
        }
    }

    /// Tag appended to every per-sample file name.
    pub fn suffix(&self) -> &'static str {
        match self {
            Direction::Forward => "R1",
            Direction::Reverse => "R2",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Reverse => write!(f, "reverse"),
        }
    }
}

/// Quality filter parameters with split_libraries_fastq.py semantics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityParams {
    pub phred_quality_threshold: u8,
    pub max_bad_run_length: usize,
    pub min_per_read_length_fraction: f64,
    pub sequence_max_n: usize,
}

impl Default for QualityParams {
    fn default() -> Self {
        QualityParams {
            phred_quality_threshold: PHRED_QUALITY_THRESHOLD,
            max_bad_run_length: MAX_BAD_RUN_LENGTH,
            min_per_read_length_fraction: MIN_PER_READ_LENGTH_FRACTION,
            sequence_max_n: SEQUENCE_MAX_N,
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Missing input file: {0}")]
    MissingInput(PathBuf),

    #[error("Invalid mapping file: {0}")]
    InvalidMapping(String),

    #[error("Invalid FASTQ format: {0}")]
    InvalidFastqFormat(String),

    #[error("Tool execution failed for {tool}: {error}")]
    ToolExecution { tool: String, error: String },

    #[error("Demultiplexed record counts differ: forward {forward}, reverse {reverse}")]
    CountMismatch { forward: u64, reverse: u64 },

    #[error("Renaming would overwrite {0}")]
    RenameCollision(PathBuf),

    #[error("Output directory is not empty: {0}")]
    OutputExists(PathBuf),

    #[error("IO error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::IOError(e.to_string())
    }
}

pub struct RunConfig {
    pub cwd: PathBuf,
    pub out_dir: PathBuf,
    pub args: Arguments,
}

impl RunConfig {
    pub fn concatenated_path(&self, role: ReadRole) -> PathBuf {
        self.out_dir.join(role.concatenated_name())
    }

    pub fn demux_dir(&self, direction: Direction) -> PathBuf {
        self.out_dir.join(direction.demux_dir())
    }

    pub fn demux_fastq(&self, direction: Direction) -> PathBuf {
        self.demux_dir(direction).join(DEMUX_FASTQ)
    }

    pub fn split_dir(&self, direction: Direction) -> PathBuf {
        self.demux_dir(direction).join(direction.split_dir())
    }

    /// A user-supplied path, resolved against the cwd unless absolute.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = PathBuf::from(path);
        if path.is_absolute() {
            path
        } else {
            self.cwd.join(path)
        }
    }

    pub fn mapping_path(&self) -> PathBuf {
        self.resolve(&self.args.mapping)
    }
}

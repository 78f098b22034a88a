use clap::{Parser, ValueEnum};
use crate::config::defs::DEFAULT_MAX_BARCODE_ERRORS;

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq)]
pub enum Backend {
    #[default]
    Native,
    Qiime,
}

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "amplicon-prep", version, about = "Concatenate, demultiplex, split and tag paired-end amplicon reads for DADA2")]
pub struct Arguments {

    #[arg(short = 'm', long = "mapping", help = "QIIME mapping file (#SampleID, BarcodeSequence, ...)")]
    pub mapping: String,

    #[arg(short = 'l', long = "lane", required = true, help = "Lane prefix, e.g. Relman_Hypo1a_NoIndex_L001. Repeat for each lane, in order.")]
    pub lanes: Vec<String>,

    #[arg(short = 'o', long = "out", help = "Work directory for all generated files. If not specified, a directory named '<sample_base>_YYYYMMDD' will be created in the current working directory.")]
    pub out_dir: Option<String>,

    #[arg(long = "backend", default_value = "native", value_enum)]
    pub backend: Backend,

    #[arg(long, default_value_t = DEFAULT_MAX_BARCODE_ERRORS, help = "Maximum Hamming distance for barcode correction (native backend)")]
    pub max_barcode_errors: usize,

    #[arg(long, default_value_t = false, help = "Warn instead of failing when forward and reverse record counts differ")]
    pub allow_count_mismatch: bool,

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,
}

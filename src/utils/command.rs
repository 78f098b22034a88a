/// Functions and structs for creating command-line arguments for the QIIME scripts

use std::path::{Path, PathBuf};
use anyhow::{anyhow, Result};
use crate::config::defs::{SPLIT_LIBRARIES_FASTQ_TAG, SPLIT_ON_SAMPLE_IDS_TAG};
use crate::utils::streams::run_to_completion;

/// Per-invocation settings for one external tool.
#[derive(Debug, Clone)]
pub enum ToolConfig {
    SplitLibraries(split_libraries_fastq::SplitLibrariesConfig),
    SplitOnSampleIds(split_on_sample_ids::SplitOnSampleIdsConfig),
}

/// Pulls the version from `<script> --version` output,
/// e.g. `Version: split_libraries_fastq.py 1.9.1`.
fn parse_version(tool: &str, lines: &[String]) -> Result<String> {
    let line = lines
        .iter()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| anyhow!("No output from {} --version", tool))?;
    let version = line
        .split_whitespace()
        .last()
        .ok_or_else(|| anyhow!("Invalid {} --version output: {}", tool, line))?
        .to_string();
    if !version.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
        return Err(anyhow!("Invalid {} --version output: {}", tool, line));
    }
    Ok(version)
}

async fn qiime_presence_check(tool: &str) -> Result<String> {
    let args = vec!["--version".to_string()];
    let output = run_to_completion(tool, &args, &std::env::temp_dir()).await?;
    if !output.status.success() {
        return Err(anyhow!("{} --version exited with {}", tool, output.status));
    }
    parse_version(tool, &output.stdout)
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// QIIME prints output directories with a trailing slash; keep that.
fn dir_arg(path: &Path) -> String {
    let s = path_arg(path);
    if s.ends_with('/') { s } else { format!("{}/", s) }
}

pub mod split_libraries_fastq {
    use std::path::PathBuf;
    use crate::config::defs::{QualityParams, SPLIT_LIBRARIES_FASTQ_TAG};
    use super::{dir_arg, path_arg};

    #[derive(Debug, Clone)]
    pub struct SplitLibrariesConfig {
        pub reads: PathBuf,
        pub mapping: PathBuf,
        pub barcodes: PathBuf,
        pub out_dir: PathBuf,
        pub quality: QualityParams,
        pub rev_comp_barcode: bool,
        pub rev_comp_mapping_barcodes: bool,
    }

    pub async fn presence_check() -> anyhow::Result<String> {
        super::qiime_presence_check(SPLIT_LIBRARIES_FASTQ_TAG).await
    }

    pub fn arg_generator(config: &SplitLibrariesConfig) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("-i".to_string());
        args_vec.push(path_arg(&config.reads));
        args_vec.push("-m".to_string());
        args_vec.push(path_arg(&config.mapping));
        args_vec.push("-b".to_string());
        args_vec.push(path_arg(&config.barcodes));
        args_vec.push("-q".to_string());
        args_vec.push(config.quality.phred_quality_threshold.to_string());
        args_vec.push("-n".to_string());
        args_vec.push(config.quality.sequence_max_n.to_string());
        args_vec.push("-r".to_string());
        args_vec.push(config.quality.max_bad_run_length.to_string());
        args_vec.push("-p".to_string());
        args_vec.push(config.quality.min_per_read_length_fraction.to_string());
        args_vec.push("-o".to_string());
        args_vec.push(dir_arg(&config.out_dir));
        args_vec.push("--store_demultiplexed_fastq".to_string());
        if config.rev_comp_barcode {
            args_vec.push("--rev_comp_barcode".to_string());
        }
        if config.rev_comp_mapping_barcodes {
            args_vec.push("--rev_comp_mapping_barcodes".to_string());
        }
        args_vec
    }
}

pub mod split_on_sample_ids {
    use std::path::PathBuf;
    use crate::config::defs::SPLIT_ON_SAMPLE_IDS_TAG;
    use crate::utils::fastx::FastxType;
    use super::{dir_arg, path_arg};

    #[derive(Debug, Clone)]
    pub struct SplitOnSampleIdsConfig {
        pub input: PathBuf,
        pub file_type: FastxType,
        pub out_dir: PathBuf,
    }

    pub async fn presence_check() -> anyhow::Result<String> {
        super::qiime_presence_check(SPLIT_ON_SAMPLE_IDS_TAG).await
    }

    pub fn arg_generator(config: &SplitOnSampleIdsConfig) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("-i".to_string());
        args_vec.push(path_arg(&config.input));
        args_vec.push("--file_type".to_string());
        args_vec.push(config.file_type.to_string());
        args_vec.push("-o".to_string());
        args_vec.push(dir_arg(&config.out_dir));
        args_vec
    }
}

pub fn generate_cli(tool: &str, config: &ToolConfig) -> Result<Vec<String>> {
    let cmd = match (tool, config) {
        (SPLIT_LIBRARIES_FASTQ_TAG, ToolConfig::SplitLibraries(cfg)) => split_libraries_fastq::arg_generator(cfg),
        (SPLIT_ON_SAMPLE_IDS_TAG, ToolConfig::SplitOnSampleIds(cfg)) => split_on_sample_ids::arg_generator(cfg),
        (SPLIT_LIBRARIES_FASTQ_TAG, _) | (SPLIT_ON_SAMPLE_IDS_TAG, _) => {
            return Err(anyhow!("Config does not match tool: {}", tool))
        }
        _ => return Err(anyhow!("Unknown tool: {}", tool)),
    };

    Ok(cmd)
}

pub async fn check_version(tool: &str) -> Result<String> {
    let version = match tool {
        SPLIT_LIBRARIES_FASTQ_TAG => split_libraries_fastq::presence_check().await,
        SPLIT_ON_SAMPLE_IDS_TAG => split_on_sample_ids::presence_check().await,
        _ => return Err(anyhow!("Unknown tool: {}", tool)),
    };
    Ok(version?)
}

/// Paths handed to a tool, for logging.
pub fn tool_inputs(config: &ToolConfig) -> Vec<PathBuf> {
    match config {
        ToolConfig::SplitLibraries(cfg) => vec![cfg.reads.clone(), cfg.barcodes.clone(), cfg.mapping.clone()],
        ToolConfig::SplitOnSampleIds(cfg) => vec![cfg.input.clone()],
    }
}

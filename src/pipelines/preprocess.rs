use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use log::{debug, info, warn};
use crate::cli::Backend;
use crate::config::defs::{Direction, PipelineError, QualityParams, ReadRole, RunConfig, SPLIT_LIBRARIES_FASTQ_TAG, SPLIT_ON_SAMPLE_IDS_TAG, SUMMARY_JSON};
use crate::pipelines::demux::{self, DemuxConfig};
use crate::pipelines::split;
use crate::utils::command::split_libraries_fastq::SplitLibrariesConfig;
use crate::utils::command::split_on_sample_ids::SplitOnSampleIdsConfig;
use crate::utils::command::{check_version, generate_cli, tool_inputs, ToolConfig};
use crate::utils::fastx::{record_counter, FastxType};
use crate::utils::file::{concatenate_files, count_lines, prepare_empty_dir, rename_with_suffix, resolve_lane_file};
use crate::utils::mapping::MappingFile;
use crate::utils::stats::{count_records_per_file, write_summary, CountCheck, DemuxStats, DirectionSummary, PipelineSummary};
use crate::utils::streams::run_to_completion;

/// Runs blocking file work off the async runtime and waits for it.
async fn blocking<T, F>(task: F) -> Result<T, PipelineError>
where
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| PipelineError::IOError(format!("Blocking task failed: {}", e)))?
}

/// Concatenates every lane's R1/R2/R3 into fwd/index/rev in the work dir.
///
/// # Arguments
///
/// * `config` - RunConfig struct from main.
///
/// # Returns
/// Bytes written, keyed by concatenated file name.
pub async fn concatenate_lanes(config: Arc<RunConfig>) -> Result<BTreeMap<String, u64>, PipelineError> {
    if config.args.lanes.is_empty() {
        return Err(PipelineError::InvalidConfig("At least one lane is required".to_string()));
    }

    let mut written = BTreeMap::new();
    for role in ReadRole::all() {
        let inputs = config
            .args
            .lanes
            .iter()
            .map(|lane| resolve_lane_file(&config.resolve(lane), *role))
            .collect::<Result<Vec<_>, _>>()?;
        let output = config.concatenated_path(*role);
        debug!("Concatenating {:?} -> {}", inputs, output.display());

        let out = output.clone();
        let bytes = blocking(move || Ok(concatenate_files(&inputs, &out)?)).await?;
        info!("Wrote {} ({} bytes)", output.display(), bytes);
        written.insert(role.concatenated_name().to_string(), bytes);
    }
    Ok(written)
}

fn split_libraries_config(config: &RunConfig, direction: Direction) -> SplitLibrariesConfig {
    SplitLibrariesConfig {
        reads: config.concatenated_path(direction.read_role()),
        mapping: config.mapping_path(),
        barcodes: config.concatenated_path(ReadRole::Index),
        out_dir: config.demux_dir(direction),
        quality: QualityParams::default(),
        rev_comp_barcode: true,
        rev_comp_mapping_barcodes: true,
    }
}

async fn run_tool(config: &RunConfig, tool: &str, tool_config: &ToolConfig) -> Result<(), PipelineError> {
    let args = generate_cli(tool, tool_config).map_err(|e| PipelineError::ToolExecution {
        tool: tool.to_string(),
        error: e.to_string(),
    })?;
    debug!("{} inputs: {:?}", tool, tool_inputs(tool_config));

    let output = run_to_completion(tool, &args, &config.out_dir)
        .await
        .map_err(|e| PipelineError::ToolExecution {
            tool: tool.to_string(),
            error: e.to_string(),
        })?;
    if !output.status.success() {
        return Err(PipelineError::ToolExecution {
            tool: tool.to_string(),
            error: format!("exited with {}: {}", output.status, output.stderr.join("\n")),
        });
    }
    Ok(())
}

/// Refuses a work dir that already holds demultiplexed or split output,
/// so a re-run cannot overwrite the results of an earlier one.
pub fn check_work_dir_unused(config: &RunConfig) -> Result<(), PipelineError> {
    for direction in Direction::all() {
        let seqs = config.demux_fastq(*direction);
        if seqs.exists() {
            return Err(PipelineError::OutputExists(seqs));
        }
        let split_dir = config.split_dir(*direction);
        if split_dir.is_dir() && fs::read_dir(&split_dir)?.next().is_some() {
            return Err(PipelineError::OutputExists(split_dir));
        }
    }
    Ok(())
}

/// Confirms the QIIME scripts are callable before anything is written.
pub async fn check_qiime_tools() -> Result<(), PipelineError> {
    for tool in [SPLIT_LIBRARIES_FASTQ_TAG, SPLIT_ON_SAMPLE_IDS_TAG] {
        let version = check_version(tool).await.map_err(|e| PipelineError::ToolExecution {
            tool: tool.to_string(),
            error: e.to_string(),
        })?;
        info!("{} version {}", tool, version);
    }
    Ok(())
}

/// Demultiplexes one direction's reads against the shared index file.
///
/// # Arguments
///
/// * `config` - RunConfig struct from main.
/// * `direction` - Forward (fwd.fastq -> f/) or reverse (rev.fastq -> r/).
/// * `mapping` - Parsed mapping file, shared by both directions.
///
/// # Returns
/// DemuxStats from the native backend; None when QIIME did the work.
pub async fn demultiplex(
    config: Arc<RunConfig>,
    direction: Direction,
    mapping: Arc<MappingFile>,
) -> Result<Option<DemuxStats>, PipelineError> {
    let sl_config = split_libraries_config(&config, direction);
    info!("Demultiplexing {} reads into {}", direction, sl_config.out_dir.display());

    match config.args.backend {
        Backend::Native => {
            let demux_config = DemuxConfig {
                reads: sl_config.reads,
                barcodes: sl_config.barcodes,
                out_dir: sl_config.out_dir,
                quality: sl_config.quality,
                rev_comp_barcode: sl_config.rev_comp_barcode,
                rev_comp_mapping_barcodes: sl_config.rev_comp_mapping_barcodes,
                max_barcode_errors: config.args.max_barcode_errors,
            };
            let stats = blocking(move || demux::demultiplex(&demux_config, &mapping)).await?;
            Ok(Some(stats))
        }
        Backend::Qiime => {
            run_tool(&config, SPLIT_LIBRARIES_FASTQ_TAG, &ToolConfig::SplitLibraries(sl_config)).await?;
            Ok(None)
        }
    }
}

/// Reports the line counts of both demultiplexed streams, `wc -l` style,
/// and fails when their record counts differ.
pub async fn verify_counts(config: Arc<RunConfig>) -> Result<CountCheck, PipelineError> {
    let forward = config.demux_fastq(Direction::Forward);
    let reverse = config.demux_fastq(Direction::Reverse);

    let check = blocking(move || {
        Ok(CountCheck {
            forward_lines: count_lines(&forward)?,
            reverse_lines: count_lines(&reverse)?,
            forward_records: record_counter(&forward)?,
            reverse_records: record_counter(&reverse)?,
        })
    })
    .await?;

    let forward = config.demux_fastq(Direction::Forward);
    let reverse = config.demux_fastq(Direction::Reverse);
    println!("{} {}", check.forward_lines, forward.display());
    println!("{} {}", check.reverse_lines, reverse.display());
    info!("Demultiplexed line counts: forward {}, reverse {}", check.forward_lines, check.reverse_lines);

    if !check.is_consistent() {
        if config.args.allow_count_mismatch {
            warn!(
                "Forward and reverse record counts differ ({} vs {}); continuing as requested",
                check.forward_records, check.reverse_records
            );
        } else {
            return Err(PipelineError::CountMismatch {
                forward: check.forward_records,
                reverse: check.reverse_records,
            });
        }
    }
    Ok(check)
}

/// Writes one file per sample for a direction's demultiplexed stream.
pub async fn split_by_sample(config: Arc<RunConfig>, direction: Direction) -> Result<(), PipelineError> {
    let so_config = SplitOnSampleIdsConfig {
        input: config.demux_fastq(direction),
        file_type: FastxType::Fastq,
        out_dir: config.split_dir(direction),
    };
    let out_dir = so_config.out_dir.clone();
    blocking(move || prepare_empty_dir(&out_dir)).await?;

    match config.args.backend {
        Backend::Native => {
            let counts = blocking(move || split::split_by_sample(&so_config.input, so_config.file_type, &so_config.out_dir)).await?;
            debug!("{} sample counts: {:?}", direction, counts);
        }
        Backend::Qiime => {
            run_tool(&config, SPLIT_ON_SAMPLE_IDS_TAG, &ToolConfig::SplitOnSampleIds(so_config)).await?;
        }
    }
    Ok(())
}

/// Appends the direction's tag to every per-sample file.
pub async fn rename_split_files(config: Arc<RunConfig>, direction: Direction) -> Result<Vec<PathBuf>, PipelineError> {
    let dir = config.split_dir(direction);
    let suffix = direction.suffix();
    let renamed = blocking(move || rename_with_suffix(&dir, FastxType::Fastq.as_str(), suffix)).await?;
    info!("Tagged {} {} files with _{}", renamed.len(), direction, suffix);
    Ok(renamed)
}

/// Concatenate, demultiplex, verify, split and tag.
///
/// # Arguments
///
/// * `config` - RunConfig struct from main.
///
/// # Returns
/// The run summary, also written to `pipeline_summary.json` in the work dir.
pub async fn run(config: Arc<RunConfig>) -> Result<PipelineSummary, PipelineError> {
    info!("Work directory: {}", config.out_dir.display());

    let mapping_path = config.mapping_path();
    let mapping = Arc::new(blocking(move || MappingFile::from_file(&mapping_path)).await?);
    info!("Mapping file lists {} samples", mapping.entries.len());

    check_work_dir_unused(&config)?;
    if config.args.backend == Backend::Qiime {
        check_qiime_tools().await?;
    }

    fs::create_dir_all(&config.out_dir)?;
    let concatenated_bytes = concatenate_lanes(config.clone()).await?;

    let mut forward = DirectionSummary::default();
    let mut reverse = DirectionSummary::default();
    forward.demux = demultiplex(config.clone(), Direction::Forward, mapping.clone()).await?;
    reverse.demux = demultiplex(config.clone(), Direction::Reverse, mapping.clone()).await?;

    let count_check = verify_counts(config.clone()).await?;

    for direction in Direction::all() {
        split_by_sample(config.clone(), *direction).await?;
    }

    for direction in Direction::all() {
        let renamed = rename_split_files(config.clone(), *direction).await?;
        let files = blocking(move || Ok(count_records_per_file(&renamed)?)).await?;
        match direction {
            Direction::Forward => forward.files = files,
            Direction::Reverse => reverse.files = files,
        }
    }

    let summary = PipelineSummary {
        lanes: config.args.lanes.clone(),
        backend: format!("{:?}", config.args.backend).to_lowercase(),
        work_dir: config.out_dir.clone(),
        concatenated_bytes,
        count_check: Some(count_check),
        forward,
        reverse,
    };
    let summary_path = config.out_dir.join(SUMMARY_JSON);
    write_summary(&summary_path, &summary).map_err(|e| PipelineError::IOError(e.to_string()))?;
    info!("Summary written to {}", summary_path.display());
    info!("Per-sample files in {} and {} are ready for DADA2",
        config.split_dir(Direction::Forward).display(),
        config.split_dir(Direction::Reverse).display());

    Ok(summary)
}

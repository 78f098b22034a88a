use std::fs;
use std::path::Path;
use std::sync::Arc;
use anyhow::Result;
use tempfile::TempDir;
use amplicon_prep::cli::{Arguments, Backend};
use amplicon_prep::config::defs::{Direction, PipelineError, ReadRole, RunConfig, SUMMARY_JSON};
use amplicon_prep::pipelines::preprocess;
use amplicon_prep::utils::fastx::{record_counter, sequence_reader, SequenceRecord};
use amplicon_prep::utils::synthetic::write_synthetic_lane;
use amplicon_prep::utils::mapping::MappingFile;
use amplicon_prep::utils::sequence::generate_rng;
use amplicon_prep::utils::stats::PipelineSummary;

const BARCODE_A: &str = "ACGTTGCAGTCA";
const BARCODE_B: &str = "TTGACCGGATCA";

fn write_mapping(dir: &Path) -> Result<()> {
    let text = format!(
        "#SampleID\tBarcodeSequence\tLinkerPrimerSequence\tDescription\n\
         SampleA\t{}\tGTGCCAGCMGCCGCGGTAA\tfirst\n\
         SampleB\t{}\tGTGCCAGCMGCCGCGGTAA\tsecond\n",
        BARCODE_A, BARCODE_B
    );
    fs::write(dir.join("mapping.txt"), text)?;
    Ok(())
}

/// Two lanes: 6+4 reads per sample and 3+2 unassignable clusters.
fn write_two_lanes(dir: &Path) -> Result<u64> {
    let mut rng = generate_rng(Some(2024));
    let a = write_synthetic_lane(dir, "runA_L001", &[BARCODE_A, BARCODE_B], 6, 3, 60, &mut rng)?;
    let b = write_synthetic_lane(dir, "runB_L001", &[BARCODE_B, BARCODE_A], 4, 2, 60, &mut rng)?;
    Ok(a + b)
}

fn run_config(tmp: &TempDir) -> Arc<RunConfig> {
    let args = Arguments {
        mapping: "mapping.txt".to_string(),
        lanes: vec!["runA_L001".to_string(), "runB_L001".to_string()],
        out_dir: Some("hypo_sa1_0001".to_string()),
        backend: Backend::Native,
        max_barcode_errors: 1,
        allow_count_mismatch: false,
        verbose: false,
    };
    Arc::new(RunConfig {
        cwd: tmp.path().to_path_buf(),
        out_dir: tmp.path().join("hypo_sa1_0001"),
        args,
    })
}

fn file_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = fs::read_dir(dir)?
        .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<std::io::Result<Vec<_>>>()?;
    names.sort();
    Ok(names)
}

fn records(path: &Path) -> Result<Vec<SequenceRecord>> {
    Ok(sequence_reader(path)?.into_sequence_records().collect::<std::io::Result<_>>()?)
}

fn description(record: &SequenceRecord) -> String {
    match record {
        SequenceRecord::Fastq { desc, .. } | SequenceRecord::Fasta { desc, .. } => desc.clone().unwrap_or_default(),
    }
}

#[tokio::test]
async fn test_two_lanes_two_samples_end_to_end() -> Result<()> {
    let tmp = TempDir::new()?;
    write_mapping(tmp.path())?;
    let clusters = write_two_lanes(tmp.path())?;
    let config = run_config(&tmp);

    let summary = preprocess::run(config.clone()).await?;

    // Concatenation keeps every record of both lanes
    for role in ReadRole::all() {
        assert_eq!(record_counter(&config.concatenated_path(*role))?, clusters);
    }

    // Both demultiplexed streams hold the same, fully attributed records
    let check = summary.count_check.clone().expect("count check recorded");
    assert_eq!(check.forward_records, 20);
    assert_eq!(check.reverse_records, 20);
    assert_eq!(check.forward_lines, 80);
    let mapping = MappingFile::from_file(&tmp.path().join("mapping.txt"))?;
    let samples = mapping.sample_ids();
    for direction in Direction::all() {
        for record in records(&config.demux_fastq(*direction))? {
            let sample = record.id().rsplit_once('_').map(|(s, _)| s).unwrap_or("");
            assert!(samples.contains(&sample), "unexpected sample in {}", record.id());
        }
    }

    // Exactly four tagged files: two samples by two directions
    assert_eq!(
        file_names(&config.split_dir(Direction::Forward))?,
        vec!["SampleA_R1.fastq".to_string(), "SampleB_R1.fastq".to_string()]
    );
    assert_eq!(
        file_names(&config.split_dir(Direction::Reverse))?,
        vec!["SampleA_R2.fastq".to_string(), "SampleB_R2.fastq".to_string()]
    );

    // Split files partition the demultiplexed stream
    let split_f = config.split_dir(Direction::Forward);
    assert_eq!(record_counter(&split_f.join("SampleA_R1.fastq"))?, 10);
    assert_eq!(record_counter(&split_f.join("SampleB_R1.fastq"))?, 10);
    assert_eq!(summary.forward.files.values().sum::<u64>(), check.forward_records);
    assert_eq!(summary.reverse.files.values().sum::<u64>(), check.reverse_records);

    let demux = summary.forward.demux.clone().expect("native stats");
    assert_eq!(demux.total_reads, clusters);
    assert_eq!(demux.unassigned, 5);
    assert_eq!(demux.quality_rejected, 0);

    assert!(config.out_dir.join(SUMMARY_JSON).is_file());
    let loaded: PipelineSummary = serde_json::from_str(&fs::read_to_string(config.out_dir.join(SUMMARY_JSON))?)?;
    assert_eq!(loaded.lanes, vec!["runA_L001".to_string(), "runB_L001".to_string()]);
    assert_eq!(loaded.backend, "native");
    Ok(())
}

#[tokio::test]
async fn test_forward_and_reverse_files_stay_paired() -> Result<()> {
    let tmp = TempDir::new()?;
    write_mapping(tmp.path())?;
    write_two_lanes(tmp.path())?;
    let config = run_config(&tmp);
    preprocess::run(config.clone()).await?;

    for sample in ["SampleA", "SampleB"] {
        let fwd = records(&config.split_dir(Direction::Forward).join(format!("{}_R1.fastq", sample)))?;
        let rev = records(&config.split_dir(Direction::Reverse).join(format!("{}_R2.fastq", sample)))?;
        assert_eq!(fwd.len(), rev.len());
        for (f, r) in fwd.iter().zip(rev.iter()) {
            assert_eq!(f.id(), r.id());
            assert_eq!(description(f), description(r));
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_missing_lane_file_fails_before_demultiplexing() -> Result<()> {
    let tmp = TempDir::new()?;
    write_mapping(tmp.path())?;
    write_two_lanes(tmp.path())?;
    fs::remove_file(tmp.path().join("runB_L001_R3_001.fastq"))?;
    let config = run_config(&tmp);

    match preprocess::run(config.clone()).await {
        Err(PipelineError::MissingInput(path)) => {
            assert!(path.ends_with("runB_L001_R3_001.fastq"));
        }
        other => panic!("Expected MissingInput, got {:?}", other.map(|_| ())),
    }
    assert!(!config.demux_dir(Direction::Forward).exists());
    Ok(())
}

#[tokio::test]
async fn test_rerun_into_same_work_dir_is_refused() -> Result<()> {
    let tmp = TempDir::new()?;
    write_mapping(tmp.path())?;
    write_two_lanes(tmp.path())?;
    let config = run_config(&tmp);
    preprocess::run(config.clone()).await?;

    let fwd_before = fs::read(config.concatenated_path(ReadRole::Forward))?;
    let seqs_before = fs::read(config.demux_fastq(Direction::Forward))?;
    // same barcodes under new sample names
    let renamed = fs::read_to_string(tmp.path().join("mapping.txt"))?
        .replace("SampleA", "OtherA")
        .replace("SampleB", "OtherB");
    fs::write(tmp.path().join("mapping.txt"), renamed)?;

    let result = preprocess::run(config.clone()).await;
    assert!(matches!(result, Err(PipelineError::OutputExists(_))));
    assert_eq!(fs::read(config.concatenated_path(ReadRole::Forward))?, fwd_before);
    assert_eq!(fs::read(config.demux_fastq(Direction::Forward))?, seqs_before);
    assert_eq!(
        file_names(&config.split_dir(Direction::Forward))?,
        vec!["SampleA_R1.fastq".to_string(), "SampleB_R1.fastq".to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn test_leftover_demux_output_blocks_the_run() -> Result<()> {
    let tmp = TempDir::new()?;
    write_mapping(tmp.path())?;
    write_two_lanes(tmp.path())?;
    let config = run_config(&tmp);
    fs::create_dir_all(config.demux_dir(Direction::Reverse))?;
    fs::write(config.demux_fastq(Direction::Reverse), "@SampleA_0\nACGT\n+\nIIII\n")?;

    match preprocess::run(config.clone()).await {
        Err(PipelineError::OutputExists(path)) => assert_eq!(path, config.demux_fastq(Direction::Reverse)),
        other => panic!("Expected OutputExists, got {:?}", other.map(|_| ())),
    }
    assert!(!config.concatenated_path(ReadRole::Forward).exists());
    Ok(())
}

#[tokio::test]
async fn test_sample_ids_that_would_merge_or_escape_are_rejected() -> Result<()> {
    for (first, second) in [("Hypo A", "Hypo B"), ("../esc", "S2")] {
        let tmp = TempDir::new()?;
        let text = format!(
            "#SampleID\tBarcodeSequence\n{}\t{}\n{}\t{}\n",
            first, BARCODE_A, second, BARCODE_B
        );
        fs::write(tmp.path().join("mapping.txt"), text)?;
        write_two_lanes(tmp.path())?;
        let config = run_config(&tmp);

        let result = preprocess::run(config.clone()).await;
        assert!(matches!(result, Err(PipelineError::InvalidMapping(_))), "{} was accepted", first);
        assert!(!config.demux_dir(Direction::Forward).exists());
    }
    Ok(())
}

fn write_uneven_demux(config: &RunConfig) -> Result<()> {
    for (direction, n) in [(Direction::Forward, 3), (Direction::Reverse, 2)] {
        fs::create_dir_all(config.demux_dir(direction))?;
        let text: String = (0..n).map(|i| format!("@SampleA_{}\nACGT\n+\nIIII\n", i)).collect();
        fs::write(config.demux_fastq(direction), text)?;
    }
    Ok(())
}

#[tokio::test]
async fn test_count_mismatch_is_an_error() -> Result<()> {
    let tmp = TempDir::new()?;
    let config = run_config(&tmp);
    write_uneven_demux(&config)?;

    match preprocess::verify_counts(config).await {
        Err(PipelineError::CountMismatch { forward, reverse }) => {
            assert_eq!((forward, reverse), (3, 2));
        }
        other => panic!("Expected CountMismatch, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_count_mismatch_can_be_downgraded() -> Result<()> {
    let tmp = TempDir::new()?;
    let base = run_config(&tmp);
    let mut args = base.args.clone();
    args.allow_count_mismatch = true;
    let config = Arc::new(RunConfig { cwd: base.cwd.clone(), out_dir: base.out_dir.clone(), args });
    write_uneven_demux(&config)?;

    let check = preprocess::verify_counts(config).await?;
    assert_eq!(check.forward_lines, 12);
    assert_eq!(check.reverse_lines, 8);
    assert!(!check.is_consistent());
    Ok(())
}

#[tokio::test]
async fn test_invalid_mapping_stops_the_run() -> Result<()> {
    let tmp = TempDir::new()?;
    fs::write(tmp.path().join("mapping.txt"), "#SampleID\tDescription\nSampleA\tfirst\n")?;
    write_two_lanes(tmp.path())?;
    let config = run_config(&tmp);

    assert!(matches!(preprocess::run(config.clone()).await, Err(PipelineError::InvalidMapping(_))));
    assert!(!config.concatenated_path(ReadRole::Forward).exists());
    Ok(())
}

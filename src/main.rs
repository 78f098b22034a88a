use std::time::{Instant, SystemTime};
use std::{env, fs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::io::Write;

use anyhow::Result;
use chrono::DateTime;
use log::{LevelFilter, debug, error, info};
use env_logger::Builder;
use amplicon_prep::cli::{self, parse};
use amplicon_prep::config::defs::RunConfig;
use amplicon_prep::utils::file::lane_sample_base;
use amplicon_prep::pipelines::preprocess;


#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();

    let args = parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    println!("\n-------------\n Amplicon Prep for DADA2\n-------------\n");

    let dir = env::current_dir()?;
    info!("The current directory is {:?}", dir);

    let out_dir = setup_output_dir(&args, &dir)?;
    debug!("Lanes: {:?}; backend: {:?}", args.lanes, args.backend);

    let run_config = Arc::new(RunConfig {
        cwd: dir,
        out_dir,
        args,
    });

    if let Err(e) = preprocess::run(run_config).await {
        error!("Pipeline failed: {} at {} milliseconds.", e, run_start.elapsed().as_millis());
        std::process::exit(1);
    }

    println!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
    Ok(())
}


/// Sets up the work directory.
/// If `out_dir` is specified from args, uses it;
/// otherwise, creates a directory named `<sample_base>_YYYYMMDD`
/// where the sample base is the first lane prefix without its `_L00x`.
/// Ensures the directory exists.
///
/// # Arguments
/// * `args` - The parsed command-line arguments.
/// * `cwd` - The current working directory.
/// # Returns
/// path to the work directory.
fn setup_output_dir(args: &cli::args::Arguments, cwd: &Path) -> Result<PathBuf> {
    let out_dir = match &args.out_dir {
        Some(out) => {
            let path = PathBuf::from(out);
            if path.is_absolute() {
                path
            } else {
                cwd.join(path)
            }
        }
        None => {
            let first_lane = args
                .lanes
                .first()
                .ok_or_else(|| anyhow::anyhow!("At least one lane (-l) is required"))?;
            let dir_base = lane_sample_base(Path::new(first_lane));

            let timestamp = SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .ok()
                .and_then(|d| DateTime::from_timestamp(d.as_secs() as i64, 0))
                .map(|dt| dt.format("%Y%m%d").to_string())
                .unwrap_or_else(|| "19700101".to_string());
            cwd.join(format!("{}_{}", dir_base, timestamp))
        }
    };
    fs::create_dir_all(&out_dir)?;
    Ok(out_dir)
}

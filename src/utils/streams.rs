// src/utils/streams.rs
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use anyhow::{anyhow, Result};
use log::debug;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

/// Collected result of a finished external command.
#[derive(Debug)]
pub struct ChildOutput {
    pub status: ExitStatus,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

/// Reads a child's output pipe to the end, line by line.
///
/// # Arguments
///
/// * `pipe` - Stdout or stderr taken from a spawned child.
///
/// # Returns
/// All lines, without terminators.
///
pub async fn read_child_output_to_vec<R>(pipe: R) -> std::io::Result<Vec<String>>
where
    R: AsyncRead + Unpin,
{
    let mut lines = Vec::new();
    let mut reader = BufReader::new(pipe).lines();
    while let Some(line) = reader.next_line().await? {
        lines.push(line);
    }
    Ok(lines)
}

/// Runs `tool` with `args` in `cwd` and waits for it.
/// Both pipes are drained concurrently so a chatty tool cannot block.
///
/// # Arguments
///
/// * `tool` - Executable name, resolved on PATH.
/// * `args` - Command line arguments.
/// * `cwd` - Working directory for the child.
///
/// # Returns
/// ChildOutput with exit status and captured lines. Spawn failures are errors;
/// a non-zero exit is not.
///
pub async fn run_to_completion(tool: &str, args: &[String], cwd: &Path) -> Result<ChildOutput> {
    debug!("Running {} {}", tool, args.join(" "));
    let mut child = Command::new(tool)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| anyhow!("Failed to spawn {}: {}. Is it installed and on PATH?", tool, e))?;

    let stdout = child.stdout.take().ok_or_else(|| anyhow!("Child stdout was not piped"))?;
    let stderr = child.stderr.take().ok_or_else(|| anyhow!("Child stderr was not piped"))?;

    let stdout_task = tokio::spawn(read_child_output_to_vec(stdout));
    let stderr_task = tokio::spawn(read_child_output_to_vec(stderr));

    let status = child.wait().await?;
    let stdout = stdout_task.await??;
    let stderr = stderr_task.await??;

    for line in &stderr {
        debug!("[{}] {}", tool, line);
    }

    Ok(ChildOutput { status, stdout, stderr })
}

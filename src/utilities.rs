use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use log::debug;

/// Formats seconds as `HH:MM:SS,mmm`.
pub fn format_timestamp(seconds: f64) -> String {
    let total_millis = (seconds * 1000.0).round() as u64;
    let hours = total_millis / 3_600_000;
    let minutes = (total_millis % 3_600_000) / 60_000;
    let secs = (total_millis % 60_000) / 1000;
    let millis = total_millis % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

/// Runs an external tool to completion and collects its output, killing it if it
/// outlives `timeout`.
///
/// The child is also killed if the returned future is dropped, so cancelling the
/// caller never leaves a decoder running.
pub async fn run_tool(program: &str, args: &[&str], timeout: Duration) -> Result<Output> {
    debug!("Running {} {}", program, args.join(" "));
    let child = tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to start {program}"))?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .with_context(|| format!("{program} timed out after {timeout:?}"))??;

    if !output.stderr.is_empty() {
        debug!("{} stderr: {}", program, String::from_utf8_lossy(&output.stderr).trim());
    }
    Ok(output)
}

/// Size of the file at `path`, or 0 if it does not exist.
pub async fn file_len(path: &std::path::Path) -> u64 {
    tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
}

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tracing::{debug, warn};

use super::{render_command_line, EngineProgress, TranscodingEngine};
use crate::config::EngineConfig;
use crate::error::{Result, SlidemixError};

/// Number of stderr lines kept for failure messages
const STDERR_TAIL_LINES: usize = 12;

/// FFmpeg command-line engine
pub struct FfmpegEngine {
    config: EngineConfig,
}

impl FfmpegEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    fn timeout(&self) -> Option<Duration> {
        (self.config.timeout_secs > 0).then(|| Duration::from_secs(self.config.timeout_secs))
    }
}

#[async_trait]
impl TranscodingEngine for FfmpegEngine {
    async fn run(&self, work_dir: &Path, args: &[String], progress: &EngineProgress) -> Result<()> {
        debug!(
            "Executing {} {} in {}",
            self.config.binary_path,
            render_command_line(args),
            work_dir.display()
        );

        let mut child = Command::new(&self.config.binary_path)
            .args(args)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SlidemixError::Tool(format!("Failed to execute transcoding engine: {}", e)))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SlidemixError::Internal("engine stderr not captured".to_string()))?;

        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        let run = async {
            drain_stderr(stderr, progress, &mut tail).await?;
            child.wait().await
        };

        let outcome = match self.timeout() {
            Some(limit) => tokio::time::timeout(limit, run).await,
            None => Ok(run.await),
        };

        let status = match outcome {
            Ok(status) => status.map_err(|e| {
                SlidemixError::Tool(format!("Lost contact with transcoding engine: {}", e))
            })?,
            Err(_) => {
                warn!(
                    "Transcoding engine timed out after {} seconds, killing process",
                    self.config.timeout_secs
                );
                let _ = child.kill().await;
                return Err(SlidemixError::Tool(format!(
                    "transcoding engine timed out after {} seconds",
                    self.config.timeout_secs
                )));
            }
        };

        if !status.success() {
            let stderr = tail.into_iter().collect::<Vec<_>>().join("\n");
            return Err(SlidemixError::Tool(format!(
                "transcoding engine exited with {}: {}",
                status, stderr
            )));
        }

        Ok(())
    }

    async fn version(&self) -> Result<String> {
        let output = Command::new(&self.config.binary_path)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| SlidemixError::Tool(format!("Failed to execute transcoding engine: {}", e)))?;

        if output.status.success() {
            let banner = String::from_utf8_lossy(&output.stdout);
            Ok(banner.lines().next().unwrap_or("Unknown version").to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(SlidemixError::Tool(format!(
                "Transcoding engine version check failed: {}",
                stderr
            )))
        }
    }
}

/// Forward progress lines and keep the last few diagnostic lines.
///
/// ffmpeg rewrites its status line with carriage returns while other
/// diagnostics end in newlines, so either byte ends a line here.
async fn drain_stderr(
    stderr: ChildStderr,
    progress: &EngineProgress,
    tail: &mut VecDeque<String>,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stderr);
    let mut line = Vec::new();
    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            break;
        }
        let consumed = chunk.len();
        for &byte in chunk {
            if byte == b'\r' || byte == b'\n' {
                handle_line(&line, progress, tail);
                line.clear();
            } else {
                line.push(byte);
            }
        }
        reader.consume(consumed);
    }
    handle_line(&line, progress, tail);
    Ok(())
}

fn handle_line(raw: &[u8], progress: &EngineProgress, tail: &mut VecDeque<String>) {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim();
    if line.is_empty() {
        return;
    }
    if let Some(seconds) = parse_progress_time(line) {
        progress(seconds);
        return;
    }
    if tail.len() == STDERR_TAIL_LINES {
        tail.pop_front();
    }
    tail.push_back(line.to_string());
}

/// Extract `time=HH:MM:SS.xx` from an ffmpeg status line.
pub fn parse_progress_time(line: &str) -> Option<f64> {
    let start = line.find("time=")? + "time=".len();
    let value = line[start..].split_whitespace().next()?;

    let mut seconds = 0.0;
    for part in value.split(':') {
        let part: f64 = part.parse().ok()?;
        seconds = seconds * 60.0 + part;
    }
    (seconds.is_finite() && seconds >= 0.0).then_some(seconds)
}

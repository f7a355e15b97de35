//! Download subprocess management.
//!
//! Builds the extractor invocation for a [`DownloadJob`], streams its output
//! through the progress parser to a [`DownloadListener`], and honors an
//! optional cancellation flag.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::events::{STATUS_CANCELLED, STATUS_STARTING, failed_status, terminal_status};
use crate::logging::{
    ErrorCategory, append_tool_log, log_error_with_context, log_info_simple, log_warning_simple,
};

use super::events::{DownloadListener, ProgressEvent};
use super::progress::{classify_phase, parse_marked_progress};
use super::settings::{DownloadJob, build_download_args};
use super::ytdlp::{ToolCommand, ToolProcess};

/// Interval in milliseconds to check for cancellation requests
const CANCELLATION_POLL_INTERVAL_MS: u64 = 100;

/// Exit code reported in the terminal status when the extractor never started.
const SPAWN_FAILED_EXIT_CODE: i32 = -1;

#[derive(Debug, Clone)]
pub struct DownloadExecutor {
    tool_path: PathBuf,
}

impl DownloadExecutor {
    pub fn new(tool_path: impl Into<PathBuf>) -> Self {
        Self {
            tool_path: tool_path.into(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.tool_path.clone())
    }

    /// The invocation a job turns into.
    pub fn command_for(&self, job: &DownloadJob) -> ToolCommand {
        ToolCommand::new(&self.tool_path)
            .args(build_download_args(job))
            .output_dir(&job.output_directory)
    }

    /// Run a job to completion and return the extractor's exit code.
    ///
    /// Call this from a dedicated task: it only returns once the process has
    /// exited. Emits `"Starting..."`, then one status per non-empty output
    /// line (plus progress and phase notifications where the line carries
    /// them), then `"Completed"` or `"Failed (exit N)"`.
    ///
    /// When `cancel` becomes true the process is killed, `"Cancelled"` is
    /// emitted and [`EngineError::Cancelled`] is returned. If the extractor
    /// cannot be started, `"Failed (exit -1)"` follows `"Starting..."` and
    /// the error is returned.
    pub async fn run(
        &self,
        job: &DownloadJob,
        listener: &dyn DownloadListener,
        cancel: Option<&AtomicBool>,
    ) -> Result<i32> {
        job.validate()?;

        let is_cancelled = || cancel.is_some_and(|flag| flag.load(Ordering::Relaxed));
        if is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let run_key = format!("download-{}", uuid::Uuid::new_v4());
        let command = self.command_for(job);
        listener.on_status(STATUS_STARTING);

        let mut process = match ToolProcess::spawn(&command).await {
            Ok(process) => process,
            Err(e) => {
                log_error_with_context(
                    ErrorCategory::Download,
                    "Failed to start download",
                    json!({ "url": job.source_url, "run": run_key }),
                    Some(&e.to_string()),
                );
                listener.on_status(&failed_status(SPAWN_FAILED_EXIT_CODE));
                return Err(e);
            }
        };

        log_info_simple(ErrorCategory::Download, &format!("Download {} started for {}", run_key, job.source_url));

        let mut cancelled = false;
        loop {
            if is_cancelled() {
                cancelled = true;
                break;
            }

            tokio::select! {
                line = process.next_line() => {
                    let Some(line) = line else { break };
                    handle_line(&run_key, line.trim(), listener);
                }

                _ = tokio::time::sleep(Duration::from_millis(CANCELLATION_POLL_INTERVAL_MS)), if cancel.is_some() => {
                    if is_cancelled() {
                        cancelled = true;
                        break;
                    }
                }
            }
        }

        if cancelled {
            log_warning_simple(ErrorCategory::Download, &format!("Cancelling download {}", run_key));
            if let Err(e) = process.kill() {
                log_warning_simple(ErrorCategory::Download, &format!("Failed to kill extractor: {}", e));
            }
            let _ = process.finish().await;
            listener.on_status(STATUS_CANCELLED);
            return Err(EngineError::Cancelled);
        }

        let exit_code = process.finish().await?;
        listener.on_status(&terminal_status(exit_code));

        if exit_code != 0 {
            log_error_with_context(
                ErrorCategory::Download,
                "Extractor exited with error status",
                json!({ "url": job.source_url, "run": run_key, "exitCode": exit_code }),
                None,
            );
        }

        Ok(exit_code)
    }

    /// Run a job on its own task.
    pub fn spawn(
        self: &Arc<Self>,
        job: DownloadJob,
        listener: Arc<dyn DownloadListener>,
        cancel: Option<Arc<AtomicBool>>,
    ) -> JoinHandle<Result<i32>> {
        let executor = Arc::clone(self);
        tokio::spawn(async move { executor.run(&job, listener.as_ref(), cancel.as_deref()).await })
    }
}

fn handle_line(run_key: &str, line: &str, listener: &dyn DownloadListener) {
    if line.is_empty() {
        return;
    }

    append_tool_log(run_key, line);

    if let Some(phase) = classify_phase(line) {
        listener.on_phase(phase);
    }

    if let Some(progress) = parse_marked_progress(line) {
        listener.on_progress(&ProgressEvent {
            percent: progress.percent,
            speed: progress.speed,
            eta: progress.eta,
            status_line: line.to_string(),
        });
    }

    listener.on_status(line);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::events::DownloadEvent;
    use crate::downloader::progress::DownloadPhase;
    use tokio::sync::mpsc;

    fn drain(rx: &mut mpsc::UnboundedReceiver<DownloadEvent>) -> Vec<DownloadEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_handle_line_emits_progress_then_status() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        handle_line("t", "[download]  45.2% of 10.00MiB at 512.00KiB/s ETA 00:12", &tx);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        match &events[0] {
            DownloadEvent::Progress(p) => {
                assert!((p.percent - 0.452).abs() < 1e-9);
                assert_eq!(p.eta, "00:12");
            }
            other => panic!("expected progress, got {:?}", other),
        }
        assert!(matches!(&events[1], DownloadEvent::Status(s) if s.starts_with("[download]")));
    }

    #[test]
    fn test_handle_line_plain_status_and_phase() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        handle_line("t", "[download] Destination: clip.mp4", &tx);
        handle_line("t", "", &tx);
        handle_line("t", "[info] abc: Downloading 1 format(s): 22", &tx);

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                DownloadEvent::Phase(DownloadPhase::NewFile),
                DownloadEvent::Status("[download] Destination: clip.mp4".to_string()),
                DownloadEvent::Status("[info] abc: Downloading 1 format(s): 22".to_string()),
            ]
        );
    }

    #[test]
    fn test_command_for_creates_output_dir_and_targets_url() {
        let executor = DownloadExecutor::new("yt-dlp");
        let job = DownloadJob::audio("https://example.com/v", "/tmp/grabx-out", "mp3");
        let command = executor.command_for(&job);

        assert_eq!(command.program(), std::path::Path::new("yt-dlp"));
        assert!(command.get_args().contains(&"-x".to_string()));
        assert_eq!(command.get_args().last().unwrap(), "https://example.com/v");
    }

    #[tokio::test]
    async fn missing_tool_is_reported() {
        let executor = DownloadExecutor::new("/definitely/not/here/yt-dlp");
        let job = DownloadJob::video("https://example.com/v", std::env::temp_dir(), "best");
        let (tx, mut rx) = mpsc::unbounded_channel();

        let result = executor.run(&job, &tx, None).await;

        assert!(matches!(result, Err(EngineError::ToolNotFound { .. })));
        assert_eq!(
            drain(&mut rx),
            vec![
                DownloadEvent::Status("Starting...".to_string()),
                DownloadEvent::Status("Failed (exit -1)".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn invalid_job_is_rejected_before_spawning() {
        let executor = DownloadExecutor::new("yt-dlp");
        let job = DownloadJob::video("file:///etc/passwd", std::env::temp_dir(), "best");
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = executor.run(&job, &tx, None).await;

        assert!(matches!(result, Err(EngineError::Validation { .. })));
    }

    #[tokio::test]
    async fn already_cancelled_job_never_starts() {
        let executor = DownloadExecutor::new("/definitely/not/here/yt-dlp");
        let job = DownloadJob::video("https://example.com/v", std::env::temp_dir(), "best");
        let flag = AtomicBool::new(true);
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = executor.run(&job, &tx, Some(&flag)).await;

        assert!(matches!(result, Err(EngineError::Cancelled)));
    }
}

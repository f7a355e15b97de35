//! Probe service: cache, in-flight guard and scheduler behind one handle.

use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::FutureExt;
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;

use crate::config::EngineConfig;
use crate::downloader::settings::validate_url;
use crate::downloader::ytdlp::{ToolCommand, run_to_output};
use crate::error::Result;
use crate::events::EVT_PROBE_DONE;
use crate::logging::{ErrorCategory, log_debug_with_context, log_warning_with_context};

use super::cache::{InFlightTicket, ProbeCache, ProbeResult};
use super::formats::parse_format_listing;
use super::scheduler::{ProbeScheduler, SchedulerStatus};

/// Delivered once per submitted probe, after the result is cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeEvent {
    pub id: String,
    pub result: Arc<ProbeResult>,
    /// The probe errored or panicked; `result` is the empty fallback.
    pub failed: bool,
}

impl ProbeEvent {
    pub fn name(&self) -> &'static str {
        EVT_PROBE_DONE
    }
}

/// Outcome of [`ProbeService::request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeRequest {
    /// Already probed; nothing was submitted and no event will follow.
    Cached(Arc<ProbeResult>),
    /// Accepted; a [`ProbeEvent`] follows on the sink.
    Submitted,
    /// Another probe for this id is running.
    AlreadyInFlight,
    /// Queue full or service shut down. Retry later.
    Rejected,
}

pub fn probe_command(tool: &Path, url: &str) -> ToolCommand {
    ToolCommand::new(tool)
        .args(["-F", "--no-warnings", "--no-playlist"])
        .arg(url.trim())
}

/// Run one format listing and normalize it. A non-zero exit still yields
/// whatever the output contained.
pub async fn probe_formats(tool: &Path, url: &str) -> Result<ProbeResult> {
    validate_url(url)?;

    let output = run_to_output(&probe_command(tool, url)).await?;
    let result = ProbeResult::from_listing(&parse_format_listing(&output.text()));

    if !output.success() {
        log_warning_with_context(
            ErrorCategory::Probe,
            "Format listing exited with error status",
            json!({ "url": url, "exitCode": output.exit_code, "heights": result.heights.len() }),
        );
    }

    Ok(result)
}

pub struct ProbeService {
    tool_path: PathBuf,
    cache: Arc<ProbeCache>,
    scheduler: ProbeScheduler,
}

impl ProbeService {
    /// Must be called inside a tokio runtime.
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_cache(config, Arc::new(ProbeCache::new()))
    }

    /// Build a service over an existing cache, e.g. one kept across views.
    pub fn with_cache(config: &EngineConfig, cache: Arc<ProbeCache>) -> Self {
        Self {
            tool_path: config.tool_path.clone(),
            cache,
            scheduler: ProbeScheduler::new(config.probe_workers, config.probe_queue_capacity),
        }
    }

    pub fn cache(&self) -> &Arc<ProbeCache> {
        &self.cache
    }

    pub fn status(&self) -> SchedulerStatus {
        self.scheduler.status()
    }

    /// Probe `id` in the background unless it is cached or already running.
    /// Never waits.
    pub fn request(&self, id: &str, url: &str, sink: mpsc::UnboundedSender<ProbeEvent>) -> ProbeRequest {
        if let Some(result) = self.cache.get(id) {
            return ProbeRequest::Cached(result);
        }

        let Some(ticket) = self.cache.begin(id) else {
            return ProbeRequest::AlreadyInFlight;
        };

        // A probe may have completed between the lookup and the begin
        if let Some(result) = self.cache.get(id) {
            return ProbeRequest::Cached(result);
        }

        let job = run_probe(self.tool_path.clone(), url.to_string(), ticket, sink);
        if self.scheduler.submit(job.boxed()) {
            ProbeRequest::Submitted
        } else {
            ProbeRequest::Rejected
        }
    }

    /// Stop accepting probes and wait for queued and running ones.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}

async fn run_probe(tool: PathBuf, url: String, ticket: InFlightTicket, sink: mpsc::UnboundedSender<ProbeEvent>) {
    let id = ticket.id().to_string();

    let result = match AssertUnwindSafe(probe_formats(&tool, &url)).catch_unwind().await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            log_warning_with_context(
                ErrorCategory::Probe,
                "Probe failed",
                json!({ "id": id, "url": url, "error": e.to_string(), "code": e.code().as_str() }),
            );
            ProbeResult::failure()
        }
        Err(_) => {
            log_warning_with_context(ErrorCategory::Probe, "Probe panicked", json!({ "id": id, "url": url }));
            ProbeResult::failure()
        }
    };

    let result = ticket.complete(result);
    let failed = result.failed;
    log_debug_with_context(
        ErrorCategory::Probe,
        "Probe completed",
        json!({ "id": id, "heights": result.heights.iter().collect::<Vec<_>>(), "failed": failed }),
    );

    // The consumer may be gone; the result stays cached either way
    let _ = sink.send(ProbeEvent { id, result, failed });
}

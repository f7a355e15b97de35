//! Listener seam for download notifications.
//!
//! Callbacks run on the download's own task, once per output line and in
//! the order the process printed them. Implementations must be cheap and
//! must not block.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::events::{EVT_DOWNLOAD_PHASE, EVT_DOWNLOAD_PROGRESS, EVT_DOWNLOAD_STATUS};

use super::progress::DownloadPhase;

/// One progress notification. Produced per line, never retained.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Fraction in `[0, 1]`.
    pub percent: f64,
    pub speed: String,
    pub eta: String,
    pub status_line: String,
}

pub trait DownloadListener: Send + Sync {
    fn on_status(&self, status: &str);

    fn on_progress(&self, progress: &ProgressEvent);

    fn on_phase(&self, _phase: DownloadPhase) {}
}

/// Owned form of the listener callbacks, for channel consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum DownloadEvent {
    Status(String),
    Progress(ProgressEvent),
    Phase(DownloadPhase),
}

impl DownloadEvent {
    /// Event name for shells that dispatch by string.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Status(_) => EVT_DOWNLOAD_STATUS,
            Self::Progress(_) => EVT_DOWNLOAD_PROGRESS,
            Self::Phase(_) => EVT_DOWNLOAD_PHASE,
        }
    }
}

// A closed receiver means the view went away; the download keeps running.
impl DownloadListener for mpsc::UnboundedSender<DownloadEvent> {
    fn on_status(&self, status: &str) {
        let _ = self.send(DownloadEvent::Status(status.to_string()));
    }

    fn on_progress(&self, progress: &ProgressEvent) {
        let _ = self.send(DownloadEvent::Progress(progress.clone()));
    }

    fn on_phase(&self, phase: DownloadPhase) {
        let _ = self.send(DownloadEvent::Phase(phase));
    }
}

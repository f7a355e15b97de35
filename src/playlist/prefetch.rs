//! Background probe warm-up for a playlist view.
//!
//! Two passes: the first `prefetch_first_batch` items with a short pause
//! between submissions, then the rest with a longer pause, probing only items
//! that are selected and available. A shared stop flag is checked before
//! each item. Probes already running when the flag is set finish and are
//! cached.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::logging::{ErrorCategory, log_info_simple, log_warning_simple};
use crate::probe::{ProbeEvent, ProbeRequest, ProbeService};

use super::{Playlist, ProbeState};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefetchStats {
    pub submitted: usize,
    /// Answered from the cache and applied directly.
    pub cached: usize,
    /// Unavailable, already probed or failed, in flight, or not selected.
    pub skipped: usize,
    /// Dropped by a full queue; reset so a later pass retries them.
    pub rejected: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pacing {
    first_batch: usize,
    first_delay: Duration,
    rest_delay: Duration,
}

impl Pacing {
    fn from_config(config: &EngineConfig) -> Self {
        Self {
            first_batch: config.prefetch_first_batch,
            first_delay: Duration::from_millis(config.prefetch_first_delay_ms),
            rest_delay: Duration::from_millis(config.prefetch_rest_delay_ms),
        }
    }
}

/// A running prefetch. Dropping the handle does not stop it; call
/// [`cancel`](Self::cancel).
pub struct PrefetchHandle {
    stop: Arc<AtomicBool>,
    join: JoinHandle<PrefetchStats>,
}

impl PrefetchHandle {
    pub fn cancel(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub async fn join(self) -> PrefetchStats {
        match self.join.await {
            Ok(stats) => stats,
            Err(e) => {
                log_warning_simple(ErrorCategory::Playlist, &format!("Prefetch task ended abnormally: {}", e));
                PrefetchStats {
                    cancelled: true,
                    ..PrefetchStats::default()
                }
            }
        }
    }
}

/// Start warming up probes for `playlist`. Completion events go to `sink`;
/// the caller applies them with [`Playlist::apply_probe_event`].
pub fn spawn_prefetch(
    service: Arc<ProbeService>,
    playlist: Arc<Mutex<Playlist>>,
    sink: mpsc::UnboundedSender<ProbeEvent>,
    config: &EngineConfig,
) -> PrefetchHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let pacing = Pacing::from_config(config);

    let join = tokio::spawn({
        let stop = Arc::clone(&stop);
        async move { run_prefetch(&service, &playlist, &sink, pacing, &stop).await }
    });

    PrefetchHandle { stop, join }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    Submitted,
    Cached,
    Skipped,
    Rejected,
}

async fn run_prefetch(
    service: &ProbeService,
    playlist: &Mutex<Playlist>,
    sink: &mpsc::UnboundedSender<ProbeEvent>,
    pacing: Pacing,
    stop: &AtomicBool,
) -> PrefetchStats {
    let mut stats = PrefetchStats::default();
    let total = lock(playlist).len();
    let first_batch = pacing.first_batch.min(total);

    let passes = [
        (0..first_batch, pacing.first_delay, false),
        (first_batch..total, pacing.rest_delay, true),
    ];

    'passes: for (range, delay, selected_only) in passes {
        for pos in range {
            if stop.load(Ordering::SeqCst) {
                stats.cancelled = true;
                break 'passes;
            }

            match visit(service, playlist, sink, pos, selected_only) {
                Visit::Submitted => {
                    stats.submitted += 1;
                    tokio::time::sleep(delay).await;
                }
                Visit::Cached => stats.cached += 1,
                Visit::Skipped => stats.skipped += 1,
                Visit::Rejected => stats.rejected += 1,
            }
        }
    }

    log_info_simple(
        ErrorCategory::Playlist,
        &format!(
            "Prefetch {}: {} submitted, {} cached, {} skipped, {} rejected",
            if stats.cancelled { "cancelled" } else { "finished" },
            stats.submitted,
            stats.cached,
            stats.skipped,
            stats.rejected
        ),
    );

    stats
}

// The playlist lock is held across the request so a completion event
// cannot be applied before the item is marked in flight.
fn visit(
    service: &ProbeService,
    playlist: &Mutex<Playlist>,
    sink: &mpsc::UnboundedSender<ProbeEvent>,
    pos: usize,
    selected_only: bool,
) -> Visit {
    let mut playlist = lock(playlist);
    let Some(item) = playlist.items().get(pos) else {
        return Visit::Skipped;
    };

    if !item.is_available()
        || (selected_only && !item.selected)
        || matches!(item.probe_state, ProbeState::Done | ProbeState::InFlight | ProbeState::Failed)
    {
        return Visit::Skipped;
    }

    let id = item.id.clone();
    let url = item.url.clone();

    match service.request(&id, &url, sink.clone()) {
        ProbeRequest::Cached(result) => {
            playlist.apply_probe_result(&id, &result, result.failed);
            Visit::Cached
        }
        ProbeRequest::Submitted => {
            playlist.set_probe_state(&id, ProbeState::InFlight);
            Visit::Submitted
        }
        ProbeRequest::AlreadyInFlight => {
            playlist.set_probe_state(&id, ProbeState::InFlight);
            Visit::Skipped
        }
        ProbeRequest::Rejected => {
            playlist.reset_probe(&id);
            Visit::Rejected
        }
    }
}

fn lock(playlist: &Mutex<Playlist>) -> std::sync::MutexGuard<'_, Playlist> {
    playlist.lock().unwrap_or_else(PoisonError::into_inner)
}

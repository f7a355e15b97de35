//! Probing and download orchestration for a yt-dlp based media grabber.
//!
//! ## Module Structure
//! - `config` - Engine configuration and env overrides
//! - `downloader` - Extractor processes and download execution
//! - `error` - Typed errors and stable error codes
//! - `events` - Status texts and event names shared with a UI shell
//! - `logging` - Structured JSON logging
//! - `playlist` - Playlist listing, item state and probe prefetch
//! - `probe` - Format probing, caching and the bounded probe pool
//! - `quality` - Quality labels, menus and resolution

pub mod config;
pub mod downloader;
pub mod error;
pub mod events;
pub mod logging;
pub mod playlist;
pub mod probe;
pub mod quality;

pub use config::EngineConfig;
pub use downloader::{DownloadEvent, DownloadExecutor, DownloadJob, DownloadListener, ProgressEvent};
pub use error::{EngineError, ErrorCode, Result};
pub use playlist::{ContentItem, Playlist, ProbeState, spawn_prefetch};
pub use probe::{ProbeEvent, ProbeRequest, ProbeResult, ProbeService};
pub use quality::{BEST_LABEL, quality_menu, resolve_quality};

/// Install the configured log directory. Returns false when none is set or
/// one was already installed.
pub fn init_logging(config: &EngineConfig) -> bool {
    match &config.log_dir {
        Some(dir) => logging::init(dir.clone()),
        None => false,
    }
}

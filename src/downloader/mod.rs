//! Extractor process handling and download execution.
//!
//! ## Module Structure
//! - `events` - Download listener seam and owned events
//! - `progress` - Progress and phase parsing for output lines
//! - `settings` - Download job validation and argument building
//! - `subprocess` - Download execution with progress streaming
//! - `ytdlp` - Tool resolution, spawning and merged line output

pub mod events;
pub mod progress;
pub mod settings;
pub mod subprocess;
pub mod ytdlp;

pub use events::{DownloadEvent, DownloadListener, ProgressEvent};
pub use progress::{DownloadPhase, ParsedProgress, parse_progress_line};
pub use settings::DownloadJob;
pub use subprocess::DownloadExecutor;
pub use ytdlp::{ToolCommand, ToolOutput, ToolProcess, resolve_tool, run_to_output};

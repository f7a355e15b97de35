//! Format probing: listing parser, ladder normalization, caching and the
//! bounded worker pool that runs probes.
//!
//! ## Module Structure
//! - `cache` - Write-once results and the per-id in-flight guard
//! - `formats` - `-F` listing parsing into heights and sizes
//! - `ladder` - Quality ladder and height snapping
//! - `scheduler` - Fixed worker pool over a bounded queue
//! - `service` - The service object callers hold

pub mod cache;
pub mod formats;
pub mod ladder;
pub mod scheduler;
pub mod service;

pub use cache::{InFlightTicket, ProbeCache, ProbeResult};
pub use formats::{FormatListing, format_size_mb, parse_format_listing};
pub use ladder::{QUALITY_LADDER, normalize_height, normalize_heights};
pub use scheduler::{ProbeJob, ProbeScheduler, SchedulerStatus};
pub use service::{ProbeEvent, ProbeRequest, ProbeService, probe_formats};

//! Centralized status texts and event names shared with the UI shell.

pub const STATUS_STARTING: &str = "Starting...";
pub const STATUS_COMPLETED: &str = "Completed";
pub const STATUS_CANCELLED: &str = "Cancelled";

/// Terminal status for a non-zero exit.
pub fn failed_status(exit_code: i32) -> String {
    format!("Failed (exit {exit_code})")
}

/// Terminal status for an exit code.
pub fn terminal_status(exit_code: i32) -> String {
    if exit_code == 0 {
        STATUS_COMPLETED.to_string()
    } else {
        failed_status(exit_code)
    }
}

pub const EVT_DOWNLOAD_STATUS: &str = "download-status";
pub const EVT_DOWNLOAD_PROGRESS: &str = "download-progress";
pub const EVT_DOWNLOAD_PHASE: &str = "download-phase";
pub const EVT_PROBE_DONE: &str = "probe-done";

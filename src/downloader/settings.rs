//! Download job validation and extractor argument building.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Maximum URL length to prevent abuse
pub const MAX_URL_LENGTH: usize = 4096;

/// Maximum output path length (OS limits)
pub const MAX_OUTPUT_PATH_LENGTH: usize = 1024;

/// Audio codecs the extractor is allowed to convert to.
pub const AUDIO_FORMATS: [&str; 6] = ["m4a", "mp3", "opus", "aac", "wav", "flac"];

pub const DEFAULT_AUDIO_FORMAT: &str = "m4a";

/// Selector used when no height cap applies.
pub const BEST_VIDEO_SELECTOR: &str = "bv*+ba/b";

pub const BEST_AUDIO_SELECTOR: &str = "bestaudio/best";

/// File names carry the quality and a running number so a second download
/// of the same title at another quality or as audio does not collide.
const VIDEO_OUTPUT_TEMPLATE: &str = "%(title)s [%(height)sp] (%(autonumber)d).%(ext)s";

const AUDIO_OUTPUT_TEMPLATE: &str = "%(title)s [audio] (%(autonumber)d).%(ext)s";

/// One user download request. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadJob {
    pub source_url: String,
    pub output_directory: PathBuf,
    pub audio_only: bool,
    /// Video: a quality label ("720p", "Best quality (Recommended)").
    /// Audio: a codec name ("mp3", "best").
    pub quality_descriptor: String,
}

impl DownloadJob {
    pub fn video(source_url: impl Into<String>, output_directory: impl Into<PathBuf>, quality: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            output_directory: output_directory.into(),
            audio_only: false,
            quality_descriptor: quality.into(),
        }
    }

    pub fn audio(source_url: impl Into<String>, output_directory: impl Into<PathBuf>, format: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            output_directory: output_directory.into(),
            audio_only: true,
            quality_descriptor: format.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_url(&self.source_url)?;
        validate_output_location(&self.output_directory)
    }
}

/// Characters that could be dangerous if passed to a shell.
/// Arguments are passed with `Command::args`, never through a shell.
const DANGEROUS_SHELL_CHARS: &[char] = &['|', '&', ';', '$', '`', '\n', '\r', '(', ')', '<', '>'];

/// Validate URL input
pub fn validate_url(url: &str) -> Result<()> {
    let url = url.trim();
    if url.is_empty() {
        return Err(EngineError::invalid_url("URL cannot be empty"));
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(EngineError::invalid_url("URL must start with http:// or https://"));
    }

    if url.len() > MAX_URL_LENGTH {
        return Err(EngineError::invalid_url(format!("URL is too long (max {} characters)", MAX_URL_LENGTH)));
    }

    if url.chars().any(|c| DANGEROUS_SHELL_CHARS.contains(&c)) {
        return Err(EngineError::invalid_url("URL contains invalid characters"));
    }

    Ok(())
}

/// Validate output location
pub fn validate_output_location(location: &Path) -> Result<()> {
    let raw = location.as_os_str();
    if raw.is_empty() || location.to_string_lossy().trim().is_empty() {
        return Err(EngineError::invalid_path("Output location cannot be empty"));
    }

    if raw.len() > MAX_OUTPUT_PATH_LENGTH {
        return Err(EngineError::invalid_path(format!(
            "Output location path is too long (max {} characters)",
            MAX_OUTPUT_PATH_LENGTH
        )));
    }

    Ok(())
}

/// Map a requested audio codec onto a supported one. Blank, "best" and
/// unknown inputs all become `m4a`.
pub fn normalize_audio_format(requested: &str) -> &'static str {
    let s = requested.trim().to_lowercase();
    if s.is_empty() || s.contains("best") {
        return DEFAULT_AUDIO_FORMAT;
    }
    AUDIO_FORMATS.iter().copied().find(|f| *f == s).unwrap_or(DEFAULT_AUDIO_FORMAT)
}

/// Leading integer of a quality label: "1080p (HD)" -> 1080.
pub fn extract_height(label: &str) -> Option<u32> {
    let digits: String = label
        .trim()
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Build the `-f` selector for a video quality label.
pub fn build_video_selector(quality: &str) -> String {
    let q = quality.trim();
    if q.is_empty() || q.to_lowercase().contains("best") {
        return BEST_VIDEO_SELECTOR.to_string();
    }

    match extract_height(q) {
        Some(h) if h > 0 => format!("bv*[height<={h}]+ba/b[height<={h}]/{BEST_VIDEO_SELECTOR}"),
        _ => BEST_VIDEO_SELECTOR.to_string(),
    }
}

/// Build format selection arguments for a job
pub fn build_format_args(job: &DownloadJob) -> Vec<String> {
    if job.audio_only {
        vec![
            "-x".to_string(),
            "--audio-format".to_string(),
            normalize_audio_format(&job.quality_descriptor).to_string(),
            "-f".to_string(),
            BEST_AUDIO_SELECTOR.to_string(),
        ]
    } else {
        vec!["-f".to_string(), build_video_selector(&job.quality_descriptor)]
    }
}

/// Full argument list for a download invocation (program excluded).
pub fn build_download_args(job: &DownloadJob) -> Vec<String> {
    let template = if job.audio_only { AUDIO_OUTPUT_TEMPLATE } else { VIDEO_OUTPUT_TEMPLATE };
    let output_template = job.output_directory.join(template);

    let mut args: Vec<String> = [
        "--newline",
        "--no-warnings",
        "--progress",
        "--encoding",
        "utf-8",
        "--no-overwrites",
        "--autonumber-start",
        "1",
        "-o",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    args.push(output_template.to_string_lossy().to_string());
    args.extend(build_format_args(job));
    args.push(job.source_url.trim().to_string());
    args
}

//! Progress parsing utilities for extractor output.

use serde::Serialize;

/// Marker every download progress line starts with (`--newline` output).
pub const PROGRESS_MARKER: &str = "[download]";

/// Percent, speed and ETA extracted from one progress line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedProgress {
    /// Fraction in `[0, 1]`.
    pub percent: f64,
    pub speed: String,
    pub eta: String,
}

/// Coarse download phases worth telling the UI about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DownloadPhase {
    /// A new destination file started; progress restarts from zero.
    NewFile,
    /// Merging, fixups, audio extraction: percent is no longer meaningful.
    PostProcessing,
}

/// Parse a progress line such as
/// `[download]  45.2% of 10.00MiB at 512.00KiB/s ETA 00:12`.
///
/// Returns `None` when the line has no `%` or the number before it does not
/// parse; the caller then treats the line as plain status text.
pub fn parse_progress_line(line: &str) -> Option<ParsedProgress> {
    let pct_idx = line.find('%')?;

    let head = &line[..pct_idx];
    let number_start = head
        .char_indices()
        .rev()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.' || *c == ' '))
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);

    let percent = head[number_start..].trim().parse::<f64>().ok()?;
    if !percent.is_finite() {
        return None;
    }
    let percent = (percent / 100.0).clamp(0.0, 1.0);

    let (speed, eta) = match line.find(" at ") {
        Some(at) => {
            let after_at = &line[at + 4..];
            match after_at.find(" ETA ") {
                Some(eta_idx) => (after_at[..eta_idx].trim(), after_at[eta_idx + 5..].trim()),
                None => (after_at.trim(), ""),
            }
        }
        None => ("", ""),
    };

    Some(ParsedProgress {
        percent,
        speed: speed.to_string(),
        eta: eta.to_string(),
    })
}

/// Parse only lines carrying the progress marker.
pub fn parse_marked_progress(line: &str) -> Option<ParsedProgress> {
    if !line.starts_with(PROGRESS_MARKER) {
        return None;
    }
    parse_progress_line(line)
}

/// Detect phase changes from a trimmed output line.
pub fn classify_phase(line: &str) -> Option<DownloadPhase> {
    if line.starts_with("[download] Destination") {
        return Some(DownloadPhase::NewFile);
    }

    let post_processing = line.starts_with("[Merger]")
        || line.contains("Merging formats into")
        || line.contains("Post-process")
        || line.contains("Postprocessing")
        || line.contains("Fixing")
        || line.contains("Extracting")
        || line.contains("Deleting original file");

    post_processing.then_some(DownloadPhase::PostProcessing)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_parse_progress_line_full() {
        let p = parse_progress_line("[download]  45.2% of 10.00MiB at 512.00KiB/s ETA 00:12").unwrap();
        assert!(approx(p.percent, 0.452));
        assert_eq!(p.speed, "512.00KiB/s");
        assert_eq!(p.eta, "00:12");
    }

    #[test]
    fn test_parse_progress_line_without_eta() {
        let p = parse_progress_line("[download] 100% of 10.00MiB at 2.00MiB/s").unwrap();
        assert!(approx(p.percent, 1.0));
        assert_eq!(p.speed, "2.00MiB/s");
        assert_eq!(p.eta, "");
    }

    #[test]
    fn test_parse_progress_line_without_speed() {
        let p = parse_progress_line("[download] 100% of 10.00MiB in 00:05").unwrap();
        assert!(approx(p.percent, 1.0));
        assert_eq!(p.speed, "");
        assert_eq!(p.eta, "");
    }

    #[test]
    fn test_parse_progress_line_clamps() {
        let p = parse_progress_line("[download] 150.0% of 1.00MiB").unwrap();
        assert!(approx(p.percent, 1.0));

        let p = parse_progress_line("[download] 0.0% of 1.00MiB").unwrap();
        assert!(approx(p.percent, 0.0));
    }

    #[test]
    fn test_parse_progress_line_no_percent() {
        assert_eq!(parse_progress_line("[download] Destination: video.mp4"), None);
        assert_eq!(parse_progress_line(""), None);
    }

    #[test]
    fn test_parse_progress_line_malformed_number() {
        assert_eq!(parse_progress_line("[download] N/A% of ~1.00MiB"), None);
        assert_eq!(parse_progress_line("%"), None);
        assert_eq!(parse_progress_line("[download] 1.2.3% of 1.00MiB"), None);
    }

    #[test]
    fn test_parse_marked_progress_requires_marker() {
        assert!(parse_marked_progress("[download]  12.0% of 3.00MiB at 1.00MiB/s ETA 00:02").is_some());
        assert!(parse_marked_progress("[ffmpeg] 50% done").is_none());
    }

    #[test]
    fn test_classify_phase() {
        assert_eq!(classify_phase("[download] Destination: clip.f137.mp4"), Some(DownloadPhase::NewFile));
        assert_eq!(
            classify_phase("[Merger] Merging formats into \"clip.mp4\""),
            Some(DownloadPhase::PostProcessing)
        );
        assert_eq!(classify_phase("[ExtractAudio] Destination: clip.m4a"), None);
        assert_eq!(
            classify_phase("Deleting original file clip.f137.mp4 (pass -k to keep)"),
            Some(DownloadPhase::PostProcessing)
        );
        assert_eq!(classify_phase("[download]  10.0% of 3.00MiB"), None);
    }
}

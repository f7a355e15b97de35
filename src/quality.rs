//! Quality labels, per-item quality menus and desired-quality resolution.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::downloader::settings::extract_height;
use crate::probe::ProbeResult;

/// Sentinel label meaning "let the extractor pick".
pub const BEST_LABEL: &str = "Best quality (Recommended)";

/// Marks an item whose quality differs from the group default.
pub const CUSTOM_LABEL: &str = "Custom";

/// Offered when a probe produced nothing usable.
pub const DEFAULT_QUALITY_HEIGHTS: [u32; 5] = [1080, 720, 480, 360, 240];

pub fn is_best(label: &str) -> bool {
    label.trim().to_lowercase().starts_with("best")
}

/// Visual divider rows in a quality list ("──────", "----").
pub fn is_separator(label: &str) -> bool {
    let label = label.trim();
    !label.is_empty() && label.chars().all(|c| c == '─' || c == '-')
}

/// `"2160p (4K)"`, `"1440p (2K)"`, otherwise `"<h>p"`.
pub fn display_label(height: u32) -> String {
    if height >= 2160 {
        "2160p (4K)".to_string()
    } else if height >= 1440 {
        "1440p (2K)".to_string()
    } else {
        format!("{height}p")
    }
}

/// Height of a concrete quality label; `None` for Best, separators, Custom.
pub fn label_height(label: &str) -> Option<u32> {
    if is_best(label) || is_separator(label) {
        return None;
    }
    extract_height(label).filter(|h| *h > 0)
}

/// Pick the available label closest to `desired`.
///
/// The largest height not above the desired one wins. When every available
/// height is above it, the largest available height is used instead. Best,
/// unparseable input and an empty list all resolve to [`BEST_LABEL`].
pub fn resolve_quality<S: AsRef<str>>(desired: &str, available: &[S]) -> String {
    if is_best(desired) || available.is_empty() {
        return BEST_LABEL.to_string();
    }
    let Some(target) = label_height(desired) else {
        return BEST_LABEL.to_string();
    };

    let candidates: Vec<(u32, &str)> = available
        .iter()
        .map(AsRef::as_ref)
        .filter_map(|label| label_height(label).map(|h| (h, label)))
        .collect();

    let floor = candidates.iter().filter(|(h, _)| *h <= target).max_by_key(|(h, _)| *h);
    let chosen = floor.or_else(|| candidates.iter().max_by_key(|(h, _)| *h));

    chosen.map_or_else(|| BEST_LABEL.to_string(), |(_, label)| label.to_string())
}

/// What a per-item quality picker shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityMenu {
    /// Best first, then heights descending.
    pub labels: Vec<String>,
    pub size_by_label: BTreeMap<String, String>,
}

impl QualityMenu {
    pub fn size_for(&self, label: &str) -> Option<&str> {
        self.size_by_label.get(label).map(String::as_str)
    }
}

/// Build the menu for a probe result. An empty result yields the default
/// list without sizes.
pub fn quality_menu(result: &ProbeResult) -> QualityMenu {
    let mut labels = vec![BEST_LABEL.to_string()];

    if result.is_empty() {
        labels.extend(DEFAULT_QUALITY_HEIGHTS.iter().map(|h| display_label(*h)));
        return QualityMenu {
            labels,
            size_by_label: BTreeMap::new(),
        };
    }

    let mut size_by_label = BTreeMap::new();
    for height in result.heights.iter().rev() {
        let label = display_label(*height);
        if let Some(size) = result.size_by_height.get(height) {
            size_by_label.insert(label.clone(), size.clone());
        }
        labels.push(label);
    }

    QualityMenu { labels, size_by_label }
}

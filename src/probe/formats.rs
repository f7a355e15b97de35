//! Parsing of the extractor's `-F` format table into height and size facts.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;

/// `1920x1080`: width and height, 3 or 4 digits each.
static RESOLUTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{3,4})x(\d{3,4})\b").expect("valid regex"));

/// `1080p` or `2160p60`; the frame-rate suffix is ignored.
static BARE_HEIGHT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{3,4})p(?:\d{2,3})?\b").expect("valid regex"));

/// `12.34MiB`: number immediately followed by a binary unit.
static SIZE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)(KiB|MiB|GiB)\b").expect("valid regex"));

const MB_PER_MIB: f64 = 1.048576;

/// Raw facts from one listing, before ladder normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatListing {
    pub heights: BTreeSet<u32>,
    /// Approximate size text per raw height; first size seen wins.
    pub size_by_height: BTreeMap<u32, String>,
}

/// Convert a size token to decimal megabytes.
pub fn size_to_mb(value: f64, unit: &str) -> Option<f64> {
    match unit {
        "KiB" => Some(value * 1024.0 / 1_000_000.0),
        "MiB" => Some(value * MB_PER_MIB),
        "GiB" => Some(value * 1024.0 * MB_PER_MIB),
        _ => None,
    }
}

/// `"524 MB"` below 1024 MB, `"2.7 GB"` from there on.
pub fn format_size_mb(mb: f64) -> String {
    if mb < 1024.0 {
        format!("{} MB", mb.round() as u64)
    } else {
        format!("{:.1} GB", mb / 1000.0)
    }
}

/// First size token on a line, already formatted.
pub fn first_size_on_line(line: &str) -> Option<String> {
    SIZE_RE.captures_iter(line).find_map(|caps| {
        let value = caps[1].parse::<f64>().ok()?;
        size_to_mb(value, &caps[2]).map(format_size_mb)
    })
}

/// Every raw height mentioned on a line, in order of appearance.
pub fn heights_on_line(line: &str) -> Vec<u32> {
    let mut found: Vec<(usize, u32)> = RESOLUTION_RE
        .captures_iter(line)
        .filter_map(|caps| {
            let m = caps.get(2)?;
            Some((m.start(), m.as_str().parse().ok()?))
        })
        .chain(BARE_HEIGHT_RE.captures_iter(line).filter_map(|caps| {
            let m = caps.get(1)?;
            Some((m.start(), m.as_str().parse().ok()?))
        }))
        .collect();

    found.sort_by_key(|(pos, _)| *pos);
    found.into_iter().map(|(_, h)| h).collect()
}

/// Scan a full listing. A size only attaches to heights on its own line.
pub fn parse_format_listing(output: &str) -> FormatListing {
    let mut listing = FormatListing::default();

    for line in output.lines() {
        let heights = heights_on_line(line);
        if heights.is_empty() {
            continue;
        }

        let size = first_size_on_line(line);
        for height in heights {
            listing.heights.insert(height);
            if let Some(size) = &size {
                listing.size_by_height.entry(height).or_insert_with(|| size.clone());
            }
        }
    }

    listing
}

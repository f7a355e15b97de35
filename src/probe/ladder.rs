//! The fixed quality ladder and height snapping.

use std::collections::BTreeSet;

/// Standard vertical resolutions surfaced as quality tiers, ascending.
pub const QUALITY_LADDER: [u32; 8] = [144, 240, 360, 480, 720, 1080, 1440, 2160];

/// Accepted distance between a reported height and a ladder value.
pub fn tolerance(ladder_value: u32) -> u32 {
    if ladder_value >= 1440 {
        40
    } else if ladder_value >= 720 {
        20
    } else {
        10
    }
}

pub fn is_ladder_height(height: u32) -> bool {
    QUALITY_LADDER.contains(&height)
}

/// Snap a reported height to the nearest ladder value when it lies within
/// that value's tolerance; otherwise return it unchanged.
pub fn normalize_height(raw: u32) -> u32 {
    let nearest = QUALITY_LADDER
        .iter()
        .copied()
        .min_by_key(|v| v.abs_diff(raw))
        .unwrap_or(raw);

    if nearest.abs_diff(raw) <= tolerance(nearest) { nearest } else { raw }
}

/// Normalize every height and keep only exact ladder members.
pub fn normalize_heights<I>(raw: I) -> BTreeSet<u32>
where
    I: IntoIterator<Item = u32>,
{
    raw.into_iter().map(normalize_height).filter(|h| is_ladder_height(*h)).collect()
}

//! Playlist listing and the per-item state a playlist view works with.
//!
//! ## Module Structure
//! - `prefetch` - Paced, cancellable background probing of listed items

pub mod prefetch;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use serde::Serialize;
use serde_json::json;

use crate::downloader::settings::{DEFAULT_AUDIO_FORMAT, DownloadJob, validate_url};
use crate::downloader::ytdlp::{ToolCommand, run_to_output};
use crate::error::Result;
use crate::logging::{ErrorCategory, log_info_simple, log_warning_with_context};
use crate::probe::{ProbeEvent, ProbeResult};
use crate::quality::{BEST_LABEL, CUSTOM_LABEL, is_best, label_height, quality_menu, resolve_quality};

pub use prefetch::{PrefetchHandle, PrefetchStats, spawn_prefetch};

/// `%(id)s|%(title)s`, one entry per line.
pub const LISTING_TEMPLATE: &str = "%(id)s|%(title)s";

pub const PRIVATE_REASON: &str = "Private video";
pub const DELETED_REASON: &str = "Deleted video";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProbeState {
    NotStarted,
    InFlight,
    Done,
    Failed,
}

/// One playlist entry and its view state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: String,
    /// 1-based position in the listing.
    pub index: usize,
    pub title: String,
    pub url: String,
    pub thumbnail_ref: Option<String>,
    pub selected: bool,
    pub unavailable: bool,
    pub unavailable_reason: Option<String>,
    pub desired_quality: String,
    /// Set once the user picks a quality for this item directly.
    pub manual_quality: bool,
    pub probe_state: ProbeState,
    pub available_qualities: Vec<String>,
    pub size_by_quality: BTreeMap<String, String>,
}

impl ContentItem {
    pub fn new(index: usize, id: &str, title: &str) -> Self {
        let id = id.trim();
        let title = match title.trim() {
            "" => id,
            t => t,
        };
        let reason = unavailable_reason(title);

        Self {
            id: id.to_string(),
            index,
            title: title.to_string(),
            url: watch_url(id),
            thumbnail_ref: thumbnail_ref(id),
            selected: reason.is_none(),
            unavailable: reason.is_some(),
            unavailable_reason: reason.map(str::to_string),
            desired_quality: BEST_LABEL.to_string(),
            manual_quality: false,
            probe_state: ProbeState::NotStarted,
            available_qualities: Vec::new(),
            size_by_quality: BTreeMap::new(),
        }
    }

    /// `"3. Title"`
    pub fn display_title(&self) -> String {
        if self.index > 0 {
            format!("{}. {}", self.index, self.title)
        } else {
            self.title.clone()
        }
    }

    pub fn size_for(&self, label: &str) -> Option<&str> {
        self.size_by_quality.get(label).map(String::as_str)
    }

    /// Unavailable items are never probed or downloaded.
    pub fn is_available(&self) -> bool {
        !self.unavailable
    }
}

/// Reason text when a listed title marks the entry as unavailable.
pub fn unavailable_reason(title: &str) -> Option<&'static str> {
    let lower = title.trim().to_lowercase();
    if lower.contains("private video") {
        Some(PRIVATE_REASON)
    } else if lower.contains("deleted video") {
        Some(DELETED_REASON)
    } else {
        None
    }
}

/// Watch page for a listed id. Ids that are already URLs are kept.
pub fn watch_url(id: &str) -> String {
    if id.starts_with("http://") || id.starts_with("https://") {
        id.to_string()
    } else {
        format!("https://www.youtube.com/watch?v={id}")
    }
}

pub fn thumbnail_ref(id: &str) -> Option<String> {
    if id.is_empty() || id.contains('/') {
        None
    } else {
        Some(format!("https://i.ytimg.com/vi/{id}/mqdefault.jpg"))
    }
}

/// Parse `id|title` lines. Lines without a separator are skipped and the
/// first occurrence of an id wins.
pub fn parse_listing(output: &str) -> Vec<ContentItem> {
    let mut seen = HashSet::new();
    let mut items = Vec::new();

    for line in output.lines() {
        let Some((id, title)) = line.trim().split_once('|') else {
            continue;
        };
        let id = id.trim();
        if id.is_empty() || !seen.insert(id.to_string()) {
            continue;
        }

        items.push(ContentItem::new(items.len() + 1, id, title));
    }

    items
}

pub fn listing_command(tool: &Path, url: &str) -> ToolCommand {
    ToolCommand::new(tool)
        .args(["--flat-playlist", "--no-warnings", "--print", LISTING_TEMPLATE])
        .arg(url.trim())
}

/// List a playlist URL's entries without probing any of them.
pub async fn list_playlist(tool: &Path, url: &str) -> Result<Vec<ContentItem>> {
    validate_url(url)?;

    let output = run_to_output(&listing_command(tool, url)).await?;
    let items = parse_listing(&output.text());

    if !output.success() {
        log_warning_with_context(
            ErrorCategory::Playlist,
            "Playlist listing exited with error status",
            json!({ "url": url, "exitCode": output.exit_code, "items": items.len() }),
        );
    }

    log_info_simple(ErrorCategory::Playlist, &format!("Listed {} items for {}", items.len(), url));
    Ok(items)
}

/// Items of one playlist view plus the group-wide quality choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    items: Vec<ContentItem>,
    group_quality: String,
    #[serde(skip)]
    positions: HashMap<String, usize>,
}

impl Playlist {
    pub fn new(items: Vec<ContentItem>) -> Self {
        let positions = items.iter().enumerate().map(|(pos, item)| (item.id.clone(), pos)).collect();
        Self {
            items,
            group_quality: BEST_LABEL.to_string(),
            positions,
        }
    }

    pub fn from_listing(output: &str) -> Self {
        Self::new(parse_listing(output))
    }

    pub fn items(&self) -> &[ContentItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ContentItem> {
        self.positions.get(id).map(|pos| &self.items[*pos])
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut ContentItem> {
        self.positions.get(id).map(|pos| &mut self.items[*pos])
    }

    pub fn group_quality(&self) -> &str {
        &self.group_quality
    }

    /// What the group picker shows: the group choice, or Custom once any
    /// available item was set by hand.
    pub fn group_label(&self) -> &str {
        if self.items.iter().any(|item| item.is_available() && item.manual_quality) {
            CUSTOM_LABEL
        } else {
            &self.group_quality
        }
    }

    /// Unavailable items cannot be selected.
    pub fn set_selected(&mut self, id: &str, selected: bool) -> bool {
        match self.get_mut(id) {
            Some(item) if item.is_available() => {
                item.selected = selected;
                true
            }
            _ => false,
        }
    }

    pub fn select_all(&mut self, selected: bool) {
        for item in self.items.iter_mut().filter(|item| item.is_available()) {
            item.selected = selected;
        }
    }

    pub fn selected_count(&self) -> usize {
        self.items.iter().filter(|item| item.selected).count()
    }

    pub fn set_probe_state(&mut self, id: &str, state: ProbeState) {
        if let Some(item) = self.get_mut(id) {
            item.probe_state = state;
        }
    }

    /// Fill an item's quality menu from a probe result.
    pub fn apply_probe_result(&mut self, id: &str, result: &ProbeResult, failed: bool) -> bool {
        let group_quality = self.group_quality.clone();
        let Some(item) = self.get_mut(id) else {
            return false;
        };

        let menu = quality_menu(result);
        item.available_qualities = menu.labels;
        item.size_by_quality = menu.size_by_label;
        item.probe_state = if failed { ProbeState::Failed } else { ProbeState::Done };

        if item.manual_quality {
            if !item.available_qualities.contains(&item.desired_quality) {
                item.desired_quality = resolve_quality(&item.desired_quality, &item.available_qualities);
            }
        } else {
            follow_group(item, &group_quality);
        }
        true
    }

    pub fn apply_probe_event(&mut self, event: &ProbeEvent) -> bool {
        self.apply_probe_result(&event.id, &event.result, event.failed)
    }

    /// Change the group default and re-resolve every item not set by hand.
    /// Custom is a display state, not a choice, and is ignored.
    pub fn set_group_quality(&mut self, label: &str) -> bool {
        if label.trim() == CUSTOM_LABEL || !(is_best(label) || label_height(label).is_some()) {
            return false;
        }

        self.group_quality = if is_best(label) { BEST_LABEL.to_string() } else { label.trim().to_string() };
        for item in self.items.iter_mut().filter(|item| !item.manual_quality) {
            follow_group(item, &self.group_quality);
        }
        true
    }

    pub fn set_item_quality(&mut self, id: &str, label: &str) -> bool {
        match self.get_mut(id) {
            Some(item) => {
                item.desired_quality = label.trim().to_string();
                item.manual_quality = true;
                true
            }
            None => false,
        }
    }

    /// Drop a manual choice and follow the group again.
    pub fn clear_item_quality(&mut self, id: &str) -> bool {
        let group_quality = self.group_quality.clone();
        match self.get_mut(id) {
            Some(item) => {
                item.manual_quality = false;
                follow_group(item, &group_quality);
                true
            }
            None => false,
        }
    }

    pub fn mark_probe_failed(&mut self, id: &str) {
        self.set_probe_state(id, ProbeState::Failed);
    }

    /// Back to not-probed so a later pass retries it.
    pub fn reset_probe(&mut self, id: &str) {
        self.set_probe_state(id, ProbeState::NotStarted);
    }

    /// Download jobs for every selected, available item, in listing order.
    pub fn selected_jobs(&self, output_dir: &Path, audio_only: bool) -> Vec<DownloadJob> {
        self.items
            .iter()
            .filter(|item| item.selected && item.is_available())
            .map(|item| {
                if audio_only {
                    DownloadJob::audio(&item.url, output_dir, DEFAULT_AUDIO_FORMAT)
                } else {
                    DownloadJob::video(&item.url, output_dir, &item.desired_quality)
                }
            })
            .collect()
    }
}

/// Unprobed items keep the group label as-is until their menu is known.
fn follow_group(item: &mut ContentItem, group_quality: &str) {
    item.desired_quality = if item.available_qualities.is_empty() {
        group_quality.to_string()
    } else {
        resolve_quality(group_quality, &item.available_qualities)
    };
}

//! Per-id probe result cache with an in-flight guard.
//!
//! For any id at most one probe runs at a time: [`ProbeCache::try_begin`]
//! succeeds once until the matching [`ProbeCache::complete`] (or release).
//! Results are write-once and never expire within a session.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use super::formats::FormatListing;
use super::ladder::{is_ladder_height, normalize_height, normalize_heights};

/// Normalized probe facts for one content id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    /// Ladder heights only.
    pub heights: BTreeSet<u32>,
    pub size_by_height: BTreeMap<u32, String>,
    /// The probe errored or panicked. Cached like any other result so the
    /// failure survives later lookups.
    pub failed: bool,
}

impl ProbeResult {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Empty result recorded for a probe that could not finish.
    pub fn failure() -> Self {
        Self {
            failed: true,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.heights.is_empty()
    }

    /// Snap raw listing heights onto the ladder. Sizes follow their height;
    /// when several raw heights snap to one tier the lowest raw height's size
    /// is kept.
    pub fn from_listing(listing: &FormatListing) -> Self {
        let heights = normalize_heights(listing.heights.iter().copied());

        let mut size_by_height = BTreeMap::new();
        for (raw, size) in &listing.size_by_height {
            let height = normalize_height(*raw);
            if is_ladder_height(height) {
                size_by_height.entry(height).or_insert_with(|| size.clone());
            }
        }

        Self {
            heights,
            size_by_height,
            failed: false,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct ProbeCache {
    results: Mutex<HashMap<String, Arc<ProbeResult>>>,
    in_flight: Mutex<HashSet<String>>,
}

impl ProbeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically mark `id` as in flight. Returns false if it already is.
    pub fn try_begin(&self, id: &str) -> bool {
        lock(&self.in_flight).insert(id.to_string())
    }

    /// Store the result and clear the in-flight mark. The first stored
    /// result for an id is kept; the returned value is the cached one.
    pub fn complete(&self, id: &str, result: ProbeResult) -> Arc<ProbeResult> {
        let cached = lock(&self.results)
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(result))
            .clone();
        lock(&self.in_flight).remove(id);
        cached
    }

    /// Clear the in-flight mark without storing anything.
    pub fn release(&self, id: &str) {
        lock(&self.in_flight).remove(id);
    }

    pub fn get(&self, id: &str) -> Option<Arc<ProbeResult>> {
        lock(&self.results).get(id).cloned()
    }

    pub fn is_in_flight(&self, id: &str) -> bool {
        lock(&self.in_flight).contains(id)
    }

    pub fn len(&self) -> usize {
        lock(&self.results).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// [`try_begin`](Self::try_begin) returning a ticket that releases the
    /// mark on drop unless completed.
    pub fn begin(self: &Arc<Self>, id: &str) -> Option<InFlightTicket> {
        self.try_begin(id).then(|| InFlightTicket {
            cache: Arc::clone(self),
            id: id.to_string(),
            completed: false,
        })
    }
}

/// Proof that the holder owns the in-flight slot for one id.
#[derive(Debug)]
pub struct InFlightTicket {
    cache: Arc<ProbeCache>,
    id: String,
    completed: bool,
}

impl InFlightTicket {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn complete(mut self, result: ProbeResult) -> Arc<ProbeResult> {
        self.completed = true;
        self.cache.complete(&self.id, result)
    }
}

impl Drop for InFlightTicket {
    fn drop(&mut self) {
        if !self.completed {
            self.cache.release(&self.id);
        }
    }
}

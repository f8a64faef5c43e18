use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::foundation::core::Frame;
use crate::foundation::error::{SkyloopError, SkyloopResult};

/// Alignment knobs for [`build_timeline`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimelinePolicy {
    /// Largest accepted distance between an entry and a source frame.
    pub tolerance: Duration,
    /// Entries with fewer populated sources are dropped.
    ///
    /// Clamped to the number of included sources, so a single-source timeline is never empty
    /// by construction.
    pub min_sources: usize,
    /// Upper bound on entries; longer unions are subsampled with a uniform stride.
    pub max_entries: usize,
}

impl TimelinePolicy {
    /// Only keep instants where at least two feeds agree within 10 minutes.
    pub fn strict() -> Self {
        Self {
            tolerance: Duration::minutes(10),
            min_sources: 2,
            max_entries: 100,
        }
    }

    /// Best-effort alignment: 15 minute tolerance, partial entries allowed.
    pub fn progressive() -> Self {
        Self {
            tolerance: Duration::minutes(15),
            min_sources: 1,
            max_entries: 100,
        }
    }

    /// Override the entry cap.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    /// Override the tolerance window.
    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Override the minimum populated-source count.
    pub fn with_min_sources(mut self, min_sources: usize) -> Self {
        self.min_sources = min_sources;
        self
    }
}

impl Default for TimelinePolicy {
    fn default() -> Self {
        Self::strict()
    }
}

/// One synchronized instant with the matching frame of each source that has one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimelineEntry {
    /// Reference instant.
    pub timestamp: DateTime<Utc>,
    /// Sparse source key → frame mapping.
    pub frames: BTreeMap<String, Frame>,
}

impl TimelineEntry {
    /// Number of sources with a frame at this instant.
    pub fn populated(&self) -> usize {
        self.frames.len()
    }
}

/// Merged cross-source sequence, ascending by timestamp.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Timeline {
    /// Included source keys, in display order.
    pub sources: Vec<String>,
    /// Entries, safe to index by animation frame number.
    pub entries: Vec<TimelineEntry>,
    /// Populated sources every entry was required to have.
    pub min_sources: usize,
}

impl Timeline {
    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return `true` when no entry survived alignment.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fail with [`SkyloopError::SynchronizationShortfall`] below `required` entries.
    pub fn ensure_min_entries(&self, required: usize) -> SkyloopResult<()> {
        if self.entries.len() < required {
            warn!(
                entries = self.entries.len(),
                required, "timeline shortfall"
            );
            return Err(SkyloopError::SynchronizationShortfall {
                entries: self.entries.len(),
                required,
            });
        }
        Ok(())
    }
}

/// Merge per-source, time-sorted frame arrays into one timeline.
///
/// 1. Union the timestamps of every included source.
/// 2. Subsample with stride `ceil(n / max_entries)` when the union exceeds the cap.
/// 3. For each kept instant pick, per source, the nearest frame within `tolerance`.
/// 4. Drop entries with fewer than `min_sources` populated sources.
pub fn build_timeline(
    frames_by_source: &HashMap<String, Vec<Frame>>,
    include: &[String],
    policy: &TimelinePolicy,
) -> Timeline {
    let mut sources: Vec<String> = Vec::with_capacity(include.len());
    for key in include {
        if !sources.contains(key) {
            sources.push(key.clone());
        }
    }

    let union: BTreeSet<DateTime<Utc>> = sources
        .iter()
        .filter_map(|k| frames_by_source.get(k))
        .flat_map(|frames| frames.iter().map(|f| f.timestamp))
        .collect();
    let instants = subsample(union.into_iter().collect(), policy.max_entries);

    let min_sources = policy.min_sources.clamp(1, sources.len().max(1));
    let mut entries = Vec::with_capacity(instants.len());
    for timestamp in instants {
        let mut frames = BTreeMap::new();
        for key in &sources {
            let Some(list) = frames_by_source.get(key) else {
                continue;
            };
            if let Some(frame) = nearest_within(list, timestamp, policy.tolerance) {
                frames.insert(key.clone(), frame.clone());
            }
        }
        if frames.len() >= min_sources {
            entries.push(TimelineEntry { timestamp, frames });
        }
    }

    debug!(
        sources = sources.len(),
        entries = entries.len(),
        min_sources,
        "built timeline"
    );
    Timeline {
        sources,
        entries,
        min_sources,
    }
}

/// Keep every `ceil(n / cap)`-th instant so the result has at most `cap` entries.
pub fn subsample<T>(items: Vec<T>, cap: usize) -> Vec<T> {
    let cap = cap.max(1);
    if items.len() <= cap {
        return items;
    }
    let stride = items.len().div_ceil(cap);
    items.into_iter().step_by(stride).collect()
}

/// Frame of a time-sorted list closest to `at`, if within `tolerance`; ties go to the earlier
/// frame.
pub fn nearest_within(frames: &[Frame], at: DateTime<Utc>, tolerance: Duration) -> Option<&Frame> {
    let idx = frames.partition_point(|f| f.timestamp < at);
    let before = idx.checked_sub(1).and_then(|i| frames.get(i));
    let after = frames.get(idx);
    let best = match (before, after) {
        (Some(b), Some(a)) => {
            if at - b.timestamp <= a.timestamp - at {
                b
            } else {
                a
            }
        }
        (Some(b), None) => b,
        (None, Some(a)) => a,
        (None, None) => return None,
    };
    ((best.timestamp - at).abs() <= tolerance).then_some(best)
}

#[cfg(test)]
#[path = "../../tests/unit/timeline/builder.rs"]
mod tests;

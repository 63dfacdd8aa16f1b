//! Duplicate collapsing
//!
//! Neighbouring files can both report the same event when a stream runs past
//! its own file. Observations sharing `(log_position, timestamp)` collapse to
//! one record; the copy from the newest file wins.

use crate::common::ChangeEvent;
use chrono::{DateTime, Utc};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::debug;

/// Deduplicated records and the number of records dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupOutcome {
    /// Survivors in ascending `(log_position, timestamp)` order.
    pub events: Vec<ChangeEvent>,
    pub removed: usize,
}

/// Numeric suffix of a log file name (`mysql-bin.000012` → 12).
///
/// Names without a numeric suffix rank above every numbered file.
pub fn file_sequence(name: &str) -> u64 {
    name.rsplit_once('.')
        .and_then(|(_, suffix)| suffix.parse::<u64>().ok())
        .unwrap_or(u64::MAX)
}

/// Collapse records that share a dedup key.
pub fn deduplicate(events: Vec<ChangeEvent>) -> DedupOutcome {
    let mut survivors: BTreeMap<(u32, DateTime<Utc>), ChangeEvent> = BTreeMap::new();
    let mut removed = 0;

    for event in events {
        match survivors.entry(event.dedup_key()) {
            Entry::Vacant(slot) => {
                slot.insert(event);
            }
            Entry::Occupied(mut slot) => {
                removed += 1;
                if file_sequence(&event.source_file) > file_sequence(&slot.get().source_file) {
                    debug!(
                        "Duplicate at {}: keeping {} over {}",
                        event.log_position,
                        event.source_file,
                        slot.get().source_file
                    );
                    slot.insert(event);
                }
            }
        }
    }

    DedupOutcome {
        events: survivors.into_values().collect(),
        removed,
    }
}

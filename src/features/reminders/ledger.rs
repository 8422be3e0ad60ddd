//! # Feature: Dedup Ledger
//!
//! Remembers which alerts have already been delivered so each
//! (item, date, slot, kind) fires at most once. Keys are typed composites in a
//! DashMap, so concurrent ticks can check-and-mark atomically.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Atomic `try_mark` for the tick path
//! - 1.0.0: Initial release

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use dashmap::DashMap;
use std::sync::Arc;

use super::alert::AlertKind;
use super::schedule::ItemId;

/// Time component of a dedup key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// A scheduled time of day
    At(NaiveTime),
    /// A snooze, identified by the time of day its deadline fell due
    Snooze(NaiveTime),
}

/// Identity of one alert occurrence
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub item_id: ItemId,
    pub date: NaiveDate,
    pub slot: Slot,
    pub kind: AlertKind,
}

impl DedupKey {
    pub fn scheduled(item_id: &ItemId, date: NaiveDate, time: NaiveTime, kind: AlertKind) -> Self {
        DedupKey {
            item_id: item_id.clone(),
            date,
            slot: Slot::At(time),
            kind,
        }
    }

    pub fn snoozed(item_id: &ItemId, deadline: NaiveDateTime) -> Self {
        DedupKey {
            item_id: item_id.clone(),
            date: deadline.date(),
            slot: Slot::Snooze(deadline.time()),
            kind: AlertKind::Snoozed,
        }
    }
}

/// Delivered-alert ledger, reset at day boundaries and on schedule edits
#[derive(Clone, Default)]
pub struct DedupLedger {
    entries: Arc<DashMap<DedupKey, NaiveDateTime>>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, key: &DedupKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Record a key as delivered. Marking twice keeps the first timestamp.
    pub fn mark(&self, key: DedupKey, at: NaiveDateTime) {
        self.entries.entry(key).or_insert(at);
    }

    /// Mark `key` and report whether this call was the one that inserted it
    pub fn try_mark(&self, key: DedupKey, at: NaiveDateTime) -> bool {
        match self.entries.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(at);
                true
            }
        }
    }

    pub fn reset_all(&self) {
        self.entries.clear();
    }

    pub fn reset_for_item(&self, item_id: &ItemId) {
        self.entries.retain(|key, _| &key.item_id != item_id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

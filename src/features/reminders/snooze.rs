//! # Snooze Register
//!
//! One-shot deferred re-alerts, at most one per item.

use chrono::{NaiveDateTime, NaiveTime};
use dashmap::DashMap;
use std::sync::Arc;

use super::schedule::ItemId;

/// A pending snooze
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnoozeEntry {
    pub deadline: NaiveDateTime,
    /// Scheduled time of the alert that was snoozed, when known
    pub original_time: Option<NaiveTime>,
}

#[derive(Clone, Default)]
pub struct SnoozeRegister {
    entries: Arc<DashMap<ItemId, SnoozeEntry>>,
}

impl SnoozeRegister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a snooze, replacing any existing one for the item
    pub fn set(&self, item_id: ItemId, deadline: NaiveDateTime, original_time: Option<NaiveTime>) {
        self.entries.insert(
            item_id,
            SnoozeEntry {
                deadline,
                original_time,
            },
        );
    }

    /// Remove and return every entry whose deadline has elapsed at `now`
    pub fn take_due(&self, now: NaiveDateTime) -> Vec<(ItemId, SnoozeEntry)> {
        let due: Vec<ItemId> = self
            .entries
            .iter()
            .filter(|entry| entry.value().deadline <= now)
            .map(|entry| entry.key().clone())
            .collect();

        // remove_if re-checks the deadline in case the entry was replaced meanwhile
        let mut taken: Vec<(ItemId, SnoozeEntry)> = due
            .into_iter()
            .filter_map(|id| self.entries.remove_if(&id, |_, entry| entry.deadline <= now))
            .collect();
        taken.sort_by(|a, b| a.1.deadline.cmp(&b.1.deadline).then_with(|| a.0.cmp(&b.0)));
        taken
    }

    pub fn cancel(&self, item_id: &ItemId) -> Option<SnoozeEntry> {
        self.entries.remove(item_id).map(|(_, entry)| entry)
    }

    pub fn get(&self, item_id: &ItemId) -> Option<SnoozeEntry> {
        self.entries.get(item_id).map(|entry| *entry.value())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

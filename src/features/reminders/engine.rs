//! # Reminder Engine
//!
//! The single owned scheduler state: schedule, dedup ledger, snooze register
//! and the date of the last daily reset. Cloning shares the same state; every
//! mutation goes through the methods below.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.1.0: Wake the scheduler loop on schedule replace
//! - 1.0.0: Initial release

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use log::{debug, info, warn};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;

use super::alert::{AlertKind, AlertRequest};
use super::ledger::{DedupKey, DedupLedger};
use super::matcher::{OccurrenceMatcher, ReminderWindows};
use super::schedule::{normalize_items, ItemId, ReminderItemInput, ScheduleStore};
use super::snooze::{SnoozeEntry, SnoozeRegister};

/// Summary of one schedule replace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleUpdate {
    pub installed: usize,
    pub skipped: usize,
    /// Items whose ledger entries were cleared
    pub reset_items: Vec<ItemId>,
}

/// Point-in-time counters for status reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStatus {
    pub items: usize,
    pub snoozes: usize,
    pub ledger_entries: usize,
}

#[derive(Clone)]
pub struct ReminderEngine {
    store: ScheduleStore,
    ledger: DedupLedger,
    snoozes: SnoozeRegister,
    matcher: OccurrenceMatcher,
    last_reset: Arc<Mutex<NaiveDate>>,
    schedule_changed: Arc<Notify>,
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

impl ReminderEngine {
    /// Create an engine whose daily tracking starts on `today`
    pub fn new(windows: ReminderWindows, today: NaiveDate) -> Self {
        Self {
            store: ScheduleStore::new(),
            ledger: DedupLedger::new(),
            snoozes: SnoozeRegister::new(),
            matcher: OccurrenceMatcher::new(windows),
            last_reset: Arc::new(Mutex::new(today)),
            schedule_changed: Arc::new(Notify::new()),
        }
    }

    pub fn windows(&self) -> &ReminderWindows {
        self.matcher.windows()
    }

    /// Replace the whole schedule and clear dedup state of affected items
    pub fn replace_schedule(&self, inputs: Vec<ReminderItemInput>) -> ScheduleUpdate {
        let normalized = normalize_items(inputs);
        let installed = normalized.items.len();
        let reset_items = self.store.replace(normalized.items);

        for item_id in &reset_items {
            self.ledger.reset_for_item(item_id);
        }

        info!(
            "📋 Schedule installed: {} items, {} skipped, {} reset",
            installed,
            normalized.skipped,
            reset_items.len()
        );
        self.schedule_changed.notify_one();

        ScheduleUpdate {
            installed,
            skipped: normalized.skipped,
            reset_items,
        }
    }

    /// Clear ledger and snoozes when the local date moved on since the last reset
    pub fn reset_if_new_day(&self, today: NaiveDate) -> bool {
        let mut last = self.last_reset.lock().unwrap_or_else(PoisonError::into_inner);
        if *last == today {
            return false;
        }
        self.ledger.reset_all();
        self.snoozes.clear();
        info!("Daily tracking reset ({} -> {})", *last, today);
        *last = today;
        true
    }

    /// One scheduling pass: daily reset, due snoozes, then every item.
    ///
    /// Returned alerts are already marked in the ledger.
    pub fn tick(&self, now: NaiveDateTime) -> Vec<AlertRequest> {
        self.reset_if_new_day(now.date());

        let items = self.store.snapshot();
        let mut alerts = Vec::new();

        for (item_id, entry) in self.snoozes.take_due(now) {
            match items.iter().find(|item| item.id == item_id) {
                Some(item) => alerts.extend(self.matcher.snoozed(now, item, &entry, &self.ledger)),
                None => debug!("Dropping snooze for item {item_id} no longer scheduled"),
            }
        }

        for item in items.iter() {
            match catch_unwind(AssertUnwindSafe(|| self.matcher.evaluate(now, item, &self.ledger))) {
                Ok(due) => alerts.extend(due),
                Err(payload) => warn!(
                    "Skipping item {} this tick after a fault: {}",
                    item.id,
                    panic_message(payload.as_ref())
                ),
            }
        }

        if !alerts.is_empty() {
            debug!("Tick at {} produced {} alert(s)", now, alerts.len());
        }
        alerts
    }

    pub fn snooze(&self, item_id: ItemId, deadline: NaiveDateTime, original_time: Option<NaiveTime>) {
        self.snoozes.set(item_id, deadline, original_time);
    }

    pub fn cancel_snooze(&self, item_id: &ItemId) -> Option<SnoozeEntry> {
        self.snoozes.cancel(item_id)
    }

    /// Mark both the `Before` and `Exact` alerts of one occurrence as delivered
    pub fn mark_taken(&self, item_id: &ItemId, date: NaiveDate, time: NaiveTime, now: NaiveDateTime) {
        for kind in [AlertKind::Before, AlertKind::Exact] {
            self.ledger.mark(DedupKey::scheduled(item_id, date, time, kind), now);
        }
    }

    /// Resolves when the schedule has been replaced
    pub fn schedule_changed(&self) -> Arc<Notify> {
        self.schedule_changed.clone()
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            items: self.store.len(),
            snoozes: self.snoozes.len(),
            ledger_entries: self.ledger.len(),
        }
    }

    pub fn store(&self) -> &ScheduleStore {
        &self.store
    }

    pub fn ledger(&self) -> &DedupLedger {
        &self.ledger
    }

    pub fn snoozes(&self) -> &SnoozeRegister {
        &self.snoozes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::reminders::schedule::TimesField;
    use chrono::Duration;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    fn at(d: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
        day(d).and_hms_opt(h, m, s).unwrap()
    }

    fn input(id: &str, times: &[&str]) -> ReminderItemInput {
        ReminderItemInput {
            id: ItemId::from(id),
            name: format!("med-{id}"),
            dosage: "1 tab".to_string(),
            times: Some(TimesField::List(times.iter().map(|t| t.to_string()).collect())),
            start_date: None,
            end_date: None,
        }
    }

    fn engine() -> ReminderEngine {
        ReminderEngine::new(ReminderWindows::default(), day(1))
    }

    fn kinds(alerts: &[AlertRequest]) -> Vec<AlertKind> {
        alerts.iter().map(|a| a.correlation.kind).collect()
    }

    #[test]
    fn test_replace_reports_counts() {
        let engine = engine();
        let mut bad = input("2", &["09:00"]);
        bad.start_date = Some("June 1st".to_string());

        let update = engine.replace_schedule(vec![input("1", &["08:00"]), bad]);
        assert_eq!(update.installed, 1);
        assert_eq!(update.skipped, 1);
        assert_eq!(update.reset_items, vec![ItemId::from("1")]);
        assert_eq!(engine.status().items, 1);
    }

    #[test]
    fn test_daily_rollover_rearms_occurrences() {
        let engine = engine();
        engine.replace_schedule(vec![input("1", &["08:00"])]);

        assert_eq!(kinds(&engine.tick(at(1, 8, 0, 0))), vec![AlertKind::Exact]);
        assert!(engine.tick(at(1, 8, 0, 1)).is_empty());
        engine.snooze(ItemId::from("1"), at(1, 23, 0, 0), None);

        assert!(engine.reset_if_new_day(day(2)));
        assert!(engine.ledger().is_empty());
        assert!(engine.snoozes().is_empty());
        assert!(!engine.reset_if_new_day(day(2)));

        assert_eq!(kinds(&engine.tick(at(2, 8, 0, 0))), vec![AlertKind::Exact]);
    }

    #[test]
    fn test_tick_performs_daily_reset() {
        let engine = engine();
        engine.replace_schedule(vec![input("1", &["08:00"])]);
        engine.tick(at(1, 8, 0, 0));
        engine.snooze(ItemId::from("1"), at(1, 23, 59, 59), None);

        // First tick of the next day, before anything is due
        assert!(engine.tick(at(2, 0, 0, 0)).is_empty());
        assert_eq!(engine.status().ledger_entries, 0);
        assert_eq!(engine.status().snoozes, 0);
    }

    #[test]
    fn test_mid_day_edit_clears_only_that_item() {
        let engine = engine();
        engine.replace_schedule(vec![input("1", &["08:00"]), input("2", &["08:00"])]);
        assert_eq!(engine.tick(at(1, 8, 0, 0)).len(), 2);

        let update = engine.replace_schedule(vec![input("1", &["09:00"]), input("2", &["08:00"])]);
        assert_eq!(update.reset_items, vec![ItemId::from("1")]);

        // Re-adding 08:00 to item 1 is not blocked by the stale entry
        engine.replace_schedule(vec![input("1", &["08:00", "09:00"]), input("2", &["08:00"])]);
        let alerts = engine.tick(at(1, 8, 0, 1));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].correlation.item_id, ItemId::from("1"));
    }

    #[test]
    fn test_identical_resend_keeps_suppression() {
        let engine = engine();
        engine.replace_schedule(vec![input("1", &["08:00"])]);
        engine.mark_taken(&ItemId::from("1"), day(1), NaiveTime::from_hms_opt(8, 0, 0).unwrap(), at(1, 7, 0, 0));

        engine.replace_schedule(vec![input("1", &["08:00"])]);
        assert!(engine.tick(at(1, 7, 50, 0)).is_empty());
        assert!(engine.tick(at(1, 8, 0, 0)).is_empty());
    }

    #[test]
    fn test_snooze_is_one_shot() {
        let engine = engine();
        engine.replace_schedule(vec![input("1", &["08:00"])]);
        engine.snooze(ItemId::from("1"), at(1, 8, 5, 0), NaiveTime::from_hms_opt(8, 0, 0));

        assert!(engine.tick(at(1, 8, 4, 59)).is_empty());
        let alerts = engine.tick(at(1, 8, 5, 0));
        assert_eq!(kinds(&alerts), vec![AlertKind::Snoozed]);
        assert_eq!(alerts[0].correlation.time.as_deref(), Some("08:00"));
        assert!(engine.snoozes().is_empty());

        assert!(engine.tick(at(1, 8, 5, 1)).is_empty());
        assert!(engine.tick(at(1, 8, 10, 0)).is_empty());
    }

    #[test]
    fn test_second_snooze_same_day_fires_again() {
        let engine = engine();
        engine.replace_schedule(vec![input("1", &["08:00"])]);

        engine.snooze(ItemId::from("1"), at(1, 8, 5, 0), None);
        assert_eq!(engine.tick(at(1, 8, 5, 0)).len(), 1);

        engine.snooze(ItemId::from("1"), at(1, 8, 10, 0), None);
        assert_eq!(engine.tick(at(1, 8, 10, 0)).len(), 1);
    }

    #[test]
    fn test_faulting_item_does_not_stop_the_tick() {
        // An unbounded slack overflows `lead + slack` for any item at least one lead away
        let windows = ReminderWindows {
            before_lead: Duration::minutes(10),
            before_slack: Duration::MAX,
            exact_grace: Duration::seconds(3),
        };
        let engine = ReminderEngine::new(windows, day(1));
        engine.replace_schedule(vec![input("1", &["08:00"]), input("2", &["09:00"])]);
        engine.snooze(ItemId::from("1"), at(1, 8, 0, 0), None);

        let alerts = engine.tick(at(1, 8, 0, 0));
        assert_eq!(kinds(&alerts), vec![AlertKind::Snoozed, AlertKind::Exact]);
        assert!(alerts.iter().all(|a| a.correlation.item_id == ItemId::from("1")));
        assert!(engine.snoozes().is_empty());

        assert!(engine.tick(at(1, 8, 0, 1)).is_empty());

        let alerts = engine.tick(at(1, 9, 0, 0));
        assert_eq!(kinds(&alerts), vec![AlertKind::Exact]);
        assert_eq!(alerts[0].correlation.item_id, ItemId::from("2"));
    }

    #[test]
    fn test_snooze_for_removed_item_is_consumed_silently() {
        let engine = engine();
        engine.replace_schedule(vec![input("1", &["08:00"])]);
        engine.snooze(ItemId::from("1"), at(1, 8, 5, 0), None);
        engine.replace_schedule(vec![input("2", &["12:00"])]);

        assert!(engine.tick(at(1, 8, 5, 0)).is_empty());
        assert!(engine.snoozes().is_empty());
    }

    #[test]
    fn test_acknowledged_before_exact_window_suppresses_exact() {
        let engine = engine();
        engine.replace_schedule(vec![input("1", &["08:00"])]);
        assert_eq!(kinds(&engine.tick(at(1, 7, 50, 0))), vec![AlertKind::Before]);

        engine.mark_taken(&ItemId::from("1"), day(1), NaiveTime::from_hms_opt(8, 0, 0).unwrap(), at(1, 7, 51, 0));

        let mut now = at(1, 7, 59, 0);
        while now < at(1, 8, 1, 0) {
            assert!(engine.tick(now).is_empty());
            now += Duration::seconds(1);
        }
    }

    #[tokio::test]
    async fn test_replace_wakes_waiters() {
        let engine = engine();
        let notify = engine.schedule_changed();
        engine.replace_schedule(vec![input("1", &["08:00"])]);

        tokio::time::timeout(std::time::Duration::from_secs(1), notify.notified())
            .await
            .expect("replace should wake the scheduler");
    }
}

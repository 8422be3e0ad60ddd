//! # Occurrence Matcher
//!
//! Decides, for one item and one instant, which alerts are due. Window
//! membership is checked against the dedup ledger and marked in the same step,
//! so a key is recorded before any delivery work starts.
//!
//! Window definitions (`diff` = scheduled instant minus now):
//! - `Before`: `lead <= diff < lead + before_slack`
//! - `Exact`: `-exact_grace < diff <= 0`
//!
//! Both windows must be at least one tick wide or occurrences can be missed.

use anyhow::{anyhow, Result};
use chrono::{Duration, NaiveDateTime};
use log::debug;

use super::alert::{AlertKind, AlertRequest};
use super::ledger::{DedupKey, DedupLedger};
use super::schedule::{ReminderItem, ScheduledTime};
use super::snooze::SnoozeEntry;

/// Alert window sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderWindows {
    /// How far ahead of the scheduled time the `Before` alert fires
    pub before_lead: Duration,
    /// Width of the `Before` window
    pub before_slack: Duration,
    /// Width of the `Exact` window after the scheduled instant
    pub exact_grace: Duration,
}

impl Default for ReminderWindows {
    fn default() -> Self {
        ReminderWindows {
            before_lead: Duration::minutes(10),
            before_slack: Duration::seconds(2),
            exact_grace: Duration::seconds(3),
        }
    }
}

impl ReminderWindows {
    pub fn in_before_window(&self, diff: Duration) -> bool {
        diff >= self.before_lead && diff < self.before_lead + self.before_slack
    }

    pub fn in_exact_window(&self, diff: Duration) -> bool {
        diff <= Duration::zero() && diff > -self.exact_grace
    }

    /// Reject windows narrower than one tick of the scheduler loop
    pub fn validate_for_tick(&self, tick: std::time::Duration) -> Result<()> {
        let tick = Duration::from_std(tick)?;
        if tick <= Duration::zero() {
            return Err(anyhow!("tick interval must be positive"));
        }
        if self.before_lead <= Duration::zero() {
            return Err(anyhow!("before lead must be positive"));
        }
        if self.before_slack < tick {
            return Err(anyhow!(
                "before window ({} ms) is narrower than the tick interval ({} ms)",
                self.before_slack.num_milliseconds(),
                tick.num_milliseconds()
            ));
        }
        if self.exact_grace < tick {
            return Err(anyhow!(
                "exact window ({} ms) is narrower than the tick interval ({} ms)",
                self.exact_grace.num_milliseconds(),
                tick.num_milliseconds()
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OccurrenceMatcher {
    windows: ReminderWindows,
}

impl OccurrenceMatcher {
    pub fn new(windows: ReminderWindows) -> Self {
        Self { windows }
    }

    pub fn windows(&self) -> &ReminderWindows {
        &self.windows
    }

    /// Alerts due for `item` at `now`. Each time entry is evaluated on its own.
    pub fn evaluate(
        &self,
        now: NaiveDateTime,
        item: &ReminderItem,
        ledger: &DedupLedger,
    ) -> Vec<AlertRequest> {
        let today = now.date();
        if !item.is_active_on(today) {
            return Vec::new();
        }

        let mut alerts = Vec::new();
        for scheduled in &item.times {
            let diff = today.and_time(scheduled.time()) - now;

            if self.windows.in_before_window(diff) {
                alerts.extend(self.fire(now, item, *scheduled, AlertKind::Before, ledger));
            }
            if self.windows.in_exact_window(diff) {
                alerts.extend(self.fire(now, item, *scheduled, AlertKind::Exact, ledger));
            }
        }
        alerts
    }

    /// Alert for a snooze whose deadline has elapsed, unless already delivered
    pub fn snoozed(
        &self,
        now: NaiveDateTime,
        item: &ReminderItem,
        entry: &SnoozeEntry,
        ledger: &DedupLedger,
    ) -> Option<AlertRequest> {
        let key = DedupKey::snoozed(&item.id, entry.deadline);
        if !ledger.try_mark(key, now) {
            debug!("Snoozed alert for item {} already delivered", item.id);
            return None;
        }
        Some(AlertRequest::for_item(
            item,
            entry.original_time,
            AlertKind::Snoozed,
            self.windows.before_lead,
        ))
    }

    fn fire(
        &self,
        now: NaiveDateTime,
        item: &ReminderItem,
        scheduled: ScheduledTime,
        kind: AlertKind,
        ledger: &DedupLedger,
    ) -> Option<AlertRequest> {
        let key = DedupKey::scheduled(&item.id, now.date(), scheduled.time(), kind);
        if !ledger.try_mark(key, now) {
            debug!("Suppressing duplicate {} alert for item {} at {}", kind, item.id, scheduled);
            return None;
        }
        Some(AlertRequest::for_item(
            item,
            Some(scheduled.time()),
            kind,
            self.windows.before_lead,
        ))
    }
}

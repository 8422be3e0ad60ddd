//! # Feature: Acknowledgment Handling
//!
//! Reacts to what the user did with a delivered alert: taken, snooze, or
//! simply opening it. Local dedup/snooze state is updated first so the alert
//! stops repeating even when the record store is unreachable.
//!
//! - **Version**: 1.2.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.2.0: Reject snoozes whose deadline is out of range
//! - 1.1.0: Bound record calls with a timeout
//! - 1.0.0: Initial release with taken/snooze/open handling

use chrono::{Duration, NaiveDateTime};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::timeout;

use super::alert::{AlertAction, AlertKind, Correlation};
use super::engine::ReminderEngine;
use super::schedule::ItemId;
use crate::features::records::DoseRecorder;

/// Observer channel capacity
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Default upper bound on one record attempt
const DEFAULT_RECORD_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// The user's reaction to an alert, echoed back with its correlation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertResponse {
    pub correlation: Correlation,
    /// `None` when the alert was opened without choosing an action
    #[serde(default)]
    pub action: Option<AlertAction>,
}

/// Broadcast to UI surfaces interested in acknowledgments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReminderEvent {
    Acknowledged { item_id: ItemId },
    FocusRequested { item_id: ItemId },
}

/// What a response resulted in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    Snoozed { until: NaiveDateTime },
    /// The snooze deadline could not be represented; nothing was installed
    SnoozeRejected,
    Acknowledged { recorded: bool, cleared_snooze: bool },
    FocusRequested,
}

#[derive(Clone)]
pub struct AcknowledgmentHandler {
    engine: ReminderEngine,
    recorder: Arc<dyn DoseRecorder>,
    events: broadcast::Sender<ReminderEvent>,
    snooze_for: Duration,
    record_timeout: std::time::Duration,
}

impl AcknowledgmentHandler {
    pub fn new(engine: ReminderEngine, recorder: Arc<dyn DoseRecorder>, snooze_for: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            engine,
            recorder,
            events,
            snooze_for,
            record_timeout: DEFAULT_RECORD_TIMEOUT,
        }
    }

    pub fn with_record_timeout(mut self, record_timeout: std::time::Duration) -> Self {
        self.record_timeout = record_timeout;
        self
    }

    /// Subscribe to acknowledgment and focus events
    pub fn subscribe(&self) -> broadcast::Receiver<ReminderEvent> {
        self.events.subscribe()
    }

    pub async fn handle(&self, response: &AlertResponse, now: NaiveDateTime) -> AckOutcome {
        let correlation = &response.correlation;
        match response.action {
            Some(AlertAction::Snooze) => self.snooze(correlation, now),
            Some(AlertAction::Acknowledge) => self.acknowledge(correlation, now).await,
            None => {
                debug!("Alert for item {} opened without an action", correlation.item_id);
                self.publish(ReminderEvent::FocusRequested {
                    item_id: correlation.item_id.clone(),
                });
                AckOutcome::FocusRequested
            }
        }
    }

    fn snooze(&self, correlation: &Correlation, now: NaiveDateTime) -> AckOutcome {
        let Some(until) = now.checked_add_signed(self.snooze_for) else {
            warn!(
                "Cannot snooze item {}: {} plus {}s is out of range",
                correlation.item_id,
                now,
                self.snooze_for.num_seconds()
            );
            return AckOutcome::SnoozeRejected;
        };
        self.engine
            .snooze(correlation.item_id.clone(), until, correlation.scheduled_time());
        info!("⏳ Item {} snoozed until {}", correlation.item_id, until);
        AckOutcome::Snoozed { until }
    }

    async fn acknowledge(&self, correlation: &Correlation, now: NaiveDateTime) -> AckOutcome {
        let item_id = &correlation.item_id;

        match (correlation.time.as_deref(), correlation.scheduled_time()) {
            (Some(_), Some(time)) => self.engine.mark_taken(item_id, now.date(), time, now),
            (Some(raw), None) => warn!("Ignoring malformed time {raw:?} on acknowledgment of item {item_id}"),
            (None, _) => {}
        }

        let cleared_snooze = if correlation.kind == AlertKind::Snoozed || correlation.time.is_none() {
            self.engine.cancel_snooze(item_id).is_some()
        } else {
            false
        };

        let recorded = match timeout(self.record_timeout, self.recorder.record_taken(item_id)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("Failed to record dose for item {item_id}: {e:#}");
                false
            }
            Err(_) => {
                warn!(
                    "Recording dose for item {item_id} timed out after {:?}",
                    self.record_timeout
                );
                false
            }
        };

        self.publish(ReminderEvent::Acknowledged {
            item_id: item_id.clone(),
        });
        info!("✔ Item {item_id} taken (recorded: {recorded})");

        AckOutcome::Acknowledged {
            recorded,
            cleared_snooze,
        }
    }

    fn publish(&self, event: ReminderEvent) {
        if self.events.send(event).is_err() {
            debug!("No observers for reminder event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::reminders::matcher::ReminderWindows;
    use crate::features::reminders::schedule::{ReminderItemInput, TimesField};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveTime};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeRecorder {
        calls: AtomicUsize,
        fail: bool,
        hang: bool,
    }

    #[async_trait]
    impl DoseRecorder for FakeRecorder {
        async fn record_taken(&self, _item_id: &ItemId) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            }
            if self.fail {
                return Err(anyhow!("store unreachable"));
            }
            Ok(())
        }
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn setup(recorder: FakeRecorder) -> (ReminderEngine, AcknowledgmentHandler, Arc<FakeRecorder>) {
        let engine = ReminderEngine::new(ReminderWindows::default(), at(0, 0, 0).date());
        engine.replace_schedule(vec![ReminderItemInput {
            id: ItemId::from("1"),
            name: "Aspirin".to_string(),
            dosage: "100mg".to_string(),
            times: Some(TimesField::List(vec!["08:00".to_string()])),
            start_date: None,
            end_date: None,
        }]);
        let recorder = Arc::new(recorder);
        let handler = AcknowledgmentHandler::new(engine.clone(), recorder.clone(), Duration::minutes(5))
            .with_record_timeout(std::time::Duration::from_millis(100));
        (engine, handler, recorder)
    }

    fn response(time: Option<&str>, kind: AlertKind, action: Option<AlertAction>) -> AlertResponse {
        AlertResponse {
            correlation: Correlation {
                item_id: ItemId::from("1"),
                time: time.map(str::to_string),
                kind,
            },
            action,
        }
    }

    #[tokio::test]
    async fn test_taken_before_exact_suppresses_exact() {
        let (engine, handler, recorder) = setup(FakeRecorder::default());
        let mut events = handler.subscribe();

        assert_eq!(engine.tick(at(7, 50, 0)).len(), 1);
        let outcome = handler
            .handle(&response(Some("08:00"), AlertKind::Before, Some(AlertAction::Acknowledge)), at(7, 51, 0))
            .await;

        assert_eq!(
            outcome,
            AckOutcome::Acknowledged {
                recorded: true,
                cleared_snooze: false
            }
        );
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            events.try_recv().unwrap(),
            ReminderEvent::Acknowledged {
                item_id: ItemId::from("1")
            }
        );
        assert!(engine.tick(at(8, 0, 0)).is_empty());
    }

    #[tokio::test]
    async fn test_record_failure_still_updates_local_state() {
        let (engine, handler, _) = setup(FakeRecorder {
            fail: true,
            ..Default::default()
        });
        let mut events = handler.subscribe();

        let outcome = handler
            .handle(&response(Some("08:00"), AlertKind::Exact, Some(AlertAction::Acknowledge)), at(7, 0, 0))
            .await;

        assert_eq!(
            outcome,
            AckOutcome::Acknowledged {
                recorded: false,
                cleared_snooze: false
            }
        );
        assert!(events.try_recv().is_ok());
        assert!(engine.tick(at(7, 50, 0)).is_empty());
        assert!(engine.tick(at(8, 0, 0)).is_empty());
    }

    #[tokio::test]
    async fn test_hung_recorder_is_abandoned() {
        let (engine, handler, _) = setup(FakeRecorder {
            hang: true,
            ..Default::default()
        });

        let outcome = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            handler.handle(&response(Some("08:00"), AlertKind::Exact, Some(AlertAction::Acknowledge)), at(7, 0, 0)),
        )
        .await
        .expect("handler must not wait for the recorder");

        assert!(matches!(outcome, AckOutcome::Acknowledged { recorded: false, .. }));
        assert!(engine.tick(at(8, 0, 0)).is_empty());
    }

    #[tokio::test]
    async fn test_snooze_installs_entry_without_touching_ledger() {
        let (engine, handler, recorder) = setup(FakeRecorder::default());
        assert_eq!(engine.tick(at(8, 0, 0)).len(), 1);
        let ledger_before = engine.ledger().len();

        let outcome = handler
            .handle(&response(Some("08:00"), AlertKind::Exact, Some(AlertAction::Snooze)), at(8, 0, 30))
            .await;

        assert_eq!(outcome, AckOutcome::Snoozed { until: at(8, 5, 30) });
        assert_eq!(engine.ledger().len(), ledger_before);
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 0);

        let entry = engine.snoozes().get(&ItemId::from("1")).unwrap();
        assert_eq!(entry.original_time, NaiveTime::from_hms_opt(8, 0, 0));

        let alerts = engine.tick(at(8, 5, 30));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].correlation.kind, AlertKind::Snoozed);
    }

    #[tokio::test]
    async fn test_unrepresentable_snooze_deadline_is_rejected() {
        let (engine, _, _) = setup(FakeRecorder::default());
        let handler = AcknowledgmentHandler::new(
            engine.clone(),
            Arc::new(FakeRecorder::default()),
            Duration::days(300_000 * 365),
        );

        let outcome = tokio::spawn(async move {
            handler
                .handle(&response(Some("08:00"), AlertKind::Exact, Some(AlertAction::Snooze)), at(8, 0, 30))
                .await
        })
        .await
        .expect("snoozing must not panic");

        assert_eq!(outcome, AckOutcome::SnoozeRejected);
        assert!(engine.snoozes().is_empty());
    }

    #[tokio::test]
    async fn test_taken_from_snoozed_alert_cancels_snooze() {
        let (engine, handler, _) = setup(FakeRecorder::default());
        handler
            .handle(&response(None, AlertKind::Snoozed, Some(AlertAction::Snooze)), at(9, 0, 0))
            .await;
        assert_eq!(engine.snoozes().len(), 1);

        let outcome = handler
            .handle(&response(None, AlertKind::Snoozed, Some(AlertAction::Acknowledge)), at(9, 1, 0))
            .await;

        assert_eq!(
            outcome,
            AckOutcome::Acknowledged {
                recorded: true,
                cleared_snooze: true
            }
        );
        assert!(engine.snoozes().is_empty());
        assert!(engine.tick(at(9, 5, 0)).is_empty());
    }

    #[tokio::test]
    async fn test_open_without_action_only_requests_focus() {
        let (engine, handler, recorder) = setup(FakeRecorder::default());
        let mut events = handler.subscribe();
        let ledger_before = engine.ledger().len();

        let outcome = handler
            .handle(&response(Some("08:00"), AlertKind::Exact, None), at(8, 0, 1))
            .await;

        assert_eq!(outcome, AckOutcome::FocusRequested);
        assert_eq!(
            events.try_recv().unwrap(),
            ReminderEvent::FocusRequested {
                item_id: ItemId::from("1")
            }
        );
        assert_eq!(engine.ledger().len(), ledger_before);
        assert!(engine.snoozes().is_empty());
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_response_wire_shape() {
        let json = r#"{"correlation":{"item_id":"1","time":"08:00","kind":"Exact"},"action":"Acknowledge"}"#;
        let parsed: AlertResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.action, Some(AlertAction::Acknowledge));
        assert_eq!(parsed.correlation.kind, AlertKind::Exact);

        let opened: AlertResponse =
            serde_json::from_str(r#"{"correlation":{"item_id":7,"kind":"Before"}}"#).unwrap();
        assert_eq!(opened.action, None);
        assert_eq!(opened.correlation.item_id, ItemId::from("7"));
    }
}

//! # Alert Requests
//!
//! Alert kinds, the correlation attached to every delivered alert, and the
//! delivery seam used by the scheduler loop.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.1.0: Snoozed alerts carry the original scheduled time in their correlation
//! - 1.0.0: Initial release with Before/Exact/Snoozed kinds

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::schedule::{format_time_of_day, ItemId, ReminderItem};

/// Which rule produced an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertKind {
    /// Fired once per occurrence, ahead of the scheduled time
    Before,
    /// Fired once per occurrence, at the scheduled time
    Exact,
    /// Fired once per active snooze, when its deadline elapses
    Snoozed,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Before => "before",
            AlertKind::Exact => "exact",
            AlertKind::Snoozed => "snoozed",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actions a presentation surface may offer alongside an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertAction {
    /// The dose was taken
    Acknowledge,
    /// Re-alert once after the snooze duration
    Snooze,
}

impl AlertAction {
    /// Button label shown by the presentation surface
    pub fn label(&self) -> &'static str {
        match self {
            AlertAction::Acknowledge => "✔ Taken",
            AlertAction::Snooze => "⏳ Snooze 5 min",
        }
    }
}

/// Identifies the occurrence an alert was raised for.
///
/// Echoed back verbatim by the presentation surface when the user responds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correlation {
    pub item_id: ItemId,
    /// Scheduled time as `HH:MM`, absent for snoozes of unknown origin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    pub kind: AlertKind,
}

impl Correlation {
    /// Parsed scheduled time, if one is attached and well formed
    pub fn scheduled_time(&self) -> Option<NaiveTime> {
        self.time
            .as_deref()
            .and_then(|t| NaiveTime::parse_from_str(t, "%H:%M").ok())
    }
}

/// Human wording of the before-alert lead, e.g. `10 minutes` or `90 seconds`
fn describe_lead(lead: Duration) -> String {
    let secs = lead.num_seconds();
    let (amount, unit) = if secs % 60 == 0 {
        (secs / 60, "minute")
    } else {
        (secs, "second")
    };
    if amount == 1 {
        format!("1 {unit}")
    } else {
        format!("{amount} {unit}s")
    }
}

/// A decision that an alert is due, ready to hand to the delivery surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRequest {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub correlation: Correlation,
    pub actions: Vec<AlertAction>,
}

impl AlertRequest {
    /// Build the alert for one occurrence of `item`
    pub fn for_item(
        item: &ReminderItem,
        time: Option<NaiveTime>,
        kind: AlertKind,
        lead: Duration,
    ) -> Self {
        let title = match kind {
            AlertKind::Exact => format!("Time to take {}", item.name),
            AlertKind::Before => format!("Reminder: {} in {}", item.name, describe_lead(lead)),
            AlertKind::Snoozed => format!("Reminder (snoozed): {}", item.name),
        };
        let time_label = time.map(format_time_of_day);
        let body = match &time_label {
            Some(t) => format!("{} - {} at {}", item.name, item.dosage, t),
            None => format!("{} - {}", item.name, item.dosage),
        };

        AlertRequest {
            id: Uuid::new_v4(),
            title,
            body,
            correlation: Correlation {
                item_id: item.id.clone(),
                time: time_label,
                kind,
            },
            actions: vec![AlertAction::Acknowledge, AlertAction::Snooze],
        }
    }
}

/// Presentation surface that shows alerts to the user
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Present an alert. Errors are logged by the caller and never retried.
    async fn deliver(&self, alert: &AlertRequest) -> Result<()>;
}

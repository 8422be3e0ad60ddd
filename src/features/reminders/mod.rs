//! # Reminders Feature
//!
//! Medication reminder scheduling: decides when an alert is due for each
//! scheduled dose, guarantees each alert fires at most once, and handles the
//! user's taken/snooze responses.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 2.0.0: Dedup ledger keyed per occurrence, one-shot snoozes
//! - 1.0.0: Initial release

pub mod acknowledge;
pub mod alert;
pub mod engine;
pub mod ledger;
pub mod matcher;
pub mod schedule;
pub mod scheduler;
pub mod snooze;

pub use acknowledge::{AckOutcome, AcknowledgmentHandler, AlertResponse, ReminderEvent};
pub use alert::{AlertAction, AlertKind, AlertRequest, AlertSink, Correlation};
pub use engine::{EngineStatus, ReminderEngine, ScheduleUpdate};
pub use ledger::{DedupKey, DedupLedger, Slot};
pub use matcher::{OccurrenceMatcher, ReminderWindows};
pub use schedule::{
    decode_items, ItemId, ReminderItem, ReminderItemInput, ScheduleFile, ScheduleStore,
    ScheduledTime, TimesField,
};
pub use scheduler::ReminderScheduler;
pub use snooze::{SnoozeEntry, SnoozeRegister};

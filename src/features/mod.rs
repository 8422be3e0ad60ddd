//! # Features
//!
//! - `reminders`: schedule matching, dedup, snoozes and acknowledgments
//! - `records`: persistence of taken doses

pub mod records;
pub mod reminders;

pub use records::{DoseRecorder, HttpDoseRecorder};
pub use reminders::{
    AcknowledgmentHandler, AlertRequest, AlertSink, ReminderEngine, ReminderScheduler,
    ReminderWindows,
};

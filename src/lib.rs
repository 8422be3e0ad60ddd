// Core layer - configuration
pub mod core;

// Features layer - reminder engine and dose records
pub mod features;

// IPC layer - communication between the daemon and presentation clients
pub mod ipc;

pub use core::Config;

pub use features::{
    AcknowledgmentHandler, AlertRequest, AlertSink, DoseRecorder, HttpDoseRecorder,
    ReminderEngine, ReminderScheduler, ReminderWindows,
};

pub use ipc::{ClientCommand, EngineEvent, IpcClient, IpcServer};

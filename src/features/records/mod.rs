//! # Dose Records Feature
//!
//! Client side of the persistent medication store: reports taken doses.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false

pub mod recorder;

pub use recorder::{DoseRecorder, HttpDoseRecorder};

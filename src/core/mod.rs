//! # Core Module
//!
//! Configuration shared by the daemon and its tools.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false

pub mod config;

pub use config::Config;

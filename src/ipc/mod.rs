//! # IPC Module
//!
//! Inter-process communication between the reminder daemon and its
//! presentation clients.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.0.0: Initial IPC implementation with Unix socket protocol

pub mod client;
pub mod protocol;
pub mod server;

pub use client::{connect_with_retry, IpcClient};
pub use protocol::{ClientCommand, EngineEvent};
pub use server::IpcServer;

/// Default socket path for IPC communication
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/medminder.sock";

/// Get the socket path from environment or use default
pub fn get_socket_path() -> String {
    std::env::var("MEDMINDER_IPC_SOCKET").unwrap_or_else(|_| DEFAULT_SOCKET_PATH.to_string())
}

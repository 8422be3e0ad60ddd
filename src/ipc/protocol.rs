//! # IPC Protocol
//!
//! Message types for daemon <-> client communication over Unix socket.
//!
//! Uses length-prefixed JSON framing:
//! - 4 bytes: message length (big-endian u32)
//! - N bytes: JSON payload

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::features::reminders::{AlertAction, AlertRequest, AlertResponse, Correlation, ItemId};

/// Largest accepted frame payload
pub const MAX_FRAME_LEN: usize = 10 * 1024 * 1024;

// ============================================================================
// Daemon -> Client Events
// ============================================================================

/// Events sent from the daemon to connected clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    /// An alert is due and should be shown
    Alert { alert: AlertRequest },
    /// A dose was acknowledged as taken
    Acknowledged { item_id: ItemId },
    /// An alert was opened without choosing an action
    FocusRequested { item_id: ItemId },
    /// Status update (response to GetStatus)
    StatusUpdate {
        items: usize,
        snoozes: usize,
        ledger_entries: usize,
        uptime_seconds: u64,
    },
    /// Response to a command
    CommandResponse {
        request_id: String,
        success: bool,
        message: Option<String>,
    },
    /// Periodic heartbeat
    Heartbeat { timestamp: i64 },
}

// ============================================================================
// Client -> Daemon Commands
// ============================================================================

/// Commands sent from clients to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientCommand {
    /// Replace the whole reminder schedule.
    ///
    /// Items stay raw JSON so one malformed record does not reject the batch.
    SaveSchedule {
        request_id: String,
        items: Vec<serde_json::Value>,
    },
    /// The user reacted to a delivered alert
    AlertResponse {
        correlation: Correlation,
        #[serde(default)]
        action: Option<AlertAction>,
    },
    /// Request daemon status
    GetStatus,
    /// Response to heartbeat
    Pong { timestamp: i64 },
}

impl ClientCommand {
    /// The acknowledgment payload carried by an `AlertResponse` command
    pub fn alert_response(&self) -> Option<AlertResponse> {
        match self {
            ClientCommand::AlertResponse {
                correlation,
                action,
            } => Some(AlertResponse {
                correlation: correlation.clone(),
                action: *action,
            }),
            _ => None,
        }
    }
}

// ============================================================================
// Framing
// ============================================================================

/// Encode a message with length prefix
pub fn encode_message<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(msg)?;
    let len = json.len() as u32;
    let mut buf = Vec::with_capacity(4 + json.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&json);
    Ok(buf)
}

/// Read one length-prefixed payload
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > MAX_FRAME_LEN {
        return Err(anyhow!("Message too large: {} bytes", len));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

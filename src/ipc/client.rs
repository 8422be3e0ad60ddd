//! # IPC Client
//!
//! Unix socket client used by presentation surfaces and the control tool.

use crate::features::reminders::{AlertAction, Correlation};
use crate::ipc::protocol::{encode_message, read_frame, ClientCommand, EngineEvent};
use anyhow::{anyhow, Result};
use log::{debug, error, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

/// Connection timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// IPC Client for presentation surfaces
pub struct IpcClient {
    /// Event receiver channel
    event_rx: mpsc::Receiver<EngineEvent>,
    /// Command sender channel
    command_tx: mpsc::Sender<ClientCommand>,
}

impl IpcClient {
    /// Connect to the daemon's IPC server
    pub async fn connect(socket_path: &str) -> Result<Self> {
        info!("Connecting to IPC server at {}", socket_path);

        let stream = timeout(CONNECT_TIMEOUT, UnixStream::connect(socket_path))
            .await
            .map_err(|_| anyhow!("Connection timeout"))?
            .map_err(|e| anyhow!("Failed to connect: {}", e))?;

        info!("Connected to IPC server");

        let (event_tx, event_rx) = mpsc::channel(256);
        let (command_tx, command_rx) = mpsc::channel(64);

        // Start the connection handler
        tokio::spawn(async move {
            Self::connection_loop(stream, event_tx, command_rx).await;
        });

        Ok(IpcClient {
            event_rx,
            command_tx,
        })
    }

    /// Main connection loop - handles reading events and writing commands
    async fn connection_loop(
        stream: UnixStream,
        event_tx: mpsc::Sender<EngineEvent>,
        mut command_rx: mpsc::Receiver<ClientCommand>,
    ) {
        let (mut reader, mut writer) = stream.into_split();

        // Spawn command writer task
        let write_handle = tokio::spawn(async move {
            while let Some(cmd) = command_rx.recv().await {
                match encode_message(&cmd) {
                    Ok(data) => {
                        if let Err(e) = writer.write_all(&data).await {
                            error!("Failed to write command: {}", e);
                            break;
                        }
                        if let Err(e) = writer.flush().await {
                            error!("Failed to flush command: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Failed to encode command: {}", e);
                    }
                }
            }
        });

        // Event reader loop
        loop {
            // Not wrapped in a timeout: cancelling mid-frame would desync the stream
            let frame = match read_frame(&mut reader).await {
                Ok(frame) => frame,
                Err(e) => {
                    debug!("IPC read ended: {}", e);
                    break;
                }
            };

            match serde_json::from_slice::<EngineEvent>(&frame) {
                Ok(event) => {
                    if let EngineEvent::Heartbeat { timestamp } = &event {
                        debug!("Received heartbeat: {}", timestamp);
                    }

                    if event_tx.send(event).await.is_err() {
                        debug!("Event receiver closed");
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to parse event: {}", e);
                }
            }
        }

        write_handle.abort();
        info!("IPC connection closed");
    }

    /// Receive an event (blocking)
    pub async fn recv(&mut self) -> Option<EngineEvent> {
        self.event_rx.recv().await
    }

    /// Send a command to the daemon
    pub async fn send(&self, cmd: ClientCommand) -> Result<()> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|e| anyhow!("Failed to send command: {}", e))
    }

    /// Request daemon status
    pub async fn request_status(&self) -> Result<()> {
        self.send(ClientCommand::GetStatus).await
    }

    /// Replace the daemon's schedule, returning the request id to match the response
    pub async fn save_schedule(&self, items: Vec<serde_json::Value>) -> Result<String> {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.send(ClientCommand::SaveSchedule {
            request_id: request_id.clone(),
            items,
        })
        .await?;
        Ok(request_id)
    }

    /// Report what the user did with an alert
    pub async fn respond(&self, correlation: Correlation, action: Option<AlertAction>) -> Result<()> {
        self.send(ClientCommand::AlertResponse {
            correlation,
            action,
        })
        .await
    }

    /// Answer a heartbeat
    pub async fn pong(&self, timestamp: i64) -> Result<()> {
        self.send(ClientCommand::Pong { timestamp }).await
    }
}

/// Try to connect with retries
pub async fn connect_with_retry(socket_path: &str, max_attempts: u32, delay: Duration) -> Result<IpcClient> {
    let mut attempt = 1;
    loop {
        match IpcClient::connect(socket_path).await {
            Ok(client) => return Ok(client),
            Err(e) if attempt < max_attempts => {
                warn!(
                    "Connection attempt {} failed: {}. Retrying in {:?}...",
                    attempt, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(anyhow!(
                    "Failed to connect after {} attempts: {}",
                    max_attempts,
                    e
                ));
            }
        }
    }
}

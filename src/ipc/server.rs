//! # IPC Server
//!
//! Unix socket server through which presentation clients receive alerts and
//! push schedules and alert responses to the daemon.
//!
//! - **Version**: 1.2.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.2.0: Acts as the alert delivery surface
//! - 1.1.0: Added command processing for schedules and alert responses
//! - 1.0.0: Initial IPC implementation with Unix socket protocol

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Local;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};

use crate::features::reminders::{
    decode_items, AcknowledgmentHandler, AlertRequest, AlertSink, ReminderEngine, ReminderEvent,
};
use crate::ipc::protocol::{encode_message, read_frame, ClientCommand, EngineEvent};

/// Maximum number of connected clients
const MAX_CLIENTS: usize = 10;

/// Broadcast channel capacity for events
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Command channel capacity shared by all clients
const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// IPC Server handle for the daemon
#[derive(Clone)]
pub struct IpcServer {
    socket_path: String,
    /// Broadcast sender for events to all clients
    event_tx: broadcast::Sender<EngineEvent>,
    /// Receiver for commands from clients
    command_rx: Arc<Mutex<mpsc::Receiver<ClientCommand>>>,
    /// Sender for commands (used by client handlers)
    command_tx: mpsc::Sender<ClientCommand>,
    /// Connected client count
    client_count: Arc<RwLock<usize>>,
    /// Server start time for uptime calculation
    start_time: Instant,
    engine: Option<ReminderEngine>,
    acknowledgments: Option<AcknowledgmentHandler>,
}

impl IpcServer {
    /// Create a new IPC server (does not start listening yet)
    pub fn new(socket_path: impl Into<String>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

        IpcServer {
            socket_path: socket_path.into(),
            event_tx,
            command_rx: Arc::new(Mutex::new(command_rx)),
            command_tx,
            client_count: Arc::new(RwLock::new(0)),
            start_time: Instant::now(),
            engine: None,
            acknowledgments: None,
        }
    }

    /// Attach the reminder engine and acknowledgment handler commands act on
    pub fn with_reminders(mut self, engine: ReminderEngine, acknowledgments: AcknowledgmentHandler) -> Self {
        self.engine = Some(engine);
        self.acknowledgments = Some(acknowledgments);
        self
    }

    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }

    /// Start the IPC server in a background task
    pub async fn start(self: Arc<Self>) -> Result<()> {
        // Remove existing socket file if it exists
        if std::path::Path::new(&self.socket_path).exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        info!("IPC server listening on {}", self.socket_path);

        if let Some(acknowledgments) = &self.acknowledgments {
            self.clone().forward_reminder_events(acknowledgments.subscribe());
        }

        // Spawn the accept loop
        let server = self.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _addr)) => {
                        let client_count = *server.client_count.read().await;
                        if client_count >= MAX_CLIENTS {
                            warn!("Maximum IPC clients reached ({}), rejecting connection", MAX_CLIENTS);
                            continue;
                        }

                        *server.client_count.write().await += 1;
                        info!("IPC client connected (total: {})", client_count + 1);

                        let server_clone = server.clone();
                        let client_count_ref = server.client_count.clone();
                        tokio::spawn(async move {
                            if let Err(e) = server_clone.handle_client(stream).await {
                                debug!("Client handler ended: {}", e);
                            }
                            *client_count_ref.write().await -= 1;
                            info!("IPC client disconnected");
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept IPC connection: {}", e);
                    }
                }
            }
        });

        Ok(())
    }

    /// Handle a connected client
    async fn handle_client(self: Arc<Self>, stream: UnixStream) -> Result<()> {
        let (mut reader, mut writer) = stream.into_split();

        // Subscribe to event broadcast
        let mut event_rx = self.event_tx.subscribe();

        // Spawn writer task for events
        let write_handle = tokio::spawn(async move {
            loop {
                match event_rx.recv().await {
                    Ok(event) => match encode_message(&event) {
                        Ok(data) => {
                            if let Err(e) = writer.write_all(&data).await {
                                debug!("Failed to write to client: {}", e);
                                break;
                            }
                            if let Err(e) = writer.flush().await {
                                debug!("Failed to flush to client: {}", e);
                                break;
                            }
                        }
                        Err(e) => {
                            error!("Failed to encode event: {}", e);
                        }
                    },
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client lagged behind by {} events", n);
                    }
                }
            }
        });

        // Read commands from client
        loop {
            let frame = match read_frame(&mut reader).await {
                Ok(frame) => frame,
                Err(e) => {
                    debug!("Client stream ended: {}", e);
                    break;
                }
            };

            match serde_json::from_slice::<ClientCommand>(&frame) {
                Ok(cmd) => {
                    if let Err(e) = self.command_tx.send(cmd).await {
                        error!("Failed to forward command: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to parse command from client: {}", e);
                }
            }
        }

        write_handle.abort();
        Ok(())
    }

    /// Broadcast an event to all connected clients
    pub fn broadcast(&self, event: EngineEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Subscribe to outgoing events as a client would see them
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    /// Receive a command (blocking)
    pub async fn recv_command(&self) -> Option<ClientCommand> {
        self.command_rx.lock().await.recv().await
    }

    /// Send a heartbeat to all clients
    pub fn send_heartbeat(&self) {
        let timestamp = chrono::Utc::now().timestamp();
        self.broadcast(EngineEvent::Heartbeat { timestamp });
    }

    /// Get uptime in seconds
    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Process a single client command and generate appropriate response
    pub async fn process_command(&self, cmd: ClientCommand) {
        match cmd {
            ClientCommand::SaveSchedule { request_id, items } => {
                let Some(engine) = &self.engine else {
                    self.reply(request_id, false, "No reminder engine attached".to_string());
                    return;
                };
                let received = items.len();
                let (inputs, undecodable) = decode_items(items);
                let update = engine.replace_schedule(inputs);
                let skipped = update.skipped + undecodable;
                self.reply(
                    request_id,
                    true,
                    format!(
                        "Installed {} of {} items ({} skipped)",
                        update.installed, received, skipped
                    ),
                );
            }
            ClientCommand::AlertResponse { .. } => {
                let Some(response) = cmd.alert_response() else {
                    return;
                };
                match &self.acknowledgments {
                    Some(acknowledgments) => {
                        let outcome = acknowledgments.handle(&response, Local::now().naive_local()).await;
                        debug!("Alert response for item {}: {:?}", response.correlation.item_id, outcome);
                    }
                    None => warn!("AlertResponse received but no acknowledgment handler attached"),
                }
            }
            ClientCommand::GetStatus => {
                let status = self.engine.as_ref().map(ReminderEngine::status);
                self.broadcast(EngineEvent::StatusUpdate {
                    items: status.map_or(0, |s| s.items),
                    snoozes: status.map_or(0, |s| s.snoozes),
                    ledger_entries: status.map_or(0, |s| s.ledger_entries),
                    uptime_seconds: self.get_uptime_seconds(),
                });
                debug!("Sent StatusUpdate response");
            }
            ClientCommand::Pong { timestamp } => {
                debug!("Received Pong with timestamp {}", timestamp);
            }
        }
    }

    fn reply(&self, request_id: String, success: bool, message: String) {
        self.broadcast(EngineEvent::CommandResponse {
            request_id,
            success,
            message: Some(message),
        });
    }

    /// Relay acknowledgment observer events to clients
    fn forward_reminder_events(self: Arc<Self>, mut events: broadcast::Receiver<ReminderEvent>) {
        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(ReminderEvent::Acknowledged { item_id }) => EngineEvent::Acknowledged { item_id },
                    Ok(ReminderEvent::FocusRequested { item_id }) => EngineEvent::FocusRequested { item_id },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Reminder event relay lagged behind by {} events", n);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                self.broadcast(event);
            }
        });
    }

    /// Start the command processing loop (call this after server start)
    pub fn start_command_processor(self: Arc<Self>) {
        let server = self.clone();
        tokio::spawn(async move {
            info!("📡 IPC command processor started");
            while let Some(cmd) = server.recv_command().await {
                debug!("Processing client command: {:?}", cmd);
                server.process_command(cmd).await;
            }
        });
    }
}

#[async_trait]
impl AlertSink for IpcServer {
    async fn deliver(&self, alert: &AlertRequest) -> Result<()> {
        self.event_tx
            .send(EngineEvent::Alert {
                alert: alert.clone(),
            })
            .map(|receivers| debug!("Alert {} sent to {} client(s)", alert.id, receivers))
            .map_err(|_| anyhow!("no presentation client connected"))
    }
}

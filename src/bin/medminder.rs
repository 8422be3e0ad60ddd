use anyhow::{Context, Result};
use chrono::Local;
use dotenvy::dotenv;
use log::{error, info};
use std::sync::Arc;

use medminder::core::Config;
use medminder::features::reminders::{
    AcknowledgmentHandler, ReminderEngine, ReminderScheduler, ScheduleFile,
};
use medminder::features::HttpDoseRecorder;
use medminder::ipc::IpcServer;

/// Interval between IPC heartbeats
const HEARTBEAT_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::from_env()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("Starting medication reminder daemon...");

    let engine = ReminderEngine::new(config.windows, Local::now().date_naive());

    if let Some(path) = &config.schedule_path {
        match ScheduleFile::load(path) {
            Ok(file) => {
                info!("📄 Loaded schedule from {path}");
                engine.replace_schedule(file.items);
            }
            Err(e) => error!("❌ {e:#}"),
        }
    }

    let recorder = HttpDoseRecorder::new(&config.record_url, config.record_timeout)
        .with_context(|| format!("invalid record url {}", config.record_url))?;
    let acknowledgments = AcknowledgmentHandler::new(engine.clone(), Arc::new(recorder), config.snooze_duration)
        .with_record_timeout(config.record_timeout);

    let ipc_server = Arc::new(IpcServer::new(config.ipc_socket.clone()).with_reminders(engine.clone(), acknowledgments));
    ipc_server
        .clone()
        .start()
        .await
        .with_context(|| format!("failed to start IPC server on {}", config.ipc_socket))?;
    info!("📡 IPC server started for presentation clients");

    // Spawn IPC heartbeat task
    let heartbeat_ipc = ipc_server.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        loop {
            interval.tick().await;
            heartbeat_ipc.send_heartbeat();
        }
    });

    // Start IPC command processor
    ipc_server.clone().start_command_processor();

    let scheduler = ReminderScheduler::new(engine, ipc_server.clone(), config.tick_interval);
    let scheduler_handle = scheduler.spawn();

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    scheduler_handle.abort();
    let _ = std::fs::remove_file(ipc_server.socket_path());

    Ok(())
}

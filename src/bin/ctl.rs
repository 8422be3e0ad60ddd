use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;
use log::{debug, info};
use tokio::time::{timeout, Duration};

use medminder::features::reminders::{AlertAction, AlertKind, Correlation, ItemId, ScheduledTime};
use medminder::ipc::{connect_with_retry, get_socket_path, EngineEvent, IpcClient};

/// How long to wait for the daemon to answer a command
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

const USAGE: &str = "\
Usage: medminder-ctl <command>

Commands:
  push <schedule.yaml>       Replace the daemon's schedule
  watch                      Print alerts and events as they arrive
  taken <item> [HH:MM]       Acknowledge a dose as taken
  snooze <item> [HH:MM]      Snooze the reminder for an item
  status                     Show daemon status";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{USAGE}");
        return Ok(());
    };

    let socket_path = get_socket_path();
    match command.as_str() {
        "push" => {
            let path = args.get(1).ok_or_else(|| anyhow!("push needs a schedule file\n\n{USAGE}"))?;
            push(&socket_path, path).await
        }
        "watch" => watch(&socket_path).await,
        "taken" | "snooze" => {
            let item = args
                .get(1)
                .ok_or_else(|| anyhow!("{command} needs an item id\n\n{USAGE}"))?;
            let action = if command == "taken" {
                AlertAction::Acknowledge
            } else {
                AlertAction::Snooze
            };
            respond(&socket_path, item, args.get(2).map(String::as_str), action).await
        }
        "status" => status(&socket_path).await,
        other => Err(anyhow!("unknown command {other:?}\n\n{USAGE}")),
    }
}

async fn push(socket_path: &str, path: &str) -> Result<()> {
    let contents = std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    let document: serde_yaml::Value = serde_yaml::from_str(&contents)?;
    let items = document
        .get("items")
        .and_then(serde_yaml::Value::as_sequence)
        .ok_or_else(|| anyhow!("{path} has no items list"))?
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()?;

    let mut client = IpcClient::connect(socket_path).await?;
    let request_id = client.save_schedule(items).await?;

    let reply = wait_for(&mut client, |event| match event {
        EngineEvent::CommandResponse {
            request_id: id,
            success,
            message,
        } if *id == request_id => Some((*success, message.clone().unwrap_or_default())),
        _ => None,
    })
    .await?;

    match reply {
        (true, message) => {
            println!("{message}");
            Ok(())
        }
        (false, message) => Err(anyhow!("daemon rejected schedule: {message}")),
    }
}

async fn watch(socket_path: &str) -> Result<()> {
    let mut client = connect_with_retry(socket_path, 5, Duration::from_secs(2)).await?;
    info!("Watching {socket_path}");

    while let Some(event) = client.recv().await {
        match event {
            EngineEvent::Alert { alert } => {
                let time = alert.correlation.time.as_deref().unwrap_or("--:--");
                println!(
                    "🔔 [{}] {} | {} (item {}, {})",
                    alert.correlation.kind, alert.title, alert.body, alert.correlation.item_id, time
                );
            }
            EngineEvent::Acknowledged { item_id } => println!("✔ item {item_id} taken"),
            EngineEvent::FocusRequested { item_id } => println!("👀 item {item_id} opened"),
            EngineEvent::Heartbeat { timestamp } => client.pong(timestamp).await?,
            other => debug!("{other:?}"),
        }
    }

    println!("Connection closed");
    Ok(())
}

async fn respond(socket_path: &str, item: &str, time: Option<&str>, action: AlertAction) -> Result<()> {
    let time = time
        .map(|t| ScheduledTime::parse(t).map(|s| s.to_string()))
        .transpose()?;
    let kind = if time.is_some() {
        AlertKind::Exact
    } else {
        AlertKind::Snoozed
    };
    let correlation = Correlation {
        item_id: ItemId::from(item),
        time,
        kind,
    };

    let mut client = IpcClient::connect(socket_path).await?;
    client.respond(correlation, Some(action)).await?;

    // Commands are processed in order, so the status reply confirms the response was handled
    client.request_status().await?;
    let snoozes = wait_for(&mut client, |event| match event {
        EngineEvent::StatusUpdate { snoozes, .. } => Some(*snoozes),
        _ => None,
    })
    .await?;

    match action {
        AlertAction::Acknowledge => println!("Item {item} marked as taken"),
        AlertAction::Snooze => println!("Item {item} snoozed ({snoozes} active snoozes)"),
    }
    Ok(())
}

async fn status(socket_path: &str) -> Result<()> {
    let mut client = IpcClient::connect(socket_path).await?;
    client.request_status().await?;

    let line = wait_for(&mut client, |event| match event {
        EngineEvent::StatusUpdate {
            items,
            snoozes,
            ledger_entries,
            uptime_seconds,
        } => Some(format!(
            "items: {items}, snoozes: {snoozes}, fired today: {ledger_entries}, uptime: {uptime_seconds}s"
        )),
        _ => None,
    })
    .await?;

    println!("{line}");
    Ok(())
}

/// Read events until `pick` accepts one
async fn wait_for<T, F>(client: &mut IpcClient, pick: F) -> Result<T>
where
    F: Fn(&EngineEvent) -> Option<T>,
{
    timeout(REPLY_TIMEOUT, async {
        while let Some(event) = client.recv().await {
            if let Some(value) = pick(&event) {
                return Ok(value);
            }
        }
        Err(anyhow!("connection closed before the daemon replied"))
    })
    .await
    .map_err(|_| anyhow!("timed out waiting for the daemon"))?
}

//! # Feature: Reminder Scheduler
//!
//! Drives the engine on a fixed tick and hands due alerts to the delivery
//! surface. A schedule replace wakes the loop for an immediate extra tick.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Immediate tick after a schedule replace
//! - 1.0.0: Initial release

use chrono::{Local, NaiveDateTime};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};

use super::alert::{AlertRequest, AlertSink};
use super::engine::ReminderEngine;

/// Default upper bound on one delivery attempt
const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ReminderScheduler {
    engine: ReminderEngine,
    sink: Arc<dyn AlertSink>,
    tick_interval: Duration,
    delivery_timeout: Duration,
}

impl ReminderScheduler {
    pub fn new(engine: ReminderEngine, sink: Arc<dyn AlertSink>, tick_interval: Duration) -> Self {
        Self {
            engine,
            sink,
            tick_interval,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }

    pub fn with_delivery_timeout(mut self, delivery_timeout: Duration) -> Self {
        self.delivery_timeout = delivery_timeout;
        self
    }

    /// Run the tick loop forever
    pub async fn run(self) {
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let schedule_changed = self.engine.schedule_changed();

        info!("⏰ Reminder scheduler started (tick every {:?})", self.tick_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = schedule_changed.notified() => {
                    debug!("Schedule changed, ticking immediately");
                }
            }
            self.tick_and_dispatch(Local::now().naive_local());
        }
    }

    /// Spawn the loop on the runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run one engine tick and start delivery of every due alert.
    ///
    /// Deliveries run on their own tasks so a slow surface never delays the
    /// next tick. The returned handles complete when each delivery settles.
    pub fn tick_and_dispatch(&self, now: NaiveDateTime) -> Vec<JoinHandle<()>> {
        self.engine
            .tick(now)
            .into_iter()
            .map(|alert| self.dispatch(alert))
            .collect()
    }

    fn dispatch(&self, alert: AlertRequest) -> JoinHandle<()> {
        let sink = self.sink.clone();
        let delivery_timeout = self.delivery_timeout;

        tokio::spawn(async move {
            info!("🔔 {} ({})", alert.title, alert.correlation.kind);
            match timeout(delivery_timeout, sink.deliver(&alert)).await {
                Ok(Ok(())) => debug!("Delivered alert {}", alert.id),
                Ok(Err(e)) => warn!(
                    "Failed to deliver {} alert for item {}: {e:#}",
                    alert.correlation.kind, alert.correlation.item_id
                ),
                Err(_) => warn!(
                    "Delivery of {} alert for item {} timed out after {:?}",
                    alert.correlation.kind, alert.correlation.item_id, delivery_timeout
                ),
            }
        })
    }
}

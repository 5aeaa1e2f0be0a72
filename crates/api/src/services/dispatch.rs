//! Dispatch worker.
//!
//! The commands table is the durable outbox; this worker is its single
//! consumer. It wakes on a notifier (dispatch request, retry, device
//! connect) and additionally polls on an interval so commands created
//! before a crash are picked up after restart. Delivery is WebSocket push
//! for connected devices; everything else stays pending for HTTP polling.

use std::sync::Arc;
use std::time::Duration;

use persistence::repositories::CommandRepository;
use sqlx::PgPool;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::middleware::metrics::record_command_pushed;
use crate::ws::protocol::ServerEvent;
use crate::ws::ConnectionRegistry;

/// Cloneable handle used by request handlers to wake the worker.
#[derive(Debug, Clone, Default)]
pub struct DispatchHandle {
    wake: Arc<Notify>,
}

impl DispatchHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake the worker for an immediate delivery pass.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    fn notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }
}

/// Background worker that drains the command outbox.
pub struct DispatchWorker {
    pool: PgPool,
    registry: ConnectionRegistry,
    wake: Arc<Notify>,
    batch_size: i64,
    poll_interval: Duration,
    shutdown_rx: watch::Receiver<bool>,
}

impl DispatchWorker {
    pub fn new(
        pool: PgPool,
        registry: ConnectionRegistry,
        handle: &DispatchHandle,
        batch_size: i64,
        poll_interval: Duration,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            pool,
            registry,
            wake: handle.notifier(),
            batch_size,
            poll_interval,
            shutdown_rx,
        }
    }

    /// Spawn the worker loop.
    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                batch_size = self.batch_size,
                poll_secs = self.poll_interval.as_secs(),
                "Dispatch worker started"
            );

            let mut interval = tokio::time::interval(self.poll_interval);
            // Skip the first immediate tick
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = self.wake.notified() => {}
                    _ = interval.tick() => {}
                    _ = self.shutdown_rx.changed() => {
                        if *self.shutdown_rx.borrow() {
                            info!("Dispatch worker shutting down");
                            break;
                        }
                    }
                }

                if let Err(e) = self.deliver_pending().await {
                    error!(error = %e, "Dispatch pass failed");
                }
            }
        })
    }

    /// One delivery pass: claim pending commands and push those whose
    /// device is connected.
    async fn deliver_pending(&self) -> Result<(), sqlx::Error> {
        let repo = CommandRepository::new(self.pool.clone());
        let pending = repo.list_undelivered(self.batch_size).await?;

        for command in pending {
            let event = ServerEvent::NewCommand {
                command_id: command.command_id.clone(),
                command_type: command.command_type.clone(),
                payload: command
                    .payload
                    .clone()
                    .unwrap_or_else(|| serde_json::json!({})),
                priority: command.priority,
            };

            if !self.registry.send_to_device(&command.device_no, event).await {
                // Not connected: the command stays pending and the device
                // will pick it up over HTTP polling.
                continue;
            }

            if repo.mark_sent(&command.command_id).await? {
                record_command_pushed();
                debug!(
                    command_id = %command.command_id,
                    device_no = %command.device_no,
                    "Command pushed over WebSocket"
                );
            }
        }

        Ok(())
    }
}

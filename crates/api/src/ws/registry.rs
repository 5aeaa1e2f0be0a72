//! Live connection registry.
//!
//! Maps connected device numbers and admin sessions to their outbound
//! channels. All access goes through one RwLock so register/unregister/
//! lookup are atomic; each session owns an unbounded mpsc consumed by its
//! socket task, so sending never blocks on the lock holder.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::protocol::ServerEvent;

type Outbound = mpsc::UnboundedSender<ServerEvent>;

#[derive(Debug)]
struct DeviceConnection {
    conn_id: Uuid,
    tx: Outbound,
}

#[derive(Debug, Default)]
struct RegistryInner {
    devices: HashMap<String, DeviceConnection>,
    admins: HashMap<Uuid, Outbound>,
}

/// Shared registry of live WebSocket connections.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device connection, replacing any previous connection for
    /// the same device number.
    pub async fn register_device(&self, device_no: &str, conn_id: Uuid, tx: Outbound) {
        let mut inner = self.inner.write().await;
        inner
            .devices
            .insert(device_no.to_string(), DeviceConnection { conn_id, tx });
    }

    /// Remove a device connection.
    ///
    /// Only removes the entry if it still belongs to `conn_id`, so a
    /// reconnect that replaced the entry is not torn down by the old
    /// session's cleanup. Returns whether an entry was removed.
    pub async fn unregister_device(&self, device_no: &str, conn_id: Uuid) -> bool {
        let mut inner = self.inner.write().await;
        match inner.devices.get(device_no) {
            Some(conn) if conn.conn_id == conn_id => {
                inner.devices.remove(device_no);
                true
            }
            _ => false,
        }
    }

    /// Register an admin session.
    pub async fn register_admin(&self, conn_id: Uuid, tx: Outbound) {
        let mut inner = self.inner.write().await;
        inner.admins.insert(conn_id, tx);
    }

    /// Remove an admin session.
    pub async fn unregister_admin(&self, conn_id: Uuid) {
        let mut inner = self.inner.write().await;
        inner.admins.remove(&conn_id);
    }

    /// Push an event to a connected device. Returns false if the device has
    /// no live connection (or its channel is closed).
    pub async fn send_to_device(&self, device_no: &str, event: ServerEvent) -> bool {
        let inner = self.inner.read().await;
        match inner.devices.get(device_no) {
            Some(conn) => conn.tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Broadcast an event to every connected admin session.
    pub async fn broadcast_admins(&self, event: ServerEvent) {
        let inner = self.inner.read().await;
        for tx in inner.admins.values() {
            let _ = tx.send(event.clone());
        }
    }

    /// Device numbers with a live connection.
    pub async fn online_devices(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut devices: Vec<String> = inner.devices.keys().cloned().collect();
        devices.sort();
        devices
    }

    /// Number of connected devices.
    pub async fn device_count(&self) -> usize {
        self.inner.read().await.devices.len()
    }

    /// Number of connected admin sessions.
    pub async fn admin_count(&self) -> usize {
        self.inner.read().await.admins.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn channel() -> (Outbound, mpsc::UnboundedReceiver<ServerEvent>) {
        mpsc::unbounded_channel()
    }

    #[tokio::test]
    async fn test_register_and_send_to_device() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = channel();
        let conn_id = Uuid::new_v4();

        registry.register_device("D001", conn_id, tx).await;
        assert_eq!(registry.device_count().await, 1);

        let sent = registry
            .send_to_device(
                "D001",
                ServerEvent::HeartbeatAck {
                    timestamp: Utc::now(),
                },
            )
            .await;
        assert!(sent);
        assert!(matches!(
            rx.recv().await,
            Some(ServerEvent::HeartbeatAck { .. })
        ));
    }

    #[tokio::test]
    async fn test_send_to_unknown_device() {
        let registry = ConnectionRegistry::new();
        let sent = registry
            .send_to_device(
                "D404",
                ServerEvent::HeartbeatAck {
                    timestamp: Utc::now(),
                },
            )
            .await;
        assert!(!sent);
    }

    #[tokio::test]
    async fn test_unregister_requires_matching_conn_id() {
        let registry = ConnectionRegistry::new();
        let (old_tx, _old_rx) = channel();
        let (new_tx, _new_rx) = channel();
        let old_id = Uuid::new_v4();
        let new_id = Uuid::new_v4();

        registry.register_device("D001", old_id, old_tx).await;
        // Device reconnects before the old session cleans up.
        registry.register_device("D001", new_id, new_tx).await;

        // The old session's cleanup must not remove the new connection.
        assert!(!registry.unregister_device("D001", old_id).await);
        assert_eq!(registry.device_count().await, 1);

        assert!(registry.unregister_device("D001", new_id).await);
        assert_eq!(registry.device_count().await, 0);
    }

    #[tokio::test]
    async fn test_admin_broadcast() {
        let registry = ConnectionRegistry::new();
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();

        registry.register_admin(Uuid::new_v4(), tx1).await;
        registry.register_admin(Uuid::new_v4(), tx2).await;
        assert_eq!(registry.admin_count().await, 2);

        registry
            .broadcast_admins(ServerEvent::DeviceOnline {
                device_no: "D001".to_string(),
            })
            .await;

        assert!(matches!(
            rx1.recv().await,
            Some(ServerEvent::DeviceOnline { .. })
        ));
        assert!(matches!(
            rx2.recv().await,
            Some(ServerEvent::DeviceOnline { .. })
        ));
    }

    #[tokio::test]
    async fn test_online_devices_sorted() {
        let registry = ConnectionRegistry::new();
        let (tx1, _rx1) = channel();
        let (tx2, _rx2) = channel();

        registry.register_device("D002", Uuid::new_v4(), tx2).await;
        registry.register_device("D001", Uuid::new_v4(), tx1).await;

        assert_eq!(registry.online_devices().await, vec!["D001", "D002"]);
    }

    #[tokio::test]
    async fn test_unregister_admin() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = channel();
        let conn_id = Uuid::new_v4();

        registry.register_admin(conn_id, tx).await;
        registry.unregister_admin(conn_id).await;
        assert_eq!(registry.admin_count().await, 0);
    }
}

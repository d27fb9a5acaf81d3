//! BLE Connection Module
//!
//! Holds at most one active connection. A connection is only recorded once
//! the link is up and full service discovery has finished.

use super::transport::{BleTransport, DiscoveredService};
use super::InFlight;
use crate::domain::models::Peripheral;
use crate::error::BleError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// An open, fully discovered link to one peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub peripheral: Peripheral,
    pub services: Vec<DiscoveredService>,
}

impl Connection {
    pub fn peripheral_id(&self) -> &str {
        &self.peripheral.id
    }

    pub fn has_characteristic(&self, service: Uuid, characteristic: Uuid) -> bool {
        self.services
            .iter()
            .any(|s| s.uuid == service && s.characteristics.contains(&characteristic))
    }
}

pub struct ConnectionManager<T: BleTransport> {
    transport: Arc<T>,
    active: Mutex<Option<Connection>>,
    connecting: Arc<AtomicBool>,
    /// Bumped by every disconnect so in-flight connects can tell they were cancelled
    generation: AtomicU64,
}

impl<T: BleTransport> ConnectionManager<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            active: Mutex::new(None),
            connecting: Arc::new(AtomicBool::new(false)),
            generation: AtomicU64::new(0),
        }
    }

    /// Connects and discovers services. Not retried on failure.
    pub async fn connect(&self, peripheral: &Peripheral) -> Result<Connection, BleError> {
        let _guard = InFlight::acquire(&self.connecting).ok_or(BleError::ConnectInProgress)?;
        // Sampled before any await so a disconnect from here on is seen
        let generation = self.generation.load(Ordering::SeqCst);

        if let Some(existing) = self.active.lock().await.as_ref() {
            if existing.peripheral.id == peripheral.id {
                return Ok(existing.clone());
            }
            return Err(BleError::AlreadyConnected(existing.peripheral.id.clone()));
        }

        info!("Connecting to {} ({})", peripheral.name, peripheral.id);

        if let Err(e) = self.transport.connect(&peripheral.id).await {
            error!("Failed to connect to {}: {}", peripheral.id, e);
            return Err(as_connection_error(e));
        }

        let services = match self.transport.discover(&peripheral.id).await {
            Ok(services) => services,
            Err(e) => {
                error!("Service discovery failed on {}: {}", peripheral.id, e);
                self.release_link(&peripheral.id).await;
                return Err(as_connection_error(e));
            }
        };

        let mut active = self.active.lock().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            drop(active);
            warn!("Disconnect requested while connecting to {}", peripheral.id);
            self.release_link(&peripheral.id).await;
            return Err(BleError::Connection("cancelled by disconnect".to_string()));
        }

        let connection = Connection {
            peripheral: peripheral.clone(),
            services,
        };
        info!(
            "Connected to {} with {} service(s)",
            peripheral.id,
            connection.services.len()
        );
        *active = Some(connection.clone());
        Ok(connection)
    }

    /// Tears down the active connection, and cancels any connect in flight.
    /// No-op when nothing is connected.
    pub async fn disconnect(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let previous = self.active.lock().await.take();
        if let Some(connection) = previous {
            self.release_link(connection.peripheral_id()).await;
            info!("Disconnected from {}", connection.peripheral_id());
        }
    }

    /// Forgets the connection after the link dropped on its own. Returns
    /// false if `peripheral_id` is not the connected device.
    pub async fn connection_lost(&self, peripheral_id: &str) -> bool {
        let mut active = self.active.lock().await;
        if active.as_ref().map(Connection::peripheral_id) != Some(peripheral_id) {
            return false;
        }
        *active = None;
        self.generation.fetch_add(1, Ordering::SeqCst);
        warn!("Link to {} lost", peripheral_id);
        true
    }

    pub async fn current(&self) -> Option<Connection> {
        self.active.lock().await.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.active.lock().await.is_some()
    }

    pub fn is_connecting(&self) -> bool {
        InFlight::is_held(&self.connecting)
    }

    async fn release_link(&self, peripheral_id: &str) {
        if let Err(e) = self.transport.disconnect(peripheral_id).await {
            warn!("Failed to close link to {}: {}", peripheral_id, e);
        }
    }
}

fn as_connection_error(e: BleError) -> BleError {
    match e {
        BleError::Connection(_) => e,
        other => BleError::Connection(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::fake::{Call, FakeTransport};
    use crate::infrastructure::bluetooth::protocol;

    fn lamp(id: &str) -> Peripheral {
        Peripheral {
            id: id.to_string(),
            name: "Moonlight".to_string(),
            rssi: Some(-50),
        }
    }

    fn manager(fake: &FakeTransport) -> Arc<ConnectionManager<FakeTransport>> {
        Arc::new(ConnectionManager::new(Arc::new(fake.clone())))
    }

    #[tokio::test]
    async fn test_connect_records_connection() {
        let fake = FakeTransport::new();
        let manager = manager(&fake);

        let connection = manager.connect(&lamp("lamp-1")).await.unwrap();
        assert!(connection.has_characteristic(protocol::SERVICE_UUID, protocol::CONTROL_CHAR_UUID));
        assert_eq!(manager.current().await, Some(connection));
        assert_eq!(
            fake.calls(),
            vec![
                Call::Connect("lamp-1".to_string()),
                Call::Discover("lamp-1".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_connect_failure_records_nothing() {
        let fake = FakeTransport::new();
        fake.set_fail_connect(true);
        let manager = manager(&fake);

        assert!(matches!(
            manager.connect(&lamp("lamp-1")).await,
            Err(BleError::Connection(_))
        ));
        assert!(!manager.is_connected().await);
        assert!(!manager.is_connecting());
    }

    #[tokio::test]
    async fn test_discovery_failure_records_nothing() {
        let fake = FakeTransport::new();
        fake.set_fail_discover(true);
        let manager = manager(&fake);

        assert!(manager.connect(&lamp("lamp-1")).await.is_err());
        assert!(!manager.is_connected().await);
        assert_eq!(
            fake.calls().last(),
            Some(&Call::Disconnect("lamp-1".to_string()))
        );
    }

    #[tokio::test]
    async fn test_disconnect_during_discovery_leaves_nothing() {
        let fake = FakeTransport::new();
        let gate = fake.hold_discovery();
        let manager = manager(&fake);

        let pending = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.connect(&lamp("lamp-1")).await })
        };
        while !fake.calls().contains(&Call::Discover("lamp-1".to_string())) {
            tokio::task::yield_now().await;
        }

        manager.disconnect().await;
        gate.notify_one();

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(BleError::Connection(_))));
        assert!(manager.current().await.is_none());
        assert_eq!(
            fake.calls().last(),
            Some(&Call::Disconnect("lamp-1".to_string()))
        );
    }

    #[tokio::test]
    async fn test_disconnect_while_connect_waits_for_state_is_seen() {
        let fake = FakeTransport::new();
        let manager = manager(&fake);

        let held = manager.active.lock().await;
        let pending = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.connect(&lamp("lamp-1")).await })
        };
        while !manager.is_connecting() {
            tokio::task::yield_now().await;
        }
        let disconnecting = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.disconnect().await })
        };
        while manager.generation.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        drop(held);

        assert!(matches!(
            pending.await.unwrap(),
            Err(BleError::Connection(_))
        ));
        disconnecting.await.unwrap();
        assert!(!manager.is_connected().await);
    }

    #[tokio::test]
    async fn test_connection_lost_clears_only_matching_device() {
        let fake = FakeTransport::new();
        let manager = manager(&fake);
        manager.connect(&lamp("lamp-1")).await.unwrap();

        assert!(!manager.connection_lost("lamp-2").await);
        assert!(manager.is_connected().await);

        assert!(manager.connection_lost("lamp-1").await);
        assert!(!manager.is_connected().await);
        assert!(!manager.connection_lost("lamp-1").await);

        // The device can be connected again afterwards
        assert!(manager.connect(&lamp("lamp-1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_overlapping_connect_rejected() {
        let fake = FakeTransport::new();
        let gate = fake.hold_discovery();
        let manager = manager(&fake);

        let pending = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.connect(&lamp("lamp-1")).await })
        };
        while !manager.is_connecting() {
            tokio::task::yield_now().await;
        }

        assert_eq!(
            manager.connect(&lamp("lamp-2")).await,
            Err(BleError::ConnectInProgress)
        );

        gate.notify_one();
        assert!(pending.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_second_device_rejected_same_device_reused() {
        let fake = FakeTransport::new();
        let manager = manager(&fake);

        manager.connect(&lamp("lamp-1")).await.unwrap();
        assert!(manager.connect(&lamp("lamp-1")).await.is_ok());
        assert_eq!(
            manager.connect(&lamp("lamp-2")).await,
            Err(BleError::AlreadyConnected("lamp-1".to_string()))
        );
    }

    #[tokio::test]
    async fn test_disconnect_without_connection_is_noop() {
        let fake = FakeTransport::new();
        let manager = manager(&fake);

        manager.disconnect().await;
        assert!(fake.calls().is_empty());

        manager.connect(&lamp("lamp-1")).await.unwrap();
        manager.disconnect().await;
        assert!(!manager.is_connected().await);

        // A later connect works again
        assert!(manager.connect(&lamp("lamp-1")).await.is_ok());
    }
}

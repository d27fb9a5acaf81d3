//! Bluetooth Service Module
//!
//! Main service that coordinates permissions, scanning, connection and
//! command writes for the nap lamp.

use super::connection::{Connection, ConnectionManager};
use super::encoder::{SessionCommandEncoder, WriteOutcome};
use super::permissions::{PermissionGate, PermissionPrompter};
use super::registry::DeviceRegistry;
use super::scanner::{ScanController, ScanStream};
use super::transport::{BleTransport, DisconnectStream};
use crate::domain::models::{
    AppEvent, ConnectionStatus, MessageSeverity, Peripheral, StatusMessage,
};
use crate::domain::session::SessionCommand;
use crate::domain::settings::{PermissionPlatform, Settings};
use crate::error::BleError;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, warn};
use uuid::Uuid;

/// Configuration for the Bluetooth service
#[derive(Debug, Clone)]
pub struct BluetoothConfig {
    pub scan_window: Duration,
    pub service_uuid: Uuid,
    pub control_char_uuid: Uuid,
    pub platform: PermissionPlatform,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for BluetoothConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            scan_window: Duration::from_secs(settings.scan_window_secs),
            service_uuid: settings.service_uuid,
            control_char_uuid: settings.control_char_uuid,
            platform: settings.platform,
        }
    }
}

/// Main Bluetooth service coordinating all BLE operations
pub struct BluetoothService<T: BleTransport> {
    permissions: PermissionGate,
    registry: Arc<Mutex<DeviceRegistry>>,
    scanner: ScanController<T>,
    connections: Arc<ConnectionManager<T>>,
    encoder: SessionCommandEncoder<T>,
    transport: Arc<T>,
    /// Watches the connected device for link loss
    link_watch: std::sync::Mutex<Option<JoinHandle<()>>>,
    event_sender: mpsc::UnboundedSender<AppEvent>,
}

impl<T: BleTransport> BluetoothService<T> {
    pub fn new(
        transport: Arc<T>,
        prompter: Arc<dyn PermissionPrompter>,
        config: BluetoothConfig,
        event_sender: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        let registry = Arc::new(Mutex::new(DeviceRegistry::new()));
        let connections = Arc::new(ConnectionManager::new(transport.clone()));

        Self {
            permissions: PermissionGate::new(config.platform, prompter),
            scanner: ScanController::new(
                transport.clone(),
                registry.clone(),
                config.scan_window,
                event_sender.clone(),
            ),
            encoder: SessionCommandEncoder::new(
                transport.clone(),
                connections.clone(),
                config.service_uuid,
                config.control_char_uuid,
            ),
            transport,
            link_watch: std::sync::Mutex::new(None),
            registry,
            connections,
            event_sender,
        }
    }

    pub async fn request_permissions(&self) -> bool {
        self.permissions.request_permissions().await
    }

    /// Asks for permissions, then starts a scan.
    pub async fn start_scan(&self) -> Result<ScanStream, BleError> {
        if !self.request_permissions().await {
            self.send_log(
                "Bluetooth permissions are required to scan",
                MessageSeverity::Error,
            );
            return Err(BleError::PermissionDenied);
        }

        self.send_log("Scanning for devices...", MessageSeverity::Info);
        self.scanner.scan_for_peripherals().await.map_err(|e| {
            self.send_log(format!("Scan failed: {}", e), MessageSeverity::Error);
            e
        })
    }

    pub fn is_scanning(&self) -> bool {
        self.scanner.is_scanning()
    }

    /// Devices found so far, in discovery order
    pub async fn devices(&self) -> Vec<Peripheral> {
        self.registry.lock().await.devices().to_vec()
    }

    pub async fn connect(&self, peripheral: &Peripheral) -> Result<Connection, BleError> {
        self.send_status(ConnectionStatus::Connecting);
        // Subscribe first so a drop right after connecting is not missed
        let disconnections = match self.transport.disconnections().await {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!("Link loss will go unnoticed: {}", e);
                None
            }
        };

        match self.connections.connect(peripheral).await {
            Ok(connection) => {
                if let Some(stream) = disconnections {
                    self.replace_link_watch(Some(self.watch_link(&connection, stream)));
                }
                self.send_status(ConnectionStatus::Connected);
                self.send_log(
                    format!("Connected to {}", peripheral.name),
                    MessageSeverity::Success,
                );
                Ok(connection)
            }
            Err(e) => {
                self.send_log(format!("Connection failed: {}", e), MessageSeverity::Error);
                let status = if self.connections.is_connected().await {
                    ConnectionStatus::Connected
                } else {
                    ConnectionStatus::Error
                };
                self.send_status(status);
                Err(e)
            }
        }
    }

    /// Connects to a device previously found by a scan.
    pub async fn connect_by_id(&self, id: &str) -> Result<Connection, BleError> {
        let peripheral = self
            .registry
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| BleError::Connection(format!("Device {} has not been discovered", id)))?;
        self.connect(&peripheral).await
    }

    pub async fn disconnect(&self) {
        self.replace_link_watch(None);
        let was_connected = self.connections.is_connected().await;
        self.connections.disconnect().await;
        if was_connected {
            self.send_log("Disconnected from device", MessageSeverity::Info);
            self.send_status(ConnectionStatus::Disconnected);
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.connections.is_connected().await
    }

    pub async fn connected_device(&self) -> Option<Peripheral> {
        self.connections.current().await.map(|c| c.peripheral)
    }

    /// Best-effort command write. Failures are logged and reported, never retried.
    pub async fn send_command(&self, command: &SessionCommand) -> Result<WriteOutcome, BleError> {
        match self.encoder.write(command).await {
            Ok(WriteOutcome::NotConnected) => {
                warn!("No device connected");
                Ok(WriteOutcome::NotConnected)
            }
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!("Failed to send {:?}: {}", command, e);
                self.send_log(format!("Failed to reach device: {}", e), MessageSeverity::Warning);
                Err(e)
            }
        }
    }

    fn watch_link(&self, connection: &Connection, mut dropped: DisconnectStream) -> JoinHandle<()> {
        let connections = self.connections.clone();
        let events = self.event_sender.clone();
        let peripheral = connection.peripheral.clone();

        tokio::spawn(async move {
            while let Some(id) = dropped.next().await {
                if id != peripheral.id {
                    continue;
                }
                if connections.connection_lost(&id).await {
                    let _ = events.send(AppEvent::LogMessage(StatusMessage::new(
                        format!("Connection to {} lost", peripheral.name),
                        MessageSeverity::Warning,
                    )));
                    let _ = events.send(AppEvent::ConnectionStatus(ConnectionStatus::Disconnected));
                }
                break;
            }
        })
    }

    fn replace_link_watch(&self, next: Option<JoinHandle<()>>) {
        let mut watch = self
            .link_watch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = std::mem::replace(&mut *watch, next) {
            previous.abort();
        }
    }

    fn send_status(&self, status: ConnectionStatus) {
        let _ = self.event_sender.send(AppEvent::ConnectionStatus(status));
    }

    fn send_log(&self, message: impl Into<String>, severity: MessageSeverity) {
        let _ = self
            .event_sender
            .send(AppEvent::LogMessage(StatusMessage::new(message, severity)));
    }
}

impl<T: BleTransport> Drop for BluetoothService<T> {
    fn drop(&mut self) {
        self.replace_link_watch(None);
    }
}

//! BLE transport seam
//!
//! The primitives the rest of the Bluetooth layer needs from the platform
//! radio stack. [`super::btleplug_backend::BtleplugTransport`] is the real
//! implementation.

use crate::error::BleError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

/// One advertisement report from the radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub id: String,
    pub name: Option<String>,
    pub rssi: Option<i16>,
}

/// A GATT service and the characteristics it exposes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredService {
    pub uuid: Uuid,
    pub characteristics: Vec<Uuid>,
}

pub type AdvertisementStream = BoxStream<'static, Result<Advertisement, BleError>>;

/// Ids of peripherals whose link dropped, whoever closed it
pub type DisconnectStream = BoxStream<'static, String>;

#[async_trait]
pub trait BleTransport: Send + Sync + 'static {
    /// Starts an unfiltered scan. The stream ends when the radio stops.
    async fn start_scan(&self) -> Result<AdvertisementStream, BleError>;

    async fn stop_scan(&self) -> Result<(), BleError>;

    /// Opens the link layer connection.
    async fn connect(&self, peripheral_id: &str) -> Result<(), BleError>;

    /// Discovers all services and characteristics of a connected peripheral.
    async fn discover(&self, peripheral_id: &str) -> Result<Vec<DiscoveredService>, BleError>;

    /// Subscribes to link-loss notifications. Only drops reported after the
    /// call are delivered.
    async fn disconnections(&self) -> Result<DisconnectStream, BleError>;

    async fn disconnect(&self, peripheral_id: &str) -> Result<(), BleError>;

    /// Write-with-response. `value` is the base64 form of the bytes to send.
    async fn write_with_response(
        &self,
        peripheral_id: &str,
        service: Uuid,
        characteristic: Uuid,
        value: &str,
    ) -> Result<(), BleError>;
}

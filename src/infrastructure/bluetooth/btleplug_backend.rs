//! btleplug-backed transport for Linux (BlueZ), macOS and Windows.

use super::protocol;
use super::transport::{
    Advertisement, AdvertisementStream, BleTransport, DisconnectStream, DiscoveredService,
};
use crate::error::BleError;
use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

pub struct BtleplugTransport {
    adapter: Adapter,
    /// Peripherals by their string id, filled as they are seen
    known: Arc<Mutex<HashMap<String, Peripheral>>>,
}

impl BtleplugTransport {
    /// Opens the first Bluetooth adapter on the system.
    pub async fn new() -> Result<Self, BleError> {
        let manager = Manager::new()
            .await
            .map_err(|e| BleError::Scan(format!("Failed to create BLE manager: {}", e)))?;
        let adapter = manager
            .adapters()
            .await
            .map_err(|e| BleError::Scan(format!("Failed to list adapters: {}", e)))?
            .into_iter()
            .next()
            .ok_or(BleError::NoAdapter)?;

        if let Ok(info) = adapter.adapter_info().await {
            info!("Using Bluetooth adapter {}", info);
        }

        Ok(Self {
            adapter,
            known: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    async fn peripheral(&self, peripheral_id: &str) -> Result<Peripheral, BleError> {
        if let Some(p) = self.known.lock().await.get(peripheral_id) {
            return Ok(p.clone());
        }

        let peripherals = self
            .adapter
            .peripherals()
            .await
            .map_err(|e| BleError::Connection(e.to_string()))?;
        let found = peripherals
            .into_iter()
            .find(|p| p.id().to_string() == peripheral_id)
            .ok_or_else(|| BleError::Connection(format!("Unknown peripheral {}", peripheral_id)))?;

        self.known
            .lock()
            .await
            .insert(peripheral_id.to_string(), found.clone());
        Ok(found)
    }
}

async fn advertisement_for(
    adapter: &Adapter,
    known: &Mutex<HashMap<String, Peripheral>>,
    event: CentralEvent,
) -> Option<Advertisement> {
    let id = match event {
        CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
        _ => return None,
    };
    let peripheral = adapter.peripheral(&id).await.ok()?;
    let properties = peripheral.properties().await.ok().flatten()?;
    let key = id.to_string();
    known.lock().await.insert(key.clone(), peripheral);

    Some(Advertisement {
        id: key,
        name: properties.local_name,
        rssi: properties.rssi,
    })
}

#[async_trait]
impl BleTransport for BtleplugTransport {
    async fn start_scan(&self) -> Result<AdvertisementStream, BleError> {
        let events = self
            .adapter
            .events()
            .await
            .map_err(|e| BleError::Scan(e.to_string()))?;
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| BleError::Scan(e.to_string()))?;

        let adapter = self.adapter.clone();
        let known = self.known.clone();
        let stream = events
            .filter_map(move |event| {
                let adapter = adapter.clone();
                let known = known.clone();
                async move { advertisement_for(&adapter, &known, event).await.map(Ok) }
            })
            .boxed();
        Ok(stream)
    }

    async fn stop_scan(&self) -> Result<(), BleError> {
        self.adapter
            .stop_scan()
            .await
            .map_err(|e| BleError::Scan(e.to_string()))
    }

    async fn connect(&self, peripheral_id: &str) -> Result<(), BleError> {
        let peripheral = self.peripheral(peripheral_id).await?;
        peripheral
            .connect()
            .await
            .map_err(|e| BleError::Connection(e.to_string()))
    }

    async fn discover(&self, peripheral_id: &str) -> Result<Vec<DiscoveredService>, BleError> {
        let peripheral = self.peripheral(peripheral_id).await?;
        peripheral
            .discover_services()
            .await
            .map_err(|e| BleError::Connection(e.to_string()))?;

        let services: Vec<DiscoveredService> = peripheral
            .services()
            .into_iter()
            .map(|service| DiscoveredService {
                uuid: service.uuid,
                characteristics: service.characteristics.iter().map(|c| c.uuid).collect(),
            })
            .collect();
        debug!("{} exposes {} service(s)", peripheral_id, services.len());
        Ok(services)
    }

    async fn disconnections(&self) -> Result<DisconnectStream, BleError> {
        let events = self
            .adapter
            .events()
            .await
            .map_err(|e| BleError::Connection(e.to_string()))?;
        let stream = events
            .filter_map(|event| async move {
                match event {
                    CentralEvent::DeviceDisconnected(id) => Some(id.to_string()),
                    _ => None,
                }
            })
            .boxed();
        Ok(stream)
    }

    async fn disconnect(&self, peripheral_id: &str) -> Result<(), BleError> {
        let peripheral = self.peripheral(peripheral_id).await?;
        peripheral
            .disconnect()
            .await
            .map_err(|e| BleError::Connection(e.to_string()))
    }

    async fn write_with_response(
        &self,
        peripheral_id: &str,
        service: Uuid,
        characteristic: Uuid,
        value: &str,
    ) -> Result<(), BleError> {
        let peripheral = self.peripheral(peripheral_id).await?;
        let target = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic && c.service_uuid == service)
            .ok_or_else(|| {
                BleError::Write(format!(
                    "Characteristic {} not found in service {}",
                    characteristic, service
                ))
            })?;

        // The value arrives base64 encoded; the radio wants the raw bytes.
        let bytes = protocol::decode_value(value)?;
        peripheral
            .write(&target, &bytes, WriteType::WithResponse)
            .await
            .map_err(|e| BleError::Write(e.to_string()))
    }
}

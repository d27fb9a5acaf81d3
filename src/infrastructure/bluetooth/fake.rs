//! In-memory transport for tests.

use super::transport::{
    Advertisement, AdvertisementStream, BleTransport, DisconnectStream, DiscoveredService,
};
use super::protocol;
use crate::error::BleError;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    StartScan,
    StopScan,
    Connect(String),
    Discover(String),
    Disconnect(String),
    Write { peripheral_id: String, value: String },
}

#[derive(Default)]
struct Inner {
    calls: Vec<Call>,
    scan_feed: Option<mpsc::UnboundedSender<Result<Advertisement, BleError>>>,
    fail_scan: bool,
    fail_connect: bool,
    fail_discover: bool,
    fail_write: bool,
    write_delay: Option<Duration>,
    link_watchers: Vec<mpsc::UnboundedSender<String>>,
}

#[derive(Clone, Default)]
pub struct FakeTransport {
    inner: Arc<Mutex<Inner>>,
    discovery_gate: Arc<Mutex<Option<Arc<Notify>>>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Plain-text payloads of every write so far.
    pub fn written_payloads(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Write { value, .. } => {
                    Some(String::from_utf8(protocol::decode_value(&value).unwrap()).unwrap())
                }
                _ => None,
            })
            .collect()
    }

    /// Pushes an advertisement into the running scan, if any.
    pub fn advertise(&self, id: &str, name: Option<&str>) {
        let inner = self.inner.lock().unwrap();
        if let Some(feed) = &inner.scan_feed {
            let _ = feed.send(Ok(Advertisement {
                id: id.to_string(),
                name: name.map(str::to_string),
                rssi: Some(-60),
            }));
        }
    }

    pub fn fail_running_scan(&self, reason: &str) {
        let inner = self.inner.lock().unwrap();
        if let Some(feed) = &inner.scan_feed {
            let _ = feed.send(Err(BleError::Scan(reason.to_string())));
        }
    }

    pub fn set_fail_scan(&self, fail: bool) {
        self.inner.lock().unwrap().fail_scan = fail;
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.inner.lock().unwrap().fail_connect = fail;
    }

    pub fn set_fail_discover(&self, fail: bool) {
        self.inner.lock().unwrap().fail_discover = fail;
    }

    pub fn set_fail_write(&self, fail: bool) {
        self.inner.lock().unwrap().fail_write = fail;
    }

    /// Makes every write wait this long before it is acknowledged.
    pub fn set_write_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().write_delay = Some(delay);
    }

    /// Reports that the link to `peripheral_id` dropped.
    pub fn drop_link(&self, peripheral_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .link_watchers
            .retain(|watcher| watcher.send(peripheral_id.to_string()).is_ok());
    }

    /// Makes `discover` wait until the returned handle is notified.
    pub fn hold_discovery(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.discovery_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    fn record(&self, call: Call) {
        self.inner.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl BleTransport for FakeTransport {
    async fn start_scan(&self) -> Result<AdvertisementStream, BleError> {
        self.record(Call::StartScan);
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_scan {
            return Err(BleError::Scan("radio off".to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        inner.scan_feed = Some(tx);
        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }

    async fn stop_scan(&self) -> Result<(), BleError> {
        self.record(Call::StopScan);
        self.inner.lock().unwrap().scan_feed = None;
        Ok(())
    }

    async fn connect(&self, peripheral_id: &str) -> Result<(), BleError> {
        self.record(Call::Connect(peripheral_id.to_string()));
        if self.inner.lock().unwrap().fail_connect {
            return Err(BleError::Connection("link refused".to_string()));
        }
        Ok(())
    }

    async fn discover(&self, peripheral_id: &str) -> Result<Vec<DiscoveredService>, BleError> {
        self.record(Call::Discover(peripheral_id.to_string()));
        let gate = self.discovery_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.inner.lock().unwrap().fail_discover {
            return Err(BleError::Connection("discovery failed".to_string()));
        }
        Ok(vec![DiscoveredService {
            uuid: protocol::SERVICE_UUID,
            characteristics: vec![protocol::CONTROL_CHAR_UUID],
        }])
    }

    async fn disconnections(&self) -> Result<DisconnectStream, BleError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().unwrap().link_watchers.push(tx);
        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|id| (id, rx))
        })
        .boxed())
    }

    async fn disconnect(&self, peripheral_id: &str) -> Result<(), BleError> {
        self.record(Call::Disconnect(peripheral_id.to_string()));
        Ok(())
    }

    async fn write_with_response(
        &self,
        peripheral_id: &str,
        _service: Uuid,
        _characteristic: Uuid,
        value: &str,
    ) -> Result<(), BleError> {
        self.record(Call::Write {
            peripheral_id: peripheral_id.to_string(),
            value: value.to_string(),
        });
        let delay = self.inner.lock().unwrap().write_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.inner.lock().unwrap().fail_write {
            return Err(BleError::Write("GATT error 0x03".to_string()));
        }
        Ok(())
    }
}

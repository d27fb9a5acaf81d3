//! BLE Scanner Module
//!
//! Runs one bounded discovery scan at a time. Named advertisements are fed
//! into the shared [`DeviceRegistry`]; newly registered devices are also
//! yielded by the returned [`ScanStream`].

use super::registry::DeviceRegistry;
use super::transport::{Advertisement, BleTransport};
use super::InFlight;
use crate::domain::models::{AppEvent, Peripheral};
use crate::error::BleError;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// How a scan ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEnd {
    /// The scan window elapsed
    TimedOut,
    /// Cancelled by the caller, or the stream was dropped
    Cancelled,
    /// The radio reported an error
    Failed,
    /// The radio stopped delivering results on its own
    Exhausted,
}

pub struct ScanController<T: BleTransport> {
    transport: Arc<T>,
    registry: Arc<Mutex<DeviceRegistry>>,
    scanning: Arc<AtomicBool>,
    window: Duration,
    event_sender: mpsc::UnboundedSender<AppEvent>,
}

impl<T: BleTransport> ScanController<T> {
    pub fn new(
        transport: Arc<T>,
        registry: Arc<Mutex<DeviceRegistry>>,
        window: Duration,
        event_sender: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            transport,
            registry,
            scanning: Arc::new(AtomicBool::new(false)),
            window,
            event_sender,
        }
    }

    pub fn is_scanning(&self) -> bool {
        InFlight::is_held(&self.scanning)
    }

    /// Starts an unfiltered scan that stops by itself after the scan window.
    ///
    /// Fails with [`BleError::ScanInProgress`] while another scan is running.
    /// Dropping the returned stream cancels the scan.
    pub async fn scan_for_peripherals(&self) -> Result<ScanStream, BleError> {
        let guard = InFlight::acquire(&self.scanning).ok_or(BleError::ScanInProgress)?;

        info!("Starting BLE scan ({} s window)", self.window.as_secs());
        let mut advertisements = self.transport.start_scan().await.map_err(|e| {
            error!("Failed to start scan: {}", e);
            e
        })?;

        let (found_tx, found_rx) = mpsc::unbounded_channel();
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        let deadline = Instant::now() + self.window;
        let transport = self.transport.clone();
        let registry = self.registry.clone();
        let events = self.event_sender.clone();

        let task = tokio::spawn(async move {
            let _guard = guard;
            let mut found = 0usize;

            let end = loop {
                tokio::select! {
                    _ = &mut cancel_rx => break ScanEnd::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => break ScanEnd::TimedOut,
                    next = advertisements.next() => match next {
                        Some(Ok(advertisement)) => {
                            let Some(peripheral) = named_peripheral(advertisement) else {
                                continue;
                            };
                            if registry.lock().await.add(peripheral.clone()) {
                                found += 1;
                                let _ = events.send(AppEvent::DeviceFound(peripheral.clone()));
                                let _ = found_tx.send(peripheral);
                            }
                        }
                        Some(Err(e)) => {
                            error!("Scan error: {}", e);
                            break ScanEnd::Failed;
                        }
                        None => break ScanEnd::Exhausted,
                    },
                }
            };

            if let Err(e) = transport.stop_scan().await {
                warn!("Failed to stop scan: {}", e);
            }
            info!("Scan ended ({:?}), {} new device(s)", end, found);
            let _ = events.send(AppEvent::ScanFinished { found });
            end
        });

        Ok(ScanStream {
            found: found_rx,
            cancel: Some(cancel_tx),
            task,
        })
    }
}

fn named_peripheral(advertisement: Advertisement) -> Option<Peripheral> {
    let name = advertisement.name?;
    if name.is_empty() {
        return None;
    }
    Some(Peripheral {
        id: advertisement.id,
        name,
        rssi: advertisement.rssi,
    })
}

/// Newly discovered devices of one scan.
///
/// Ends when the scan ends. Also usable as a [`futures::Stream`].
pub struct ScanStream {
    found: mpsc::UnboundedReceiver<Peripheral>,
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<ScanEnd>,
}

impl ScanStream {
    pub async fn next_device(&mut self) -> Option<Peripheral> {
        self.found.recv().await
    }

    /// Stops the scan early and waits for the radio to be released.
    pub async fn cancel(mut self) -> ScanEnd {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        Self::join(self.task).await
    }

    /// Waits for the scan to end on its own.
    pub async fn finished(self) -> ScanEnd {
        let ScanStream { cancel, task, .. } = self;
        let end = Self::join(task).await;
        drop(cancel);
        end
    }

    async fn join(task: JoinHandle<ScanEnd>) -> ScanEnd {
        task.await.unwrap_or_else(|e| {
            error!("Scan task failed: {}", e);
            ScanEnd::Failed
        })
    }
}

impl Stream for ScanStream {
    type Item = Peripheral;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Peripheral>> {
        self.found.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::fake::{Call, FakeTransport};

    fn controller(
        fake: &FakeTransport,
    ) -> (
        ScanController<FakeTransport>,
        Arc<Mutex<DeviceRegistry>>,
        mpsc::UnboundedReceiver<AppEvent>,
    ) {
        let registry = Arc::new(Mutex::new(DeviceRegistry::new()));
        let (tx, rx) = mpsc::unbounded_channel();
        let scanner = ScanController::new(
            Arc::new(fake.clone()),
            registry.clone(),
            Duration::from_secs(10),
            tx,
        );
        (scanner, registry, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_registers_named_devices_and_times_out() {
        let fake = FakeTransport::new();
        let (scanner, registry, _events) = controller(&fake);

        let started = Instant::now();
        let mut stream = scanner.scan_for_peripherals().await.unwrap();
        assert!(scanner.is_scanning());

        fake.advertise("lamp-1", Some("Moonlight"));
        fake.advertise("anon", None);
        fake.advertise("blank", Some(""));
        fake.advertise("lamp-1", Some("Moonlight"));
        fake.advertise("lamp-2", Some("Moonlight 2"));

        assert_eq!(stream.next_device().await.unwrap().id, "lamp-1");
        assert_eq!(stream.next_device().await.unwrap().id, "lamp-2");

        assert_eq!(stream.finished().await, ScanEnd::TimedOut);
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert!(!scanner.is_scanning());

        let registry = registry.lock().await;
        assert_eq!(registry.len(), 2);
        assert_eq!(fake.calls().last(), Some(&Call::StopScan));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_scan_rejected() {
        let fake = FakeTransport::new();
        let (scanner, _registry, _events) = controller(&fake);

        let stream = scanner.scan_for_peripherals().await.unwrap();
        assert_eq!(
            scanner.scan_for_peripherals().await.err(),
            Some(BleError::ScanInProgress)
        );

        assert_eq!(stream.cancel().await, ScanEnd::Cancelled);
        let again = scanner.scan_for_peripherals().await.unwrap();
        again.cancel().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_before_window() {
        let fake = FakeTransport::new();
        let (scanner, _registry, mut events) = controller(&fake);

        let started = Instant::now();
        let stream = scanner.scan_for_peripherals().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(stream.cancel().await, ScanEnd::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(matches!(
            events.recv().await,
            Some(AppEvent::ScanFinished { found: 0 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_radio_error_ends_scan_and_keeps_registry() {
        let fake = FakeTransport::new();
        let (scanner, registry, _events) = controller(&fake);

        let mut stream = scanner.scan_for_peripherals().await.unwrap();
        fake.advertise("lamp-1", Some("Moonlight"));
        assert!(stream.next_device().await.is_some());

        fake.fail_running_scan("adapter reset");
        assert_eq!(stream.finished().await, ScanEnd::Failed);
        assert_eq!(registry.lock().await.len(), 1);
        assert!(!scanner.is_scanning());
    }

    #[tokio::test(start_paused = true)]
    async fn test_whitespace_name_still_registered() {
        let fake = FakeTransport::new();
        let (scanner, registry, _events) = controller(&fake);

        let mut stream = scanner.scan_for_peripherals().await.unwrap();
        fake.advertise("spaces", Some("  "));
        assert_eq!(stream.next_device().await.unwrap().name, "  ");
        stream.cancel().await;
        assert!(registry.lock().await.contains("spaces"));
    }

    #[tokio::test]
    async fn test_start_failure_releases_guard() {
        let fake = FakeTransport::new();
        fake.set_fail_scan(true);
        let (scanner, _registry, _events) = controller(&fake);

        assert!(matches!(
            scanner.scan_for_peripherals().await,
            Err(BleError::Scan(_))
        ));
        assert!(!scanner.is_scanning());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_interface() {
        let fake = FakeTransport::new();
        let (scanner, _registry, _events) = controller(&fake);

        let stream = scanner.scan_for_peripherals().await.unwrap();
        fake.advertise("a", Some("A"));
        fake.advertise("b", Some("B"));

        let names: Vec<String> = stream.map(|p| p.name).collect().await;
        assert_eq!(names, vec!["A".to_string(), "B".to_string()]);
    }
}

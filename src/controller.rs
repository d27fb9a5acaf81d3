//! Nap session controller
//!
//! Owns the session configuration, the countdown and the Bluetooth service,
//! and drives the one-second tick task. Front ends hold one of these and
//! call into it; updates come back as [`AppEvent`]s.

use crate::domain::models::{AppEvent, StopReason};
use crate::domain::session::{BreathingMethod, SessionCommand, SessionConfig, SessionConfigStore};
use crate::domain::timer::{SessionTimer, Tick, TimerSnapshot};
use crate::error::ConfigError;
use crate::infrastructure::bluetooth::transport::BleTransport;
use crate::infrastructure::bluetooth::BluetoothService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{info, warn};

pub struct NapController<T: BleTransport> {
    config: Mutex<SessionConfigStore>,
    timer: Arc<Mutex<SessionTimer>>,
    bluetooth: Arc<BluetoothService<T>>,
    ticker: std::sync::Mutex<Option<JoinHandle<()>>>,
    tick_interval: Duration,
    event_sender: mpsc::UnboundedSender<AppEvent>,
}

impl<T: BleTransport> NapController<T> {
    pub fn new(
        bluetooth: Arc<BluetoothService<T>>,
        event_sender: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        let store = SessionConfigStore::new();
        let timer = SessionTimer::new(store.get().nap_duration);
        Self {
            config: Mutex::new(store),
            timer: Arc::new(Mutex::new(timer)),
            bluetooth,
            ticker: std::sync::Mutex::new(None),
            tick_interval: Duration::from_secs(1),
            event_sender,
        }
    }

    pub fn bluetooth(&self) -> &Arc<BluetoothService<T>> {
        &self.bluetooth
    }

    pub async fn config(&self) -> SessionConfig {
        self.config.lock().await.get()
    }

    // Configuration changes are not blocked while a session runs; front ends
    // should not offer them then. The timer only adopts a new nap length on
    // its next reset.

    pub async fn set_nap_duration(&self, minutes: u32) -> Result<(), ConfigError> {
        self.update_config(|store| store.set_nap_duration(minutes)).await
    }

    pub async fn set_breathing_method(&self, method: BreathingMethod) -> Result<(), ConfigError> {
        self.update_config(|store| store.set_breathing_method(method)).await
    }

    pub async fn set_breathing_light_duration(&self, minutes: u32) -> Result<(), ConfigError> {
        self.update_config(|store| store.set_breathing_light_duration(minutes))
            .await
    }

    pub async fn set_wake_up_light_duration(&self, minutes: u32) -> Result<(), ConfigError> {
        self.update_config(|store| store.set_wake_up_light_duration(minutes))
            .await
    }

    pub async fn apply_config(&self, config: SessionConfig) -> Result<(), ConfigError> {
        self.update_config(|store| store.apply(config)).await
    }

    pub async fn apply_preset(&self, title: &str) -> Result<(), ConfigError> {
        self.update_config(|store| store.apply_preset(title)).await
    }

    async fn update_config(
        &self,
        change: impl FnOnce(&mut SessionConfigStore) -> Result<(), ConfigError>,
    ) -> Result<(), ConfigError> {
        let nap = {
            let mut store = self.config.lock().await;
            if let Err(e) = change(&mut store) {
                warn!("Rejected configuration change: {}", e);
                return Err(e);
            }
            store.get().nap_duration
        };
        self.timer.lock().await.reconfigure(nap);
        Ok(())
    }

    pub async fn snapshot(&self) -> TimerSnapshot {
        self.timer.lock().await.snapshot()
    }

    pub async fn is_running(&self) -> bool {
        self.timer.lock().await.is_running()
    }

    /// Starts a session with the current configuration. Does nothing if one
    /// is already running.
    ///
    /// The countdown runs whether or not the start command reaches the lamp.
    pub async fn start_session(&self) -> TimerSnapshot {
        let config = self.config().await;
        let (command, snapshot) = {
            let mut timer = self.timer.lock().await;
            (timer.start(&config), timer.snapshot())
        };
        let Some(command) = command else {
            return snapshot;
        };

        info!(
            "Starting nap session: {} min, {}",
            config.nap_duration, config.breathing_method
        );
        self.replace_ticker(Some(self.spawn_ticker()));
        let _ = self.event_sender.send(AppEvent::SessionStarted(config));
        let _ = self.event_sender.send(AppEvent::Tick(snapshot.clone()));
        // The countdown is already running; a slow acknowledgement only delays the caller.
        let _ = self.bluetooth.send_command(&command).await;
        snapshot
    }

    /// Stops a running session. No-op when idle.
    pub async fn stop_session(&self) -> TimerSnapshot {
        let (command, snapshot) = {
            let mut timer = self.timer.lock().await;
            (timer.stop(), timer.snapshot())
        };
        if let Some(command) = command {
            self.finish(command, StopReason::Stopped, &snapshot).await;
        }
        snapshot
    }

    /// Start when idle, stop when running.
    pub async fn toggle_session(&self) -> TimerSnapshot {
        if self.is_running().await {
            self.stop_session().await
        } else {
            self.start_session().await
        }
    }

    /// Resets the countdown and sends the stop command even when no session
    /// is running. The write is skipped only if no device is connected.
    pub async fn cancel_session(&self) -> TimerSnapshot {
        let (command, snapshot) = {
            let mut timer = self.timer.lock().await;
            (timer.cancel(), timer.snapshot())
        };
        self.finish(command, StopReason::Cancelled, &snapshot).await;
        snapshot
    }

    /// Cancels the tick task and closes the connection.
    pub async fn shutdown(&self) {
        if self.is_running().await {
            self.stop_session().await;
        }
        self.replace_ticker(None);
        self.bluetooth.disconnect().await;
    }

    async fn finish(&self, command: SessionCommand, reason: StopReason, snapshot: &TimerSnapshot) {
        self.replace_ticker(None);
        info!("Nap session ended: {:?}", reason);
        let _ = self.bluetooth.send_command(&command).await;
        let _ = self.event_sender.send(AppEvent::SessionStopped(reason));
        let _ = self.event_sender.send(AppEvent::Tick(snapshot.clone()));
    }

    fn spawn_ticker(&self) -> JoinHandle<()> {
        let timer = self.timer.clone();
        let bluetooth = self.bluetooth.clone();
        let events = self.event_sender.clone();
        let period = self.tick_interval;

        tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                let (tick, snapshot) = {
                    let mut timer = timer.lock().await;
                    (timer.tick(), timer.snapshot())
                };
                match tick {
                    Tick::Idle => break,
                    Tick::Counting(_) => {
                        let _ = events.send(AppEvent::Tick(snapshot));
                    }
                    Tick::Expired(command) => {
                        info!("Nap session ended: {:?}", StopReason::Expired);
                        let _ = bluetooth.send_command(&command).await;
                        let _ = events.send(AppEvent::SessionStopped(StopReason::Expired));
                        let _ = events.send(AppEvent::Tick(snapshot));
                        break;
                    }
                }
            }
        })
    }

    fn replace_ticker(&self, next: Option<JoinHandle<()>>) {
        let mut ticker = self
            .ticker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = std::mem::replace(&mut *ticker, next) {
            previous.abort();
        }
    }
}

impl<T: BleTransport> Drop for NapController<T> {
    fn drop(&mut self) {
        self.replace_ticker(None);
    }
}

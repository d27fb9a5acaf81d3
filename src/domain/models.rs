use serde::{Deserialize, Serialize};

use crate::domain::session::SessionConfig;
use crate::domain::timer::TimerSnapshot;

/// A BLE device seen during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peripheral {
    /// Platform identifier (a UUID on macOS/Windows, a MAC address on Linux)
    pub id: String,
    /// Advertised local name
    pub name: String,
    /// Signal strength in dBm, when the platform reports it
    pub rssi: Option<i16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Why a running session left the `Running` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    Stopped,
    Cancelled,
    Expired,
}

/// Events pushed to whichever front end drives the controller.
#[derive(Debug, Clone)]
pub enum AppEvent {
    DeviceFound(Peripheral),
    ScanFinished { found: usize },
    ConnectionStatus(ConnectionStatus),
    SessionStarted(SessionConfig),
    SessionStopped(StopReason),
    Tick(TimerSnapshot),
    LogMessage(StatusMessage),
}

#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}

impl StatusMessage {
    pub fn new(message: impl Into<String>, severity: MessageSeverity) -> Self {
        Self {
            message: message.into(),
            severity,
        }
    }
}

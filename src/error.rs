//! Error types shared across the crate.
//!
//! Library code returns these typed errors; the binary wraps them in
//! `anyhow` at the edge.

use thiserror::Error;

/// Failures of the Bluetooth subsystem.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BleError {
    /// The platform refused one of the Bluetooth/location permissions.
    #[error("Bluetooth permissions were not granted")]
    PermissionDenied,

    /// No Bluetooth adapter is available on this machine.
    #[error("No Bluetooth adapter found")]
    NoAdapter,

    /// Starting or running a discovery scan failed.
    #[error("Scan failed: {0}")]
    Scan(String),

    /// A scan is already running.
    #[error("A scan is already in progress")]
    ScanInProgress,

    /// Connecting or discovering services failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// A connection attempt is already in flight.
    #[error("A connection attempt is already in progress")]
    ConnectInProgress,

    /// Another peripheral is already connected.
    #[error("Already connected to {0}")]
    AlreadyConnected(String),

    /// Writing the control characteristic failed.
    #[error("Write failed: {0}")]
    Write(String),

    /// The payload could not be encoded for the wire.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

/// Rejected session configuration changes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Total light duration cannot exceed the nap duration. ({breathing} + {wake_up} > {nap} minutes)")]
    LightDurationExceedsNap {
        breathing: u32,
        wake_up: u32,
        nap: u32,
    },

    #[error("Nap duration must be longer than the total light duration. ({nap} < {lights} minutes)")]
    NapShorterThanLights { nap: u32, lights: u64 },

    #[error("Nap duration must be at least one minute")]
    NapTooShort,

    #[error("Nap duration cannot exceed {max} minutes")]
    NapTooLong { max: u32 },

    #[error("Unknown breathing method: {0}")]
    UnknownBreathingMethod(String),

    #[error("Unknown preset: {0}")]
    UnknownPreset(String),
}

/// Loading or saving the persisted settings file.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Settings I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings format error: {0}")]
    Format(#[from] serde_json::Error),
}

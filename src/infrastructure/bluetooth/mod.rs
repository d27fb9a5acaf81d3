//! Bluetooth Module
//!
//! BLE central side of the nap lamp.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    BluetoothService                     │
//! │  (Main coordinator - public API for the application)    │
//! └──────┬──────────────┬───────────────┬──────────────┬────┘
//!        │              │               │              │
//!        ▼              ▼               ▼              ▼
//! ┌────────────┐ ┌────────────┐ ┌──────────────┐ ┌──────────┐
//! │Permissions │ │  Scanner   │ │  Connection  │ │ Encoder  │
//! │            │ │ + Registry │ │              │ │ Protocol │
//! └────────────┘ └─────┬──────┘ └──────┬───────┘ └────┬─────┘
//!                      └───────────────┼──────────────┘
//!                                      ▼
//!                               ┌─────────────┐
//!                               │ BleTransport│ (btleplug)
//!                               └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`permissions`] - Runtime permission gate
//! - [`registry`] - Deduplicated list of discovered devices
//! - [`scanner`] - Bounded, cancellable discovery scan
//! - [`connection`] - Single-device connection and service discovery
//! - [`encoder`] - Session command writes
//! - [`protocol`] - UUIDs and payload encoding
//! - [`transport`] - Platform radio seam
//! - [`service`] - Main service coordinator

pub mod btleplug_backend;
pub mod connection;
pub mod encoder;
pub mod permissions;
pub mod protocol;
pub mod registry;
pub mod scanner;
pub mod service;
pub mod transport;

#[cfg(test)]
pub(crate) mod fake;

pub use btleplug_backend::BtleplugTransport;
pub use service::BluetoothService;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Marks an operation as in flight until dropped.
pub(crate) struct InFlight(Arc<AtomicBool>);

impl InFlight {
    /// Returns `None` if the flag is already held.
    pub(crate) fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag.clone()))
    }

    pub(crate) fn is_held(flag: &AtomicBool) -> bool {
        flag.load(Ordering::Acquire)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

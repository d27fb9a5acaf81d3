//! Infrastructure layer: Bluetooth LE and logging.

pub mod bluetooth;
pub mod logging;

//! Domain layer: session configuration, countdown and persisted settings.

pub mod models;
pub mod session;
pub mod settings;
pub mod timer;

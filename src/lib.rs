//! Power nap lamp client
//!
//! Configures a nap session, runs its countdown and drives a BLE lamp that
//! plays the breathing and wake-up light sequences.

pub mod controller;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod presentation;

pub use controller::NapController;

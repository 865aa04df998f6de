//! Art-Net to uDMX bridge engine.
//!
//! Receives Art-Net DMX frames, keeps the last 512 channel values, and writes
//! only the changed channels of the configured universe to a USB uDMX
//! interface. The device connection is retried forever and resynced in full
//! after every reconnect. An optional health API observes the engine through
//! a non-blocking event relay.

pub mod artnet_listener;
pub mod bridge;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod health;
pub mod health_server;
pub mod relay;

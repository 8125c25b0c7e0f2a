//! Wi-Fi light controller driver
//!
//! Configuration handling for the `wifilight` binary. The device layers live
//! in `wifilight-transport` and `wifilight-device`.

pub mod config;

pub use config::{AppConfig, DeviceEntry};

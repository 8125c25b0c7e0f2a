//! Light controller devices
//!
//! Everything above the wire: color math, fade planning, the serialized
//! command queue and the per-device task that ties them to a connection.
//!
//! ```no_run
//! use std::sync::Arc;
//! use wifilight_device::{DeviceConfig, LightDevice, MemoryStore, Rgbw};
//! use wifilight_transport::Family;
//!
//! # async fn demo() -> Result<(), wifilight_device::DeviceError> {
//! let store = Arc::new(MemoryStore::new());
//! let device = LightDevice::spawn(DeviceConfig::new("192.168.1.40", Family::Ld382a), store)?;
//! device.set_color(Rgbw::rgb(255, 128, 0), 20).await?;
//! device.run_command("l:40, x:10").await?;
//! # Ok(())
//! # }
//! ```

pub mod color;
pub mod command;
pub mod device;
pub mod error;
pub mod fade;
pub mod queue;
pub mod registry;
pub mod store;

pub use color::{ct_scale_to_kelvin, hsv_to_rgb, kelvin_to_rgb, parse_hex_color, rgb_to_hsv, Hsv, Rgbw};
pub use command::{parse_program, LightCommand, ProgramStep};
pub use device::{DeviceConfig, DeviceSnapshot, LightDevice, DEFAULT_ON_TIMER_FOLLOWUP};
pub use error::{DeviceError, ParseError};
pub use fade::{plan_fade, FadeStep};
pub use queue::{Command, CommandQueue, DrainState, QueueOptions, Step};
pub use registry::DeviceRegistry;
pub use store::{names, MemoryStore, StateChange, StateStore};

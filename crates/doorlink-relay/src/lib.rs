//! Door-state relay.
//!
//! Sits between the lock controller (serial) and one control client (TCP),
//! keeps the authoritative door state, and records every confirmed
//! transition before acknowledging or forwarding it.
//!
//! ```no_run
//! use doorlink_channel::{SerialChannel, SerialSettings};
//! use doorlink_relay::{RelayConfig, RelayCore, RelayService};
//! use doorlink_store::{StateStore, StoreConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RelayConfig::default();
//! let store = StateStore::open(&StoreConfig::default())?;
//! let settings = SerialSettings::new("/dev/ttyACM0");
//! let device = SerialChannel::open(&settings)?;
//!
//! let service = RelayService::bind(
//!     config.clone(),
//!     RelayCore::new(config.device_id.clone(), store),
//!     Box::new(device),
//! )?;
//! service.run()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod counters;
mod error;
pub mod routing;
pub mod service;

pub use config::RelayConfig;
pub use error::{RelayError, RelayResult};
pub use routing::{Dispatch, Outgoing, Peer, RelayCore};
pub use service::{DeviceOpener, RelayHandle, RelayService};

//! Control-client side of the door relay.
//!
//! ```no_run
//! use std::time::Duration;
//! use doorlink_client::{ClientEvent, ClientOptions, DoorClient};
//!
//! # fn main() -> Result<(), doorlink_client::ClientError> {
//! let client = DoorClient::connect("127.0.0.1:8080", "laptop", ClientOptions::default())?;
//! client.lock()?;
//! while let Some(event) = client.recv_timeout(Duration::from_secs(5)) {
//!     if let ClientEvent::StateChanged(status) = event {
//!         println!("door is now {}", status.state);
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod receiver;

pub use client::{ClientOptions, DoorClient, DEFAULT_SOURCE};
pub use error::{ClientError, ClientResult};
pub use receiver::ClientEvent;

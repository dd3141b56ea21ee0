//! # Discovery
//!
//! The central type of this crate is [`Discovery`](crate::discovery::Discovery).
//! It tracks the adapters and devices that BlueZ exposes on the system bus,
//! registers A2DP media endpoints on every adapter and keeps track of the
//! audio transports that BlueZ configures through those endpoints.
//!
//! # Bus
//!
//! Everything that goes over the wire passes through the
//! [`Bus`](crate::bus::Bus) trait. [`SystemBus`](crate::bus::SystemBus)
//! implements it on a `zbus` connection and decodes incoming signals into a
//! stream for [`Discovery::run`](crate::discovery::Discovery::run), which
//! also answers the calls reaching our endpoint objects.
//!
//! # Codecs
//!
//! The capability and configuration blobs exchanged while negotiating a
//! transport are packed and unpacked by the [`codec`] module. Only SBC and
//! aptX parameters are understood; the audio bitstreams themselves are out of
//! scope.

#[macro_use]
extern crate num_derive;
#[macro_use]
extern crate thiserror;

pub use address::*;
pub use config::Config;
pub use profile::*;
pub use result::{Error, Result};

pub mod bus;
pub mod class;
pub mod codec;
pub mod discovery;

mod address;
mod config;
mod profile;
mod result;

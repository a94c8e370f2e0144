//! ICMP echo probing for pmtud.
//!
//! This crate owns everything that touches the wire:
//!
//! - [`checksum`]: the internet checksum (RFC 1071)
//! - [`packet`]: echo request framing and reply classification
//! - [`transport`]: raw ICMP sockets
//! - [`prober`]: the [`IcmpProber`] implementation of `pmtud_core::Prober`

pub mod checksum;
pub mod packet;
pub mod prober;
pub mod transport;

pub use checksum::internet_checksum;
pub use prober::{IcmpProber, IcmpProberFactory};

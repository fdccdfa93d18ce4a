#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod adapter;
pub mod addr;
pub mod buf;
pub mod chip;
pub mod config;
pub mod error;
pub mod itf;
pub mod link;
pub mod logging;
pub mod socket;

#[cfg(test)]
mod testing;

pub use adapter::{Adapter, AdapterStats, Event, ReadStatus};
pub use buf::{Packet, PacketPool, TxChain};
pub use chip::{Chip, Handle, Notification, Radio, SocketChip};
pub use config::AdapterConfig;
pub use error::{LinkError, SockError};
pub use link::{LinkEvent, LinkState};
pub use socket::{Domain, Received, Rejected, SockOpt, SockType, SocketPhase};

//! WiFi link management: radio bring-up, scanning, association and address
//! acquisition.

mod machine;
mod state;

pub(crate) use machine::ConnectionMachine;
pub use machine::SCAN_RESULTS_MAX;
pub use state::{LinkEvent, LinkState, LinkStatus};

use core::net::Ipv4Addr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    Stopped,
    Initializing,
    Scanning,
    Connecting,
    AddressPending,
    Connected,
}

impl LinkState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Initializing => "Initializing",
            Self::Scanning => "Scanning",
            Self::Connecting => "Connecting",
            Self::AddressPending => "AddressPending",
            Self::Connected => "Connected",
        }
    }
}

/// Link transitions reported to the application.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    Up { addr: Ipv4Addr, prefix_len: u8 },
    Down,
    RadioInitFailed { code: i16 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkStatus {
    pub state: LinkState,
    pub target: LinkState,
    pub address: Option<(Ipv4Addr, u8)>,
    pub events_armed: bool,
}

//! Boundary towards the WiFi co-processor.
//!
//! Commands are synchronous and only report whether the chip accepted them;
//! their outcome arrives later as a [`Notification`].

use alloc::vec::Vec;
use core::net::Ipv4Addr;

use heapless::String;

use crate::{addr::NativeAddr, error::NativeStatus};

pub const TCP_SOCK_MAX: usize = 7;
pub const UDP_SOCK_MAX: usize = 4;
pub const MAX_SOCKETS: usize = TCP_SOCK_MAX + UDP_SOCK_MAX;

pub const SSID_MAX: usize = 32;
pub const KEY_MAX: usize = 64;
pub const BSSID_LEN: usize = 6;

/// Native socket identifier, doubling as the socket table index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u8);

impl Handle {
    pub const fn new(index: u8) -> Option<Self> {
        if (index as usize) < MAX_SOCKETS {
            Some(Self(index))
        } else {
            None
        }
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn raw(self) -> u8 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketKind {
    Stream,
    Datagram,
}

impl SocketKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stream => "stream",
            Self::Datagram => "dgram",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanRegion {
    NorthAmerica,
    Europe,
    Asia,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthType {
    Open,
    WpaPsk,
    Wep,
    Enterprise,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessPoint {
    pub ssid: String<SSID_MAX>,
    pub bssid: [u8; BSSID_LEN],
    pub rssi: i8,
    pub auth: AuthType,
    pub channel: u8,
}

pub trait SocketChip {
    fn socket(&mut self, kind: SocketKind) -> Result<Handle, NativeStatus>;
    fn bind(&mut self, handle: Handle, addr: NativeAddr) -> Result<(), NativeStatus>;
    fn listen(&mut self, handle: Handle, backlog: u8) -> Result<(), NativeStatus>;
    fn connect(&mut self, handle: Handle, addr: NativeAddr) -> Result<(), NativeStatus>;
    fn send(&mut self, handle: Handle, data: &[u8]) -> Result<(), NativeStatus>;
    fn send_to(&mut self, handle: Handle, data: &[u8], addr: NativeAddr)
        -> Result<(), NativeStatus>;
    /// Asks the chip for up to `max_len` bytes; completes with [`SocketMsg::Recv`].
    fn recv(&mut self, handle: Handle, max_len: usize, timeout_ms: u32)
        -> Result<(), NativeStatus>;
    fn close(&mut self, handle: Handle);
    fn set_multicast(
        &mut self,
        handle: Handle,
        group: Ipv4Addr,
        join: bool,
    ) -> Result<(), NativeStatus>;
    /// `true` stops the chip from delivering further inbound data.
    fn set_flow_control(&mut self, paused: bool);
    /// Drains one notification the host interface has already pulled in.
    fn poll_notification(&mut self) -> Option<Notification>;
}

pub trait Radio {
    fn init(&mut self) -> Result<(), NativeStatus>;
    fn deinit(&mut self);
    fn set_scan_region(&mut self, region: ScanRegion) -> Result<(), NativeStatus>;
    fn request_scan(&mut self) -> Result<(), NativeStatus>;
    fn request_scan_result(&mut self, index: u8) -> Result<(), NativeStatus>;
    fn associate(&mut self, ssid: &str, auth: AuthType, key: &str) -> Result<(), NativeStatus>;
    fn disassociate(&mut self) -> Result<(), NativeStatus>;
}

pub trait Chip: SocketChip + Radio {}

impl<T: SocketChip + Radio> Chip for T {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    Socket { handle: Handle, msg: SocketMsg },
    Radio(RadioMsg),
}

impl Notification {
    pub const fn socket(handle: Handle, msg: SocketMsg) -> Self {
        Self::Socket { handle, msg }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketMsg {
    Bind {
        status: NativeStatus,
    },
    Listen {
        status: NativeStatus,
    },
    Accept {
        accepted: Result<Handle, NativeStatus>,
        peer: NativeAddr,
    },
    Connect {
        status: NativeStatus,
    },
    Recv(RecvMsg),
    /// `status` is the byte count on success.
    Send {
        status: NativeStatus,
    },
    SendTo {
        status: NativeStatus,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecvMsg {
    /// Delivered length, or a negative `SOCK_ERR_*` code.
    pub len: i16,
    pub remaining: u16,
    pub from: NativeAddr,
    pub data: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RecvOutcome {
    NoData,
    Data { remaining: u16 },
    Closed,
    Failed(NativeStatus),
}

impl RecvMsg {
    pub(crate) fn outcome(&self) -> RecvOutcome {
        match self.len {
            len if len == NativeStatus::TIMEOUT.0 => RecvOutcome::NoData,
            len if len > 0 => RecvOutcome::Data {
                remaining: self.remaining,
            },
            0 => RecvOutcome::Closed,
            len => RecvOutcome::Failed(NativeStatus(len)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RadioMsg {
    ScanDone { status: NativeStatus, found: u8 },
    ScanResult(AccessPoint),
    ConnectionChanged { connected: bool, reason: u8 },
    AddressAssigned { addr: Ipv4Addr, prefix_len: u8 },
}

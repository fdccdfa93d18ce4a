//! Conversion between the generic socket address and the chip's `sockaddr_in`.
//!
//! The co-processor runs an IPv4-only stack, so every other family is refused
//! at this boundary.

use core::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use crate::error::SockError;

/// Family tag the chip expects in `sin_family`.
pub const AF_INET: u16 = 2;

/// Address in the chip's layout. Port and address are kept in network byte
/// order, exactly as they travel over the host interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NativeAddr {
    pub family: u16,
    pub port_be: u16,
    pub addr_be: u32,
}

impl NativeAddr {
    pub const UNSPECIFIED: Self = Self {
        family: AF_INET,
        port_be: 0,
        addr_be: 0,
    };

    pub const fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self {
            family: AF_INET,
            port_be: port.to_be(),
            addr_be: u32::from_be_bytes(ip.octets()).to_be(),
        }
    }

    pub const fn ip(self) -> Ipv4Addr {
        let octets = u32::from_be(self.addr_be).to_be_bytes();
        Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3])
    }

    pub const fn port(self) -> u16 {
        u16::from_be(self.port_be)
    }
}

pub fn to_native(addr: SocketAddr) -> Result<NativeAddr, SockError> {
    match addr {
        SocketAddr::V4(v4) => Ok(NativeAddr::new(*v4.ip(), v4.port())),
        SocketAddr::V6(_) => Err(SockError::InvalidArgument),
    }
}

pub fn from_native(addr: NativeAddr) -> SocketAddrV4 {
    SocketAddrV4::new(addr.ip(), addr.port())
}

pub(crate) const fn unspecified() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))
}

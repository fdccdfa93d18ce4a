//! Interface enumeration. The co-processor exposes exactly one interface.

use core::net::Ipv4Addr;

use crate::error::SockError;

pub const INTERFACE_NAME: &str = "wnc";
pub const INTERFACE_INDEX: u8 = 1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InterfaceFlags(u8);

impl InterfaceFlags {
    pub const UP: Self = Self(1 << 0);
    pub const LINK: Self = Self(1 << 1);
    pub const MULTICAST: Self = Self(1 << 2);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Interface {
    pub name: &'static str,
    pub index: u8,
    pub flags: InterfaceFlags,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InterfaceAddr {
    pub addr: Ipv4Addr,
    pub prefix_len: u8,
}

pub(crate) fn interface(
    position: usize,
    address: Option<(Ipv4Addr, u8)>,
) -> Result<Interface, SockError> {
    if position != 0 {
        return Err(SockError::AddressNotAvailable);
    }
    let mut flags = InterfaceFlags::MULTICAST;
    if address.is_some() {
        flags = flags.union(InterfaceFlags::UP).union(InterfaceFlags::LINK);
    }
    Ok(Interface {
        name: INTERFACE_NAME,
        index: INTERFACE_INDEX,
        flags,
    })
}

pub(crate) fn interface_addr(
    index: u8,
    position: usize,
    address: Option<(Ipv4Addr, u8)>,
) -> Result<InterfaceAddr, SockError> {
    if index != INTERFACE_INDEX {
        return Err(SockError::InvalidArgument);
    }
    match (position, address) {
        (0, Some((addr, prefix_len))) => Ok(InterfaceAddr { addr, prefix_len }),
        _ => Err(SockError::AddressNotAvailable),
    }
}

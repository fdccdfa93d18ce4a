use alloc::collections::VecDeque;
use core::net::SocketAddrV4;

use crate::{
    buf::{Packet, TxChain},
    chip::{Handle, SocketChip, SocketKind, MAX_SOCKETS},
    error::SockError,
};

use super::lifecycle::{SocketCommand, SocketLifecycle, SocketPhase};

pub(crate) struct SocketRecord {
    pub(crate) kind: SocketKind,
    pub(crate) peer: Option<SocketAddrV4>,
    pub(crate) waiting: bool,
    pub(crate) poll: bool,
    pub(crate) peer_closed: bool,
    pub(crate) inbound: VecDeque<Packet>,
    pub(crate) pending_tx: Option<TxChain>,
    pub(crate) lifecycle: SocketLifecycle,
}

impl SocketRecord {
    fn new(kind: SocketKind) -> Self {
        Self {
            kind,
            peer: None,
            waiting: false,
            poll: false,
            peer_closed: false,
            inbound: VecDeque::new(),
            pending_tx: None,
            lifecycle: SocketLifecycle::new(),
        }
    }

    pub(crate) fn phase(&self) -> SocketPhase {
        self.lifecycle.phase()
    }

    /// Whether the receive pump should ask the chip for data on this socket.
    /// Stream sockets only carry data once the connection is up.
    pub(crate) fn awaiting_data(&self) -> bool {
        if !self.poll || self.peer_closed {
            return false;
        }
        match self.kind {
            SocketKind::Datagram => true,
            SocketKind::Stream => matches!(self.phase(), SocketPhase::Connected),
        }
    }
}

#[derive(Default)]
struct Slot {
    generation: u32,
    record: Option<SocketRecord>,
}

/// Fixed arena of socket records indexed by the chip's native handle.
pub(crate) struct SocketTable {
    slots: [Slot; MAX_SOCKETS],
}

impl SocketTable {
    pub(crate) fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| Slot::default()),
        }
    }

    pub(crate) fn allocate<C: SocketChip>(
        &mut self,
        chip: &mut C,
        kind: SocketKind,
    ) -> Result<Handle, SockError> {
        let handle = match chip.socket(kind) {
            Ok(handle) => handle,
            Err(status) => {
                log::warn!("wincnet: socket create refused kind={} code={}", kind.as_str(), status.0);
                return Err(SockError::OutOfResources);
            }
        };
        if self.slots[handle.index()].record.is_some() {
            log::error!("wincnet: chip reused open handle={}", handle.raw());
            return Err(SockError::OutOfResources);
        }
        self.open(handle, SocketRecord::new(kind));
        Ok(handle)
    }

    /// Registers a connection the chip accepted on a listening socket.
    pub(crate) fn adopt(
        &mut self,
        handle: Handle,
        kind: SocketKind,
        peer: SocketAddrV4,
    ) -> Result<(), SockError> {
        if self.slots[handle.index()].record.is_some() {
            return Err(SockError::AddressInUse);
        }
        let mut record = SocketRecord::new(kind);
        record.peer = Some(peer);
        record.lifecycle.apply(SocketCommand::Accepted);
        record.poll = true;
        self.open(handle, record);
        Ok(())
    }

    fn open(&mut self, handle: Handle, record: SocketRecord) {
        let slot = &mut self.slots[handle.index()];
        slot.generation = slot.generation.wrapping_add(1);
        slot.record = Some(record);
    }

    /// Frees the slot. Queued packets go back to the pool before the slot can
    /// be handed out again.
    pub(crate) fn release(&mut self, handle: Handle) -> Option<SocketRecord> {
        let mut record = self.slots[handle.index()].record.take()?;
        record.inbound.clear();
        record.pending_tx = None;
        record.lifecycle.apply(SocketCommand::Close);
        Some(record)
    }

    pub(crate) fn get(&self, handle: Handle) -> Result<&SocketRecord, SockError> {
        self.slots
            .get(handle.index())
            .and_then(|slot| slot.record.as_ref())
            .ok_or(SockError::InvalidArgument)
    }

    pub(crate) fn get_mut(&mut self, handle: Handle) -> Result<&mut SocketRecord, SockError> {
        self.slots
            .get_mut(handle.index())
            .and_then(|slot| slot.record.as_mut())
            .ok_or(SockError::InvalidArgument)
    }

    pub(crate) fn generation(&self, handle: Handle) -> u32 {
        self.slots[handle.index()].generation
    }

    pub(crate) fn is_current(&self, handle: Handle, generation: u32) -> bool {
        let slot = &self.slots[handle.index()];
        slot.record.is_some() && slot.generation == generation
    }

    /// First socket at or after `start` waiting for inbound data.
    pub(crate) fn next_awaiting(&self, start: usize) -> Option<Handle> {
        self.slots
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, slot)| slot.record.as_ref().is_some_and(SocketRecord::awaiting_data))
            .and_then(|(index, _)| Handle::new(index as u8))
    }
}

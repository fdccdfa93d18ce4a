//! Packet buffers.
//!
//! Inbound data lands in [`Packet`]s leased from a fixed-budget [`PacketPool`];
//! the lease returns to the pool when the application drops the packet. Running
//! out of leases is what drives flow control towards the chip.

use alloc::{collections::VecDeque, vec::Vec};
use core::{
    net::SocketAddrV4,
    sync::atomic::{AtomicUsize, Ordering},
};

pub struct PacketPool {
    available: AtomicUsize,
}

impl PacketPool {
    pub const fn new(packets: usize) -> Self {
        Self {
            available: AtomicUsize::new(packets),
        }
    }

    pub fn available(&self) -> usize {
        self.available.load(Ordering::Acquire)
    }

    pub fn try_alloc(&'static self, capacity: usize) -> Option<Packet> {
        self.available
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |free| free.checked_sub(1))
            .ok()?;
        Some(Packet {
            data: Vec::with_capacity(capacity),
            capacity,
            source: None,
            lease: Lease(self),
        })
    }
}

struct Lease(&'static PacketPool);

impl Drop for Lease {
    fn drop(&mut self) {
        self.0.available.fetch_add(1, Ordering::AcqRel);
    }
}

pub struct Packet {
    data: Vec<u8>,
    capacity: usize,
    source: Option<SocketAddrV4>,
    #[allow(dead_code)]
    lease: Lease,
}

impl Packet {
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Sender stamped by the receive pump for datagram sockets.
    pub fn source(&self) -> Option<SocketAddrV4> {
        self.source
    }

    pub(crate) fn room(&self) -> usize {
        self.capacity.saturating_sub(self.data.len())
    }

    /// Appends as much of `bytes` as fits; returns the number of bytes taken.
    pub(crate) fn append(&mut self, bytes: &[u8]) -> usize {
        let take = bytes.len().min(self.room());
        self.data.extend_from_slice(&bytes[..take]);
        take
    }

    pub(crate) fn stamp_source(&mut self, source: SocketAddrV4) {
        self.source = Some(source);
    }

    pub(crate) fn reset(&mut self) {
        self.data.clear();
        self.source = None;
    }
}

impl core::fmt::Debug for Packet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Packet")
            .field("len", &self.data.len())
            .field("capacity", &self.capacity)
            .field("source", &self.source)
            .finish()
    }
}

/// Outbound data as a chain of segments. Stream sockets hand one segment per
/// native send to the chip.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxChain {
    segments: VecDeque<Vec<u8>>,
}

impl TxChain {
    pub const fn new() -> Self {
        Self {
            segments: VecDeque::new(),
        }
    }

    /// Splits `data` into segments of at most `segment` bytes.
    pub fn from_slice(data: &[u8], segment: usize) -> Self {
        let mut chain = Self::new();
        for chunk in data.chunks(segment.max(1)) {
            chain.push(chunk.to_vec());
        }
        chain
    }

    pub fn push(&mut self, segment: Vec<u8>) {
        if !segment.is_empty() {
            self.segments.push_back(segment);
        }
    }

    pub fn len(&self) -> usize {
        self.segments.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> impl Iterator<Item = &[u8]> {
        self.segments.iter().map(Vec::as_slice)
    }

    pub(crate) fn front(&self) -> Option<&[u8]> {
        self.segments.front().map(Vec::as_slice)
    }

    /// Drops `sent` bytes from the head segment.
    pub(crate) fn advance(&mut self, sent: usize) {
        let Some(front) = self.segments.front_mut() else {
            return;
        };
        if sent >= front.len() {
            self.segments.pop_front();
        } else {
            front.drain(..sent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropping_packet_returns_lease() {
        static POOL: PacketPool = PacketPool::new(1);
        let packet = POOL.try_alloc(64).unwrap();
        assert_eq!(POOL.available(), 0);
        assert!(POOL.try_alloc(64).is_none());
        drop(packet);
        assert_eq!(POOL.available(), 1);
    }

    #[test]
    fn append_stops_at_capacity() {
        static POOL: PacketPool = PacketPool::new(1);
        let mut packet = POOL.try_alloc(4).unwrap();
        assert_eq!(packet.append(b"abc"), 3);
        assert_eq!(packet.append(b"def"), 1);
        assert_eq!(packet.as_slice(), b"abcd");
        assert_eq!(packet.room(), 0);
    }

    #[test]
    fn chain_splits_and_skips_empty_segments() {
        let mut chain = TxChain::from_slice(&[7u8; 10], 4);
        chain.push(Vec::new());
        let lens: Vec<usize> = chain.segments().map(<[u8]>::len).collect();
        assert_eq!(lens, [4, 4, 2]);
        assert_eq!(chain.len(), 10);
    }

    #[test]
    fn advance_trims_partial_head() {
        let mut chain = TxChain::from_slice(b"abcdef", 4);
        chain.advance(3);
        assert_eq!(chain.front(), Some(&b"d"[..]));
        chain.advance(1);
        assert_eq!(chain.front(), Some(&b"ef"[..]));
        chain.advance(2);
        assert!(chain.is_empty());
    }
}

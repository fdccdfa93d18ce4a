//! Receive pump: rotates one outstanding native receive across the sockets
//! that wait for data and hands finished packets to their inbound queues.

use crate::{
    adapter::{Adapter, Event, Inner, ReadStatus},
    addr,
    buf::Packet,
    chip::{Chip, Handle, RecvMsg, RecvOutcome, SocketKind},
    error::{NativeStatus, SockError},
};

pub(crate) struct RxState {
    /// Packet being assembled; reused across sockets until it carries data.
    pub(crate) packet: Option<Packet>,
    /// Socket (and its generation) the bytes in `packet` belong to.
    pub(crate) owner: Option<(Handle, u32)>,
    pub(crate) cursor: Option<(Handle, u32)>,
    pub(crate) polling: bool,
    pub(crate) flow_paused: bool,
}

impl RxState {
    pub(crate) const fn new() -> Self {
        Self {
            packet: None,
            owner: None,
            cursor: None,
            polling: false,
            flow_paused: false,
        }
    }

    pub(crate) fn drop_partial(&mut self) {
        if let Some(packet) = self.packet.as_mut() {
            packet.reset();
        }
        self.owner = None;
    }
}

impl<C: Chip> Adapter<C> {
    /// Issues a receive for the first socket at or after `start` that waits
    /// for data. Pauses the chip instead when no packet can be leased.
    ///
    /// A partial packet never crosses sockets: before another socket is polled
    /// it is handed to its owner.
    pub(crate) fn poll_next(&self, inner: &mut Inner<C>, start: usize) {
        inner.rx.polling = false;
        inner.rx.cursor = None;
        if !self.lease_packet(inner) {
            return;
        }
        let mut start = start;
        while let Some(handle) = inner.table.next_awaiting(start) {
            let generation = inner.table.generation(handle);
            if inner.rx.owner.is_some_and(|owner| owner != (handle, generation)) {
                self.settle_partial(inner);
                if !self.lease_packet(inner) {
                    return;
                }
            }
            let room = inner.rx.packet.as_ref().map_or(0, Packet::room);
            match inner
                .chip
                .recv(handle, room, inner.config.recv_timeout_ms)
            {
                Ok(()) => {
                    inner.rx.cursor = Some((handle, generation));
                    inner.rx.polling = true;
                    return;
                }
                Err(status) => {
                    log::warn!("wincnet: recv refused handle={} code={}", handle.raw(), status.0);
                    start = handle.index() + 1;
                }
            }
        }
    }

    /// Makes sure a packet is in flight, toggling flow control on the way.
    fn lease_packet(&self, inner: &mut Inner<C>) -> bool {
        if inner.rx.packet.is_none() {
            match inner.pool.try_alloc(inner.config.rx_packet_size) {
                Some(packet) => inner.rx.packet = Some(packet),
                None => {
                    if !inner.rx.flow_paused {
                        log::debug!("wincnet: rx pool empty, pausing chip");
                        inner.chip.set_flow_control(true);
                        inner.rx.flow_paused = true;
                        inner.stats.flow_pauses = inner.stats.flow_pauses.saturating_add(1);
                    }
                    return false;
                }
            }
        }
        if inner.rx.flow_paused {
            log::debug!("wincnet: rx pool refilled, resuming chip");
            inner.chip.set_flow_control(false);
            inner.rx.flow_paused = false;
        }
        true
    }

    /// Delivers a partial packet to the socket it was read from, or drops it
    /// when that socket is gone.
    fn settle_partial(&self, inner: &mut Inner<C>) {
        let Some((owner, generation)) = inner.rx.owner else {
            return;
        };
        if inner.table.is_current(owner, generation) {
            self.finish_packet(inner, owner);
        } else {
            log::debug!("wincnet: rx partial dropped handle={}", owner.raw());
            inner.rx.drop_partial();
        }
    }

    /// Kicks the pump when nothing is outstanding.
    pub(crate) fn pump_idle(&self, inner: &mut Inner<C>) {
        if !inner.rx.polling {
            self.poll_next(inner, 0);
        }
    }

    pub(crate) fn on_recv(&self, inner: &mut Inner<C>, handle: Handle, msg: RecvMsg) {
        let outstanding = if inner.rx.polling { inner.rx.cursor } else { None };
        let Some((_, generation)) = outstanding.filter(|(polled, _)| *polled == handle) else {
            self.discard(inner, handle, "unsolicited");
            self.pump_idle(inner);
            return;
        };
        let next = handle.index() + 1;
        if !inner.table.is_current(handle, generation) {
            inner.rx.drop_partial();
            self.discard(inner, handle, "closed");
            self.poll_next(inner, next);
            return;
        }

        match msg.outcome() {
            RecvOutcome::NoData => {
                self.settle_partial(inner);
                self.poll_next(inner, next);
            }
            RecvOutcome::Data { remaining } => {
                let Some(packet) = inner.rx.packet.as_mut() else {
                    self.poll_next(inner, next);
                    return;
                };
                let first = packet.is_empty();
                let len = usize::from(msg.len.unsigned_abs()).min(msg.data.len());
                let taken = packet.append(&msg.data[..len]);
                if taken < len {
                    log::warn!(
                        "wincnet: rx overrun handle={} dropped={}",
                        handle.raw(),
                        len - taken
                    );
                }
                let kind = inner.table.get(handle).map(|record| record.kind);
                if first && kind == Ok(SocketKind::Datagram) {
                    packet.stamp_source(addr::from_native(msg.from));
                }
                let room = packet.room();
                inner.rx.owner = Some((handle, generation));
                if remaining > 0 && room > 0 {
                    self.poll_next(inner, handle.index());
                    return;
                }
                self.finish_packet(inner, handle);
                // A full packet with bytes still queued on the chip keeps
                // reading the same socket.
                let resume = if remaining > 0 { handle.index() } else { next };
                self.poll_next(inner, resume);
            }
            RecvOutcome::Closed => {
                self.end_stream(inner, handle, NativeStatus::CONN_ABORTED, ReadStatus::EndOfStream);
                self.poll_next(inner, next);
            }
            RecvOutcome::Failed(status) => {
                let err = SockError::from_failure(status);
                self.end_stream(inner, handle, status, ReadStatus::Error(err));
                self.poll_next(inner, next);
            }
        }
    }

    fn finish_packet(&self, inner: &mut Inner<C>, handle: Handle) {
        inner.rx.owner = None;
        let Some(packet) = inner.rx.packet.take() else {
            return;
        };
        let len = packet.len();
        let Ok(record) = inner.table.get_mut(handle) else {
            return;
        };
        record.inbound.push_back(packet);
        inner.stats.rx_packets = inner.stats.rx_packets.saturating_add(1);
        inner.stats.rx_bytes = inner.stats.rx_bytes.saturating_add(len as u32);
        log::trace!("wincnet: rx handle={} len={}", handle.raw(), len);
        self.emit(
            inner,
            Event::Readable {
                handle,
                status: ReadStatus::Data,
            },
        );
    }

    fn end_stream(&self, inner: &mut Inner<C>, handle: Handle, status: NativeStatus, read: ReadStatus) {
        inner.rx.drop_partial();
        let Ok(record) = inner.table.get_mut(handle) else {
            return;
        };
        record.peer_closed = true;
        record.poll = false;
        if record.waiting {
            self.completions[handle.index()].signal(status);
        }
        log::debug!("wincnet: rx end handle={} status={:?}", handle.raw(), read);
        self.emit(inner, Event::Readable { handle, status: read });
    }

    fn discard(&self, inner: &mut Inner<C>, handle: Handle, why: &str) {
        inner.stats.discarded_notifications = inner.stats.discarded_notifications.saturating_add(1);
        log::debug!("wincnet: rx completion discarded handle={} reason={}", handle.raw(), why);
    }
}

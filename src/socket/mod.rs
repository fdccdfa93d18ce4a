//! Socket operations on top of the chip's native sockets.
//!
//! Bind and listen look synchronous to the caller: the native command is
//! issued under the adapter lock and the caller then parks until the matching
//! notification arrives. Everything else returns as soon as the chip accepted
//! the command and reports completion through [`Event`]s.

pub(crate) mod bridge;
pub(crate) mod lifecycle;
pub(crate) mod pump;
pub(crate) mod table;

use core::net::{IpAddr, SocketAddr};

use crate::{
    adapter::{Adapter, Event, Inner},
    addr::{self, NativeAddr},
    buf::{Packet, TxChain},
    chip::{Chip, Handle, SocketKind, SocketMsg},
    config::STREAM_SEGMENT_MAX,
    error::{NativeStatus, SockError},
};

use self::lifecycle::SocketCommand;

pub use self::lifecycle::SocketPhase;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Domain {
    Inet,
    Inet6,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SockType {
    Stream,
    Datagram,
    Raw,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SockOpt {
    JoinGroup(IpAddr),
    LeaveGroup(IpAddr),
    /// Interface selection for outgoing multicast; the chip has one.
    MulticastInterface(u8),
    Other { level: u16, name: u16 },
}

/// A failed send hands the caller's data back.
#[derive(Debug, PartialEq, Eq)]
pub struct Rejected {
    pub error: SockError,
    pub chain: TxChain,
}

#[derive(Debug)]
pub struct Received {
    pub packet: Packet,
    pub from: SocketAddr,
}

enum Drain {
    Done,
    Blocked,
    Failed(SockError),
}

impl<C: Chip> Adapter<C> {
    pub async fn create(&self, domain: Domain, ty: SockType) -> Result<Handle, SockError> {
        if domain != Domain::Inet {
            return Err(SockError::AddressFamilyNotSupported);
        }
        let kind = match ty {
            SockType::Stream => SocketKind::Stream,
            SockType::Datagram => SocketKind::Datagram,
            SockType::Raw => return Err(SockError::ProtocolNotSupported),
        };
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let handle = inner.table.allocate(&mut inner.chip, kind)?;
        log::debug!("wincnet: socket open handle={} kind={}", handle.raw(), kind.as_str());
        Ok(handle)
    }

    /// Always succeeds; closing a free handle does nothing.
    pub async fn close(&self, handle: Handle) {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let Some(record) = inner.table.release(handle) else {
            return;
        };
        inner.chip.close(handle);
        if inner.rx.cursor.is_some_and(|(polled, _)| polled == handle) {
            inner.rx.cursor = None;
            inner.rx.polling = false;
        }
        if inner.rx.owner.is_some_and(|(owner, _)| owner == handle) {
            inner.rx.drop_partial();
        }
        if record.waiting {
            self.completions[handle.index()].signal(NativeStatus::CONN_ABORTED);
        }
        log::debug!("wincnet: socket closed handle={}", handle.raw());
    }

    pub async fn bind(&self, handle: Handle, local: SocketAddr) -> Result<(), SockError> {
        let native = addr::to_native(local)?;
        let mut guard = self.inner.lock().await;
        let timeout = guard.config.bind_timeout();
        guard = self.begin_sync(guard, handle, SocketCommand::Bind, |chip| {
            chip.bind(handle, native)
        })?;
        let (mut guard, result) = self.wait_completion(guard, handle, timeout).await;
        if result.is_err() {
            self.revert(&mut guard, handle, SocketCommand::BindDone { ok: false });
        }
        result
    }

    pub async fn listen(&self, handle: Handle, backlog: u8) -> Result<(), SockError> {
        let mut guard = self.inner.lock().await;
        if guard.table.get(handle)?.kind != SocketKind::Stream {
            return Err(SockError::InvalidArgument);
        }
        let timeout = guard.config.listen_timeout();
        guard = self.begin_sync(guard, handle, SocketCommand::Listen, |chip| {
            chip.listen(handle, backlog)
        })?;
        let (mut guard, result) = self.wait_completion(guard, handle, timeout).await;
        if result.is_err() {
            self.revert(&mut guard, handle, SocketCommand::ListenDone { ok: false });
        }
        result
    }

    /// Checks exclusivity, moves the lifecycle and issues the native command.
    fn begin_sync<'a>(
        &'a self,
        mut guard: bridge::Guard<'a, C>,
        handle: Handle,
        command: SocketCommand,
        issue: impl FnOnce(&mut C) -> Result<(), NativeStatus>,
    ) -> Result<bridge::Guard<'a, C>, SockError> {
        let inner = &mut *guard;
        let record = inner.table.get_mut(handle)?;
        if record.waiting {
            return Err(SockError::Again);
        }
        if record.lifecycle.apply(command).rejected() {
            return Err(SockError::InvalidArgument);
        }
        self.arm_completion(handle);
        if let Err(status) = issue(&mut inner.chip) {
            let undo = match command {
                SocketCommand::Listen => SocketCommand::ListenDone { ok: false },
                _ => SocketCommand::BindDone { ok: false },
            };
            self.revert(inner, handle, undo);
            return Err(SockError::from_failure(status));
        }
        Ok(guard)
    }

    fn revert(&self, inner: &mut Inner<C>, handle: Handle, command: SocketCommand) {
        if let Ok(record) = inner.table.get_mut(handle) {
            record.lifecycle.apply(command);
        }
    }

    /// Stream sockets complete with [`Event::Writable`]. Datagram sockets
    /// only remember the peer and report `InvalidArgument`.
    pub async fn connect(&self, handle: Handle, remote: SocketAddr) -> Result<(), SockError> {
        let native = addr::to_native(remote)?;
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let record = inner.table.get_mut(handle)?;
        if record.kind == SocketKind::Datagram {
            record.peer = Some(addr::from_native(native));
            record.poll = true;
            return Err(SockError::InvalidArgument);
        }
        if record.lifecycle.apply(SocketCommand::Connect).rejected() {
            return Err(SockError::InvalidArgument);
        }
        record.peer = Some(addr::from_native(native));
        record.poll = true;
        if let Err(status) = inner.chip.connect(handle, native) {
            self.revert(inner, handle, SocketCommand::ConnectDone { ok: false });
            return Err(SockError::from_failure(status));
        }
        log::debug!("wincnet: connect handle={} remote={}", handle.raw(), remote);
        Ok(())
    }

    /// Datagram sockets need `dest`; stream sockets must not get one.
    pub async fn send(
        &self,
        handle: Handle,
        chain: TxChain,
        dest: Option<SocketAddr>,
    ) -> Result<(), Rejected> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let kind = match inner.table.get(handle) {
            Ok(record) => record.kind,
            Err(error) => return Err(Rejected { error, chain }),
        };
        match kind {
            SocketKind::Datagram => Self::send_datagram(inner, handle, chain, dest),
            SocketKind::Stream => Self::send_stream(inner, handle, chain, dest),
        }
    }

    fn send_datagram(
        inner: &mut Inner<C>,
        handle: Handle,
        chain: TxChain,
        dest: Option<SocketAddr>,
    ) -> Result<(), Rejected> {
        let Some(dest) = dest else {
            return Err(Rejected {
                error: SockError::DestinationRequired,
                chain,
            });
        };
        let native = match addr::to_native(dest) {
            Ok(native) => native,
            Err(error) => return Err(Rejected { error, chain }),
        };
        if chain.len() > inner.config.max_datagram {
            log::debug!(
                "wincnet: datagram too large handle={} len={} max={}",
                handle.raw(),
                chain.len(),
                inner.config.max_datagram
            );
            return Err(Rejected {
                error: SockError::InvalidArgument,
                chain,
            });
        }
        inner.tx_scratch.clear();
        let scratch = &mut inner.tx_scratch;
        let fits = chain
            .segments()
            .all(|segment| scratch.extend_from_slice(segment).is_ok());
        if !fits {
            return Err(Rejected {
                error: SockError::InvalidArgument,
                chain,
            });
        }
        match inner.chip.send_to(handle, &inner.tx_scratch, native) {
            Ok(()) => Ok(()),
            Err(status) => Err(Rejected {
                error: SockError::from_failure(status),
                chain,
            }),
        }
    }

    fn send_stream(
        inner: &mut Inner<C>,
        handle: Handle,
        mut chain: TxChain,
        dest: Option<SocketAddr>,
    ) -> Result<(), Rejected> {
        let Inner { chip, table, .. } = &mut *inner;
        let record = match table.get_mut(handle) {
            Ok(record) => record,
            Err(error) => return Err(Rejected { error, chain }),
        };
        let error = if dest.is_some() || record.phase() != SocketPhase::Connected {
            Some(SockError::InvalidArgument)
        } else if record.peer_closed {
            Some(SockError::ConnectionAborted)
        } else if record.pending_tx.is_some() {
            Some(SockError::Again)
        } else {
            None
        };
        if let Some(error) = error {
            return Err(Rejected { error, chain });
        }
        if chain.is_empty() {
            return Ok(());
        }
        match drain(chip, handle, &mut chain) {
            Drain::Done => Ok(()),
            Drain::Blocked => {
                record.pending_tx = Some(chain);
                Ok(())
            }
            Drain::Failed(error) => Err(Rejected { error, chain }),
        }
    }

    /// Pops the oldest inbound packet; `Again` when none is queued.
    pub async fn recv(&self, handle: Handle) -> Result<Received, SockError> {
        let mut guard = self.inner.lock().await;
        let record = guard.table.get_mut(handle)?;
        let packet = record.inbound.pop_front().ok_or(SockError::Again)?;
        let from = packet
            .source()
            .or(record.peer)
            .map_or_else(addr::unspecified, SocketAddr::V4);
        Ok(Received { packet, from })
    }

    pub async fn getpeername(&self, handle: Handle) -> Result<SocketAddr, SockError> {
        let guard = self.inner.lock().await;
        let record = guard.table.get(handle)?;
        Ok(record.peer.map_or_else(addr::unspecified, SocketAddr::V4))
    }

    pub async fn setsockopt(&self, handle: Handle, opt: SockOpt) -> Result<(), SockError> {
        let (group, join) = match opt {
            SockOpt::JoinGroup(group) => (group, true),
            SockOpt::LeaveGroup(group) => (group, false),
            SockOpt::MulticastInterface(_) => return Ok(()),
            SockOpt::Other { .. } => return Err(SockError::ProtocolNotSupported),
        };
        let IpAddr::V4(group) = group else {
            return Err(SockError::InvalidArgument);
        };
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        inner.table.get(handle)?;
        inner
            .chip
            .set_multicast(handle, group, join)
            .map_err(SockError::from_failure)
    }

    pub async fn is_peer_closed(&self, handle: Handle) -> Result<bool, SockError> {
        Ok(self.inner.lock().await.table.get(handle)?.peer_closed)
    }

    pub async fn pending_rx(&self, handle: Handle) -> Result<usize, SockError> {
        Ok(self.inner.lock().await.table.get(handle)?.inbound.len())
    }

    pub async fn phase(&self, handle: Handle) -> Result<SocketPhase, SockError> {
        Ok(self.inner.lock().await.table.get(handle)?.phase())
    }

    pub(crate) fn on_socket_msg(&self, inner: &mut Inner<C>, handle: Handle, msg: SocketMsg) {
        match msg {
            SocketMsg::Bind { status } => {
                self.complete_sync(inner, handle, SocketCommand::BindDone { ok: status.is_ok() }, status)
            }
            SocketMsg::Listen { status } => self.complete_sync(
                inner,
                handle,
                SocketCommand::ListenDone { ok: status.is_ok() },
                status,
            ),
            SocketMsg::Accept { accepted, peer } => self.on_accept(inner, handle, accepted, peer),
            SocketMsg::Connect { status } => self.on_connect(inner, handle, status),
            SocketMsg::Recv(msg) => self.on_recv(inner, handle, msg),
            SocketMsg::Send { status } => self.on_send(inner, handle, status),
            SocketMsg::SendTo { status } => {
                if status.0 < 0 {
                    log::debug!("wincnet: sendto failed handle={} code={}", handle.raw(), status.0);
                }
            }
        }
    }

    fn complete_sync(
        &self,
        inner: &mut Inner<C>,
        handle: Handle,
        command: SocketCommand,
        status: NativeStatus,
    ) {
        let Ok(record) = inner.table.get_mut(handle) else {
            inner.stats.discarded_notifications =
                inner.stats.discarded_notifications.saturating_add(1);
            return;
        };
        let result = record.lifecycle.apply(command);
        if result.rejected() {
            log::debug!(
                "wincnet: late completion ignored handle={} phase={}",
                handle.raw(),
                result.before.as_str()
            );
            return;
        }
        let start_polling =
            result.after == SocketPhase::Bound && record.kind == SocketKind::Datagram;
        if start_polling {
            record.poll = true;
        }
        self.wake(inner, handle, status);
        if start_polling {
            self.pump_idle(inner);
        }
    }

    fn on_accept(
        &self,
        inner: &mut Inner<C>,
        listener: Handle,
        accepted: Result<Handle, NativeStatus>,
        peer: NativeAddr,
    ) {
        let child = match accepted {
            Ok(child) => child,
            Err(status) => {
                log::warn!("wincnet: accept failed listener={} code={}", listener.raw(), status.0);
                return;
            }
        };
        let kind = match inner.table.get(listener) {
            Ok(record) if record.phase() == SocketPhase::Listening => record.kind,
            _ => {
                log::warn!("wincnet: accept without listener handle={}", listener.raw());
                inner.chip.close(child);
                return;
            }
        };
        if let Err(err) = inner.table.adopt(child, kind, addr::from_native(peer)) {
            log::warn!("wincnet: accept slot busy handle={} err={}", child.raw(), err);
            inner.chip.close(child);
            return;
        }
        let delivered = self.emit(
            inner,
            Event::NewConnection {
                listener,
                handle: child,
            },
        );
        if !delivered {
            inner.table.release(child);
            inner.chip.close(child);
            return;
        }
        log::debug!(
            "wincnet: accepted handle={} listener={} peer={}",
            child.raw(),
            listener.raw(),
            addr::from_native(peer)
        );
        self.pump_idle(inner);
    }

    fn on_connect(&self, inner: &mut Inner<C>, handle: Handle, status: NativeStatus) {
        let Ok(record) = inner.table.get_mut(handle) else {
            inner.stats.discarded_notifications =
                inner.stats.discarded_notifications.saturating_add(1);
            return;
        };
        if record
            .lifecycle
            .apply(SocketCommand::ConnectDone { ok: status.is_ok() })
            .rejected()
        {
            return;
        }
        self.emit(
            inner,
            Event::Writable {
                handle,
                status: status.into_result(),
            },
        );
        if status.is_ok() {
            self.pump_idle(inner);
        }
    }

    fn on_send(&self, inner: &mut Inner<C>, handle: Handle, status: NativeStatus) {
        let Inner { chip, table, .. } = &mut *inner;
        let Ok(record) = table.get_mut(handle) else {
            return;
        };
        let Some(mut chain) = record.pending_tx.take() else {
            return;
        };
        let outcome = if status.0 < 0 {
            Drain::Failed(SockError::from_failure(status))
        } else {
            drain(chip, handle, &mut chain)
        };
        let status = match outcome {
            Drain::Blocked => {
                record.pending_tx = Some(chain);
                return;
            }
            Drain::Done => Ok(()),
            Drain::Failed(err) => {
                log::warn!("wincnet: stream send failed handle={} err={}", handle.raw(), err);
                Err(err)
            }
        };
        self.emit(inner, Event::Writable { handle, status });
    }
}

/// Offers segments until the chip reports its buffer full.
fn drain<C: Chip>(chip: &mut C, handle: Handle, chain: &mut TxChain) -> Drain {
    while let Some(segment) = chain.front() {
        let take = segment.len().min(STREAM_SEGMENT_MAX);
        match chip.send(handle, &segment[..take]) {
            Ok(()) => chain.advance(take),
            Err(NativeStatus::BUFFER_FULL) => return Drain::Blocked,
            Err(status) => return Drain::Failed(SockError::from_failure(status)),
        }
    }
    Drain::Done
}

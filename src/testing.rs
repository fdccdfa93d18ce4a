//! Scripted chip used by the host tests.

use alloc::{collections::VecDeque, string::String, vec::Vec};
use core::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use embassy_futures::{join::join, yield_now};
use heapless::String as BoundedString;

use crate::{
    adapter::{Adapter, Event},
    addr::NativeAddr,
    buf::PacketPool,
    chip::{
        AccessPoint, AuthType, Handle, Notification, Radio, RecvMsg, ScanRegion, SocketChip,
        SocketKind, SocketMsg, MAX_SOCKETS, TCP_SOCK_MAX,
    },
    config::AdapterConfig,
    error::NativeStatus,
    socket::{Domain, SockType},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Call {
    Socket(SocketKind),
    Bind(Handle, NativeAddr),
    Listen(Handle, u8),
    Connect(Handle, NativeAddr),
    Send(Handle, Vec<u8>),
    SendTo(Handle, Vec<u8>, NativeAddr),
    Recv(Handle, usize),
    Close(Handle),
    Multicast(Handle, Ipv4Addr, bool),
    FlowControl(bool),
    Init,
    Deinit,
    ScanRegion(ScanRegion),
    Scan,
    ScanResult(u8),
    Associate(String, AuthType),
    Disassociate,
}

pub(crate) struct MockChip {
    pub(crate) calls: Vec<Call>,
    pub(crate) open: [bool; MAX_SOCKETS],
    pub(crate) socket_result: Option<NativeStatus>,
    pub(crate) bind_result: Result<(), NativeStatus>,
    pub(crate) recv_result: Result<(), NativeStatus>,
    pub(crate) send_to_result: Result<(), NativeStatus>,
    /// Stream segments accepted before the chip reports buffer-full.
    pub(crate) send_budget: usize,
    pub(crate) init_result: Result<(), NativeStatus>,
    pub(crate) scan_result: Result<(), NativeStatus>,
    pub(crate) associate_result: Result<(), NativeStatus>,
    pub(crate) inbox: VecDeque<Notification>,
}

impl MockChip {
    pub(crate) fn new() -> Self {
        Self {
            calls: Vec::new(),
            open: [false; MAX_SOCKETS],
            socket_result: None,
            bind_result: Ok(()),
            recv_result: Ok(()),
            send_to_result: Ok(()),
            send_budget: usize::MAX,
            init_result: Ok(()),
            scan_result: Ok(()),
            associate_result: Ok(()),
            inbox: VecDeque::new(),
        }
    }

    pub(crate) fn recv_calls(&self) -> Vec<Handle> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Recv(handle, _) => Some(*handle),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn count(&self, wanted: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|call| wanted(call)).count()
    }
}

impl SocketChip for MockChip {
    fn socket(&mut self, kind: SocketKind) -> Result<Handle, NativeStatus> {
        self.calls.push(Call::Socket(kind));
        if let Some(status) = self.socket_result {
            return Err(status);
        }
        let mut range = match kind {
            SocketKind::Stream => 0..TCP_SOCK_MAX,
            SocketKind::Datagram => TCP_SOCK_MAX..MAX_SOCKETS,
        };
        let index = range.find(|&index| !self.open[index]).ok_or(match kind {
            SocketKind::Stream => NativeStatus::MAX_TCP_SOCK,
            SocketKind::Datagram => NativeStatus::MAX_UDP_SOCK,
        })?;
        self.open[index] = true;
        Handle::new(index as u8).ok_or(NativeStatus::INVALID)
    }

    fn bind(&mut self, handle: Handle, addr: NativeAddr) -> Result<(), NativeStatus> {
        self.calls.push(Call::Bind(handle, addr));
        self.bind_result
    }

    fn listen(&mut self, handle: Handle, backlog: u8) -> Result<(), NativeStatus> {
        self.calls.push(Call::Listen(handle, backlog));
        Ok(())
    }

    fn connect(&mut self, handle: Handle, addr: NativeAddr) -> Result<(), NativeStatus> {
        self.calls.push(Call::Connect(handle, addr));
        Ok(())
    }

    fn send(&mut self, handle: Handle, data: &[u8]) -> Result<(), NativeStatus> {
        if self.send_budget == 0 {
            return Err(NativeStatus::BUFFER_FULL);
        }
        self.send_budget -= 1;
        self.calls.push(Call::Send(handle, data.to_vec()));
        Ok(())
    }

    fn send_to(&mut self, handle: Handle, data: &[u8], addr: NativeAddr) -> Result<(), NativeStatus> {
        self.calls.push(Call::SendTo(handle, data.to_vec(), addr));
        self.send_to_result
    }

    fn recv(&mut self, handle: Handle, max_len: usize, _timeout_ms: u32) -> Result<(), NativeStatus> {
        self.calls.push(Call::Recv(handle, max_len));
        self.recv_result
    }

    fn close(&mut self, handle: Handle) {
        self.calls.push(Call::Close(handle));
        self.open[handle.index()] = false;
    }

    fn set_multicast(
        &mut self,
        handle: Handle,
        group: Ipv4Addr,
        join: bool,
    ) -> Result<(), NativeStatus> {
        self.calls.push(Call::Multicast(handle, group, join));
        Ok(())
    }

    fn set_flow_control(&mut self, paused: bool) {
        self.calls.push(Call::FlowControl(paused));
    }

    fn poll_notification(&mut self) -> Option<Notification> {
        self.inbox.pop_front()
    }
}

impl Radio for MockChip {
    fn init(&mut self) -> Result<(), NativeStatus> {
        self.calls.push(Call::Init);
        self.init_result
    }

    fn deinit(&mut self) {
        self.calls.push(Call::Deinit);
    }

    fn set_scan_region(&mut self, region: ScanRegion) -> Result<(), NativeStatus> {
        self.calls.push(Call::ScanRegion(region));
        Ok(())
    }

    fn request_scan(&mut self) -> Result<(), NativeStatus> {
        self.calls.push(Call::Scan);
        self.scan_result
    }

    fn request_scan_result(&mut self, index: u8) -> Result<(), NativeStatus> {
        self.calls.push(Call::ScanResult(index));
        Ok(())
    }

    fn associate(&mut self, ssid: &str, auth: AuthType, _key: &str) -> Result<(), NativeStatus> {
        self.calls.push(Call::Associate(String::from(ssid), auth));
        self.associate_result
    }

    fn disassociate(&mut self) -> Result<(), NativeStatus> {
        self.calls.push(Call::Disassociate);
        Ok(())
    }
}

pub(crate) fn access_point(ssid: &str, auth: AuthType) -> AccessPoint {
    AccessPoint {
        ssid: BoundedString::try_from(ssid).unwrap(),
        bssid: [0x02, 0, 0, 0, 0, 1],
        rssi: -52,
        auth,
        channel: 6,
    }
}

pub(crate) fn v4(a: u8, b: u8, c: u8, d: u8, port: u16) -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(a, b, c, d), port))
}

pub(crate) fn adapter(pool: &'static PacketPool) -> Adapter<MockChip> {
    Adapter::new(MockChip::new(), pool, AdapterConfig::defaults())
}

pub(crate) async fn with_chip<R>(
    adapter: &Adapter<MockChip>,
    f: impl FnOnce(&mut MockChip) -> R,
) -> R {
    let mut guard = adapter.inner.lock().await;
    f(&mut guard.chip)
}

pub(crate) fn drain_events(adapter: &Adapter<MockChip>) -> Vec<Event> {
    core::iter::from_fn(|| adapter.try_next_event()).collect()
}

pub(crate) fn recv_msg(data: &[u8], remaining: u16, from: SocketAddrV4) -> SocketMsg {
    SocketMsg::Recv(RecvMsg {
        len: data.len() as i16,
        remaining,
        from: NativeAddr::new(*from.ip(), from.port()),
        data: data.to_vec(),
    })
}

pub(crate) fn recv_status(len: i16) -> SocketMsg {
    SocketMsg::Recv(RecvMsg {
        len,
        remaining: 0,
        from: NativeAddr::UNSPECIFIED,
        data: Vec::new(),
    })
}

/// Binds `handle`, answering the chip's bind notification with success.
pub(crate) async fn bind_ok(adapter: &Adapter<MockChip>, handle: Handle, local: SocketAddr) {
    let (result, ()) = join(adapter.bind(handle, local), async {
        yield_now().await;
        adapter
            .dispatch(Notification::socket(
                handle,
                SocketMsg::Bind {
                    status: NativeStatus::OK,
                },
            ))
            .await;
    })
    .await;
    assert_eq!(result, Ok(()));
}

pub(crate) async fn listen_ok(adapter: &Adapter<MockChip>, handle: Handle) {
    let (result, ()) = join(adapter.listen(handle, 2), async {
        yield_now().await;
        adapter
            .dispatch(Notification::socket(
                handle,
                SocketMsg::Listen {
                    status: NativeStatus::OK,
                },
            ))
            .await;
    })
    .await;
    assert_eq!(result, Ok(()));
}

pub(crate) async fn bound_datagram(adapter: &Adapter<MockChip>, port: u16) -> Handle {
    let handle = adapter.create(Domain::Inet, SockType::Datagram).await.unwrap();
    bind_ok(adapter, handle, v4(0, 0, 0, 0, port)).await;
    handle
}

pub(crate) async fn connected_stream(adapter: &Adapter<MockChip>, remote: SocketAddr) -> Handle {
    let handle = adapter.create(Domain::Inet, SockType::Stream).await.unwrap();
    adapter.connect(handle, remote).await.unwrap();
    adapter
        .dispatch(Notification::socket(
            handle,
            SocketMsg::Connect {
                status: NativeStatus::OK,
            },
        ))
        .await;
    drain_events(adapter);
    handle
}

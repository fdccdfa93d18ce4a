//! The adapter: owns the chip, the socket table and the link machine behind
//! one lock, and runs the worker that feeds chip notifications through them.

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_futures::select::{select3, Either3};
use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel, mutex::Mutex, signal::Signal,
};
use embassy_time::{Instant, Timer};
use heapless::Vec;

use crate::{
    buf::PacketPool,
    chip::{AccessPoint, Chip, Handle, Notification, MAX_SOCKETS},
    config::{AdapterConfig, DATAGRAM_CAPACITY},
    error::{LinkError, NativeStatus, SockError},
    itf::{self, Interface, InterfaceAddr},
    link::{ConnectionMachine, LinkEvent, LinkState, LinkStatus, SCAN_RESULTS_MAX},
    socket::{pump::RxState, table::SocketTable},
};

pub const NOTIFICATION_QUEUE: usize = 16;
pub const EVENT_QUEUE: usize = 16;
/// Upper bound on notifications pulled from the chip per worker tick.
const TICK_DRAIN_MAX: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadStatus {
    Data,
    EndOfStream,
    Error(SockError),
}

/// Upward notification for the application.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    Readable {
        handle: Handle,
        status: ReadStatus,
    },
    Writable {
        handle: Handle,
        status: Result<(), SockError>,
    },
    NewConnection {
        listener: Handle,
        handle: Handle,
    },
    Link(LinkEvent),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdapterStats {
    pub rx_packets: u32,
    pub rx_bytes: u32,
    pub flow_pauses: u32,
    pub dropped_events: u32,
    pub discarded_notifications: u32,
}

pub(crate) struct Inner<C> {
    pub(crate) chip: C,
    pub(crate) table: SocketTable,
    pub(crate) rx: RxState,
    pub(crate) pool: &'static PacketPool,
    pub(crate) link: ConnectionMachine,
    pub(crate) config: AdapterConfig,
    pub(crate) tx_scratch: Vec<u8, DATAGRAM_CAPACITY>,
    pub(crate) stats: AdapterStats,
}

pub struct Adapter<C: Chip> {
    pub(crate) inner: Mutex<CriticalSectionRawMutex, Inner<C>>,
    pub(crate) completions: [Signal<CriticalSectionRawMutex, NativeStatus>; MAX_SOCKETS],
    notifications: Channel<CriticalSectionRawMutex, Notification, NOTIFICATION_QUEUE>,
    events: Channel<CriticalSectionRawMutex, Event, EVENT_QUEUE>,
    kick: Signal<CriticalSectionRawMutex, ()>,
    overflowed_notifications: AtomicU32,
}

impl<C: Chip> Adapter<C> {
    pub fn new(chip: C, pool: &'static PacketPool, config: AdapterConfig) -> Self {
        let config = config.sanitized();
        Self {
            inner: Mutex::new(Inner {
                chip,
                table: SocketTable::new(),
                rx: RxState::new(),
                pool,
                link: ConnectionMachine::new(&config),
                config,
                tx_scratch: Vec::new(),
                stats: AdapterStats::default(),
            }),
            completions: [const { Signal::new() }; MAX_SOCKETS],
            notifications: Channel::new(),
            events: Channel::new(),
            kick: Signal::new(),
            overflowed_notifications: AtomicU32::new(0),
        }
    }

    /// Worker loop. Must run for the adapter to make progress.
    pub async fn run(&self) -> ! {
        let poll_interval = self.inner.lock().await.config.poll_interval();
        // The deadline survives notifications so a busy queue cannot starve the tick.
        let mut next_tick = Instant::now() + poll_interval;
        loop {
            match select3(
                self.notifications.receive(),
                self.kick.wait(),
                Timer::at(next_tick),
            )
            .await
            {
                Either3::First(notification) => self.dispatch(notification).await,
                Either3::Second(()) | Either3::Third(()) => {
                    self.tick().await;
                    next_tick = Instant::now() + poll_interval;
                }
            }
        }
    }

    /// Queues a notification from interrupt or transport context.
    pub fn notify(&self, notification: Notification) -> Result<(), Notification> {
        self.notifications.try_send(notification).map_err(|err| {
            self.overflowed_notifications.fetch_add(1, Ordering::Relaxed);
            log::warn!("wincnet: notification queue full");
            match err {
                embassy_sync::channel::TrySendError::Full(notification) => notification,
            }
        })
    }

    pub async fn post(&self, notification: Notification) {
        self.notifications.send(notification).await;
    }

    /// Handles one notification immediately, bypassing the queue.
    pub async fn dispatch(&self, notification: Notification) {
        let mut guard = self.inner.lock().await;
        self.handle(&mut *guard, notification);
    }

    /// One service round: drains the chip, advances link retries and restarts
    /// the receive scan when it went idle.
    pub async fn tick(&self) {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if inner.link.events_armed() {
            for _ in 0..TICK_DRAIN_MAX {
                let Some(notification) = inner.chip.poll_notification() else {
                    break;
                };
                self.handle(inner, notification);
            }
        }
        inner.link.tick(&mut inner.chip, Instant::now());
        self.flush_link_events(inner);
        if !inner.rx.polling {
            self.poll_next(inner, 0);
        }
    }

    fn handle(&self, inner: &mut Inner<C>, notification: Notification) {
        match notification {
            Notification::Socket { handle, msg } => self.on_socket_msg(inner, handle, msg),
            Notification::Radio(msg) => {
                inner.link.on_radio(&mut inner.chip, msg, Instant::now());
                self.flush_link_events(inner);
            }
        }
    }

    /// Queues an event for the application; `false` when the queue is full.
    pub(crate) fn emit(&self, inner: &mut Inner<C>, event: Event) -> bool {
        if self.events.try_send(event).is_ok() {
            return true;
        }
        inner.stats.dropped_events = inner.stats.dropped_events.saturating_add(1);
        log::warn!("wincnet: event queue full event={:?}", event);
        false
    }

    fn flush_link_events(&self, inner: &mut Inner<C>) {
        while let Some(event) = inner.link.take_event() {
            self.emit(inner, Event::Link(event));
        }
    }

    pub async fn next_event(&self) -> Event {
        self.events.receive().await
    }

    pub fn try_next_event(&self) -> Option<Event> {
        self.events.try_receive().ok()
    }

    pub async fn stats(&self) -> AdapterStats {
        let mut stats = self.inner.lock().await.stats;
        stats.discarded_notifications = stats
            .discarded_notifications
            .saturating_add(self.overflowed_notifications.load(Ordering::Relaxed));
        stats
    }

    pub async fn start(&self) -> Result<(), LinkError> {
        self.link_request(|inner| inner.link.start(&mut inner.chip, Instant::now()))
            .await
    }

    /// Valid in any state.
    pub async fn stop(&self) {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        inner.link.stop(&mut inner.chip, Instant::now());
        self.flush_link_events(inner);
    }

    pub async fn join(&self, ssid: &str, key: &str) -> Result<(), LinkError> {
        self.link_request(|inner| inner.link.join(&mut inner.chip, ssid, key, Instant::now()))
            .await
    }

    pub async fn scan(&self) -> Result<(), LinkError> {
        self.link_request(|inner| inner.link.scan(&mut inner.chip, Instant::now()))
            .await
    }

    async fn link_request(
        &self,
        request: impl FnOnce(&mut Inner<C>) -> Result<(), LinkError>,
    ) -> Result<(), LinkError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let result = request(inner);
        self.flush_link_events(inner);
        drop(guard);
        self.kick.signal(());
        result
    }

    pub async fn link_state(&self) -> LinkState {
        self.inner.lock().await.link.state()
    }

    pub async fn link_status(&self) -> LinkStatus {
        self.inner.lock().await.link.status()
    }

    pub async fn scan_results(&self) -> Vec<AccessPoint, SCAN_RESULTS_MAX> {
        let guard = self.inner.lock().await;
        guard.link.scan_results().iter().cloned().collect()
    }

    pub async fn interface(&self, position: usize) -> Result<Interface, SockError> {
        let address = self.inner.lock().await.link.address();
        itf::interface(position, address)
    }

    pub async fn interface_addr(
        &self,
        index: u8,
        position: usize,
    ) -> Result<InterfaceAddr, SockError> {
        let address = self.inner.lock().await.link.address();
        itf::interface_addr(index, position, address)
    }
}

#[cfg(test)]
mod tests;

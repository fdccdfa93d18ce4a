use core::net::Ipv4Addr;

use embassy_time::{Duration, Instant};
use heapless::{Deque, String, Vec};

use crate::{
    chip::{AccessPoint, Radio, RadioMsg, ScanRegion, KEY_MAX, SSID_MAX},
    config::AdapterConfig,
    error::{LinkError, NativeStatus},
};

use super::state::{LinkEvent, LinkState, LinkStatus};

pub const SCAN_RESULTS_MAX: usize = 20;
const CONVERGE_STEPS_MAX: usize = 8;
const LINK_EVENT_QUEUE: usize = 4;

/// Radio lifecycle driver. `state` only moves towards `target` through
/// [`ConnectionMachine::converge`]; notifications and application requests
/// only ever rewrite `target`.
pub(crate) struct ConnectionMachine {
    pub(super) state: LinkState,
    pub(super) target: LinkState,
    ssid: String<SSID_MAX>,
    key: String<KEY_MAX>,
    pub(super) scan: Vec<AccessPoint, SCAN_RESULTS_MAX>,
    scan_expected: u8,
    scan_index: u8,
    address: Option<(Ipv4Addr, u8)>,
    events_armed: bool,
    retry_at: Option<Instant>,
    scan_region: ScanRegion,
    rescan_backoff: Duration,
    auto_reconnect: bool,
    events: Deque<LinkEvent, LINK_EVENT_QUEUE>,
}

impl ConnectionMachine {
    pub(crate) fn new(config: &AdapterConfig) -> Self {
        Self {
            state: LinkState::Stopped,
            target: LinkState::Stopped,
            ssid: String::new(),
            key: String::new(),
            scan: Vec::new(),
            scan_expected: 0,
            scan_index: 0,
            address: None,
            events_armed: false,
            retry_at: None,
            scan_region: config.scan_region,
            rescan_backoff: config.rescan_backoff(),
            auto_reconnect: config.auto_reconnect,
            events: Deque::new(),
        }
    }

    pub(crate) fn state(&self) -> LinkState {
        self.state
    }

    #[cfg(test)]
    pub(crate) fn target(&self) -> LinkState {
        self.target
    }

    pub(crate) fn address(&self) -> Option<(Ipv4Addr, u8)> {
        self.address
    }

    pub(crate) fn events_armed(&self) -> bool {
        self.events_armed
    }

    pub(crate) fn scan_results(&self) -> &[AccessPoint] {
        &self.scan
    }

    pub(crate) fn status(&self) -> LinkStatus {
        LinkStatus {
            state: self.state,
            target: self.target,
            address: self.address,
            events_armed: self.events_armed,
        }
    }

    pub(crate) fn take_event(&mut self) -> Option<LinkEvent> {
        self.events.pop_front()
    }

    pub(crate) fn start<R: Radio>(&mut self, radio: &mut R, now: Instant) -> Result<(), LinkError> {
        if self.state != LinkState::Stopped || self.target != LinkState::Stopped {
            return Err(LinkError::InvalidState);
        }
        self.target = LinkState::Initializing;
        self.converge(radio, now);
        Ok(())
    }

    pub(crate) fn stop<R: Radio>(&mut self, radio: &mut R, now: Instant) {
        self.target = LinkState::Stopped;
        self.converge(radio, now);
    }

    /// Records the network to join. Only an idle radio starts connecting right
    /// away; otherwise the network is picked up by the next retry.
    pub(crate) fn join<R: Radio>(
        &mut self,
        radio: &mut R,
        ssid: &str,
        key: &str,
        now: Instant,
    ) -> Result<(), LinkError> {
        if ssid.is_empty() {
            return Err(LinkError::InvalidCredentials);
        }
        let ssid = String::try_from(ssid).map_err(|_| LinkError::InvalidCredentials)?;
        let key = String::try_from(key).map_err(|_| LinkError::InvalidCredentials)?;
        self.ssid = ssid;
        self.key = key;
        self.retry_at = None;
        if self.state == LinkState::Initializing && self.target == LinkState::Initializing {
            self.target = LinkState::Connecting;
            self.converge(radio, now);
        }
        Ok(())
    }

    pub(crate) fn scan<R: Radio>(&mut self, radio: &mut R, now: Instant) -> Result<(), LinkError> {
        if self.state != LinkState::Initializing {
            return Err(LinkError::InvalidState);
        }
        self.target = LinkState::Scanning;
        self.converge(radio, now);
        Ok(())
    }

    pub(crate) fn tick<R: Radio>(&mut self, radio: &mut R, now: Instant) {
        let idle = self.state == LinkState::Initializing && self.target == LinkState::Initializing;
        let due = self.retry_at.is_some_and(|at| now >= at);
        if idle && due && !self.ssid.is_empty() {
            log::info!("wincnet: link retry ssid={}", self.ssid.as_str());
            self.retry_at = None;
            self.target = LinkState::Connecting;
        }
        self.converge(radio, now);
    }

    pub(crate) fn on_radio<R: Radio>(&mut self, radio: &mut R, msg: RadioMsg, now: Instant) {
        match msg {
            RadioMsg::ScanDone { status, found } => self.on_scan_done(radio, status, found, now),
            RadioMsg::ScanResult(ap) => self.on_scan_result(radio, ap, now),
            RadioMsg::ConnectionChanged { connected, reason } => {
                self.on_connection_changed(connected, reason, now)
            }
            RadioMsg::AddressAssigned { addr, prefix_len } => {
                if self.state == LinkState::AddressPending {
                    self.address = Some((addr, prefix_len));
                    self.target = LinkState::Connected;
                } else {
                    log::debug!(
                        "wincnet: dhcp ignored state={} addr={}",
                        self.state.as_str(),
                        addr
                    );
                }
            }
        }
        self.converge(radio, now);
    }

    fn on_scan_done<R: Radio>(&mut self, radio: &mut R, status: NativeStatus, found: u8, now: Instant) {
        if self.state != LinkState::Scanning {
            return;
        }
        if !status.is_ok() || found == 0 {
            log::info!("wincnet: scan done code={} found={}", status.0, found);
            self.complete_scan(now);
            return;
        }
        self.scan_expected = found.min(SCAN_RESULTS_MAX as u8);
        self.scan_index = 0;
        self.fetch_scan_result(radio, now);
    }

    fn on_scan_result<R: Radio>(&mut self, radio: &mut R, ap: AccessPoint, now: Instant) {
        if self.state != LinkState::Scanning {
            return;
        }
        log::debug!(
            "wincnet: scan result ssid={} rssi={} ch={}",
            ap.ssid.as_str(),
            ap.rssi,
            ap.channel
        );
        if let Err(ap) = self.scan.push(ap) {
            log::warn!("wincnet: scan result dropped ssid={}", ap.ssid.as_str());
        }
        self.scan_index = self.scan_index.saturating_add(1);
        if self.scan_index < self.scan_expected {
            self.fetch_scan_result(radio, now);
        } else {
            self.complete_scan(now);
        }
    }

    fn fetch_scan_result<R: Radio>(&mut self, radio: &mut R, now: Instant) {
        if let Err(status) = radio.request_scan_result(self.scan_index) {
            log::warn!(
                "wincnet: scan result request failed index={} code={}",
                self.scan_index,
                status.0
            );
            self.complete_scan(now);
        }
    }

    fn complete_scan(&mut self, now: Instant) {
        self.scan_expected = 0;
        if self.wanted_ap().is_some() {
            self.target = LinkState::Connecting;
            return;
        }
        self.target = LinkState::Initializing;
        if !self.ssid.is_empty() {
            self.schedule_retry(now);
        }
    }

    fn on_connection_changed(&mut self, connected: bool, reason: u8, now: Instant) {
        match (self.state, connected) {
            (LinkState::Connecting, true) => self.target = LinkState::AddressPending,
            (LinkState::Connecting, false) => {
                log::warn!("wincnet: association rejected reason={}", reason);
                self.target = LinkState::Initializing;
                self.schedule_retry(now);
            }
            (LinkState::AddressPending | LinkState::Connected, false) => {
                log::warn!("wincnet: link lost reason={}", reason);
                self.address = None;
                self.push_event(LinkEvent::Down);
                self.target = LinkState::Initializing;
                if self.auto_reconnect {
                    self.schedule_retry(now);
                }
            }
            (state, connected) => log::debug!(
                "wincnet: connection change ignored state={} connected={}",
                state.as_str(),
                connected
            ),
        }
    }

    fn schedule_retry(&mut self, now: Instant) {
        self.retry_at = Some(now + self.rescan_backoff);
    }

    fn wanted_ap(&self) -> Option<&AccessPoint> {
        if self.ssid.is_empty() {
            return None;
        }
        self.scan.iter().find(|ap| ap.ssid == self.ssid)
    }

    /// Steps until `state == target`. A pair that fails to settle is forced.
    pub(crate) fn converge<R: Radio>(&mut self, radio: &mut R, now: Instant) {
        for _ in 0..CONVERGE_STEPS_MAX {
            if self.state == self.target {
                return;
            }
            self.step(radio, now);
        }
        if self.state != self.target {
            log::error!(
                "wincnet: link did not settle state={} target={}",
                self.state.as_str(),
                self.target.as_str()
            );
            self.target = self.state;
        }
    }

    fn step<R: Radio>(&mut self, radio: &mut R, now: Instant) {
        match self.target {
            LinkState::Stopped => {
                if matches!(
                    self.state,
                    LinkState::Connecting | LinkState::AddressPending | LinkState::Connected
                ) {
                    if let Err(status) = radio.disassociate() {
                        log::warn!("wincnet: disassociate failed code={}", status.0);
                    }
                }
                radio.deinit();
                if self.address.take().is_some() {
                    self.push_event(LinkEvent::Down);
                }
                self.events_armed = false;
                self.retry_at = None;
                self.enter(LinkState::Stopped);
            }
            LinkState::Initializing => {
                if self.state != LinkState::Stopped {
                    if self.address.take().is_some() {
                        self.push_event(LinkEvent::Down);
                    }
                    self.enter(LinkState::Initializing);
                    return;
                }
                match radio.init() {
                    Ok(()) => {
                        self.events_armed = true;
                        self.enter(LinkState::Initializing);
                    }
                    Err(status) => {
                        log::error!("wincnet: radio init failed code={}", status.0);
                        self.target = LinkState::Stopped;
                        self.push_event(LinkEvent::RadioInitFailed { code: status.0 });
                    }
                }
            }
            LinkState::Scanning => {
                if self.state != LinkState::Initializing {
                    self.target = self.state;
                    return;
                }
                let requested = radio
                    .set_scan_region(self.scan_region)
                    .and_then(|()| radio.request_scan());
                match requested {
                    Ok(()) => {
                        self.scan.clear();
                        self.enter(LinkState::Scanning);
                    }
                    Err(status) => {
                        log::warn!("wincnet: scan request failed code={}", status.0);
                        self.target = LinkState::Initializing;
                        if !self.ssid.is_empty() {
                            self.schedule_retry(now);
                        }
                    }
                }
            }
            LinkState::Connecting => {
                if !matches!(self.state, LinkState::Initializing | LinkState::Scanning) {
                    self.target = self.state;
                    return;
                }
                let Some(auth) = self.wanted_ap().map(|ap| ap.auth) else {
                    self.target = LinkState::Scanning;
                    return;
                };
                match radio.associate(&self.ssid, auth, &self.key) {
                    Ok(()) => self.enter(LinkState::Connecting),
                    Err(status) => {
                        log::error!("wincnet: associate command failed code={}", status.0);
                        self.target = LinkState::Stopped;
                    }
                }
            }
            LinkState::AddressPending => {
                if self.state == LinkState::Connecting {
                    self.enter(LinkState::AddressPending);
                } else {
                    self.target = self.state;
                }
            }
            LinkState::Connected => match (self.state, self.address) {
                (LinkState::AddressPending, Some((addr, prefix_len))) => {
                    self.enter(LinkState::Connected);
                    self.push_event(LinkEvent::Up { addr, prefix_len });
                }
                _ => self.target = self.state,
            },
        }
    }

    fn enter(&mut self, next: LinkState) {
        log::info!("wincnet: link {} -> {}", self.state.as_str(), next.as_str());
        self.state = next;
    }

    fn push_event(&mut self, event: LinkEvent) {
        if self.events.push_back(event).is_err() {
            log::warn!("wincnet: link event dropped event={:?}", event);
        }
    }
}

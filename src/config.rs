use embassy_time::Duration;

use crate::chip::ScanRegion;

// Bind/listen acknowledgements normally arrive within a few poll intervals.
pub const SYNC_CALL_TIMEOUT_DEFAULT_MS: u32 = 1_000;
pub const POLL_INTERVAL_DEFAULT_MS: u32 = 100;
/// One Ethernet MTU; the chip never hands over more per logical receive.
pub const RX_PACKET_SIZE_DEFAULT: usize = 1_500;
pub const RX_PACKET_SIZE_MAX: usize = 1_500;
pub const RECV_TIMEOUT_DEFAULT_MS: u32 = 1;
/// Capacity of the contiguous datagram scratch buffer.
pub const DATAGRAM_CAPACITY: usize = 1_500;
pub const RESCAN_BACKOFF_DEFAULT_MS: u32 = 3_000;
/// Largest payload one native stream send accepts.
pub const STREAM_SEGMENT_MAX: usize = 1_400;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdapterConfig {
    pub bind_timeout_ms: u32,
    pub listen_timeout_ms: u32,
    pub poll_interval_ms: u32,
    pub rx_packet_size: usize,
    pub recv_timeout_ms: u32,
    pub max_datagram: usize,
    pub scan_region: ScanRegion,
    pub rescan_backoff_ms: u32,
    pub auto_reconnect: bool,
}

impl AdapterConfig {
    pub const fn defaults() -> Self {
        Self {
            bind_timeout_ms: SYNC_CALL_TIMEOUT_DEFAULT_MS,
            listen_timeout_ms: SYNC_CALL_TIMEOUT_DEFAULT_MS,
            poll_interval_ms: POLL_INTERVAL_DEFAULT_MS,
            rx_packet_size: RX_PACKET_SIZE_DEFAULT,
            recv_timeout_ms: RECV_TIMEOUT_DEFAULT_MS,
            max_datagram: DATAGRAM_CAPACITY,
            scan_region: ScanRegion::NorthAmerica,
            rescan_backoff_ms: RESCAN_BACKOFF_DEFAULT_MS,
            auto_reconnect: true,
        }
    }

    pub const fn sanitized(self) -> Self {
        Self {
            bind_timeout_ms: clamp_u32(self.bind_timeout_ms, 10, 60_000),
            listen_timeout_ms: clamp_u32(self.listen_timeout_ms, 10, 60_000),
            poll_interval_ms: clamp_u32(self.poll_interval_ms, 1, 5_000),
            rx_packet_size: clamp_usize(self.rx_packet_size, 64, RX_PACKET_SIZE_MAX),
            recv_timeout_ms: clamp_u32(self.recv_timeout_ms, 1, 1_000),
            max_datagram: clamp_usize(self.max_datagram, 1, DATAGRAM_CAPACITY),
            scan_region: self.scan_region,
            rescan_backoff_ms: clamp_u32(self.rescan_backoff_ms, 0, 600_000),
            auto_reconnect: self.auto_reconnect,
        }
    }

    pub const fn bind_timeout(&self) -> Duration {
        Duration::from_millis(self.bind_timeout_ms as u64)
    }

    pub const fn listen_timeout(&self) -> Duration {
        Duration::from_millis(self.listen_timeout_ms as u64)
    }

    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms as u64)
    }

    pub const fn rescan_backoff(&self) -> Duration {
        Duration::from_millis(self.rescan_backoff_ms as u64)
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self::defaults()
    }
}

const fn clamp_u32(value: u32, min: u32, max: u32) -> u32 {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

const fn clamp_usize(value: usize, min: usize, max: usize) -> usize {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

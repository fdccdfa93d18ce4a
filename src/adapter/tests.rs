use core::net::Ipv4Addr;

use embassy_futures::{
    block_on,
    select::{select, Either},
};
use embassy_time::{Duration, Timer};

use super::*;
use crate::{
    chip::{AuthType, RadioMsg},
    itf::InterfaceFlags,
    testing::{access_point, adapter, drain_events, with_chip, Call, MockChip},
};

fn radio(msg: RadioMsg) -> Notification {
    Notification::Radio(msg)
}

fn lab_connection() -> [Notification; 4] {
    [
        radio(RadioMsg::ScanDone {
            status: NativeStatus::OK,
            found: 1,
        }),
        radio(RadioMsg::ScanResult(access_point("lab", AuthType::WpaPsk))),
        radio(RadioMsg::ConnectionChanged {
            connected: true,
            reason: 0,
        }),
        radio(RadioMsg::AddressAssigned {
            addr: Ipv4Addr::new(192, 168, 1, 50),
            prefix_len: 24,
        }),
    ]
}

async fn connect_lab(adapter: &Adapter<MockChip>) {
    adapter.start().await.unwrap();
    adapter.join("lab", "secret").await.unwrap();
    with_chip(adapter, |chip| chip.inbox.extend(lab_connection())).await;
    adapter.tick().await;
}

#[test]
fn tick_drains_chip_once_radio_is_up() {
    static POOL: PacketPool = PacketPool::new(2);
    let adapter = adapter(&POOL);
    block_on(async {
        with_chip(&adapter, |chip| chip.inbox.extend(lab_connection())).await;
        adapter.tick().await;
        with_chip(&adapter, |chip| assert_eq!(chip.inbox.len(), 4)).await;
        with_chip(&adapter, |chip| chip.inbox.clear()).await;

        connect_lab(&adapter).await;
        assert_eq!(adapter.link_state().await, LinkState::Connected);
        assert_eq!(
            drain_events(&adapter),
            [Event::Link(LinkEvent::Up {
                addr: Ipv4Addr::new(192, 168, 1, 50),
                prefix_len: 24
            })]
        );
        assert_eq!(adapter.scan_results().await.len(), 1);
        with_chip(&adapter, |chip| {
            assert!(chip.inbox.is_empty());
            assert!(chip
                .calls
                .contains(&Call::Associate("lab".into(), AuthType::WpaPsk)));
        })
        .await;
    });
}

#[test]
fn interface_follows_link_address() {
    static POOL: PacketPool = PacketPool::new(2);
    let adapter = adapter(&POOL);
    block_on(async {
        let down = adapter.interface(0).await.unwrap();
        assert!(!down.flags.contains(InterfaceFlags::UP));
        assert_eq!(
            adapter.interface_addr(1, 0).await,
            Err(SockError::AddressNotAvailable)
        );

        connect_lab(&adapter).await;
        let up = adapter.interface(0).await.unwrap();
        assert!(up.flags.contains(InterfaceFlags::UP.union(InterfaceFlags::LINK)));
        assert_eq!(
            adapter.interface_addr(1, 0).await,
            Ok(InterfaceAddr {
                addr: Ipv4Addr::new(192, 168, 1, 50),
                prefix_len: 24
            })
        );
        assert_eq!(
            adapter.link_status().await.address,
            Some((Ipv4Addr::new(192, 168, 1, 50), 24))
        );
    });
}

#[test]
fn empty_scan_rescans_after_backoff() {
    static POOL: PacketPool = PacketPool::new(2);
    let adapter = Adapter::new(
        MockChip::new(),
        &POOL,
        AdapterConfig {
            rescan_backoff_ms: 0,
            ..AdapterConfig::defaults()
        },
    );
    block_on(async {
        adapter.start().await.unwrap();
        adapter.join("lab", "secret").await.unwrap();
        assert_eq!(adapter.link_state().await, LinkState::Scanning);

        adapter
            .dispatch(radio(RadioMsg::ScanDone {
                status: NativeStatus::OK,
                found: 0,
            }))
            .await;
        assert_eq!(adapter.link_state().await, LinkState::Initializing);

        adapter.tick().await;
        assert_eq!(adapter.link_state().await, LinkState::Scanning);
        with_chip(&adapter, |chip| {
            assert_eq!(chip.count(|call| *call == Call::Scan), 2)
        })
        .await;
    });
}

#[test]
fn radio_init_failure_is_reported() {
    static POOL: PacketPool = PacketPool::new(2);
    let adapter = adapter(&POOL);
    block_on(async {
        with_chip(&adapter, |chip| chip.init_result = Err(NativeStatus(-5))).await;
        assert_eq!(adapter.start().await, Ok(()));
        assert_eq!(adapter.link_state().await, LinkState::Stopped);
        assert_eq!(
            drain_events(&adapter),
            [Event::Link(LinkEvent::RadioInitFailed { code: -5 })]
        );
        assert_eq!(adapter.scan().await, Err(LinkError::InvalidState));
    });
}

#[test]
fn stop_tears_down_connected_link() {
    static POOL: PacketPool = PacketPool::new(2);
    let adapter = adapter(&POOL);
    block_on(async {
        connect_lab(&adapter).await;
        drain_events(&adapter);

        adapter.stop().await;
        assert_eq!(adapter.link_state().await, LinkState::Stopped);
        assert_eq!(drain_events(&adapter), [Event::Link(LinkEvent::Down)]);
        with_chip(&adapter, |chip| {
            assert_eq!(&chip.calls[chip.calls.len() - 2..], [Call::Disassociate, Call::Deinit])
        })
        .await;
        assert!(!adapter.link_status().await.events_armed);

        adapter.stop().await;
        assert!(drain_events(&adapter).is_empty());
    });
}

#[test]
fn notification_overflow_is_counted() {
    static POOL: PacketPool = PacketPool::new(2);
    let adapter = adapter(&POOL);
    let scan_done = radio(RadioMsg::ScanDone {
        status: NativeStatus::OK,
        found: 0,
    });
    for _ in 0..NOTIFICATION_QUEUE {
        assert!(adapter.notify(scan_done.clone()).is_ok());
    }
    assert_eq!(adapter.notify(scan_done.clone()), Err(scan_done));
    assert_eq!(block_on(adapter.stats()).discarded_notifications, 1);
}

#[test]
fn worker_dispatches_posted_notifications() {
    static POOL: PacketPool = PacketPool::new(2);
    let adapter = adapter(&POOL);
    block_on(async {
        adapter.start().await.unwrap();
        adapter.join("lab", "secret").await.unwrap();
        let outcome = select(adapter.run(), async {
            for notification in lab_connection() {
                adapter.post(notification).await;
            }
            adapter.next_event().await
        })
        .await;
        let event = match outcome {
            Either::First(_) => unreachable!(),
            Either::Second(event) => event,
        };
        assert_eq!(
            event,
            Event::Link(LinkEvent::Up {
                addr: Ipv4Addr::new(192, 168, 1, 50),
                prefix_len: 24
            })
        );
    });
}

#[test]
fn busy_notification_stream_still_ticks() {
    static POOL: PacketPool = PacketPool::new(2);
    let adapter = adapter(&POOL);
    let ignored = radio(RadioMsg::ScanDone {
        status: NativeStatus::OK,
        found: 0,
    });
    block_on(async {
        adapter.start().await.unwrap();
        adapter.kick.reset();
        with_chip(&adapter, |chip| {
            chip.inbox.extend(core::iter::repeat_n(ignored.clone(), 4))
        })
        .await;

        let outcome = select(adapter.run(), async {
            for _ in 0..10 {
                adapter.post(ignored.clone()).await;
                Timer::after(Duration::from_millis(40)).await;
            }
        })
        .await;
        assert!(matches!(outcome, Either::Second(())));
        with_chip(&adapter, |chip| assert!(chip.inbox.is_empty())).await;
    });
}

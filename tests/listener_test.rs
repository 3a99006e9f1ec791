//! Listener behaviour over in-process and TCP transports.

use motion_session_recorder::listener::{
    send_framed, ChannelTransport, Listener, Packet, PacketData, PacketKind, RawPacket,
    TcpTransport, WireType,
};
use motion_session_recorder::listener::packet::WireVec3;
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const POLL: Duration = Duration::from_millis(20);

fn fused_packet(counter: u64) -> Vec<u8> {
    RawPacket {
        packet_type: WireType::Fused as i64,
        timestamp: 5_000,
        acc: WireVec3 {
            x: 0.1,
            y: 0.2,
            z: 0.3,
        },
        extra: counter,
        ..RawPacket::default()
    }
    .encode()
}

fn legacy_packet() -> Vec<u8> {
    RawPacket {
        packet_type: WireType::Acc as i64,
        timestamp: 5_000,
        x: 0.5,
        ..RawPacket::default()
    }
    .encode()
}

fn collecting_observer(
    listener: &Listener,
    filter: Option<&[PacketKind]>,
) -> Arc<Mutex<Vec<Packet>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    listener.register_observer(move |packet| sink.lock().unwrap().push(*packet), filter);
    seen
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for listener");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_fused_packet_is_dispatched_once() {
    let (sender, transport) = ChannelTransport::new(16);
    let mut listener = Listener::with_options(transport, POLL, false);
    let seen = collecting_observer(&listener, None);
    listener.start().unwrap();

    sender.send(fused_packet(7)).unwrap();
    wait_until(|| listener.stats().dispatches == 1);
    listener.close();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let json = serde_json::to_value(seen[0]).unwrap();
    assert_eq!(json["type"], "fused");
    assert_eq!(json["counter"], 7);
    assert_eq!(seen[0].timestamp_sensor, 5.0);
    match seen[0].data {
        PacketData::Fused {
            acc_x,
            acc_y,
            acc_z,
            ..
        } => assert_eq!((acc_x, acc_y, acc_z), (0.1, 0.2, 0.3)),
        other => panic!("expected fused packet, got {other:?}"),
    }
}

#[test]
fn test_legacy_packet_is_dropped() {
    let (sender, transport) = ChannelTransport::new(16);
    let mut listener = Listener::with_options(transport, POLL, false);
    let seen = collecting_observer(&listener, None);
    listener.start().unwrap();

    sender.send(legacy_packet()).unwrap();
    wait_until(|| listener.stats().legacy_dropped == 1);
    listener.close();

    assert!(seen.lock().unwrap().is_empty());
    assert!(listener.get_recorded(None).is_empty());
    assert_eq!(listener.stats().dispatches, 0);
}

#[test]
fn test_no_callbacks_after_close() {
    let (sender, transport) = ChannelTransport::new(16);
    let mut listener = Listener::with_options(transport, POLL, false);
    let seen = collecting_observer(&listener, Some(&[PacketKind::Fused][..]));
    listener.start().unwrap();

    sender.send(fused_packet(1)).unwrap();
    wait_until(|| listener.stats().dispatches == 1);
    listener.close();

    // the channel is still open but nobody reads it any more
    let _ = sender.try_send(fused_packet(2));
    thread::sleep(POLL * 3);

    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(listener.get_recorded(None).len(), 1);
}

#[test]
fn test_recorded_snapshot_filters_by_kind() {
    let (sender, transport) = ChannelTransport::new(16);
    let mut listener = Listener::with_options(transport, POLL, false);
    listener.start().unwrap();

    let battery = RawPacket {
        packet_type: WireType::Battery as i64,
        w: 55.0,
        x: 3800.0,
        ..RawPacket::default()
    };
    sender.send(battery.encode()).unwrap();
    sender.send(fused_packet(3)).unwrap();
    wait_until(|| listener.stats().decoded() == 2);

    assert_eq!(listener.get_recorded(None).len(), 2);
    let fused = listener.get_recorded(Some(&[PacketKind::Fused][..]));
    assert_eq!(fused.len(), 1);
    assert_eq!(fused[0].kind(), PacketKind::Fused);
    listener.close();
}

#[test]
fn test_tcp_publisher_end_to_end() {
    let transport = TcpTransport::bind("127.0.0.1:0").unwrap();
    let addr = transport.local_addr().unwrap();
    let mut listener = Listener::with_options(transport, POLL, false);
    let seen = collecting_observer(&listener, None);
    listener.start().unwrap();

    let publisher = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        for counter in 0..3 {
            send_framed(&mut stream, &fused_packet(counter)).unwrap();
        }
    });
    publisher.join().unwrap();

    wait_until(|| seen.lock().unwrap().len() == 3);
    listener.close();

    let counters: Vec<u32> = seen
        .lock()
        .unwrap()
        .iter()
        .filter_map(|p| match p.data {
            PacketData::Fused { counter, .. } => Some(counter),
            _ => None,
        })
        .collect();
    assert_eq!(counters, vec![0, 1, 2]);
}

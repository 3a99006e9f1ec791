//! Background listener that decodes sensor packets and fans them out.
//!
//! Lifecycle: `Idle` until [`Listener::start`], `Listening` while the
//! worker runs, `Stopped` after [`Listener::close`]. A stopped listener
//! cannot be restarted. Observer callbacks run on the worker thread; once
//! `close` returns no callback is running or will run again.

use crate::listener::packet::{decode, DecodeError, Packet, PacketKind};
use crate::listener::stats::{ListenerStats, StatsSnapshot};
use crate::listener::transport::Transport;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Callback invoked with every matching packet.
pub type Observer = Box<dyn FnMut(&Packet) + Send>;

struct Registration {
    callback: Observer,
    /// `None` matches every kind
    filter: Option<Vec<PacketKind>>,
}

impl Registration {
    fn matches(&self, kind: PacketKind) -> bool {
        self.filter.as_ref().map_or(true, |f| f.contains(&kind))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    Listening,
    Stopped,
}

/// Listener errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerError {
    /// `start` after `close`
    Stopped,
    SpawnFailed(String),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Stopped => write!(f, "Listener was closed and cannot be restarted"),
            ListenerError::SpawnFailed(e) => write!(f, "Failed to spawn listener thread: {e}"),
        }
    }
}

impl std::error::Error for ListenerError {}

/// State shared with the worker thread.
struct Shared {
    observers: Mutex<Vec<Registration>>,
    recorded: Mutex<Vec<Packet>>,
    stats: ListenerStats,
    active: AtomicBool,
    verbose: bool,
}

impl Shared {
    fn new(verbose: bool) -> Self {
        Self {
            observers: Mutex::new(Vec::new()),
            recorded: Mutex::new(Vec::new()),
            stats: ListenerStats::new(),
            active: AtomicBool::new(false),
            verbose,
        }
    }
}

/// Receives packets from a [`Transport`] on a background thread.
pub struct Listener {
    shared: Arc<Shared>,
    transport: Option<Box<dyn Transport>>,
    worker: Option<JoinHandle<Box<dyn Transport>>>,
    poll_timeout: Duration,
    state: ListenerState,
}

impl Listener {
    /// Create an idle listener with the default 600 ms poll timeout.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::with_options(transport, Duration::from_millis(600), false)
    }

    /// Create an idle listener. `verbose` logs every decoded packet.
    pub fn with_options(
        transport: impl Transport + 'static,
        poll_timeout: Duration,
        verbose: bool,
    ) -> Self {
        Self {
            shared: Arc::new(Shared::new(verbose)),
            transport: Some(Box::new(transport)),
            worker: None,
            poll_timeout,
            state: ListenerState::Idle,
        }
    }

    /// Register a callback for packets of the given kinds, or all kinds.
    ///
    /// Callbacks must not register further observers.
    pub fn register_observer<F>(&self, callback: F, filter: Option<&[PacketKind]>)
    where
        F: FnMut(&Packet) + Send + 'static,
    {
        lock(&self.shared.observers).push(Registration {
            callback: Box::new(callback),
            filter: filter.map(<[PacketKind]>::to_vec),
        });
    }

    /// Start the worker thread. Calling it while listening does nothing.
    pub fn start(&mut self) -> Result<(), ListenerError> {
        match self.state {
            ListenerState::Listening => return Ok(()),
            ListenerState::Stopped => return Err(ListenerError::Stopped),
            ListenerState::Idle => {}
        }
        let Some(transport) = self.transport.take() else {
            return Err(ListenerError::Stopped);
        };

        self.shared.active.store(true, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let poll_timeout = self.poll_timeout;

        let handle = thread::Builder::new()
            .name("packet-listener".to_string())
            .spawn(move || run_loop(transport, &shared, poll_timeout))
            .map_err(|e| {
                self.shared.active.store(false, Ordering::SeqCst);
                ListenerError::SpawnFailed(e.to_string())
            })?;

        self.worker = Some(handle);
        self.state = ListenerState::Listening;
        info!("Listener started");
        Ok(())
    }

    /// Stop the worker and release the transport. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.shared.active.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            match handle.join() {
                Ok(transport) => drop(transport),
                Err(_) => error!("Listener thread panicked"),
            }
            info!("Listener closed");
        }
        self.transport = None;
        self.state = ListenerState::Stopped;
    }

    /// Copy of every packet received so far, optionally filtered by kind.
    pub fn get_recorded(&self, filter: Option<&[PacketKind]>) -> Vec<Packet> {
        lock(&self.shared.recorded)
            .iter()
            .filter(|p| filter.map_or(true, |f| f.contains(&p.kind())))
            .copied()
            .collect()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn summary(&self) -> String {
        self.shared.stats.summary()
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    /// Whether the worker is still receiving.
    pub fn is_running(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.close();
    }
}

/// Lock a mutex, recovering the data if an observer panicked while holding it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn run_loop(
    mut transport: Box<dyn Transport>,
    shared: &Shared,
    poll_timeout: Duration,
) -> Box<dyn Transport> {
    while shared.active.load(Ordering::SeqCst) {
        match transport.recv_timeout(poll_timeout) {
            Ok(Some(message)) => handle_message(&message, shared),
            Ok(None) => continue,
            Err(e) => {
                error!(error = %e, "Transport failed, listener stopping");
                break;
            }
        }
    }
    shared.active.store(false, Ordering::SeqCst);
    transport
}

fn handle_message(message: &[u8], shared: &Shared) {
    shared.stats.record_message();
    let received_at = Utc::now().timestamp_micros() as f64 / 1_000_000.0;

    let packet = match decode(message, received_at) {
        Ok(packet) => packet,
        Err(e @ DecodeError::Legacy(_)) => {
            warn!("{e}");
            shared.stats.record_legacy();
            return;
        }
        Err(e @ DecodeError::UnknownType(_)) => {
            warn!("{e}");
            shared.stats.record_unknown();
            return;
        }
        Err(e) => {
            warn!("{e}");
            shared.stats.record_malformed();
            return;
        }
    };

    let kind = packet.kind();
    shared.stats.record_packet(kind);
    if shared.verbose {
        info!(?packet, "Packet received");
    } else {
        debug!(%kind, timestamp_sensor = packet.timestamp_sensor, "Packet received");
    }

    lock(&shared.recorded).push(packet);

    let mut dispatched = 0;
    for registration in lock(&shared.observers).iter_mut() {
        if registration.matches(kind) {
            (registration.callback)(&packet);
            dispatched += 1;
        }
    }
    shared.stats.record_dispatches(dispatched);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::packet::{RawPacket, WireType};
    use crate::listener::transport::ChannelTransport;
    use std::time::Instant;

    fn switch_packet(pressed: bool) -> Vec<u8> {
        RawPacket {
            packet_type: WireType::Switch as i64,
            timestamp: 1000,
            w: if pressed { 1.0 } else { 0.0 },
            ..RawPacket::default()
        }
        .encode()
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_start_is_idempotent_and_restart_fails() {
        let (_sender, transport) = ChannelTransport::new(8);
        let mut listener = Listener::with_options(transport, Duration::from_millis(20), false);
        assert_eq!(listener.state(), ListenerState::Idle);

        listener.start().unwrap();
        listener.start().unwrap();
        assert_eq!(listener.state(), ListenerState::Listening);

        listener.close();
        listener.close();
        assert_eq!(listener.state(), ListenerState::Stopped);
        assert_eq!(listener.start(), Err(ListenerError::Stopped));
    }

    #[test]
    fn test_filtered_observers() {
        let (sender, transport) = ChannelTransport::new(8);
        let mut listener = Listener::with_options(transport, Duration::from_millis(20), false);

        let fused_hits = Arc::new(Mutex::new(0));
        let all_hits = Arc::new(Mutex::new(0));
        let fused = Arc::clone(&fused_hits);
        listener.register_observer(
            move |_| *fused.lock().unwrap() += 1,
            Some(&[PacketKind::Fused][..]),
        );
        let all = Arc::clone(&all_hits);
        listener.register_observer(move |_| *all.lock().unwrap() += 1, None);

        listener.start().unwrap();
        sender.send(switch_packet(true)).unwrap();
        assert!(wait_for(|| listener.stats().dispatches == 1));
        listener.close();

        assert_eq!(*fused_hits.lock().unwrap(), 0);
        assert_eq!(*all_hits.lock().unwrap(), 1);
        assert_eq!(listener.get_recorded(Some(&[PacketKind::Switch][..])).len(), 1);
        assert!(listener.get_recorded(Some(&[PacketKind::Battery][..])).is_empty());
    }

    #[test]
    fn test_malformed_message_keeps_listening() {
        let (sender, transport) = ChannelTransport::new(8);
        let mut listener = Listener::with_options(transport, Duration::from_millis(20), false);
        listener.start().unwrap();

        sender.send(vec![0x08]).unwrap();
        sender.send(switch_packet(false)).unwrap();
        assert!(wait_for(|| listener.stats().switch_packets == 1));
        assert_eq!(listener.stats().malformed, 1);
        assert!(listener.is_running());
        listener.close();
    }

    /// Collects formatted log output.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_legacy_packet_logs_one_warning() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let shared = Shared::new(false);
        let legacy = RawPacket {
            packet_type: WireType::Acc as i64,
            timestamp: 1000,
            x: 0.5,
            ..RawPacket::default()
        }
        .encode();
        tracing::subscriber::with_default(subscriber, || handle_message(&legacy, &shared));

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        let warnings: Vec<&str> = output.lines().filter(|l| l.contains("WARN")).collect();
        assert_eq!(warnings.len(), 1, "log output: {output}");
        assert!(warnings[0].contains("latest firmware"));
        assert_eq!(shared.stats.snapshot().legacy_dropped, 1);
        assert!(lock(&shared.recorded).is_empty());
    }

    #[test]
    fn test_closed_transport_stops_worker() {
        let (sender, transport) = ChannelTransport::new(8);
        let mut listener = Listener::with_options(transport, Duration::from_millis(20), false);
        listener.start().unwrap();
        drop(sender);

        assert!(wait_for(|| !listener.is_running()));
        listener.close();
        assert_eq!(listener.state(), ListenerState::Stopped);
    }
}

//! Channel-fed tracking source.
//!
//! A live hardware adapter (or a test) pushes frames and input events
//! through a [`ChannelSourceHandle`]; the recorder loop drains them.

use crate::collector::types::{BodyFrame, InputEvent};
use crate::collector::{CollectorError, TrackingSource};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};

/// Producer side of a [`ChannelSource`].
#[derive(Clone)]
pub struct ChannelSourceHandle {
    frames: Sender<BodyFrame>,
    events: Sender<InputEvent>,
}

impl ChannelSourceHandle {
    /// Queue a body frame. Returns false if the source was dropped or is full.
    pub fn send_frame(&self, frame: BodyFrame) -> bool {
        self.frames.try_send(frame).is_ok()
    }

    /// Queue an input event. Returns false if the source was dropped or is full.
    pub fn send_event(&self, event: InputEvent) -> bool {
        self.events.try_send(event).is_ok()
    }
}

/// A [`TrackingSource`] fed through bounded channels.
pub struct ChannelSource {
    frames: Receiver<BodyFrame>,
    events: Receiver<InputEvent>,
    disconnected: bool,
}

impl ChannelSource {
    /// Create a source and the handle used to feed it.
    pub fn new(capacity: usize) -> (Self, ChannelSourceHandle) {
        // Bounded so a stalled loop cannot grow memory without limit
        let (frame_tx, frame_rx) = bounded(capacity);
        let (event_tx, event_rx) = bounded(capacity);
        (
            Self {
                frames: frame_rx,
                events: event_rx,
                disconnected: false,
            },
            ChannelSourceHandle {
                frames: frame_tx,
                events: event_tx,
            },
        )
    }
}

impl TrackingSource for ChannelSource {
    fn poll_input(&mut self) -> Result<Vec<InputEvent>, CollectorError> {
        let mut events = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.disconnected = true;
                    break;
                }
            }
        }
        Ok(events)
    }

    fn poll_frame(&mut self) -> Result<Option<BodyFrame>, CollectorError> {
        // Only the newest frame matters; older queued frames are skipped
        // the same way the SDK only exposes its last frame.
        let mut latest = None;
        loop {
            match self.frames.try_recv() {
                Ok(frame) => latest = Some(frame),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.disconnected = true;
                    break;
                }
            }
        }
        Ok(latest)
    }

    fn is_exhausted(&self) -> bool {
        self.disconnected && self.frames.is_empty() && self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_latest_frame_is_returned() {
        let (mut source, handle) = ChannelSource::new(16);
        for ts in [1, 2, 3] {
            assert!(handle.send_frame(BodyFrame {
                timestamp_ms: ts,
                bodies: Vec::new(),
            }));
        }
        let frame = source.poll_frame().unwrap().unwrap();
        assert_eq!(frame.timestamp_ms, 3);
        assert!(source.poll_frame().unwrap().is_none());
    }

    #[test]
    fn test_exhausted_after_handle_dropped() {
        let (mut source, handle) = ChannelSource::new(4);
        handle.send_event(InputEvent::key_down('q', 20, 1));
        drop(handle);
        assert!(!source.is_exhausted());
        assert_eq!(source.poll_input().unwrap().len(), 1);
        let _ = source.poll_frame().unwrap();
        assert!(source.is_exhausted());
    }
}

//! Append-only sample logs.
//!
//! Every row carries the session frame counter so tables can be joined
//! after export. Rows are never modified once appended.

use crate::collector::types::{Body, InputEvent, InputKind, JointType, ScreenPoint, Vec3};

/// Position of one joint in one processed frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointSample {
    pub position: Vec3,
    pub joint: JointType,
    pub counter: u64,
    pub timestamp_ms: i64,
}

/// Hand-tip position together with its screen projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandTipSample {
    pub point: ScreenPoint,
    pub position: Vec3,
    pub counter: u64,
    pub timestamp_ms: i64,
}

/// Any input event, as logged to the screen-events table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenEventRow {
    pub event_type: u32,
    pub counter: u64,
    pub timestamp_ms: i64,
}

/// A key press or release, as logged to the keyboard table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEventRow {
    pub event_type: u32,
    /// The pressed symbol, or `none` for releases
    pub unicode: String,
    pub scancode: u32,
    pub counter: u64,
    pub timestamp_ms: i64,
}

/// Label written in place of a symbol for key releases.
pub const RELEASE_UNICODE: &str = "none";

/// All per-frame and per-event logs of a session.
#[derive(Debug, Default)]
pub struct SampleBuffer {
    full: Vec<JointSample>,
    hand: Vec<JointSample>,
    hand_tips: Vec<HandTipSample>,
    screen_events: Vec<ScreenEventRow>,
    key_events: Vec<KeyEventRow>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append every joint of `body`, plus the `hand_joint` subset.
    ///
    /// Returns the samples appended to the full log for this frame.
    pub fn record_joints(
        &mut self,
        body: &Body,
        hand_joint: JointType,
        counter: u64,
        timestamp_ms: i64,
    ) -> &[JointSample] {
        let start = self.full.len();
        for joint in &body.joints {
            let sample = JointSample {
                position: joint.position,
                joint: joint.joint_type,
                counter,
                timestamp_ms,
            };
            if joint.joint_type == hand_joint {
                self.hand.push(sample);
            }
            self.full.push(sample);
        }
        &self.full[start..]
    }

    pub fn record_hand_tip(&mut self, sample: HandTipSample) {
        self.hand_tips.push(sample);
    }

    /// Log an input event. Key events also go to the keyboard table.
    pub fn record_event(&mut self, event: &InputEvent, counter: u64) {
        let event_type = event.kind.event_code();
        self.screen_events.push(ScreenEventRow {
            event_type,
            counter,
            timestamp_ms: event.timestamp_ms,
        });

        let key_row = match &event.kind {
            InputKind::KeyDown { symbol, scancode } => Some((symbol.to_string(), *scancode)),
            InputKind::KeyUp { scancode, .. } => Some((RELEASE_UNICODE.to_string(), *scancode)),
            _ => None,
        };
        if let Some((unicode, scancode)) = key_row {
            self.key_events.push(KeyEventRow {
                event_type,
                unicode,
                scancode,
                counter,
                timestamp_ms: event.timestamp_ms,
            });
        }
    }

    /// Most recent hand-tip sample, used to place points of interest.
    pub fn latest_hand_tip(&self) -> Option<&HandTipSample> {
        self.hand_tips.last()
    }

    pub fn full(&self) -> &[JointSample] {
        &self.full
    }

    pub fn hand(&self) -> &[JointSample] {
        &self.hand
    }

    pub fn hand_tips(&self) -> &[HandTipSample] {
        &self.hand_tips
    }

    pub fn screen_events(&self) -> &[ScreenEventRow] {
        &self.screen_events
    }

    pub fn key_events(&self) -> &[KeyEventRow] {
        &self.key_events
    }
}

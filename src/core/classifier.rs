//! Classification of discrete input events.
//!
//! Key presses on a trigger symbol place a point of interest at the latest
//! hand-tip position. Any other key press opens a labeled activity span that
//! stays open until the same symbol is released. Closed spans wait in a
//! queue until the owner drains them with [`EventClassifier::take_completed`].

use crate::collector::types::{InputEvent, InputKind};
use crate::core::poi::{PoiFamily, PoiRegistry};
use crate::core::samples::{HandTipSample, JointSample};
use tracing::{debug, info, warn};

/// A closed (or still open at shutdown) activity span.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivitySpan {
    /// 1-based position among all spans started in the session
    pub index: usize,
    pub symbol: char,
    pub started_counter: u64,
    pub started_ms: i64,
    pub ended_ms: Option<i64>,
    pub samples: Vec<JointSample>,
}

impl ActivitySpan {
    pub fn is_complete(&self) -> bool {
        self.ended_ms.is_some()
    }
}

/// Activity recording state.
#[derive(Debug, Default)]
pub enum ActivityState {
    #[default]
    Idle,
    Recording(ActivitySpan),
}

/// What an input event did to session state.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// The operator asked to end the session
    Quit,
    /// A point of interest was set
    PoiSet { family: PoiFamily, symbol: char },
    /// A trigger fired before any hand-tip position existed
    PoiSkipped { symbol: char },
    ActivityStarted { symbol: char },
    ActivityEnded { symbol: char, samples: usize },
    /// A press arrived while another activity was open
    ActivityIgnored { symbol: char, open: char },
    /// A release that does not close the open activity
    ReleaseUnmatched { symbol: char },
    /// Logged only
    Logged,
}

/// Routes input events to the POI registry and the activity state machine.
#[derive(Debug, Default)]
pub struct EventClassifier {
    activity: ActivityState,
    /// Closed spans not yet drained
    completed: Vec<ActivitySpan>,
    started: usize,
}

impl EventClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `event` and apply its effect.
    ///
    /// `latest` is the most recent hand-tip sample; `counter` the current
    /// session frame counter.
    pub fn classify(
        &mut self,
        event: &InputEvent,
        registry: &mut PoiRegistry,
        latest: Option<&HandTipSample>,
        counter: u64,
    ) -> EventOutcome {
        match event.kind {
            InputKind::Quit => EventOutcome::Quit,
            InputKind::KeyDown { symbol, .. } => {
                if registry.family_of(symbol).is_some() {
                    self.place_poi(symbol, registry, latest)
                } else {
                    self.start_activity(symbol, counter, event.timestamp_ms)
                }
            }
            InputKind::KeyUp { symbol, .. } => self.end_activity(symbol, event.timestamp_ms),
            _ => EventOutcome::Logged,
        }
    }

    fn place_poi(
        &mut self,
        symbol: char,
        registry: &mut PoiRegistry,
        latest: Option<&HandTipSample>,
    ) -> EventOutcome {
        let Some(tip) = latest else {
            warn!(%symbol, "No hand position recorded yet, ignoring trigger");
            return EventOutcome::PoiSkipped { symbol };
        };

        match registry.set(symbol, tip.point, tip.position, tip.counter, tip.timestamp_ms) {
            Some(family) => {
                info!(%family, %symbol, "Set point of interest");
                EventOutcome::PoiSet { family, symbol }
            }
            None => EventOutcome::Logged,
        }
    }

    fn start_activity(&mut self, symbol: char, counter: u64, timestamp_ms: i64) -> EventOutcome {
        match &self.activity {
            ActivityState::Recording(open) => {
                warn!(%symbol, open = %open.symbol, "Activity already open, ignoring press");
                EventOutcome::ActivityIgnored {
                    symbol,
                    open: open.symbol,
                }
            }
            ActivityState::Idle => {
                info!(%symbol, "Activity start");
                self.started += 1;
                self.activity = ActivityState::Recording(ActivitySpan {
                    index: self.started,
                    symbol,
                    started_counter: counter,
                    started_ms: timestamp_ms,
                    ended_ms: None,
                    samples: Vec::new(),
                });
                EventOutcome::ActivityStarted { symbol }
            }
        }
    }

    fn end_activity(&mut self, symbol: char, timestamp_ms: i64) -> EventOutcome {
        match std::mem::take(&mut self.activity) {
            ActivityState::Recording(mut span) if span.symbol == symbol => {
                span.ended_ms = Some(timestamp_ms);
                let samples = span.samples.len();
                info!(%symbol, samples, "Activity end");
                self.completed.push(span);
                EventOutcome::ActivityEnded { symbol, samples }
            }
            other => {
                // Releases of trigger keys and stray releases land here.
                self.activity = other;
                debug!(%symbol, "Release does not close an activity");
                EventOutcome::ReleaseUnmatched { symbol }
            }
        }
    }

    /// Append this frame's samples to the open activity, if any.
    pub fn observe_frame(&mut self, samples: &[JointSample]) {
        if let ActivityState::Recording(span) = &mut self.activity {
            span.samples.extend_from_slice(samples);
        }
    }

    /// Symbol of the open activity.
    pub fn open_activity(&self) -> Option<char> {
        match &self.activity {
            ActivityState::Recording(span) => Some(span.symbol),
            ActivityState::Idle => None,
        }
    }

    /// Closed spans that have not been drained yet.
    pub fn completed(&self) -> &[ActivitySpan] {
        &self.completed
    }

    /// Remove and return the closed spans, releasing their samples.
    pub fn take_completed(&mut self) -> Vec<ActivitySpan> {
        std::mem::take(&mut self.completed)
    }

    /// Spans still held: undrained closed ones, then the open one (if any).
    pub fn spans_for_export(&self) -> Vec<&ActivitySpan> {
        let mut spans: Vec<&ActivitySpan> = self.completed.iter().collect();
        if let ActivityState::Recording(span) = &self.activity {
            spans.push(span);
        }
        spans
    }
}

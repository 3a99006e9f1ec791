//! Session state owned by the recorder loop.
//!
//! The frame counter is shared by every table written during a frame, so
//! joint samples, hand-tip points and distance records of the same frame
//! carry the same counter value.

use crate::collector::types::{BodyFrame, InputEvent, JointType};
use crate::config::TriggerConfig;
use crate::core::classifier::{ActivitySpan, EventClassifier, EventOutcome};
use crate::core::distance::{DistanceEngine, DistanceRecord};
use crate::core::overlay::Overlay;
use crate::core::poi::PoiRegistry;
use crate::core::samples::{HandTipSample, SampleBuffer};
use tracing::warn;

/// Result of processing one body frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// The frame had a subject and was recorded under `counter`
    Processed { counter: u64, overlay: Overlay },
    /// No tracked body in the frame
    NoSubject,
    /// The subject lacked a required joint
    Incomplete { missing: JointType },
}

/// All state accumulated during one recording session.
#[derive(Debug)]
pub struct SessionState {
    counter: u64,
    tracked_joint: JointType,
    hand_tip_joint: JointType,
    samples: SampleBuffer,
    registry: PoiRegistry,
    classifier: EventClassifier,
    engine: DistanceEngine,
    distances: Vec<DistanceRecord>,
}

impl SessionState {
    pub fn new(triggers: TriggerConfig, tracked_joint: JointType, hand_tip_joint: JointType) -> Self {
        Self {
            counter: 0,
            tracked_joint,
            hand_tip_joint,
            samples: SampleBuffer::new(),
            registry: PoiRegistry::new(triggers),
            classifier: EventClassifier::new(),
            engine: DistanceEngine::new(),
            distances: Vec::new(),
        }
    }

    /// Log an input event and apply its classification.
    pub fn handle_event(&mut self, event: &InputEvent) -> EventOutcome {
        self.samples.record_event(event, self.counter);
        let latest = self.samples.latest_hand_tip().copied();
        self.classifier
            .classify(event, &mut self.registry, latest.as_ref(), self.counter)
    }

    /// Record the frame's subject and compute its distance record.
    ///
    /// The counter advances only when the frame is processed.
    pub fn process_frame(&mut self, frame: &BodyFrame) -> FrameOutcome {
        let Some(body) = frame.subject() else {
            return FrameOutcome::NoSubject;
        };
        let Some(tracked) = body.joint(self.tracked_joint).copied() else {
            warn!(joint = %self.tracked_joint, "Tracked joint missing from body, skipping frame");
            return FrameOutcome::Incomplete {
                missing: self.tracked_joint,
            };
        };
        let Some(tip) = body.joint(self.hand_tip_joint).copied() else {
            warn!(joint = %self.hand_tip_joint, "Hand tip joint missing from body, skipping frame");
            return FrameOutcome::Incomplete {
                missing: self.hand_tip_joint,
            };
        };

        let counter = self.counter;
        let timestamp_ms = frame.timestamp_ms;

        let frame_samples =
            self.samples
                .record_joints(body, self.tracked_joint, counter, timestamp_ms);
        self.classifier.observe_frame(frame_samples);

        self.samples.record_hand_tip(HandTipSample {
            point: tip.projected,
            position: tip.position,
            counter,
            timestamp_ms,
        });

        let record = self
            .engine
            .compute(tracked.position, &self.registry, counter, timestamp_ms);
        self.distances.push(record);

        let overlay = Overlay::build(body, &self.registry);
        self.counter += 1;

        FrameOutcome::Processed { counter, overlay }
    }

    /// Number of frames processed so far.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn samples(&self) -> &SampleBuffer {
        &self.samples
    }

    pub fn registry(&self) -> &PoiRegistry {
        &self.registry
    }

    pub fn classifier(&self) -> &EventClassifier {
        &self.classifier
    }

    pub fn distances(&self) -> &[DistanceRecord] {
        &self.distances
    }

    /// Hand over activity spans closed since the last call.
    pub fn take_completed_activities(&mut self) -> Vec<ActivitySpan> {
        self.classifier.take_completed()
    }
}

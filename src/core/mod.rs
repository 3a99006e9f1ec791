//! Session-state core of the recorder.
//!
//! This module contains:
//! - Append-only sample logs
//! - The point-of-interest registry
//! - Input event classification and activity spans
//! - Per-frame distance computation
//! - The overlay drawing list
//! - The session state tying them together

pub mod classifier;
pub mod distance;
pub mod overlay;
pub mod poi;
pub mod samples;
pub mod session;

// Re-export commonly used types
pub use classifier::{ActivitySpan, EventClassifier, EventOutcome};
pub use distance::{DistanceEngine, DistanceRecord, DistanceSlot};
pub use overlay::{Marker, Overlay, OverlaySink, Segment};
pub use poi::{CurrentMap, PoiEntry, PoiFamily, PoiRegistry};
pub use samples::{HandTipSample, JointSample, KeyEventRow, SampleBuffer, ScreenEventRow};
pub use session::{FrameOutcome, SessionState};

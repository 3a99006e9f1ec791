//! Motion Session Recorder - body-tracking sessions with points of interest.
//!
//! This library records a tracked subject's skeleton frame by frame, lets
//! the operator place points of interest with trigger keys, measures the
//! distance from a tracked joint to every current point, and writes the
//! whole session as CSV tables when it ends. A separate listener receives
//! packets from a wearable motion sensor.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Motion Session Recorder                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │  Collector  │──▶│   Session   │──▶│   Export    │       │
//! │  │  (frames,   │   │ (samples,   │   │   (CSV at   │       │
//! │  │   input)    │   │  POIs, dist)│   │  shutdown)  │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │                           │                                 │
//! │                           ▼                                 │
//! │                    ┌─────────────┐                          │
//! │                    │   Overlay   │                          │
//! │                    └─────────────┘                          │
//! │                                                             │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │  Transport  │──▶│   Decoder   │──▶│  Observers  │       │
//! │  │ (TCP/chan)  │   │ (protobuf)  │   │ (filtered)  │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use motion_session_recorder::{
//!     collector::ReplaySource, config::SessionConfig, Config, Recorder, SessionExporter,
//!     SessionState,
//! };
//! use std::sync::{atomic::AtomicBool, Arc};
//!
//! let config = Config::default();
//! let source = ReplaySource::open("capture.jsonl".as_ref()).expect("capture file");
//! let state = SessionState::new(
//!     config.triggers().expect("trigger keys"),
//!     config.tracked_joint,
//!     config.hand_tip_joint,
//! );
//! let exporter = SessionExporter::new(SessionConfig::new(
//!     &config.recordings_path,
//!     chrono::Local::now(),
//! ));
//!
//! let summary = Recorder::new(source, state, exporter, &config)
//!     .run(Arc::new(AtomicBool::new(true)));
//! println!("{} frames recorded", summary.frames_processed);
//! ```

pub mod collector;
pub mod config;
pub mod core;
pub mod export;
pub mod listener;
pub mod recorder;

// Re-export key types at crate root for convenience
pub use collector::{CollectorError, TrackingSource};
pub use config::{Config, ConfigError, SessionConfig, TriggerConfig};
pub use crate::core::{FrameOutcome, SessionState};
pub use export::{ExportReport, SessionExporter};
pub use listener::{Listener, Packet, PacketKind};
pub use recorder::{Recorder, RecorderSummary};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}

//! Collaborator adapters for the recorder.
//!
//! The tracking hardware and the display/input layer sit behind the
//! [`TrackingSource`] trait. Two sources ship with the crate: a JSON Lines
//! replay of a captured session and a channel-fed source for live adapters.

pub mod channel;
pub mod replay;
pub mod types;

// Re-export commonly used types
pub use channel::{ChannelSource, ChannelSourceHandle};
pub use replay::{ReplayRecord, ReplaySource};
pub use types::{
    Body, BodyFrame, InputEvent, InputKind, Joint, JointType, ScreenPoint, TrackingState, Vec3,
};

/// A source of body frames and input events.
///
/// The recorder calls `poll_input` then `poll_frame` once per loop iteration.
pub trait TrackingSource {
    /// Drain all input events that are pending right now.
    fn poll_input(&mut self) -> Result<Vec<InputEvent>, CollectorError>;

    /// The latest body frame if a new one is available.
    fn poll_frame(&mut self) -> Result<Option<BodyFrame>, CollectorError>;

    /// Whether the source will never deliver anything again.
    fn is_exhausted(&self) -> bool;
}

/// Errors that can occur while reading from a collaborator.
#[derive(Debug)]
pub enum CollectorError {
    Io(std::io::Error),
    Parse { line: usize, message: String },
    Disconnected,
}

impl std::fmt::Display for CollectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectorError::Io(e) => write!(f, "IO error: {e}"),
            CollectorError::Parse { line, message } => {
                write!(f, "Malformed capture record on line {line}: {message}")
            }
            CollectorError::Disconnected => write!(f, "Tracking source disconnected"),
        }
    }
}

impl std::error::Error for CollectorError {}

impl From<std::io::Error> for CollectorError {
    fn from(e: std::io::Error) -> Self {
        CollectorError::Io(e)
    }
}

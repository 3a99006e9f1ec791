//! Types delivered by the tracking and input collaborators.
//!
//! Positions are trusted as delivered. Projected screen points may contain
//! non-finite values when the SDK cannot map a joint into color space.

use serde::{Deserialize, Serialize};

/// Skeletal landmarks reported by the body tracker, in SDK index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JointType {
    SpineBase,
    SpineMid,
    Neck,
    Head,
    ShoulderLeft,
    ElbowLeft,
    WristLeft,
    HandLeft,
    ShoulderRight,
    ElbowRight,
    WristRight,
    HandRight,
    HipLeft,
    KneeLeft,
    AnkleLeft,
    FootLeft,
    HipRight,
    KneeRight,
    AnkleRight,
    FootRight,
    SpineShoulder,
    HandTipLeft,
    ThumbLeft,
    HandTipRight,
    ThumbRight,
}

impl JointType {
    /// Number of joints in a full skeleton.
    pub const COUNT: usize = 25;

    /// All joints in SDK index order.
    pub const ALL: [JointType; Self::COUNT] = [
        JointType::SpineBase,
        JointType::SpineMid,
        JointType::Neck,
        JointType::Head,
        JointType::ShoulderLeft,
        JointType::ElbowLeft,
        JointType::WristLeft,
        JointType::HandLeft,
        JointType::ShoulderRight,
        JointType::ElbowRight,
        JointType::WristRight,
        JointType::HandRight,
        JointType::HipLeft,
        JointType::KneeLeft,
        JointType::AnkleLeft,
        JointType::FootLeft,
        JointType::HipRight,
        JointType::KneeRight,
        JointType::AnkleRight,
        JointType::FootRight,
        JointType::SpineShoulder,
        JointType::HandTipLeft,
        JointType::ThumbLeft,
        JointType::HandTipRight,
        JointType::ThumbRight,
    ];

    /// SDK index of this joint.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            JointType::SpineBase => "SpineBase",
            JointType::SpineMid => "SpineMid",
            JointType::Neck => "Neck",
            JointType::Head => "Head",
            JointType::ShoulderLeft => "ShoulderLeft",
            JointType::ElbowLeft => "ElbowLeft",
            JointType::WristLeft => "WristLeft",
            JointType::HandLeft => "HandLeft",
            JointType::ShoulderRight => "ShoulderRight",
            JointType::ElbowRight => "ElbowRight",
            JointType::WristRight => "WristRight",
            JointType::HandRight => "HandRight",
            JointType::HipLeft => "HipLeft",
            JointType::KneeLeft => "KneeLeft",
            JointType::AnkleLeft => "AnkleLeft",
            JointType::FootLeft => "FootLeft",
            JointType::HipRight => "HipRight",
            JointType::KneeRight => "KneeRight",
            JointType::AnkleRight => "AnkleRight",
            JointType::FootRight => "FootRight",
            JointType::SpineShoulder => "SpineShoulder",
            JointType::HandTipLeft => "HandTipLeft",
            JointType::ThumbLeft => "ThumbLeft",
            JointType::HandTipRight => "HandTipRight",
            JointType::ThumbRight => "ThumbRight",
        }
    }

    /// Look up a joint by its name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|j| j.name().eq_ignore_ascii_case(name.trim()))
    }
}

impl std::fmt::Display for JointType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Tracking confidence reported per joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackingState {
    NotTracked,
    Inferred,
    Tracked,
}

/// World-space position in meters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Sum of squared per-axis differences. No square root is taken.
    pub fn squared_distance(&self, other: &Vec3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }
}

/// Point projected onto the display surface, in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// One joint of a tracked body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub joint_type: JointType,
    pub state: TrackingState,
    pub position: Vec3,
    /// Projection of `position` onto the display surface.
    pub projected: ScreenPoint,
}

/// A body slot in a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub is_tracked: bool,
    /// Joints in SDK index order.
    pub joints: Vec<Joint>,
}

impl Body {
    /// Find a joint by type.
    pub fn joint(&self, joint_type: JointType) -> Option<&Joint> {
        self.joints
            .get(joint_type.index())
            .filter(|j| j.joint_type == joint_type)
            .or_else(|| self.joints.iter().find(|j| j.joint_type == joint_type))
    }
}

/// A body frame as delivered by the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyFrame {
    /// Capture time in milliseconds since the Unix epoch
    pub timestamp_ms: i64,
    pub bodies: Vec<Body>,
}

impl BodyFrame {
    /// The first tracked body, which is the recorded subject.
    pub fn subject(&self) -> Option<&Body> {
        self.bodies.iter().find(|b| b.is_tracked)
    }
}

/// Discrete input from the display/input collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputKind {
    Quit,
    KeyDown { symbol: char, scancode: u32 },
    KeyUp { symbol: char, scancode: u32 },
    MouseMotion,
    MouseButtonDown,
    MouseButtonUp,
    Window,
}

impl InputKind {
    /// Numeric event type as written to the events tables.
    pub fn event_code(&self) -> u32 {
        match self {
            InputKind::Quit => 256,
            InputKind::Window => 512,
            InputKind::KeyDown { .. } => 768,
            InputKind::KeyUp { .. } => 769,
            InputKind::MouseMotion => 1024,
            InputKind::MouseButtonDown => 1025,
            InputKind::MouseButtonUp => 1026,
        }
    }
}

/// A timestamped input event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputEvent {
    #[serde(flatten)]
    pub kind: InputKind,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: i64,
}

impl InputEvent {
    pub fn new(kind: InputKind, timestamp_ms: i64) -> Self {
        Self { kind, timestamp_ms }
    }

    pub fn key_down(symbol: char, scancode: u32, timestamp_ms: i64) -> Self {
        Self::new(InputKind::KeyDown { symbol, scancode }, timestamp_ms)
    }

    pub fn key_up(symbol: char, scancode: u32, timestamp_ms: i64) -> Self {
        Self::new(InputKind::KeyUp { symbol, scancode }, timestamp_ms)
    }
}

/// Build a fully tracked body with every joint at `base` offset by its index.
///
/// Handy for tests and demos; real frames come from the tracker.
pub fn synthetic_body(base: Vec3) -> Body {
    let joints = JointType::ALL
        .iter()
        .map(|&joint_type| {
            let i = joint_type.index() as f64;
            Joint {
                joint_type,
                state: TrackingState::Tracked,
                position: Vec3::new(base.x + i * 0.01, base.y + i * 0.01, base.z),
                projected: ScreenPoint::new(100.0 + i * 10.0, 200.0 + i * 10.0),
            }
        })
        .collect();
    Body {
        is_tracked: true,
        joints,
    }
}

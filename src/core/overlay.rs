//! Drawing list for the display collaborator.
//!
//! Bones and POI markers are computed here; rasterizing them is left to an
//! [`OverlaySink`]. Projected coordinates can be infinite when the tracker
//! cannot map a joint, so such primitives are dropped and counted.

use crate::collector::types::{Body, JointType, ScreenPoint, TrackingState};
use crate::core::poi::{PoiFamily, PoiRegistry};

/// Radius of tire circles and half side of field squares, in pixels.
pub const MARKER_OFFSET: f64 = 25.0;

/// Bones drawn for a full skeleton.
pub const BONES: [(JointType, JointType); 24] = [
    // Torso
    (JointType::Head, JointType::Neck),
    (JointType::Neck, JointType::SpineShoulder),
    (JointType::SpineShoulder, JointType::SpineMid),
    (JointType::SpineMid, JointType::SpineBase),
    (JointType::SpineShoulder, JointType::ShoulderRight),
    (JointType::SpineShoulder, JointType::ShoulderLeft),
    (JointType::SpineBase, JointType::HipRight),
    (JointType::SpineBase, JointType::HipLeft),
    // Right arm
    (JointType::ShoulderRight, JointType::ElbowRight),
    (JointType::ElbowRight, JointType::WristRight),
    (JointType::WristRight, JointType::HandRight),
    (JointType::HandRight, JointType::HandTipRight),
    (JointType::WristRight, JointType::ThumbRight),
    // Left arm
    (JointType::ShoulderLeft, JointType::ElbowLeft),
    (JointType::ElbowLeft, JointType::WristLeft),
    (JointType::WristLeft, JointType::HandLeft),
    (JointType::HandLeft, JointType::HandTipLeft),
    (JointType::WristLeft, JointType::ThumbLeft),
    // Right leg
    (JointType::HipRight, JointType::KneeRight),
    (JointType::KneeRight, JointType::AnkleRight),
    (JointType::AnkleRight, JointType::FootRight),
    // Left leg
    (JointType::HipLeft, JointType::KneeLeft),
    (JointType::KneeLeft, JointType::AnkleLeft),
    (JointType::AnkleLeft, JointType::FootLeft),
];

/// A line between two projected joints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: ScreenPoint,
    pub end: ScreenPoint,
}

/// Marker for a current point of interest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Marker {
    /// Tires are drawn as circles.
    Circle { center: ScreenPoint, radius: f64, symbol: char },
    /// Fields are drawn as squares, corners in drawing order.
    Square { corners: [ScreenPoint; 4], symbol: char },
}

/// Everything to draw over one frame.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Overlay {
    pub segments: Vec<Segment>,
    pub markers: Vec<Marker>,
    /// Primitives dropped because of non-finite coordinates
    pub skipped: usize,
}

/// Receives the overlay of every processed frame.
pub trait OverlaySink {
    fn present(&mut self, overlay: &Overlay);
}

impl Overlay {
    /// Build the overlay for `body` and the registry's current POIs.
    pub fn build(body: &Body, registry: &PoiRegistry) -> Self {
        let mut overlay = Overlay::default();

        for (a, b) in BONES {
            let (Some(ja), Some(jb)) = (body.joint(a), body.joint(b)) else {
                continue;
            };
            if ja.state == TrackingState::NotTracked || jb.state == TrackingState::NotTracked {
                continue;
            }
            if ja.state == TrackingState::Inferred && jb.state == TrackingState::Inferred {
                continue;
            }
            if ja.projected.is_finite() && jb.projected.is_finite() {
                overlay.segments.push(Segment {
                    start: ja.projected,
                    end: jb.projected,
                });
            } else {
                overlay.skipped += 1;
            }
        }

        for entry in registry.current().iter() {
            if !entry.point.is_finite() {
                overlay.skipped += 1;
                continue;
            }
            let center = entry.point;
            let marker = match registry.family_of(entry.symbol) {
                Some(PoiFamily::Tire) => Marker::Circle {
                    center,
                    radius: MARKER_OFFSET,
                    symbol: entry.symbol,
                },
                Some(PoiFamily::Field) => Marker::Square {
                    corners: square_corners(center, MARKER_OFFSET),
                    symbol: entry.symbol,
                },
                None => continue,
            };
            overlay.markers.push(marker);
        }

        overlay
    }
}

fn square_corners(c: ScreenPoint, offset: f64) -> [ScreenPoint; 4] {
    [
        ScreenPoint::new(c.x - offset, c.y + offset),
        ScreenPoint::new(c.x + offset, c.y + offset),
        ScreenPoint::new(c.x + offset, c.y - offset),
        ScreenPoint::new(c.x - offset, c.y - offset),
    ]
}

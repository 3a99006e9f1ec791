//! Per-frame distances from the tracked joint to every current POI.
//!
//! Distances are squared Euclidean (no square root) to stay numerically
//! compatible with existing analysis scripts.

use crate::collector::types::Vec3;
use crate::core::poi::{PoiFamily, PoiRegistry};

/// Distance to one point of interest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceSlot {
    pub symbol: char,
    pub family: PoiFamily,
    pub distance: f64,
    pub timestamp_ms: i64,
}

/// All distances of one processed frame.
///
/// Sparse: only symbols with a current entry are present, in the registry's
/// current order. An empty record is valid.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceRecord {
    pub counter: u64,
    pub timestamp_ms: i64,
    pub slots: Vec<DistanceSlot>,
}

impl DistanceRecord {
    pub fn get(&self, symbol: char) -> Option<&DistanceSlot> {
        self.slots.iter().find(|s| s.symbol == symbol)
    }

    pub fn symbols(&self) -> Vec<char> {
        self.slots.iter().map(|s| s.symbol).collect()
    }
}

/// Stateless distance computation.
#[derive(Debug, Default, Clone, Copy)]
pub struct DistanceEngine;

impl DistanceEngine {
    pub fn new() -> Self {
        Self
    }

    /// Compute one record for `joint` against the registry's current map.
    pub fn compute(
        &self,
        joint: Vec3,
        registry: &PoiRegistry,
        counter: u64,
        timestamp_ms: i64,
    ) -> DistanceRecord {
        let slots = registry
            .current()
            .iter()
            .filter_map(|entry| {
                let family = registry.family_of(entry.symbol)?;
                Some(DistanceSlot {
                    symbol: entry.symbol,
                    family,
                    distance: joint.squared_distance(&entry.position),
                    timestamp_ms,
                })
            })
            .collect();

        DistanceRecord {
            counter,
            timestamp_ms,
            slots,
        }
    }
}

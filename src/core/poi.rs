//! Points of interest placed by the operator.
//!
//! Each family (tires, fields) keeps a current map with at most one entry
//! per trigger symbol and an append-only history. Every write is mirrored
//! into a unified current map and history spanning both families.

use crate::collector::types::{ScreenPoint, Vec3};
use crate::config::TriggerConfig;
use std::collections::HashMap;

/// The two families of points of interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoiFamily {
    Tire,
    Field,
}

impl std::fmt::Display for PoiFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoiFamily::Tire => write!(f, "tire"),
            PoiFamily::Field => write!(f, "field"),
        }
    }
}

/// A placed point of interest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoiEntry {
    pub symbol: char,
    pub point: ScreenPoint,
    pub position: Vec3,
    pub counter: u64,
    pub timestamp_ms: i64,
}

/// Current entries keyed by symbol, iterated in last-write order.
///
/// Overwriting a symbol moves it to the end, so iteration order matches
/// the order in which the current positions were set.
#[derive(Debug, Default, Clone)]
pub struct CurrentMap {
    entries: HashMap<char, PoiEntry>,
    order: Vec<char>,
}

impl CurrentMap {
    pub fn insert(&mut self, entry: PoiEntry) {
        if self.entries.insert(entry.symbol, entry).is_some() {
            self.order.retain(|s| *s != entry.symbol);
        }
        self.order.push(entry.symbol);
    }

    pub fn get(&self, symbol: char) -> Option<&PoiEntry> {
        self.entries.get(&symbol)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Symbols in iteration order.
    pub fn symbols(&self) -> &[char] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = &PoiEntry> {
        self.order.iter().filter_map(|s| self.entries.get(s))
    }
}

/// Registry of current and historical points of interest.
#[derive(Debug)]
pub struct PoiRegistry {
    triggers: TriggerConfig,
    unified_current: CurrentMap,
    unified_history: Vec<PoiEntry>,
    tires_current: CurrentMap,
    tires_history: Vec<PoiEntry>,
    fields_current: CurrentMap,
    fields_history: Vec<PoiEntry>,
}

impl PoiRegistry {
    pub fn new(triggers: TriggerConfig) -> Self {
        Self {
            triggers,
            unified_current: CurrentMap::default(),
            unified_history: Vec::new(),
            tires_current: CurrentMap::default(),
            tires_history: Vec::new(),
            fields_current: CurrentMap::default(),
            fields_history: Vec::new(),
        }
    }

    pub fn triggers(&self) -> &TriggerConfig {
        &self.triggers
    }

    /// Family a trigger symbol belongs to, if any.
    pub fn family_of(&self, symbol: char) -> Option<PoiFamily> {
        if self.triggers.tires.contains(&symbol) {
            Some(PoiFamily::Tire)
        } else if self.triggers.fields.contains(&symbol) {
            Some(PoiFamily::Field)
        } else {
            None
        }
    }

    /// Overwrite the current entry for `symbol` and append it to history.
    ///
    /// Returns the family written, or `None` if `symbol` is not a trigger.
    pub fn set(
        &mut self,
        symbol: char,
        point: ScreenPoint,
        position: Vec3,
        counter: u64,
        timestamp_ms: i64,
    ) -> Option<PoiFamily> {
        let family = self.family_of(symbol)?;
        let entry = PoiEntry {
            symbol,
            point,
            position,
            counter,
            timestamp_ms,
        };

        let (current, history) = match family {
            PoiFamily::Tire => (&mut self.tires_current, &mut self.tires_history),
            PoiFamily::Field => (&mut self.fields_current, &mut self.fields_history),
        };
        current.insert(entry);
        history.push(entry);

        self.unified_current.insert(entry);
        self.unified_history.push(entry);

        Some(family)
    }

    /// Present unified current entries in last-write order.
    pub fn current_snapshot(&self) -> Vec<PoiEntry> {
        self.unified_current.iter().copied().collect()
    }

    pub fn current(&self) -> &CurrentMap {
        &self.unified_current
    }

    pub fn history(&self) -> &[PoiEntry] {
        &self.unified_history
    }

    pub fn family_current(&self, family: PoiFamily) -> &CurrentMap {
        match family {
            PoiFamily::Tire => &self.tires_current,
            PoiFamily::Field => &self.fields_current,
        }
    }

    pub fn family_history(&self, family: PoiFamily) -> &[PoiEntry] {
        match family {
            PoiFamily::Tire => &self.tires_history,
            PoiFamily::Field => &self.fields_history,
        }
    }
}

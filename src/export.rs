//! Session export.
//!
//! At shutdown every buffer is written to its own CSV file inside the
//! session directory. A failing table does not stop the others; all
//! failures are collected in the returned [`ExportReport`].
//!
//! # Artifacts
//!
//! | File | Columns |
//! |------|---------|
//! | `kin-sample-full.csv`, `kin-sample-hand.csv` | `pos_x, pos_y, pos_z, typ, counter, timestamp` |
//! | `kin-sample-events.csv` | `event_type, counter, timestamp` |
//! | `kin-sample-events-keys.csv` | `event_type, unicode, scancode, counter, timestamp` |
//! | `kin-sample-hand-points.csv` | `point_x, point_y, pos_x, pos_y, pos_z, counter, timestamp` |
//! | `kin-sample-{positions,tires,fields}-current.csv`, `..._all.csv` | `key, point_x, point_y, pos_x, pos_y, pos_z, counter, timestamp` |
//! | `kin-sample-distances_all.csv` | one `(key, distance, timestamp)` group per trigger symbol |
//! | `targets.csv` | `01 .. 21` |
//! | `activity-NN-<key>-<start>.csv` | same as joint samples |

use crate::config::SessionConfig;
use crate::core::classifier::ActivitySpan;
use crate::core::distance::DistanceRecord;
use crate::core::poi::{PoiEntry, PoiFamily};
use crate::core::samples::JointSample;
use crate::core::SessionState;
use crate::listener::packet::{Packet, PacketData};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const JOINT_COLUMNS: [&str; 6] = ["pos_x", "pos_y", "pos_z", "typ", "counter", "timestamp"];
pub const EVENT_COLUMNS: [&str; 3] = ["event_type", "counter", "timestamp"];
pub const KEY_COLUMNS: [&str; 5] = ["event_type", "unicode", "scancode", "counter", "timestamp"];
pub const HAND_POINT_COLUMNS: [&str; 7] = [
    "point_x", "point_y", "pos_x", "pos_y", "pos_z", "counter", "timestamp",
];
pub const POI_COLUMNS: [&str; 8] = [
    "key", "point_x", "point_y", "pos_x", "pos_y", "pos_z", "counter", "timestamp",
];

/// A table that was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSummary {
    pub name: String,
    /// Data rows, excluding the header
    pub rows: usize,
}

/// A table or global file that could not be written.
#[derive(Debug)]
pub struct ExportFailure {
    pub artifact: String,
    pub error: ExportError,
}

/// Outcome of a session export.
#[derive(Debug, Default)]
pub struct ExportReport {
    pub session_dir: PathBuf,
    pub written: Vec<ArtifactSummary>,
    pub failures: Vec<ExportFailure>,
}

impl ExportReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Row count of a written artifact.
    pub fn rows(&self, name: &str) -> Option<usize> {
        self.written.iter().find(|a| a.name == name).map(|a| a.rows)
    }

    /// Fold in artifacts written earlier in the session.
    pub fn absorb(&mut self, earlier: ExportReport) {
        self.written.extend(earlier.written);
        self.failures.extend(earlier.failures);
    }
}

/// Errors that can occur while writing an artifact.
#[derive(Debug)]
pub enum ExportError {
    Io(std::io::Error),
    Csv(csv::Error),
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::Io(e) => write!(f, "IO error: {e}"),
            ExportError::Csv(e) => write!(f, "CSV error: {e}"),
        }
    }
}

impl std::error::Error for ExportError {}

impl From<std::io::Error> for ExportError {
    fn from(e: std::io::Error) -> Self {
        ExportError::Io(e)
    }
}

impl From<csv::Error> for ExportError {
    fn from(e: csv::Error) -> Self {
        ExportError::Csv(e)
    }
}

/// Writes a session's state to its directory.
pub struct SessionExporter {
    session: SessionConfig,
}

impl SessionExporter {
    pub fn new(session: SessionConfig) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionConfig {
        &self.session
    }

    /// Create the session directory and its `plots` subdirectory.
    pub fn prepare(&self) -> Result<PathBuf, ExportError> {
        std::fs::create_dir_all(self.session.plots_dir())?;
        Ok(self.session.session_dir())
    }

    /// Write every artifact. Never stops early.
    pub fn export(&self, state: &SessionState) -> ExportReport {
        let dir = self.session.session_dir();
        let mut report = ExportReport {
            session_dir: dir.clone(),
            ..ExportReport::default()
        };

        if let Err(e) = std::fs::create_dir_all(&dir) {
            // Each table below will report its own failure too.
            warn!(dir = %dir.display(), error = %e, "Could not create session directory");
        }

        let samples = state.samples();
        let registry = state.registry();

        for (name, rows) in [
            ("kin-sample-hand.csv", samples.hand()),
            ("kin-sample-full.csv", samples.full()),
        ] {
            record(&mut report, name, write_joint_samples(&dir.join(name), rows));
        }

        record(
            &mut report,
            "kin-sample-events.csv",
            write_rows(
                &dir.join("kin-sample-events.csv"),
                &EVENT_COLUMNS,
                samples
                    .screen_events()
                    .iter()
                    .map(|e| (e.event_type, e.counter, e.timestamp_ms)),
            ),
        );

        record(
            &mut report,
            "kin-sample-events-keys.csv",
            write_rows(
                &dir.join("kin-sample-events-keys.csv"),
                &KEY_COLUMNS,
                samples.key_events().iter().map(|e| {
                    (e.event_type, e.unicode.as_str(), e.scancode, e.counter, e.timestamp_ms)
                }),
            ),
        );

        record(
            &mut report,
            "kin-sample-hand-points.csv",
            write_rows(
                &dir.join("kin-sample-hand-points.csv"),
                &HAND_POINT_COLUMNS,
                samples.hand_tips().iter().map(|s| {
                    (
                        s.point.x,
                        s.point.y,
                        s.position.x,
                        s.position.y,
                        s.position.z,
                        s.counter,
                        s.timestamp_ms,
                    )
                }),
            ),
        );

        let current: Vec<PoiEntry> = registry.current().iter().copied().collect();
        let tires: Vec<PoiEntry> = registry
            .family_current(PoiFamily::Tire)
            .iter()
            .copied()
            .collect();
        let fields: Vec<PoiEntry> = registry
            .family_current(PoiFamily::Field)
            .iter()
            .copied()
            .collect();

        let poi_tables: [(&str, &[PoiEntry]); 6] = [
            ("kin-sample-positions-current.csv", current.as_slice()),
            ("kin-sample-positions_all.csv", registry.history()),
            ("kin-sample-tires-current.csv", tires.as_slice()),
            ("kin-sample-tires_all.csv", registry.family_history(PoiFamily::Tire)),
            ("kin-sample-fields-current.csv", fields.as_slice()),
            ("kin-sample-fields_all.csv", registry.family_history(PoiFamily::Field)),
        ];
        for (name, entries) in poi_tables {
            record(&mut report, name, write_poi_entries(&dir.join(name), entries));
        }

        let triggers = registry.triggers();
        let layout = DistanceLayout::new(&triggers.tires, &triggers.fields);
        record(
            &mut report,
            "kin-sample-distances_all.csv",
            write_distances(
                &dir.join("kin-sample-distances_all.csv"),
                &layout,
                state.distances(),
            ),
        );

        record(
            &mut report,
            "targets.csv",
            write_targets(&dir.join("targets.csv"), &self.session.targets),
        );

        for span in state.classifier().spans_for_export() {
            self.write_activity(span, &mut report);
        }

        record(
            &mut report,
            "session_names.csv",
            append_text(&self.session.session_index_path(), &format!(",{}", self.session.dir_name)),
        );
        record(
            &mut report,
            "notes.csv",
            append_text(&self.session.notes_path(), &format!("\n{}: ", self.session.dir_name)),
        );

        if report.is_complete() {
            info!(dir = %dir.display(), artifacts = report.written.len(), "Session exported");
        }
        report
    }

    /// Write one activity span to its own table and note the result in `report`.
    pub fn write_activity(&self, span: &ActivitySpan, report: &mut ExportReport) {
        let name = activity_file_name(span);
        let path = self.session.session_dir().join(&name);
        record(report, &name, write_joint_samples(&path, &span.samples));
    }
}

/// File name of an activity span's table.
pub fn activity_file_name(span: &ActivitySpan) -> String {
    let key = if span.symbol.is_ascii_alphanumeric() {
        span.symbol.to_string()
    } else {
        format!("u{:04x}", span.symbol as u32)
    };
    let suffix = if span.is_complete() { "" } else { "-open" };
    format!("activity-{:02}-{}-{}{}.csv", span.index, key, span.started_ms, suffix)
}

fn record(report: &mut ExportReport, name: &str, result: Result<usize, ExportError>) {
    match result {
        Ok(rows) => report.written.push(ArtifactSummary {
            name: name.to_string(),
            rows,
        }),
        Err(error) => {
            warn!(artifact = name, error = %error, "Failed to write artifact");
            report.failures.push(ExportFailure {
                artifact: name.to_string(),
                error,
            });
        }
    }
}

fn write_rows<R, I>(path: &Path, header: &[&str], rows: I) -> Result<usize, ExportError>
where
    R: serde::Serialize,
    I: IntoIterator<Item = R>,
{
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(header)?;
    let mut count = 0;
    for row in rows {
        writer.serialize(row)?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}

fn write_joint_samples(path: &Path, samples: &[JointSample]) -> Result<usize, ExportError> {
    write_rows(
        path,
        &JOINT_COLUMNS,
        samples.iter().map(|s| {
            (
                s.position.x,
                s.position.y,
                s.position.z,
                s.joint.name(),
                s.counter,
                s.timestamp_ms,
            )
        }),
    )
}

fn write_poi_entries(path: &Path, entries: &[PoiEntry]) -> Result<usize, ExportError> {
    write_rows(
        path,
        &POI_COLUMNS,
        entries.iter().map(|e| {
            (
                e.symbol.to_string(),
                e.point.x,
                e.point.y,
                e.position.x,
                e.position.y,
                e.position.z,
                e.counter,
                e.timestamp_ms,
            )
        }),
    )
}

/// Fixed column binding of distance slots, decided at export time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistanceLayout {
    groups: Vec<(char, [String; 3])>,
}

impl DistanceLayout {
    /// Tires map to `tireN/distanceN/timestampN`, fields to
    /// `fieldN/distance_fieldN/timestamp_fieldN`, in trigger order.
    pub fn new(tires: &[char], fields: &[char]) -> Self {
        let mut groups = Vec::with_capacity(tires.len() + fields.len());
        for (i, &symbol) in tires.iter().enumerate() {
            let n = i + 1;
            groups.push((
                symbol,
                [format!("tire{n}"), format!("distance{n}"), format!("timestamp{n}")],
            ));
        }
        for (i, &symbol) in fields.iter().enumerate() {
            let n = i + 1;
            groups.push((
                symbol,
                [
                    format!("field{n}"),
                    format!("distance_field{n}"),
                    format!("timestamp_field{n}"),
                ],
            ));
        }
        Self { groups }
    }

    pub fn header(&self) -> Vec<&str> {
        self.groups
            .iter()
            .flat_map(|(_, names)| names.iter().map(String::as_str))
            .collect()
    }

    /// Materialize a sparse record. Absent slots become empty cells.
    pub fn row(&self, record: &DistanceRecord) -> Vec<String> {
        let mut row = Vec::with_capacity(self.groups.len() * 3);
        for (symbol, _) in &self.groups {
            match record.get(*symbol) {
                Some(slot) => {
                    row.push(slot.symbol.to_string());
                    row.push(slot.distance.to_string());
                    row.push(slot.timestamp_ms.to_string());
                }
                None => row.extend(std::iter::repeat(String::new()).take(3)),
            }
        }
        row
    }
}

fn write_distances(
    path: &Path,
    layout: &DistanceLayout,
    records: &[DistanceRecord],
) -> Result<usize, ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(layout.header())?;
    for record in records {
        writer.write_record(layout.row(record))?;
    }
    writer.flush()?;
    Ok(records.len())
}

fn write_targets(path: &Path, targets: &[String]) -> Result<usize, ExportError> {
    let header: Vec<String> = (1..=targets.len()).map(|i| format!("{i:02}")).collect();
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(&header)?;
    writer.write_record(targets)?;
    writer.flush()?;
    Ok(1)
}

fn append_text(path: &Path, text: &str) -> Result<usize, ExportError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(text.as_bytes())?;
    Ok(1)
}

/// Union of every packet variant's fields; cells a variant lacks stay empty.
pub const PACKET_COLUMNS: [&str; 13] = [
    "type",
    "timestamp_sensor",
    "timestamp",
    "switch_pressed",
    "battery_percent",
    "battery_millivolts",
    "acc_x",
    "acc_y",
    "acc_z",
    "gyro_x",
    "gyro_y",
    "gyro_z",
    "counter",
];

/// Write received sensor packets as one table.
pub fn write_packets(path: &Path, packets: &[Packet]) -> Result<usize, ExportError> {
    write_rows(path, &PACKET_COLUMNS, packets.iter().map(packet_row))
}

fn packet_row(packet: &Packet) -> Vec<String> {
    let mut row = vec![String::new(); PACKET_COLUMNS.len()];
    row[0] = packet.kind().as_str().to_string();
    row[1] = packet.timestamp_sensor.to_string();
    row[2] = packet.timestamp.to_string();
    match packet.data {
        PacketData::Switch { switch_pressed } => row[3] = switch_pressed.to_string(),
        PacketData::Battery {
            battery_percent,
            battery_millivolts,
        } => {
            row[4] = battery_percent.to_string();
            row[5] = battery_millivolts.to_string();
        }
        PacketData::Fused {
            acc_x,
            acc_y,
            acc_z,
            gyro_x,
            gyro_y,
            gyro_z,
            counter,
        } => {
            for (cell, value) in row[6..12]
                .iter_mut()
                .zip([acc_x, acc_y, acc_z, gyro_x, gyro_y, gyro_z])
            {
                *cell = value.to_string();
            }
            row[12] = counter.to_string();
        }
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::distance::DistanceSlot;

    #[test]
    fn test_default_layout_header() {
        let layout = DistanceLayout::new(&['1', '2'], &['3', '4', '5']);
        let header = layout.header();
        assert_eq!(
            &header[..12],
            &[
                "tire1",
                "distance1",
                "timestamp1",
                "tire2",
                "distance2",
                "timestamp2",
                "field1",
                "distance_field1",
                "timestamp_field1",
                "field2",
                "distance_field2",
                "timestamp_field2",
            ]
        );
        assert_eq!(&header[12..], &["field3", "distance_field3", "timestamp_field3"]);
    }

    #[test]
    fn test_sparse_row_leaves_absent_slots_empty() {
        let layout = DistanceLayout::new(&['1', '2'], &['3']);
        let record = DistanceRecord {
            counter: 0,
            timestamp_ms: 50,
            slots: vec![DistanceSlot {
                symbol: '3',
                family: PoiFamily::Field,
                distance: 9.0,
                timestamp_ms: 50,
            }],
        };
        let row = layout.row(&record);
        assert_eq!(row.len(), 9);
        assert!(row[..6].iter().all(String::is_empty));
        assert_eq!(&row[6..], &["3", "9", "50"]);
    }

    #[test]
    fn test_activity_file_names() {
        let mut span = ActivitySpan {
            index: 1,
            symbol: 'a',
            started_counter: 0,
            started_ms: 1234,
            ended_ms: Some(2000),
            samples: Vec::new(),
        };
        assert_eq!(activity_file_name(&span), "activity-01-a-1234.csv");
        span.index = 3;
        span.ended_ms = None;
        span.symbol = '/';
        assert_eq!(activity_file_name(&span), "activity-03-u002f-1234-open.csv");
    }

    #[test]
    fn test_packet_row_fills_only_its_columns() {
        let packet = Packet {
            timestamp_sensor: 1.5,
            timestamp: 10.0,
            data: PacketData::Battery {
                battery_percent: 80.0,
                battery_millivolts: 3700.0,
            },
        };
        let row = packet_row(&packet);
        assert_eq!(row.len(), PACKET_COLUMNS.len());
        assert_eq!(&row[..3], &["battery", "1.5", "10"]);
        assert_eq!(&row[4..6], &["80", "3700"]);
        assert!(row[3].is_empty());
        assert!(row[6..].iter().all(String::is_empty));
    }
}

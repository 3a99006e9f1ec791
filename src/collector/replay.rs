//! Replay of a captured session from a JSON Lines file.
//!
//! Each line is one tagged record:
//!
//! ```text
//! {"record":"event","kind":"key_down","symbol":"1","scancode":30,"timestamp_ms":1700000000000}
//! {"record":"frame","timestamp_ms":1700000000016,"bodies":[...]}
//! ```
//!
//! Events preceding a frame are delivered on the iteration that delivers
//! that frame, so key presses land before the frame they were issued on.

use crate::collector::types::{BodyFrame, InputEvent};
use crate::collector::{CollectorError, TrackingSource};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::BufRead;
use std::path::Path;

/// One line of a capture file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum ReplayRecord {
    Event(InputEvent),
    Frame(BodyFrame),
}

/// A [`TrackingSource`] backed by pre-recorded records.
pub struct ReplaySource {
    pending: VecDeque<ReplayRecord>,
}

impl ReplaySource {
    /// Build a replay from records already in memory.
    pub fn from_records(records: impl IntoIterator<Item = ReplayRecord>) -> Self {
        Self {
            pending: records.into_iter().collect(),
        }
    }

    /// Parse a capture from any buffered reader. Blank lines are skipped.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, CollectorError> {
        let mut pending = VecDeque::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: ReplayRecord =
                serde_json::from_str(&line).map_err(|e| CollectorError::Parse {
                    line: idx + 1,
                    message: e.to_string(),
                })?;
            pending.push_back(record);
        }
        Ok(Self { pending })
    }

    /// Open a capture file.
    pub fn open(path: &Path) -> Result<Self, CollectorError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Number of records not yet delivered.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl TrackingSource for ReplaySource {
    fn poll_input(&mut self) -> Result<Vec<InputEvent>, CollectorError> {
        let mut events = Vec::new();
        while let Some(ReplayRecord::Event(_)) = self.pending.front() {
            if let Some(ReplayRecord::Event(event)) = self.pending.pop_front() {
                events.push(event);
            }
        }
        Ok(events)
    }

    fn poll_frame(&mut self) -> Result<Option<BodyFrame>, CollectorError> {
        match self.pending.front() {
            Some(ReplayRecord::Frame(_)) => match self.pending.pop_front() {
                Some(ReplayRecord::Frame(frame)) => Ok(Some(frame)),
                _ => Ok(None),
            },
            _ => Ok(None),
        }
    }

    fn is_exhausted(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::{synthetic_body, Vec3};
    use std::io::Cursor;

    #[test]
    fn test_events_are_delivered_before_their_frame() {
        let frame = BodyFrame {
            timestamp_ms: 20,
            bodies: vec![synthetic_body(Vec3::default())],
        };
        let mut source = ReplaySource::from_records(vec![
            ReplayRecord::Event(InputEvent::key_down('a', 4, 10)),
            ReplayRecord::Event(InputEvent::key_up('a', 4, 15)),
            ReplayRecord::Frame(frame.clone()),
        ]);

        // Frame is not reachable until the events are drained.
        assert_eq!(source.poll_frame().unwrap(), None);
        assert_eq!(source.poll_input().unwrap().len(), 2);
        assert_eq!(source.poll_frame().unwrap(), Some(frame));
        assert!(source.is_exhausted());
    }

    #[test]
    fn test_parse_capture_lines() {
        let text = concat!(
            "{\"record\":\"event\",\"kind\":\"key_down\",\"symbol\":\"1\",\"scancode\":30,\"timestamp_ms\":5}\n",
            "\n",
            "{\"record\":\"frame\",\"timestamp_ms\":16,\"bodies\":[]}\n",
        );
        let mut source = ReplaySource::from_reader(Cursor::new(text)).unwrap();
        assert_eq!(source.remaining(), 2);
        let events = source.poll_input().unwrap();
        assert_eq!(events, vec![InputEvent::key_down('1', 30, 5)]);
        let frame = source.poll_frame().unwrap().unwrap();
        assert_eq!(frame.timestamp_ms, 16);
    }

    #[test]
    fn test_parse_error_reports_line() {
        let text = "{\"record\":\"frame\",\"timestamp_ms\":16,\"bodies\":[]}\nnot json\n";
        match ReplaySource::from_reader(Cursor::new(text)) {
            Err(CollectorError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected result: {:?}", other.map(|s| s.remaining())),
        }
    }
}

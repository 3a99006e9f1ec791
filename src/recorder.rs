//! The recording loop.
//!
//! Each iteration drains pending input, classifies it, processes the
//! latest body frame and hands the overlay to the optional sink. The loop
//! is rate-limited by a [`FrameClock`]. An activity span is written as soon
//! as it closes and its samples are released. When the loop ends, for
//! whatever reason, the rest of the session is exported exactly once.

use crate::collector::TrackingSource;
use crate::config::Config;
use crate::core::{EventOutcome, FrameOutcome, OverlaySink, SessionState};
use crate::export::{ExportReport, SessionExporter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Blocks so that consecutive ticks are at least `interval` apart.
#[derive(Debug)]
pub struct FrameClock {
    interval: Duration,
    last: Option<Instant>,
}

impl FrameClock {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Wait out the rest of the current interval. Returns the time slept.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let slept = match self.last {
            Some(last) => {
                let wait = self.interval.saturating_sub(now.duration_since(last));
                if !wait.is_zero() {
                    thread::sleep(wait);
                }
                wait
            }
            None => Duration::ZERO,
        };
        self.last = Some(Instant::now());
        slept
    }
}

/// Why the loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    Quit,
    SourceExhausted,
    Interrupted,
    SourceError(String),
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::Quit => write!(f, "quit requested"),
            ExitReason::SourceExhausted => write!(f, "source exhausted"),
            ExitReason::Interrupted => write!(f, "interrupted"),
            ExitReason::SourceError(e) => write!(f, "source error: {e}"),
        }
    }
}

/// What a finished session did.
#[derive(Debug)]
pub struct RecorderSummary {
    pub exit: ExitReason,
    pub iterations: u64,
    pub frames_processed: u64,
    /// Frames without a subject or with missing joints
    pub frames_skipped: u64,
    pub events: u64,
    /// `None` when CSV output is disabled
    pub export: Option<ExportReport>,
}

impl RecorderSummary {
    fn empty() -> Self {
        Self {
            exit: ExitReason::Interrupted,
            iterations: 0,
            frames_processed: 0,
            frames_skipped: 0,
            events: 0,
            export: None,
        }
    }
}

/// Drives one recording session.
pub struct Recorder<S: TrackingSource> {
    source: S,
    state: SessionState,
    exporter: SessionExporter,
    write_csv: bool,
    clock: FrameClock,
    sink: Option<Box<dyn OverlaySink>>,
    /// Activity tables written while recording
    flushed: ExportReport,
}

impl<S: TrackingSource> Recorder<S> {
    pub fn new(source: S, state: SessionState, exporter: SessionExporter, config: &Config) -> Self {
        Self {
            source,
            state,
            exporter,
            write_csv: config.write_csv,
            clock: FrameClock::new(config.frame_interval()),
            sink: None,
            flushed: ExportReport::default(),
        }
    }

    /// Attach a sink that receives every frame's overlay.
    pub fn with_sink(mut self, sink: impl OverlaySink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Run until quit, interruption, source exhaustion or a source error.
    pub fn run(mut self, running: Arc<AtomicBool>) -> RecorderSummary {
        if self.write_csv {
            match self.exporter.prepare() {
                Ok(dir) => info!(dir = %dir.display(), "Recording session"),
                Err(e) => warn!(error = %e, "Could not create session directory"),
            }
        }

        let mut summary = RecorderSummary::empty();

        summary.exit = loop {
            if !running.load(Ordering::SeqCst) {
                break ExitReason::Interrupted;
            }
            let outcome = self.step(&mut summary);
            self.flush_activities();
            match outcome {
                Ok(Some(reason)) => break reason,
                Ok(None) => {}
                Err(e) => {
                    error!(error = %e, "Tracking source failed, ending session");
                    break ExitReason::SourceError(e.to_string());
                }
            }
            summary.iterations += 1;
            self.clock.tick();
        };

        info!(
            reason = %summary.exit,
            frames = summary.frames_processed,
            events = summary.events,
            "Recording stopped"
        );

        if self.write_csv {
            let mut report = self.exporter.export(&self.state);
            report.absorb(std::mem::take(&mut self.flushed));
            summary.export = Some(report);
        }
        summary
    }

    /// Write every activity span that closed during the last step.
    fn flush_activities(&mut self) {
        for span in self.state.take_completed_activities() {
            if self.write_csv {
                self.exporter.write_activity(&span, &mut self.flushed);
            } else {
                debug!(index = span.index, samples = span.samples.len(), "Activity discarded");
            }
        }
    }

    /// One loop iteration. Returns an exit reason when the loop should end.
    fn step(
        &mut self,
        summary: &mut RecorderSummary,
    ) -> Result<Option<ExitReason>, crate::collector::CollectorError> {
        let mut quit = false;
        for event in self.source.poll_input()? {
            summary.events += 1;
            if self.state.handle_event(&event) == EventOutcome::Quit {
                quit = true;
            }
        }

        if let Some(frame) = self.source.poll_frame()? {
            match self.state.process_frame(&frame) {
                FrameOutcome::Processed { counter, overlay } => {
                    summary.frames_processed += 1;
                    if overlay.skipped > 0 {
                        debug!(counter, skipped = overlay.skipped, "Overlay primitives skipped");
                    }
                    if let Some(sink) = self.sink.as_mut() {
                        sink.present(&overlay);
                    }
                }
                FrameOutcome::NoSubject | FrameOutcome::Incomplete { .. } => {
                    summary.frames_skipped += 1;
                }
            }
        }

        if quit {
            return Ok(Some(ExitReason::Quit));
        }
        if self.source.is_exhausted() {
            return Ok(Some(ExitReason::SourceExhausted));
        }
        Ok(None)
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::{synthetic_body, BodyFrame, InputEvent, InputKind, Vec3};
    use crate::collector::{CollectorError, ReplayRecord, ReplaySource};
    use crate::config::{SessionConfig, TriggerConfig};
    use crate::core::Overlay;
    use chrono::Local;
    use std::sync::Mutex;

    fn test_config() -> Config {
        Config {
            frame_rate_hz: 10_000,
            write_csv: false,
            ..Config::default()
        }
    }

    fn recorder<S: TrackingSource>(source: S) -> Recorder<S> {
        let config = test_config();
        let state = SessionState::new(
            TriggerConfig::default(),
            config.tracked_joint,
            config.hand_tip_joint,
        );
        let exporter = SessionExporter::new(SessionConfig::new(
            std::env::temp_dir(),
            Local::now(),
        ));
        Recorder::new(source, state, exporter, &config)
    }

    fn frame(ts: i64) -> ReplayRecord {
        ReplayRecord::Frame(BodyFrame {
            timestamp_ms: ts,
            bodies: vec![synthetic_body(Vec3::default())],
        })
    }

    #[test]
    fn test_frame_clock_limits_rate() {
        let mut clock = FrameClock::new(Duration::from_millis(10));
        let start = Instant::now();
        for _ in 0..4 {
            clock.tick();
        }
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_runs_until_source_exhausted() {
        let source = ReplaySource::from_records(vec![
            frame(0),
            ReplayRecord::Event(InputEvent::key_down('1', 2, 5)),
            frame(16),
            frame(32),
        ]);
        let summary = recorder(source).run(Arc::new(AtomicBool::new(true)));

        assert_eq!(summary.exit, ExitReason::SourceExhausted);
        assert_eq!(summary.frames_processed, 3);
        assert_eq!(summary.events, 1);
        assert!(summary.export.is_none());
    }

    #[test]
    fn test_quit_ends_loop() {
        let source = ReplaySource::from_records(vec![
            frame(0),
            ReplayRecord::Event(InputEvent::new(InputKind::Quit, 10)),
            frame(16),
        ]);
        let summary = recorder(source).run(Arc::new(AtomicBool::new(true)));
        assert_eq!(summary.exit, ExitReason::Quit);
        // the frame polled in the quitting iteration is still processed
        assert_eq!(summary.frames_processed, 2);
        assert_eq!(summary.iterations, 1);
    }

    #[test]
    fn test_events_after_quit_in_same_batch_are_handled() {
        let mut recorder = recorder(ReplaySource::from_records(vec![
            frame(0),
            ReplayRecord::Event(InputEvent::new(InputKind::Quit, 10)),
            ReplayRecord::Event(InputEvent::key_down('1', 2, 12)),
            frame(16),
            frame(32),
        ]));
        let mut summary = RecorderSummary::empty();

        assert_eq!(recorder.step(&mut summary).unwrap(), None);
        assert_eq!(recorder.step(&mut summary).unwrap(), Some(ExitReason::Quit));
        assert_eq!(summary.events, 2);
        assert_eq!(summary.frames_processed, 2);
        assert_eq!(recorder.state().samples().key_events().len(), 1);
        assert!(recorder.state().registry().current().get('1').is_some());
    }

    #[test]
    fn test_closed_activity_is_written_before_shutdown() {
        let root = std::env::temp_dir().join(format!("motion-recorder-{}", uuid::Uuid::new_v4()));
        let config = Config {
            write_csv: true,
            ..test_config()
        };
        let state = SessionState::new(
            TriggerConfig::default(),
            config.tracked_joint,
            config.hand_tip_joint,
        );
        let mut session = SessionConfig::new(&root, Local::now());
        session.dir_name = "activity-flush".to_string();
        let dir = session.session_dir();
        let exporter = SessionExporter::new(session);
        exporter.prepare().unwrap();

        let mut recorder = Recorder::new(
            ReplaySource::from_records(vec![
                ReplayRecord::Event(InputEvent::key_down('w', 17, 0)),
                frame(16),
                frame(32),
                frame(48),
                ReplayRecord::Event(InputEvent::key_up('w', 17, 60)),
                frame(64),
            ]),
            state,
            exporter,
            &config,
        );
        let mut summary = RecorderSummary::empty();
        for _ in 0..4 {
            recorder.step(&mut summary).unwrap();
            recorder.flush_activities();
        }

        assert!(recorder.state().classifier().completed().is_empty());
        assert!(recorder.state().classifier().spans_for_export().is_empty());
        let written = dir.join("activity-01-w-0.csv");
        assert!(written.is_file());
        assert_eq!(recorder.flushed.rows("activity-01-w-0.csv"), Some(75));

        let summary = recorder.run(Arc::new(AtomicBool::new(true)));
        let report = summary.export.unwrap();
        let activities: Vec<_> = report
            .written
            .iter()
            .filter(|a| a.name.starts_with("activity-"))
            .collect();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].rows, 75);

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_cleared_flag_interrupts() {
        let source = ReplaySource::from_records(vec![frame(0)]);
        let summary = recorder(source).run(Arc::new(AtomicBool::new(false)));
        assert_eq!(summary.exit, ExitReason::Interrupted);
        assert_eq!(summary.iterations, 0);
    }

    struct FailingSource;

    impl TrackingSource for FailingSource {
        fn poll_input(&mut self) -> Result<Vec<InputEvent>, CollectorError> {
            Err(CollectorError::Disconnected)
        }

        fn poll_frame(&mut self) -> Result<Option<BodyFrame>, CollectorError> {
            Ok(None)
        }

        fn is_exhausted(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_source_error_ends_session() {
        let summary = recorder(FailingSource).run(Arc::new(AtomicBool::new(true)));
        assert!(matches!(summary.exit, ExitReason::SourceError(_)));
    }

    struct CountingSink(Arc<Mutex<usize>>);

    impl OverlaySink for CountingSink {
        fn present(&mut self, overlay: &Overlay) {
            assert!(!overlay.segments.is_empty());
            *self.0.lock().unwrap() += 1;
        }
    }

    #[test]
    fn test_sink_receives_each_processed_frame() {
        let count = Arc::new(Mutex::new(0));
        let source = ReplaySource::from_records(vec![frame(0), frame(16)]);
        recorder(source)
            .with_sink(CountingSink(Arc::clone(&count)))
            .run(Arc::new(AtomicBool::new(true)));
        assert_eq!(*count.lock().unwrap(), 2);
    }
}

//! The sampling loop.
//!
//! `Orchestrator` pulls frames from a `FrameSource`, runs the detector on
//! every Nth frame, feeds the result to `EventDetector` and hands each event
//! to the annotate → compress → dispatch chain.
//!
//! Everything per-frame is caught and logged, panics included. Only a source
//! that cannot be opened at startup ends `run` with an error.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

use crate::clock::Clock;
use crate::config::Config;
use crate::detect::{Detection, ObjectDetector};
use crate::dispatch::{EventPayload, EventSink};
use crate::error::PipelineError;
use crate::events::EventDetector;
use crate::frame::{Frame, FrameSource};
use crate::imaging::EventImageStore;
use crate::Event;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Loop parameters, usually derived from `Config`.
#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub camera_index: u32,
    pub sample_every_n_frames: u64,
    pub confidence_threshold: f32,
    pub cooldown: Duration,
    pub concurrent_dispatch: bool,
    /// Stop after this many frames have been read.
    pub max_frames: Option<u64>,
    pub skip_health_check: bool,
}

impl PipelineSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            camera_index: cfg.camera.index,
            sample_every_n_frames: cfg.events.sample_every_n_frames.max(1),
            confidence_threshold: cfg.detection.confidence_threshold,
            cooldown: cfg.events.cooldown,
            concurrent_dispatch: cfg.events.concurrent_dispatch,
            max_frames: None,
            skip_health_check: false,
        }
    }
}

/// Cross-thread stop request, checked between frames.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrchestratorState {
    Running,
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    FrameLimit,
    SourceExhausted,
    SourceFailed,
    StartupFailed,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames_read: u64,
    pub frames_sampled: u64,
    pub detection_errors: u64,
    /// Sampled frames whose processing panicked.
    pub frames_panicked: u64,
    pub events_emitted: u64,
    pub images_saved: u64,
    pub storage_errors: u64,
    pub dispatch_ok: u64,
    pub dispatch_failed: u64,
}

/// Releases the wrapped source exactly once, on request or on drop.
struct SourceGuard {
    source: Box<dyn FrameSource>,
    released: bool,
}

impl SourceGuard {
    fn new(source: Box<dyn FrameSource>) -> Self {
        Self {
            source,
            released: false,
        }
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.source.release();
            log::info!("released frame source {}", self.source.describe());
        }
    }
}

impl Drop for SourceGuard {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct HandleOutcome {
    image_saved: bool,
    storage_failed: bool,
    delivered: bool,
}

/// The per-event chain. Shared by reference across dispatch threads.
struct EventHandler {
    store: Option<EventImageStore>,
    sink: Box<dyn EventSink>,
    camera_index: u32,
}

impl EventHandler {
    fn handle(
        &self,
        frame: &Frame,
        detections: &[Detection],
        event: &Event,
        at: DateTime<Local>,
    ) -> HandleOutcome {
        log::info!("event detected: {} ({})", event.event_type, event.description);
        let mut outcome = HandleOutcome::default();

        let image_path = match &self.store {
            Some(store) => match store.save(frame, detections, event.event_type, at) {
                Ok(path) => {
                    outcome.image_saved = true;
                    Some(path)
                }
                Err(err) => {
                    log::warn!("{} event image not saved: {}", event.event_type, err);
                    outcome.storage_failed = true;
                    None
                }
            },
            None => None,
        };

        let payload = EventPayload::new(event, detections, self.camera_index, at);
        outcome.delivered = self.sink.send(payload, image_path.as_deref());
        outcome
    }
}

pub struct Orchestrator {
    settings: PipelineSettings,
    source: SourceGuard,
    detector: Box<dyn ObjectDetector>,
    events: EventDetector,
    handler: EventHandler,
    state: OrchestratorState,
    stop_reason: Option<StopReason>,
    stats: LoopStats,
    stop: StopHandle,
}

impl Orchestrator {
    /// `store` may be `None` when the image directory is unusable; events
    /// are then sent without images.
    pub fn new(
        settings: PipelineSettings,
        source: Box<dyn FrameSource>,
        detector: Box<dyn ObjectDetector>,
        store: Option<EventImageStore>,
        sink: Box<dyn EventSink>,
    ) -> Self {
        let events = EventDetector::new(settings.cooldown);
        let handler = EventHandler {
            store,
            sink,
            camera_index: settings.camera_index,
        };
        Self {
            settings,
            source: SourceGuard::new(source),
            detector,
            events,
            handler,
            state: OrchestratorState::Running,
            stop_reason: None,
            stats: LoopStats::default(),
            stop: StopHandle::new(),
        }
    }

    /// Drive cooldowns from `clock` instead of the process monotonic clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.events = EventDetector::with_clock(self.settings.cooldown, clock);
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    /// Run until stopped. The source is released before this returns, on
    /// every path.
    pub fn run(&mut self) -> Result<LoopStats, PipelineError> {
        let result = self.start().map(|()| self.run_loop());
        self.state = OrchestratorState::Stopped;
        self.source.release();
        log::info!(
            "loop stopped ({:?}): frames={} sampled={} events={} sent={} failed={}",
            self.stop_reason,
            self.stats.frames_read,
            self.stats.frames_sampled,
            self.stats.events_emitted,
            self.stats.dispatch_ok,
            self.stats.dispatch_failed
        );
        result.map(|()| self.stats.clone())
    }

    fn start(&mut self) -> Result<(), PipelineError> {
        if self.settings.skip_health_check {
            log::info!("collector health check skipped");
        } else if !self.handler.sink.health_check() {
            log::warn!("collector unreachable at startup; events will be dropped until it is up");
        }

        let description = self.source.source.describe();
        if let Err(err) = self.source.source.connect() {
            self.stop_reason = Some(StopReason::StartupFailed);
            log::error!("cannot open frame source {}: {:#}", description, err);
            return Err(PipelineError::device(format!("{}: {:#}", description, err)));
        }

        if let Err(err) = self.detector.warm_up() {
            log::warn!("detector {} warm-up failed: {:#}", self.detector.name(), err);
        }
        log::info!(
            "monitoring {} with detector {} (every {} frames, cooldown {:?})",
            description,
            self.detector.name(),
            self.settings.sample_every_n_frames,
            self.settings.cooldown
        );
        Ok(())
    }

    fn run_loop(&mut self) {
        let mut last_health_log = Instant::now();
        let sample_every = self.settings.sample_every_n_frames.max(1);

        let reason = loop {
            if self.stop.is_stopped() {
                break StopReason::Requested;
            }
            if self
                .settings
                .max_frames
                .is_some_and(|limit| self.stats.frames_read >= limit)
            {
                break StopReason::FrameLimit;
            }

            let frame = match self.source.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    log::info!("frame source exhausted");
                    break StopReason::SourceExhausted;
                }
                Err(err) => {
                    log::error!("failed to read frame: {:#}", err);
                    break StopReason::SourceFailed;
                }
            };
            self.stats.frames_read += 1;

            if self.stats.frames_read % sample_every == 0 {
                let processed =
                    panic::catch_unwind(AssertUnwindSafe(|| self.process_frame(&frame)));
                if processed.is_err() {
                    self.stats.frames_panicked += 1;
                    log::error!("frame {} processing panicked, continuing", frame.index);
                }
            }

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                log::info!(
                    "source health={} frames={} sampled={} events={} sent={} failed={}",
                    self.source.source.is_healthy(),
                    self.stats.frames_read,
                    self.stats.frames_sampled,
                    self.stats.events_emitted,
                    self.stats.dispatch_ok,
                    self.stats.dispatch_failed
                );
                last_health_log = Instant::now();
            }
        };
        self.stop_reason = Some(reason);
    }

    fn process_frame(&mut self, frame: &Frame) {
        self.stats.frames_sampled += 1;

        let detections = match self.detect(frame) {
            Ok(detections) => detections,
            Err(err) => {
                self.stats.detection_errors += 1;
                log::warn!("frame {} skipped: {}", frame.index, err);
                return;
            }
        };
        log::debug!("frame {}: {} detections", frame.index, detections.len());

        let events = self.events.detect_now(&detections);
        if events.is_empty() {
            return;
        }
        self.stats.events_emitted += events.len() as u64;

        let at = Local::now();
        let outcomes = if self.settings.concurrent_dispatch && events.len() > 1 {
            let handler = &self.handler;
            let detections = &detections;
            std::thread::scope(|scope| {
                let handles: Vec<_> = events
                    .iter()
                    .map(|event| scope.spawn(move || handler.handle(frame, detections, event, at)))
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| {
                        handle.join().unwrap_or_else(|_| {
                            log::error!("event dispatch thread panicked");
                            HandleOutcome::default()
                        })
                    })
                    .collect::<Vec<_>>()
            })
        } else {
            events
                .iter()
                .map(|event| self.handler.handle(frame, &detections, event, at))
                .collect()
        };

        for outcome in outcomes {
            self.stats.images_saved += outcome.image_saved as u64;
            self.stats.storage_errors += outcome.storage_failed as u64;
            if outcome.delivered {
                self.stats.dispatch_ok += 1;
            } else {
                self.stats.dispatch_failed += 1;
            }
        }
    }

    /// Run the detector, reject malformed output, drop low-confidence hits.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, PipelineError> {
        let raw = self
            .detector
            .detect(frame)
            .map_err(|e| PipelineError::detection(format!("{:#}", e)))?;
        for detection in &raw {
            detection.validate().map_err(PipelineError::detection)?;
        }
        let threshold = self.settings.confidence_threshold;
        Ok(raw
            .into_iter()
            .filter(|d| d.confidence >= threshold)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, ScriptedDetector};
    use crate::ingest::SyntheticSource;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingSink {
        sent: Mutex<Vec<EventPayload>>,
    }

    impl EventSink for Arc<CountingSink> {
        fn send(&self, payload: EventPayload, _image_path: Option<&std::path::Path>) -> bool {
            self.sent.lock().unwrap().push(payload);
            true
        }
    }

    fn settings(every: u64) -> PipelineSettings {
        PipelineSettings {
            camera_index: 1,
            sample_every_n_frames: every,
            confidence_threshold: 0.5,
            cooldown: Duration::from_secs(5),
            concurrent_dispatch: false,
            max_frames: None,
            skip_health_check: true,
        }
    }

    fn person(conf: f32) -> Detection {
        Detection::new("person", conf, BoundingBox::new(0.0, 0.0, 5.0, 5.0))
    }

    fn cup() -> Detection {
        Detection::new("cup", 0.8, BoundingBox::new(1.0, 1.0, 4.0, 4.0))
    }

    #[test]
    fn detector_runs_only_on_sampled_frames() {
        let sink = Arc::new(CountingSink::default());
        let source = SyntheticSource::new(8, 8).with_frame_limit(10);
        let mut orch = Orchestrator::new(
            settings(5),
            Box::new(source),
            Box::new(ScriptedDetector::new(vec![vec![]])),
            None,
            Box::new(sink.clone()),
        );
        let stats = orch.run().unwrap();
        assert_eq!(stats.frames_read, 10);
        assert_eq!(stats.frames_sampled, 2);
        assert_eq!(orch.state(), OrchestratorState::Stopped);
        assert_eq!(orch.stop_reason(), Some(StopReason::SourceExhausted));
    }

    #[test]
    fn low_confidence_detections_are_filtered() {
        let sink = Arc::new(CountingSink::default());
        let source = SyntheticSource::new(8, 8).with_frame_limit(1);
        let mut orch = Orchestrator::new(
            settings(1),
            Box::new(source),
            Box::new(ScriptedDetector::new(vec![vec![person(0.2)]])),
            None,
            Box::new(sink.clone()),
        );
        let stats = orch.run().unwrap();
        assert_eq!(stats.events_emitted, 0);
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn malformed_detections_skip_the_frame() {
        let sink = Arc::new(CountingSink::default());
        let source = SyntheticSource::new(8, 8).with_frame_limit(2);
        let mut orch = Orchestrator::new(
            settings(1),
            Box::new(source),
            Box::new(ScriptedDetector::new(vec![vec![person(1.7)], vec![person(0.9)]])),
            None,
            Box::new(sink.clone()),
        );
        let stats = orch.run().unwrap();
        assert_eq!(stats.detection_errors, 1);
        assert_eq!(stats.events_emitted, 1);
        assert_eq!(stats.dispatch_ok, 1);
    }

    #[test]
    fn panicking_sink_does_not_end_the_loop() {
        struct PanickingSink;

        impl EventSink for PanickingSink {
            fn send(&self, _payload: EventPayload, _image_path: Option<&std::path::Path>) -> bool {
                panic!("sink exploded");
            }
        }

        for concurrent in [false, true] {
            let mut run_settings = settings(1);
            run_settings.concurrent_dispatch = concurrent;
            let source = SyntheticSource::new(8, 8).with_frame_limit(3);
            let detector = ScriptedDetector::new(vec![
                vec![person(0.9)],
                vec![person(0.9), person(0.9), person(0.9), cup()],
                vec![],
            ]);
            let mut orch = Orchestrator::new(
                run_settings,
                Box::new(source),
                Box::new(detector),
                None,
                Box::new(PanickingSink),
            );
            let stats = orch.run().unwrap();
            assert_eq!(stats.frames_read, 3);
            assert_eq!(stats.dispatch_ok, 0);
            assert_eq!(orch.stop_reason(), Some(StopReason::SourceExhausted));
            if concurrent {
                // Multi-event frames are isolated per dispatch thread; the
                // single-event first frame goes through the sequential path.
                assert_eq!(stats.frames_panicked, 1);
                assert_eq!(stats.dispatch_failed, 4);
            } else {
                assert_eq!(stats.frames_panicked, 3);
            }
        }
    }

    #[test]
    fn panicking_detector_skips_only_its_frame() {
        struct FlakyDetector {
            calls: usize,
        }

        impl ObjectDetector for FlakyDetector {
            fn name(&self) -> &'static str {
                "flaky"
            }

            fn detect(&mut self, _frame: &Frame) -> anyhow::Result<Vec<Detection>> {
                self.calls += 1;
                if self.calls == 1 {
                    panic!("inference crashed");
                }
                Ok(vec![person(0.9)])
            }
        }

        let sink = Arc::new(CountingSink::default());
        let mut orch = Orchestrator::new(
            settings(1),
            Box::new(SyntheticSource::new(8, 8).with_frame_limit(2)),
            Box::new(FlakyDetector { calls: 0 }),
            None,
            Box::new(sink.clone()),
        );
        let stats = orch.run().unwrap();
        assert_eq!(stats.frames_panicked, 1);
        assert_eq!(stats.frames_sampled, 2);
        assert_eq!(stats.dispatch_ok, 1);
        assert_eq!(orch.stop_reason(), Some(StopReason::SourceExhausted));
    }

    #[test]
    fn stop_request_takes_effect_before_the_next_frame() {
        let sink = Arc::new(CountingSink::default());
        let mut orch = Orchestrator::new(
            settings(1),
            Box::new(SyntheticSource::new(8, 8)),
            Box::new(ScriptedDetector::new(vec![vec![]])),
            None,
            Box::new(sink),
        );
        orch.stop_handle().stop();
        let stats = orch.run().unwrap();
        assert_eq!(stats.frames_read, 0);
        assert_eq!(orch.stop_reason(), Some(StopReason::Requested));
    }
}

//! Rate-limited detect → track → annotate loop

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::capture::codec;
use crate::pipeline::{FrameBuffer, OutputBuffer};
use crate::vision::{annotate, filter_detections, Detector, Tracker};
use crate::{Config, RelayError, Result};

/// Policy values the worker applies on every tick
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub target_fps: u32,
    pub confidence_threshold: f32,
    pub classes: Vec<u32>,
    pub box_thickness: u32,
    pub jpeg_quality: u8,
}

impl WorkerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            target_fps: config.buffer.target_fps,
            confidence_threshold: config.vision.confidence_threshold,
            classes: config.vision.classes.clone(),
            box_thickness: config.vision.box_thickness,
            jpeg_quality: config.buffer.jpeg_quality,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps.max(1) as f64)
    }
}

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Frame buffer had nothing in it
    Empty,
    /// Newest frame was already processed
    Stale,
    /// Frame annotated and published with this many tracks drawn
    Annotated { tracks: usize },
    /// Per-frame failure, skipped
    Failed,
}

#[derive(Debug, Default)]
pub struct WorkerStats {
    processed: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerStatsSnapshot {
    pub processed: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl WorkerStats {
    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: TickOutcome) {
        let counter = match outcome {
            TickOutcome::Annotated { .. } => &self.processed,
            TickOutcome::Empty | TickOutcome::Stale => &self.skipped,
            TickOutcome::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Always works on the freshest buffered frame, never a backlog: a slow
/// detector lowers the output rate but never adds lag.
pub struct VisionWorker {
    frames: Arc<FrameBuffer>,
    output: Arc<OutputBuffer>,
    detector: Box<dyn Detector>,
    tracker: Box<dyn Tracker>,
    settings: WorkerSettings,
    last_processed: Option<f64>,
    stats: Arc<WorkerStats>,
}

impl VisionWorker {
    pub fn new(
        frames: Arc<FrameBuffer>,
        output: Arc<OutputBuffer>,
        detector: Box<dyn Detector>,
        tracker: Box<dyn Tracker>,
        settings: WorkerSettings,
    ) -> Result<Self> {
        if settings.target_fps == 0 {
            return Err(RelayError::InvalidConfig(
                "worker target_fps must be at least 1".into(),
            ));
        }
        Ok(Self {
            frames,
            output,
            detector,
            tracker,
            settings,
            last_processed: None,
            stats: Arc::new(WorkerStats::default()),
        })
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        self.stats.clone()
    }

    /// Process the newest frame if it has not been seen yet
    pub fn tick(&mut self) -> Result<TickOutcome> {
        let Some(newest) = self.frames.latest_timestamp() else {
            return Ok(TickOutcome::Empty);
        };
        if self.last_processed == Some(newest) {
            return Ok(TickOutcome::Stale);
        }

        let Some(frame) = self.frames.latest() else {
            return Ok(TickOutcome::Empty);
        };
        if self.last_processed == Some(frame.timestamp) {
            return Ok(TickOutcome::Stale);
        }
        // Marked before inference so a frame that fails is not retried
        self.last_processed = Some(frame.timestamp);

        let detect_start = Instant::now();
        let detections = self.detector.detect(&frame.image)?;
        metrics::histogram!("detect_time_ms").record(detect_start.elapsed().as_secs_f64() * 1000.0);

        let detections = filter_detections(
            detections,
            &self.settings.classes,
            self.settings.confidence_threshold,
        );
        let tracks = self.tracker.update(&frame.image, &detections)?;

        let mut image = frame.image;
        annotate(&mut image, &tracks, self.settings.box_thickness);
        let payload = codec::encode_jpeg(&image, self.settings.jpeg_quality)?;
        self.output.add(payload, frame.timestamp);

        metrics::counter!("frames_annotated").increment(1);
        debug!(
            timestamp = frame.timestamp,
            detections = detections.len(),
            tracks = tracks.len(),
            "Frame annotated"
        );
        Ok(TickOutcome::Annotated {
            tracks: tracks.len(),
        })
    }

    /// Run one tick, absorbing errors and panics from the detector, tracker
    /// or codec so the loop survives bad frames.
    pub fn tick_guarded(&mut self) -> TickOutcome {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| self.tick())) {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) if e.is_transient() => {
                warn!("Vision tick skipped: {e}");
                TickOutcome::Failed
            }
            Ok(Err(e)) => {
                error!("Vision tick failed unexpectedly: {e}");
                TickOutcome::Failed
            }
            Err(_) => {
                warn!("Vision tick panicked; skipping frame");
                TickOutcome::Failed
            }
        };
        if outcome == TickOutcome::Failed {
            metrics::counter!("worker_tick_failures").increment(1);
        }
        self.stats.record(outcome);
        outcome
    }

    /// Tick at `target_fps` until `shutdown` fires or its sender is dropped.
    /// Ticks missed while a slow frame was processing are dropped, not queued.
    #[instrument(skip_all, name = "vision_worker")]
    pub fn run(mut self, shutdown: Receiver<()>) {
        let interval = self.settings.interval();
        info!("Vision worker running every {:?}", interval);
        let ticker = channel::tick(interval);

        loop {
            channel::select! {
                recv(ticker) -> _ => {
                    self.tick_guarded();
                }
                recv(shutdown) -> _ => break,
            }
        }

        info!("Vision worker stopped");
    }

    /// Move the worker onto its own thread
    pub fn spawn(self) -> Result<WorkerHandle> {
        let (shutdown_tx, shutdown_rx) = channel::bounded(1);
        let handle = std::thread::Builder::new()
            .name("vision-worker".into())
            .spawn(move || self.run(shutdown_rx))?;
        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            handle,
        })
    }
}

/// Handle for the worker thread
pub struct WorkerHandle {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the worker to stop and block until the thread exits
    pub fn stop(self) {
        let _ = self.shutdown.send(());
        if self.handle.join().is_err() {
            warn!("Vision worker thread panicked");
        }
    }
}

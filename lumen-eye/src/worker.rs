//! Per-room capture, detect, annotate and publish loop

use crate::error::VisionError;
use crate::models::{Detection, Detector};
use crate::processing::{
    DetectionPipeline, FrameAnnotator, JpegEncoder, OccupancyDebouncer, OccupancyTransition,
    StatusLabels,
};
use crate::source::{ReconnectPolicy, SourceFactory, VideoSource};
use crate::Frame;
use bytes::Bytes;
use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use lumen_core::{apply_energy_policy, DeviceState, PipelineConfig, RoomSource};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Invoked on the worker thread for every occupancy edge. Must return
/// quickly; heavier work belongs on a queue owned by the callback.
pub type TransitionCallback = Arc<dyn Fn(&OccupancyTransition) + Send + Sync>;

/// How long `stop` waits for the source lock after a join timeout
const SOURCE_RELEASE_WAIT: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Idle,
    Connecting,
    Running,
    Stopping,
}

/// Latest output of a worker. Frame and count are always published together.
#[derive(Debug, Clone)]
pub struct PublishedFrame {
    pub jpeg: Bytes,
    pub person_count: usize,
    pub occupied: bool,
    pub devices: DeviceState,
    /// Increases by one per publish
    pub sequence: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerSnapshot {
    pub room_id: String,
    pub state: WorkerState,
    pub running: bool,
    pub person_count: usize,
    pub occupied: bool,
    pub devices: DeviceState,
    pub frames_published: u64,
    /// Why the capture loop gave up, if it did
    pub failure: Option<String>,
}

/// Everything the workers of one process share
#[derive(Clone)]
pub struct PipelineContext {
    pub config: PipelineConfig,
    pub sources: Arc<dyn SourceFactory>,
    pub detector: Arc<dyn Detector>,
    pub annotator: FrameAnnotator,
}

impl PipelineContext {
    pub fn new(
        config: PipelineConfig,
        sources: Arc<dyn SourceFactory>,
        detector: Arc<dyn Detector>,
        annotator: FrameAnnotator,
    ) -> Self {
        Self {
            config,
            sources,
            detector,
            annotator,
        }
    }
}

/// What a single worker should capture and who to tell about transitions
#[derive(Clone)]
pub struct WorkerSpec {
    pub room_id: String,
    pub source: RoomSource,
    /// Device state the energy policy starts from
    pub initial_devices: DeviceState,
    pub on_transition: Option<TransitionCallback>,
}

impl WorkerSpec {
    pub fn new(room_id: impl Into<String>, source: RoomSource) -> Self {
        Self {
            room_id: room_id.into(),
            source,
            initial_devices: DeviceState::default(),
            on_transition: None,
        }
    }

    pub fn with_devices(mut self, devices: DeviceState) -> Self {
        self.initial_devices = devices;
        self
    }

    pub fn with_callback(mut self, callback: TransitionCallback) -> Self {
        self.on_transition = Some(callback);
        self
    }
}

/// Interruptible sleep shared between a worker and its controller
#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

impl StopSignal {
    fn trigger(&self) {
        *self.stopped.lock() = true;
        self.condvar.notify_all();
    }

    fn is_triggered(&self) -> bool {
        *self.stopped.lock()
    }

    /// Sleep up to `timeout`; returns true if stop was requested
    fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.condvar.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }
}

struct Shared {
    room_id: String,
    running: AtomicBool,
    state: Mutex<WorkerState>,
    stop: StopSignal,
    latest: Mutex<Option<PublishedFrame>>,
    source: Mutex<Box<dyn VideoSource>>,
    frames_published: AtomicU64,
    failure: Mutex<Option<String>>,
}

impl Shared {
    fn set_state(&self, state: WorkerState) {
        *self.state.lock() = state;
    }

    fn publish(&self, jpeg: Bytes, person_count: usize, devices: DeviceState) {
        let sequence = self.frames_published.fetch_add(1, Ordering::SeqCst) + 1;
        *self.latest.lock() = Some(PublishedFrame {
            jpeg,
            person_count,
            occupied: person_count > 0,
            devices,
            sequence,
        });
    }

    fn release_source(&self) {
        self.source.lock().close();
    }
}

/// One room's background capture thread and its published output
pub struct RoomStreamWorker {
    shared: Arc<Shared>,
    description: String,
    handle: Mutex<Option<JoinHandle<()>>>,
    done: Receiver<()>,
    stop_timeout: Duration,
}

impl RoomStreamWorker {
    /// Open the room's source and spawn the capture thread.
    ///
    /// Fails with `SourceUnavailable` without spawning anything when the
    /// initial open fails.
    pub fn start(context: &PipelineContext, spec: WorkerSpec) -> Result<Self, VisionError> {
        let mut source = context.sources.create(&spec.source)?;
        let description = source.describe();
        source.open().map_err(|e| match e {
            VisionError::SourceUnavailable(_) => e,
            other => VisionError::SourceUnavailable(format!("{}: {}", description, other)),
        })?;

        let shared = Arc::new(Shared {
            room_id: spec.room_id.clone(),
            running: AtomicBool::new(true),
            state: Mutex::new(WorkerState::Connecting),
            stop: StopSignal::default(),
            latest: Mutex::new(None),
            source: Mutex::new(source),
            frames_published: AtomicU64::new(0),
            failure: Mutex::new(None),
        });

        let capture = CaptureLoop::new(context, &spec, shared.clone());
        let (done_tx, done) = channel::bounded(1);
        let spawned = std::thread::Builder::new()
            .name(format!("lumen-room-{}", spec.room_id))
            .spawn(move || {
                capture.run();
                let _ = done_tx.send(());
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                shared.running.store(false, Ordering::SeqCst);
                shared.set_state(WorkerState::Idle);
                shared.release_source();
                return Err(VisionError::Io(e));
            }
        };

        info!(room_id = %spec.room_id, source = %description, "Room worker started");
        Ok(Self {
            shared,
            description,
            handle: Mutex::new(Some(handle)),
            done,
            stop_timeout: context.config.stop_timeout(),
        })
    }

    pub fn room_id(&self) -> &str {
        &self.shared.room_id
    }

    pub fn source_description(&self) -> &str {
        &self.description
    }

    /// True while the capture thread is alive and has not been asked to stop
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> WorkerState {
        *self.shared.state.lock()
    }

    pub fn latest_frame(&self) -> Option<PublishedFrame> {
        self.shared.latest.lock().clone()
    }

    pub fn person_count(&self) -> usize {
        self.shared
            .latest
            .lock()
            .as_ref()
            .map_or(0, |frame| frame.person_count)
    }

    pub fn snapshot(&self) -> WorkerSnapshot {
        let latest = self.shared.latest.lock();
        WorkerSnapshot {
            room_id: self.shared.room_id.clone(),
            state: self.state(),
            running: self.is_running(),
            person_count: latest.as_ref().map_or(0, |f| f.person_count),
            occupied: latest.as_ref().map_or(false, |f| f.occupied),
            devices: latest.as_ref().map(|f| f.devices).unwrap_or_default(),
            frames_published: self.shared.frames_published.load(Ordering::SeqCst),
            failure: self.failure(),
        }
    }

    /// Set once the reconnect policy is exhausted
    pub fn failure(&self) -> Option<String> {
        self.shared.failure.lock().clone()
    }

    /// True when the source is closed now. False if it is still open or a
    /// capture call still holds it.
    pub fn source_released(&self) -> bool {
        self.shared
            .source
            .try_lock_for(SOURCE_RELEASE_WAIT)
            .map_or(false, |source| !source.is_open())
    }

    /// Stop with the configured join timeout
    pub fn stop(&self) -> Result<(), VisionError> {
        self.stop_with_timeout(self.stop_timeout)
    }

    /// Signal the loop to stop and wait up to `timeout` for it to exit.
    ///
    /// The source is released in every case; a join timeout is returned as
    /// `ShutdownTimeout` after a best-effort release.
    pub fn stop_with_timeout(&self, timeout: Duration) -> Result<(), VisionError> {
        let room_id = &self.shared.room_id;
        self.shared.running.store(false, Ordering::SeqCst);

        let Some(handle) = self.handle.lock().take() else {
            self.shared.release_source();
            return Ok(());
        };

        self.shared.set_state(WorkerState::Stopping);
        self.shared.stop.trigger();

        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    error!(room_id = %room_id, "Room worker thread panicked");
                }
                self.shared.release_source();
                self.shared.set_state(WorkerState::Idle);
                info!(room_id = %room_id, "Room worker stopped");
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(room_id = %room_id, ?timeout, "Room worker did not stop in time");
                match self.shared.source.try_lock_for(SOURCE_RELEASE_WAIT) {
                    Some(mut source) => source.close(),
                    None => warn!(room_id = %room_id, "Source still busy, leaving release to the worker thread"),
                }
                Err(VisionError::ShutdownTimeout {
                    room_id: room_id.clone(),
                    timeout,
                })
            }
        }
    }
}

impl Drop for RoomStreamWorker {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.stop.trigger();
    }
}

impl std::fmt::Debug for RoomStreamWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomStreamWorker")
            .field("room_id", &self.shared.room_id)
            .field("source", &self.description)
            .field("running", &self.is_running())
            .finish()
    }
}

/// State owned by the capture thread
struct CaptureLoop {
    shared: Arc<Shared>,
    detection: DetectionPipeline,
    annotator: FrameAnnotator,
    encoder: JpegEncoder,
    policy: ReconnectPolicy,
    detect_every: u64,
    frame_interval: Option<Duration>,
    redraw_skipped_frames: bool,
    debouncer: OccupancyDebouncer,
    devices: DeviceState,
    on_transition: Option<TransitionCallback>,
    last_detections: Vec<Detection>,
}

impl CaptureLoop {
    fn new(context: &PipelineContext, spec: &WorkerSpec, shared: Arc<Shared>) -> Self {
        let config = &context.config;
        Self {
            detection: DetectionPipeline::new(
                context.detector.clone(),
                config.confidence_threshold,
                config.resize_factor,
            ),
            annotator: context.annotator.clone(),
            encoder: JpegEncoder::new(config.jpeg_quality),
            policy: ReconnectPolicy::for_source(&spec.source, config),
            detect_every: u64::from(config.detect_every.max(1)),
            frame_interval: config.frame_interval(),
            redraw_skipped_frames: config.redraw_skipped_frames,
            debouncer: OccupancyDebouncer::new(spec.room_id.clone()),
            devices: spec.initial_devices,
            on_transition: spec.on_transition.clone(),
            last_detections: Vec::new(),
            shared,
        }
    }

    fn run(mut self) {
        let room_id = self.shared.room_id.clone();
        let mut failures: u32 = 0;
        let mut frame_index: u64 = 0;

        while !self.shared.stop.is_triggered() {
            let tick = Instant::now();
            let frame = self.shared.source.lock().read_frame();

            let Some(frame) = frame else {
                failures += 1;
                if !self.policy.allows(failures) {
                    let lost = VisionError::SourceInterrupted(format!(
                        "{} yielded no frame {} times in a row",
                        self.shared.source.lock().describe(),
                        failures
                    ));
                    error!(room_id = %room_id, failures, "{}, giving up", lost);
                    *self.shared.failure.lock() = Some(lost.to_string());
                    break;
                }
                warn!(
                    room_id = %room_id,
                    attempt = failures,
                    backoff = ?self.policy.backoff,
                    "No frame from video source, retrying"
                );
                if self.shared.stop.wait(self.policy.backoff) {
                    break;
                }
                if self.policy.reopen {
                    self.reopen(&room_id);
                }
                continue;
            };

            if failures > 0 {
                info!(room_id = %room_id, failures, "Video source recovered");
                failures = 0;
            }
            if frame_index == 0 {
                self.shared.set_state(WorkerState::Running);
            }

            let detect_now = frame_index % self.detect_every == 0;
            frame_index += 1;
            self.process(&room_id, &frame, detect_now);

            if let Some(interval) = self.frame_interval {
                let elapsed = tick.elapsed();
                if elapsed < interval && self.shared.stop.wait(interval - elapsed) {
                    break;
                }
            }
        }

        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.release_source();
        self.shared.set_state(WorkerState::Idle);
        debug!(room_id = %room_id, frames = frame_index, "Capture loop exited");
    }

    fn reopen(&self, room_id: &str) {
        let mut source = self.shared.source.lock();
        source.close();
        match source.open() {
            Ok(()) => info!(room_id = %room_id, "Reconnected video source"),
            Err(e) => warn!(room_id = %room_id, "Reconnect failed: {}", e),
        }
    }

    fn process(&mut self, room_id: &str, frame: &Frame, detect_now: bool) {
        let nothing_published = self.shared.latest.lock().is_none();

        if detect_now {
            match self.detection.detect(frame) {
                Ok(detections) => {
                    self.last_detections = detections;
                    self.observe(room_id, self.last_detections.len());
                    self.publish(room_id, frame);
                    return;
                }
                Err(e) => warn!(room_id = %room_id, "Detection failed, keeping previous annotation: {}", e),
            }
        }

        if self.redraw_skipped_frames || nothing_published {
            self.publish(room_id, frame);
        }
    }

    fn observe(&mut self, room_id: &str, person_count: usize) {
        let Some(mut transition) = self.debouncer.observe(person_count) else {
            return;
        };
        apply_energy_policy(&mut self.devices, transition.occupied);
        transition.devices = self.devices;

        info!(
            room_id = %room_id,
            occupied = transition.occupied,
            person_count,
            light = self.devices.light,
            ac = self.devices.ac,
            "Occupancy changed"
        );
        if let Some(callback) = &self.on_transition {
            callback(&transition);
        }
    }

    fn publish(&self, room_id: &str, frame: &Frame) {
        let person_count = self.debouncer.person_count();
        let labels = StatusLabels::new(person_count, self.devices);
        let annotated = self.annotator.annotate(frame, &self.last_detections, &labels);
        match self.encoder.encode(&annotated) {
            Ok(jpeg) => self.shared.publish(jpeg, person_count, self.devices),
            Err(e) => warn!(room_id = %room_id, "Failed to encode frame: {}", e),
        }
    }
}

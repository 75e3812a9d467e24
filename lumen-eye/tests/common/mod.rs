//! Scripted sources and detectors shared by the integration tests

#![allow(dead_code)]

use image::Rgb;
use lumen_core::{PipelineConfig, RoomSource};
use lumen_eye::{
    BoundingBox, Detection, Detector, Frame, FrameAnnotator, OccupancyTransition, PipelineContext,
    SourceFactory, TransitionCallback, VideoSource, VisionError,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Ordered record of source lifecycle events, e.g. `open:A#1`
pub type EventLog = Arc<Mutex<Vec<String>>>;

/// What a scripted source yields
#[derive(Debug, Clone)]
pub struct SourcePlan {
    /// `true` yields a frame, `false` yields nothing
    pub reads: Vec<bool>,
    /// Behaviour once `reads` is exhausted
    pub then_frames: bool,
    pub fail_open: bool,
    /// Time `open` blocks before returning
    pub open_delay: Duration,
    /// Time each `read_frame` blocks while holding the source
    pub read_delay: Duration,
}

impl SourcePlan {
    pub fn frames() -> Self {
        Self {
            reads: Vec::new(),
            then_frames: true,
            fail_open: false,
            open_delay: Duration::ZERO,
            read_delay: Duration::ZERO,
        }
    }

    pub fn silent() -> Self {
        Self {
            reads: Vec::new(),
            then_frames: false,
            fail_open: false,
            open_delay: Duration::ZERO,
            read_delay: Duration::ZERO,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            fail_open: true,
            ..Self::silent()
        }
    }

    pub fn script(reads: &[bool], then_frames: bool) -> Self {
        Self {
            reads: reads.to_vec(),
            then_frames,
            fail_open: false,
            open_delay: Duration::ZERO,
            read_delay: Duration::ZERO,
        }
    }

    /// Camera that takes `delay` to connect
    pub fn slow_open(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// Camera whose reads hang for `delay`
    pub fn stuck_reads(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }
}

pub struct ScriptedSource {
    name: String,
    plan: SourcePlan,
    remaining: VecDeque<bool>,
    open: Arc<AtomicBool>,
    reads: Arc<AtomicUsize>,
    log: EventLog,
}

impl VideoSource for ScriptedSource {
    fn open(&mut self) -> Result<(), VisionError> {
        std::thread::sleep(self.plan.open_delay);
        if self.plan.fail_open {
            self.log.lock().push(format!("open-failed:{}", self.name));
            return Err(VisionError::SourceUnavailable(self.name.clone()));
        }
        self.open.store(true, Ordering::SeqCst);
        self.log.lock().push(format!("open:{}", self.name));
        Ok(())
    }

    fn read_frame(&mut self) -> Option<Frame> {
        if !self.open.load(Ordering::SeqCst) {
            return None;
        }
        self.reads.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.plan.read_delay);
        let yields = self.remaining.pop_front().unwrap_or(self.plan.then_frames);
        yields.then(|| Frame::from_pixel(64, 48, Rgb([90, 90, 90])))
    }

    fn close(&mut self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.log.lock().push(format!("close:{}", self.name));
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// Handle on a source created by [`ScriptedFactory`]
#[derive(Clone)]
pub struct SourceProbe {
    pub name: String,
    pub requested: RoomSource,
    pub open: Arc<AtomicBool>,
    pub reads: Arc<AtomicUsize>,
}

impl SourceProbe {
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

/// Hands out scripted sources in order; the last plan repeats
pub struct ScriptedFactory {
    plans: Mutex<VecDeque<SourcePlan>>,
    fallback: SourcePlan,
    created: Mutex<Vec<SourceProbe>>,
    pub log: EventLog,
}

impl ScriptedFactory {
    pub fn new(plans: Vec<SourcePlan>) -> Arc<Self> {
        let fallback = plans.last().cloned().unwrap_or_else(SourcePlan::frames);
        Arc::new(Self {
            plans: Mutex::new(plans.into()),
            fallback,
            created: Mutex::new(Vec::new()),
            log: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn probes(&self) -> Vec<SourceProbe> {
        self.created.lock().clone()
    }

    pub fn probe(&self, index: usize) -> SourceProbe {
        self.created.lock()[index].clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

impl SourceFactory for ScriptedFactory {
    fn create(&self, source: &RoomSource) -> Result<Box<dyn VideoSource>, VisionError> {
        let plan = self.plans.lock().pop_front().unwrap_or_else(|| self.fallback.clone());
        let mut created = self.created.lock();
        let name = format!("{}#{}", label(source), created.len() + 1);
        let probe = SourceProbe {
            name: name.clone(),
            requested: source.clone(),
            open: Arc::new(AtomicBool::new(false)),
            reads: Arc::new(AtomicUsize::new(0)),
        };
        created.push(probe.clone());
        Ok(Box::new(ScriptedSource {
            name,
            remaining: plan.reads.iter().copied().collect(),
            plan,
            open: probe.open,
            reads: probe.reads,
            log: self.log.clone(),
        }))
    }
}

fn label(source: &RoomSource) -> String {
    match source {
        RoomSource::None => "none".to_string(),
        RoomSource::LocalCamera { index } => format!("cam{}", index),
        RoomSource::NetworkStream { url } => url.clone(),
    }
}

/// Reports `counts[i]` persons on its i-th call, repeating the last value
pub struct SequenceDetector {
    counts: Vec<usize>,
    calls: AtomicUsize,
}

impl SequenceDetector {
    pub fn new(counts: &[usize]) -> Arc<Self> {
        Arc::new(Self {
            counts: counts.to_vec(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Detector for SequenceDetector {
    fn detect(&self, _frame: &Frame, _threshold: f32) -> Result<Vec<Detection>, VisionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let count = self
            .counts
            .get(call)
            .or(self.counts.last())
            .copied()
            .unwrap_or(0);
        Ok((0..count)
            .map(|i| {
                let x = 2.0 + i as f32 * 10.0;
                Detection::person(BoundingBox::new(x, 20.0, x + 8.0, 40.0), 0.9)
            })
            .collect())
    }

    fn name(&self) -> &str {
        "sequence"
    }
}

pub struct FailingDetector;

impl Detector for FailingDetector {
    fn detect(&self, _frame: &Frame, _threshold: f32) -> Result<Vec<Detection>, VisionError> {
        Err(VisionError::Detector("model exploded".to_string()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Pipeline settings with short backoffs so tests run quickly
pub fn fast_config() -> PipelineConfig {
    PipelineConfig {
        detect_every: 1,
        resize_factor: 1.0,
        target_fps: 0,
        stop_timeout_ms: 2_000,
        network_retry_backoff_ms: 10,
        camera_retry_backoff_ms: 10,
        camera_max_retries: 30,
        ..PipelineConfig::default()
    }
}

pub fn context(
    config: PipelineConfig,
    factory: Arc<ScriptedFactory>,
    detector: Arc<dyn Detector>,
) -> PipelineContext {
    PipelineContext::new(config, factory, detector, FrameAnnotator::default())
}

/// Callback that stores every transition it sees
pub fn recording_callback() -> (TransitionCallback, Arc<Mutex<Vec<OccupancyTransition>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let callback: TransitionCallback = Arc::new(move |transition: &OccupancyTransition| {
        sink.lock().push(transition.clone());
    });
    (callback, seen)
}

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

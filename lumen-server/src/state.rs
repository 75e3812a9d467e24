//! Shared handler state owned by the composition root

use bytes::Bytes;
use lumen_core::RoomTable;
use lumen_eye::{
    FrameAnnotator, JpegEncoder, MultiRoomOrchestrator, OccupancyReporter, PipelineContext,
    VisionError, WorkerRegistry,
};
use std::sync::Arc;
use tracing::info;

/// Room used by webcam test mode
pub const WEBCAM_ROOM: &str = "Webcam";

pub const PLACEHOLDER_MESSAGE: &str = "Camera Not Connected";
const PLACEHOLDER_SIZE: (u32, u32) = (640, 480);

#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RoomTable>,
    /// CCTV and webcam workers, replaced on reconnect
    pub registry: Arc<WorkerRegistry>,
    /// Per-room AI workers reporting through the control endpoint
    pub orchestrator: Arc<MultiRoomOrchestrator>,
    /// Pre-encoded "not connected" frame
    pub placeholder: Bytes,
}

impl AppState {
    pub fn new(
        rooms: Arc<RoomTable>,
        context: PipelineContext,
        reporter: Arc<dyn OccupancyReporter>,
    ) -> Result<Self, VisionError> {
        let placeholder = encode_placeholder(&context.annotator, context.config.jpeg_quality)?;
        let orchestrator = MultiRoomOrchestrator::new(context.clone(), reporter)?;
        Ok(Self {
            rooms,
            registry: Arc::new(WorkerRegistry::new(context)),
            orchestrator: Arc::new(orchestrator),
            placeholder,
        })
    }

    /// Stop every worker. Blocks; call from a blocking thread.
    pub fn shutdown(&self) {
        info!("Stopping room workers");
        self.registry.stop_all();
        self.orchestrator.stop_all();
    }
}

fn encode_placeholder(annotator: &FrameAnnotator, quality: u8) -> Result<Bytes, VisionError> {
    let (width, height) = PLACEHOLDER_SIZE;
    let frame = annotator.placeholder(width, height, PLACEHOLDER_MESSAGE);
    JpegEncoder::new(quality).encode(&frame)
}

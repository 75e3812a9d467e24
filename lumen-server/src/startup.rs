//! Builds the pipeline from configuration

use crate::state::AppState;
use lumen_core::{LumenConfig, PipelineConfig, RoomTable};
use lumen_eye::{
    Detector, FrameAnnotator, NoopDetector, OccupancyReporter, PipelineContext, SourceFactory,
    VisionError,
};
use std::sync::Arc;
use tracing::{info, warn};

pub fn pipeline_context(config: &PipelineConfig) -> Result<PipelineContext, VisionError> {
    let annotator = FrameAnnotator::from_font_file(config.font_path.as_deref())?;
    if config.font_path.is_none() {
        info!("Using bundled label font");
    }
    Ok(PipelineContext::new(
        config.clone(),
        source_factory(config),
        detector(config)?,
        annotator,
    ))
}

#[cfg(feature = "vision")]
fn source_factory(config: &PipelineConfig) -> Arc<dyn SourceFactory> {
    Arc::new(lumen_eye::OpenCvSourceFactory::new(config.clone()))
}

#[cfg(not(feature = "vision"))]
fn source_factory(_config: &PipelineConfig) -> Arc<dyn SourceFactory> {
    warn!("Built without the `vision` feature, cameras cannot be opened");
    Arc::new(lumen_eye::UnsupportedSourceFactory)
}

#[cfg(feature = "vision")]
fn detector(config: &PipelineConfig) -> Result<Arc<dyn Detector>, VisionError> {
    match &config.model_path {
        Some(path) => Ok(Arc::new(lumen_eye::YoloPersonDetector::load(path)?)),
        None => {
            warn!("No detection model configured, rooms will always read as empty");
            Ok(Arc::new(NoopDetector))
        }
    }
}

#[cfg(not(feature = "vision"))]
fn detector(config: &PipelineConfig) -> Result<Arc<dyn Detector>, VisionError> {
    if config.model_path.is_some() {
        warn!("pipeline.model_path is ignored without the `vision` feature");
    }
    Ok(Arc::new(NoopDetector))
}

/// Room table, registry and orchestrator for `config`
pub fn build_state(config: &LumenConfig, reporter: Arc<dyn OccupancyReporter>) -> Result<AppState, VisionError> {
    let rooms = Arc::new(RoomTable::from_definitions(&config.rooms));
    let context = pipeline_context(&config.pipeline)?;
    info!(
        rooms = config.rooms.len(),
        detector = context.detector.name(),
        "Pipeline ready"
    );
    AppState::new(rooms, context, reporter)
}

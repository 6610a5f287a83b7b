//! Detection requests on the latest captured frame.
//!
//! A request copies the latest frame and runs it through the network, the decoder, the
//! suppressor and the aggregator. The resulting counts are announced and returned. Requests
//! are independent of each other and share the read-only network.
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use common::{Frame, LatestFrame, PipelineError, Result};
use serde::Serialize;

use crate::{
    aggregator::{aggregate, CountMapping},
    announcer::Announcer,
    decoder::decode,
    labels::ClassTable,
    meter::METER,
    nn::InferModel,
    suppressor::Suppressor,
};

/// Result of one detection request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionOutcome {
    /// Sequence number of the analysed frame.
    pub frame_seq: u64,
    pub counts: CountMapping,
    /// Whether the counts were announced.
    pub spoken: bool,
}

pub struct DetectionPipeline {
    model: Arc<dyn InferModel>,
    classes: Arc<ClassTable>,
    suppressor: Suppressor,
    announcer: Arc<Announcer>,
    latest: Arc<LatestFrame>,
    inference_timeout: Option<Duration>,
}

impl DetectionPipeline {
    pub fn new(
        model: Arc<dyn InferModel>,
        classes: Arc<ClassTable>,
        announcer: Arc<Announcer>,
        latest: Arc<LatestFrame>,
    ) -> Self {
        Self {
            model,
            classes,
            suppressor: Suppressor::default(),
            announcer,
            latest,
            inference_timeout: None,
        }
    }

    /// Fail requests whose inference takes longer than `timeout`.
    pub fn with_inference_timeout(mut self, timeout: Duration) -> Self {
        self.inference_timeout = Some(timeout);
        self
    }

    /// Count the objects in a frame.
    pub fn detect_frame(&self, frame: &Frame) -> Result<CountMapping> {
        detect(self.model.as_ref(), &self.classes, &self.suppressor, frame)
    }

    /// Detect objects on the latest frame and announce the counts.
    ///
    /// Fails with [`PipelineError::NoFrameYet`] before the first frame was captured. Returns
    /// after the announcement has been spoken.
    pub async fn trigger(&self) -> Result<DetectionOutcome> {
        let started = Instant::now();
        let frame = self.latest.latest()?;
        let frame_seq = frame.seq;

        let model = Arc::clone(&self.model);
        let classes = Arc::clone(&self.classes);
        let suppressor = self.suppressor;
        let task = tokio::task::spawn_blocking(move || {
            detect(model.as_ref(), &classes, &suppressor, &frame)
        });

        let joined = match self.inference_timeout {
            // The blocking task cannot be aborted, its result is discarded
            Some(limit) => tokio::time::timeout(limit, task).await.map_err(|_| {
                PipelineError::InferenceError(format!("no result within {limit:?}"))
            })?,
            None => task.await,
        };
        let counts = joined.map_err(|err| {
            PipelineError::InferenceError(format!("inference task failed: {err}"))
        })??;

        METER.record_detection(started.elapsed());
        log::info!("Frame {frame_seq}: {counts:?}");

        let spoken = self.announce(counts.clone()).await;

        Ok(DetectionOutcome {
            frame_seq,
            counts,
            spoken,
        })
    }

    async fn announce(&self, counts: CountMapping) -> bool {
        let announcer = Arc::clone(&self.announcer);
        match tokio::task::spawn_blocking(move || announcer.announce(&counts)).await {
            Ok(Ok(spoken)) => spoken,
            Ok(Err(err)) => {
                log::warn!("Announcement failed: {err}");
                false
            }
            Err(err) => {
                log::warn!("Announcement task failed: {err}");
                false
            }
        }
    }
}

fn detect(
    model: &dyn InferModel,
    classes: &ClassTable,
    suppressor: &Suppressor,
    frame: &Frame,
) -> Result<CountMapping> {
    let raw = model.infer(&frame.image)?;
    let candidates = decode(&raw, frame.width(), frame.height());
    let detections = suppressor.suppress(candidates, classes)?;
    log::debug!(
        "Frame {}: kept {} detections",
        frame.seq,
        detections.len()
    );

    Ok(aggregate(&detections))
}

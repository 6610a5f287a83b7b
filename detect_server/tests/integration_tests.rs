use std::{path::Path, sync::Arc};

use axum::{http::StatusCode, Extension, Json};
use cam_source::{CaptureDevice, FrameSource};
use common::{Frame, LatestFrame, PipelineError};
use detect_server::{
    announcer::{Announcer, SilentSpeech},
    endpoints::detect,
    labels::ClassTable,
    nn::{InferModel, RawOutput, YoloModel},
    pipeline::DetectionPipeline,
};
use image::{Rgb, RgbImage};
use ndarray::Array2;
use serde_json::json;
use tokio_util::sync::CancellationToken;

/// Camera delivering a fixed number of frames.
struct ScriptedCamera {
    remaining: usize,
}

impl CaptureDevice for ScriptedCamera {
    fn next_frame(&mut self) -> common::Result<RgbImage> {
        if self.remaining == 0 {
            return Err(PipelineError::StreamEnded);
        }
        self.remaining -= 1;

        // Bright left half, the detector looks for it after mirroring
        Ok(RgbImage::from_fn(64, 48, |x, _| {
            if x < 32 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        }))
    }
}

/// Reports one "cup" wherever the frame is bright.
struct BrightHalfModel;

impl InferModel for BrightHalfModel {
    fn infer(&self, frame: &RgbImage) -> common::Result<RawOutput> {
        let right_is_bright = frame.get_pixel(frame.width() - 1, 0)[0] > 127;
        let center_x = if right_is_bright { 0.75 } else { 0.25 };
        let rows = Array2::from_shape_vec(
            (2, 7),
            vec![
                center_x, 0.5, 0.5, 1.0, 1.0, 0.0, 0.9, //
                center_x, 0.5, 0.45, 0.9, 1.0, 0.0, 0.8,
            ],
        )
        .map_err(PipelineError::inference)?;
        RawOutput::new(vec![rows])
    }
}

#[tokio::test]
async fn test_detect_on_captured_frames() -> Result<(), Box<dyn std::error::Error>> {
    let latest = Arc::new(LatestFrame::new());
    let frame_source = FrameSource::new(latest.clone(), 80);

    let capture = frame_source.spawn(ScriptedCamera { remaining: 3 }, CancellationToken::new())?;
    capture.join().map_err(|_| "capture thread panicked")?;
    assert!(!frame_source.is_running());

    // The last frame stays available after the camera stopped
    let frame: Frame = latest.latest()?;
    assert_eq!(frame.seq, 3);
    assert_eq!(frame.image.get_pixel(63, 0), &Rgb([255, 255, 255]));

    let pipeline = Arc::new(DetectionPipeline::new(
        Arc::new(BrightHalfModel),
        Arc::new(["bottle", "cup"].into_iter().collect()),
        Arc::new(Announcer::new(Arc::new(SilentSpeech))),
        latest,
    ));

    let (status, Json(body)) = detect(Extension(pipeline)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        serde_json::to_value(&body)?,
        json!({
            "status": "detected",
            "frame": 3,
            "counts": {"cup": 1},
            "spoken": true,
        })
    );

    Ok(())
}

#[tokio::test]
async fn test_detect_before_first_frame() {
    let pipeline = Arc::new(DetectionPipeline::new(
        Arc::new(BrightHalfModel),
        Arc::new(["bottle", "cup"].into_iter().collect()),
        Arc::new(Announcer::new(Arc::new(SilentSpeech))),
        Arc::new(LatestFrame::new()),
    ));

    let (status, Json(body)) = detect(Extension(pipeline)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        serde_json::to_value(&body).unwrap(),
        json!({"status": "no_frame"})
    );
}

#[test]
fn test_missing_artifacts() {
    assert!(matches!(
        ClassTable::from_path("does/not/exist.names"),
        Err(PipelineError::ArtifactLoadError { .. })
    ));
    assert!(matches!(
        YoloModel::from_path("does/not/exist.onnx"),
        Err(PipelineError::ArtifactLoadError { .. })
    ));
}

#[test]
fn test_yolov3_on_picture() -> Result<(), Box<dyn std::error::Error>> {
    let model_path = std::env::var("YOLO_MODEL").unwrap_or_else(|_| "yolov3.onnx".into());
    let labels_path = std::env::var("YOLO_LABELS").unwrap_or_else(|_| "coco.names".into());
    let Ok(picture_path) = std::env::var("YOLO_TEST_PICTURE") else {
        println!("YOLO_TEST_PICTURE not set, skipping");
        return Ok(());
    };
    if !Path::new(&model_path).exists() || !Path::new(&labels_path).exists() {
        println!("No model at {model_path} or labels at {labels_path}, skipping");
        return Ok(());
    }

    let classes = ClassTable::from_path(&labels_path)?;
    let model = YoloModel::from_path(&model_path)?;
    let pipeline = DetectionPipeline::new(
        Arc::new(model),
        Arc::new(classes),
        Arc::new(Announcer::new(Arc::new(SilentSpeech))),
        Arc::new(LatestFrame::new()),
    );

    let image = image::open(picture_path)?.to_rgb8();
    let counts = pipeline.detect_frame(&Frame::new(1, image))?;
    dbg!(&counts);
    assert!(counts.values().all(|count| *count >= 1));

    Ok(())
}

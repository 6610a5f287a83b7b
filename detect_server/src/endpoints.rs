//! Endpoints of HTTP server.
//!
use std::{convert::Infallible, sync::Arc};

use axum::{
    body::StreamBody,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use cam_source::FrameSource;
use common::{protocol::MULTIPART_CONTENT_TYPE, PipelineError, Result};
use futures::StreamExt;
use serde::Serialize;

use crate::{
    aggregator::CountMapping,
    meter::METER,
    pipeline::{DetectionOutcome, DetectionPipeline},
};

/// Body of a detection response.
#[derive(Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DetectResponse {
    Detected {
        frame: u64,
        counts: CountMapping,
        spoken: bool,
    },
    NoFrame,
    Error {
        message: String,
    },
}

/// Build the HTTP router.
pub fn router(pipeline: Arc<DetectionPipeline>, frame_source: Arc<FrameSource>) -> Router {
    Router::new()
        .route("/healthcheck", get(healthcheck))
        .route("/video_feed", get(video_feed))
        .route("/detect", get(detect))
        .layer(Extension(pipeline))
        .layer(Extension(frame_source))
}

/// Health check endpoint.
pub async fn healthcheck() -> &'static str {
    "healthy"
}

/// Live camera stream.
pub async fn video_feed(Extension(frame_source): Extension<Arc<FrameSource>>) -> Response {
    log::info!("Frame stream requested");

    let stream = match frame_source.subscribe() {
        Some(stream) if frame_source.is_running() => stream,
        _ => {
            log::warn!("Frame stream requested while the camera is not capturing");
            return (StatusCode::SERVICE_UNAVAILABLE, "camera not available").into_response();
        }
    };

    let stream = stream.map(|x| {
        METER.tick_streamed();
        Ok::<_, Infallible>(x)
    });

    // Set body and headers for multipart streaming
    let body = StreamBody::new(stream);
    let headers = [(header::CONTENT_TYPE, MULTIPART_CONTENT_TYPE)];

    (headers, body).into_response()
}

/// Detect objects on the latest frame and announce them.
pub async fn detect(
    Extension(pipeline): Extension<Arc<DetectionPipeline>>,
) -> (StatusCode, Json<DetectResponse>) {
    detect_response(pipeline.trigger().await)
}

/// Map the outcome of a detection request to status code and body.
pub fn detect_response(result: Result<DetectionOutcome>) -> (StatusCode, Json<DetectResponse>) {
    match result {
        Ok(outcome) => (
            StatusCode::OK,
            Json(DetectResponse::Detected {
                frame: outcome.frame_seq,
                counts: outcome.counts,
                spoken: outcome.spoken,
            }),
        ),
        Err(PipelineError::NoFrameYet) => (StatusCode::OK, Json(DetectResponse::NoFrame)),
        Err(err) => {
            log::error!("Detection failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(DetectResponse::Error {
                    message: err.to_string(),
                }),
            )
        }
    }
}

#[cfg(test)]
mod test {
    use common::LatestFrame;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_detected_body() {
        let counts: CountMapping = [("person".to_owned(), 1), ("car".to_owned(), 2)]
            .into_iter()
            .collect();
        let (status, Json(body)) = detect_response(Ok(DetectionOutcome {
            frame_seq: 7,
            counts,
            spoken: true,
        }));

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "status": "detected",
                "frame": 7,
                "counts": {"person": 1, "car": 2},
                "spoken": true,
            })
        );
    }

    #[test]
    fn test_no_frame_body() {
        let (status, Json(body)) = detect_response(Err(PipelineError::NoFrameYet));

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"status": "no_frame"})
        );
    }

    #[test]
    fn test_inference_error_body() {
        let (status, Json(body)) =
            detect_response(Err(PipelineError::InferenceError("bad shape".into())));

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            DetectResponse::Error {
                message: "inference failed: bad shape".into()
            }
        );
    }

    #[tokio::test]
    async fn test_stream_unavailable_without_capture() {
        let frame_source = Arc::new(FrameSource::new(Arc::new(LatestFrame::new()), 80));

        let response = video_feed(Extension(frame_source)).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_healthcheck() {
        assert_eq!(healthcheck().await, "healthy");
    }
}

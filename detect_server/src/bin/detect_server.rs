//! Detect server binary.
//!
use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use cam_source::{sensors::parse_resolution, CaptureConfig, FrameSource};
use clap::Parser;
use common::LatestFrame;
use detect_server::{
    announcer::{Announcer, CommandSpeech, SilentSpeech, SpeechEngine},
    endpoints::router,
    labels::ClassTable,
    meter::spawn_meter_logger,
    nn::YoloModel,
    pipeline::DetectionPipeline,
};
use env_logger::TimestampPrecision;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Address to serve the HTTP endpoints on
    #[clap(long, default_value = "127.0.0.1:3000")]
    server_address: String,

    /// Index N of the camera device /dev/videoN
    #[clap(long, default_value_t = 0)]
    device: u32,

    /// Capture resolution as WIDTHxHEIGHT, the largest supported one if omitted
    #[clap(long, value_parser = parse_resolution)]
    resolution: Option<(u32, u32)>,

    /// Capture frame rate, the highest supported one if omitted
    #[clap(long)]
    frame_rate: Option<u32>,

    /// JPEG quality of the video feed
    #[clap(long, default_value_t = 80)]
    jpeg_quality: i32,

    /// ONNX file of the detection network
    #[clap(long, default_value = "yolov3.onnx")]
    model: String,

    /// Class names, one per line
    #[clap(long, default_value = "coco.names")]
    labels: String,

    /// Speech synthesizer called with the sentence as last argument
    #[clap(long, default_value = "espeak-ng")]
    speech_program: String,

    /// Log announcements instead of speaking them
    #[clap(long)]
    mute: bool,

    /// Fail detections taking longer than this many milliseconds, 0 disables the limit
    #[clap(long, default_value_t = 0)]
    inference_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logger
    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    // Artifacts are required, fail before serving anything
    let classes = ClassTable::from_path(&args.labels)
        .with_context(|| format!("loading class names from {}", args.labels))?;
    let model = YoloModel::from_path(&args.model)
        .with_context(|| format!("loading network from {}", args.model))?;

    let latest = Arc::new(LatestFrame::new());
    let frame_source = Arc::new(FrameSource::new(latest.clone(), args.jpeg_quality));
    let cancel = CancellationToken::new();

    let capture_config = CaptureConfig {
        device_index: args.device,
        resolution: args.resolution,
        frame_rate: args.frame_rate,
    };
    // Without a camera the server keeps running, detections report that no frame exists
    let capture = match FrameSource::open(&capture_config) {
        Ok(camera) => Some(frame_source.spawn(camera, cancel.clone())?),
        Err(err) => {
            log::error!("Camera not available: {err}");
            None
        }
    };

    spawn_meter_logger();

    let speech: Arc<dyn SpeechEngine> = if args.mute {
        Arc::new(SilentSpeech)
    } else {
        Arc::new(CommandSpeech::new(&args.speech_program))
    };
    let mut pipeline = DetectionPipeline::new(
        Arc::new(model),
        Arc::new(classes),
        Arc::new(Announcer::new(speech)),
        latest,
    );
    if args.inference_timeout_ms > 0 {
        pipeline = pipeline.with_inference_timeout(Duration::from_millis(args.inference_timeout_ms));
    }

    // Build HTTP server with endpoints
    let app = router(Arc::new(pipeline), frame_source);

    // Serve HTTP server
    let addr: SocketAddr = args.server_address.parse()?;
    log::info!("Serving on http://{addr}");
    let shutdown = cancel.clone();
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                log::error!("Waiting for shutdown signal failed: {err}");
            }
            log::info!("Shutting down");
            shutdown.cancel();
        })
        .await?;

    cancel.cancel();
    if let Some(capture) = capture {
        if capture.join().is_err() {
            log::error!("Capture thread panicked");
        }
    }

    Ok(())
}

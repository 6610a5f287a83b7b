//! Capture loop feeding the latest-frame slot and the encoded frame stream.
//!
//! A single capture thread owns the camera. For every captured frame it mirrors the image,
//! JPEG-encodes it for the stream subscribers (only when there are any) and publishes it as
//! the latest frame. Dropping a stream subscription never stops the capture.
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    thread::{self, JoinHandle},
};

use bytes::Bytes;
use common::{protocol::as_jpeg_stream_item, Frame, LatestFrame, PipelineError};
use futures::{Stream, StreamExt};
use image::RgbImage;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_util::sync::CancellationToken;

use crate::sensors::{CaptureConfig, CaptureDevice, V4lCamera};

/// Number of encoded frames buffered per subscriber before frames are skipped.
const STREAM_CAPACITY: usize = 2;

pub type StreamSender = broadcast::Sender<Bytes>;

pub struct FrameSource {
    shared: Arc<Shared>,
    jpeg_quality: i32,
}

struct Shared {
    latest: Arc<LatestFrame>,
    stream_tx: Mutex<Option<StreamSender>>,
    running: AtomicBool,
}

impl FrameSource {
    /// Source publishing to `latest`, encoding streamed frames at `jpeg_quality` (1-100).
    pub fn new(latest: Arc<LatestFrame>, jpeg_quality: i32) -> Self {
        let (stream_tx, _) = broadcast::channel(STREAM_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                latest,
                stream_tx: Mutex::new(Some(stream_tx)),
                running: AtomicBool::new(false),
            }),
            jpeg_quality,
        }
    }

    /// Open the configured camera.
    pub fn open(config: &CaptureConfig) -> common::Result<V4lCamera> {
        V4lCamera::open(config)
    }

    /// Start the capture loop on a dedicated thread.
    ///
    /// The loop runs until the device ends its stream, fails, or `cancel` is triggered.
    pub fn spawn<D>(&self, device: D, cancel: CancellationToken) -> common::Result<JoinHandle<()>>
    where
        D: CaptureDevice + 'static,
    {
        if self.shared.running.swap(true, Ordering::AcqRel) {
            return Err(PipelineError::DeviceUnavailable(
                "capture loop already running".into(),
            ));
        }

        let stream_tx = self
            .shared
            .stream_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert_with(|| broadcast::channel(STREAM_CAPACITY).0)
            .clone();

        let shared = Arc::clone(&self.shared);
        let jpeg_quality = self.jpeg_quality;

        thread::Builder::new()
            .name("frame-capture".into())
            .spawn(move || {
                run_capture_loop(device, &shared.latest, &stream_tx, jpeg_quality, &cancel);

                // Close all open streams and mark the source as stopped
                drop(stream_tx);
                shared
                    .stream_tx
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                shared.running.store(false, Ordering::Release);
            })
            .map_err(|err| {
                self.shared.running.store(false, Ordering::Release);
                PipelineError::DeviceUnavailable(format!("failed to spawn capture thread: {err}"))
            })
    }

    /// Whether the capture loop is alive.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// The slot this source publishes to.
    pub fn latest(&self) -> &Arc<LatestFrame> {
        &self.shared.latest
    }

    /// Subscribe to the stream of multipart-framed JPEG frames.
    ///
    /// Returns `None` once the capture loop has stopped. The stream ends when capture stops
    /// and skips frames the subscriber was too slow to take.
    pub fn subscribe(&self) -> Option<impl Stream<Item = Bytes> + Send + 'static> {
        let rx = self
            .shared
            .stream_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()?
            .subscribe();

        Some(BroadcastStream::new(rx).filter_map(|item| async move {
            match item {
                Ok(data) => Some(data),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    log::debug!("Stream subscriber skipped {skipped} frames");
                    None
                }
            }
        }))
    }
}

fn run_capture_loop<D: CaptureDevice>(
    mut device: D,
    latest: &LatestFrame,
    stream_tx: &StreamSender,
    jpeg_quality: i32,
    cancel: &CancellationToken,
) {
    let mut seq = 0;

    while !cancel.is_cancelled() {
        let mut image = match device.next_frame() {
            Ok(image) => image,
            Err(PipelineError::StreamEnded) => {
                log::info!("Camera stream ended after {seq} frames");
                return;
            }
            Err(err) => {
                log::error!("Stopping capture: {err}");
                return;
            }
        };

        image::imageops::flip_horizontal_in_place(&mut image);
        seq += 1;

        if stream_tx.receiver_count() > 0 {
            match encode_jpeg(&image, jpeg_quality) {
                // Nobody may be listening anymore, the frame is dropped then
                Ok(data) => {
                    stream_tx.send(as_jpeg_stream_item(&data)).ok();
                }
                Err(err) => log::warn!("Failed to encode frame {seq}: {err}"),
            }
        }

        latest.publish(Frame::new(seq, image));
    }

    log::info!("Capture cancelled after {seq} frames");
}

fn encode_jpeg(image: &RgbImage, quality: i32) -> Result<Vec<u8>, turbojpeg::Error> {
    let buf = turbojpeg::compress_image(image, quality, turbojpeg::Subsamp::Sub2x2)?;
    Ok(buf.to_vec())
}

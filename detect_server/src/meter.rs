//! Throughput of the video feed and latency of detections.
//!
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use tokio::{task::JoinHandle, time::interval};

pub static METER: Meter = Meter::new();

#[derive(Default)]
pub struct Meter {
    streamed_frames: AtomicU64,
    detections: AtomicU64,
    detection_micros: AtomicU64,
}

/// Detections finished since the last reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionStats {
    pub count: u64,
    pub total: Duration,
}

impl DetectionStats {
    pub fn mean(&self) -> Option<Duration> {
        (self.count > 0).then(|| self.total / self.count as u32)
    }
}

impl Meter {
    pub const fn new() -> Meter {
        Meter {
            streamed_frames: AtomicU64::new(0),
            detections: AtomicU64::new(0),
            detection_micros: AtomicU64::new(0),
        }
    }

    pub fn tick_streamed(&self) {
        self.streamed_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished detection that took `elapsed` from frame copy to counts.
    pub fn record_detection(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.detection_micros.fetch_add(micros, Ordering::Relaxed);
        self.detections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_reset_streamed(&self) -> u64 {
        self.streamed_frames.swap(0, Ordering::Relaxed)
    }

    pub fn get_reset_detections(&self) -> DetectionStats {
        // Count and sum are read separately, a concurrent record may land in the next window
        let count = self.detections.swap(0, Ordering::Relaxed);
        let micros = self.detection_micros.swap(0, Ordering::Relaxed);
        DetectionStats {
            count,
            total: Duration::from_micros(micros),
        }
    }
}

pub fn spawn_meter_logger() -> JoinHandle<()> {
    tokio::spawn(async {
        let mut log_interval = interval(Duration::from_secs(2));
        log_interval.tick().await;

        loop {
            let start = Instant::now();
            log_interval.tick().await;

            let streamed_frames = METER.get_reset_streamed();
            let detections = METER.get_reset_detections();
            let fps_streamed = streamed_frames as f32 / start.elapsed().as_secs_f32();

            if streamed_frames > 0 {
                log::info!("Streamed frames per second: {fps_streamed:.2}")
            }
            if let Some(mean) = detections.mean() {
                log::info!(
                    "Detections: {}, mean latency {:.0} ms",
                    detections.count,
                    mean.as_secs_f64() * 1000.0
                )
            }
        }
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_counters_reset_on_read() {
        let meter = Meter::new();
        meter.tick_streamed();
        meter.tick_streamed();

        assert_eq!(meter.get_reset_streamed(), 2);
        assert_eq!(meter.get_reset_streamed(), 0);
    }

    #[test]
    fn test_mean_detection_latency() {
        let meter = Meter::new();
        assert_eq!(meter.get_reset_detections().mean(), None);

        meter.record_detection(Duration::from_millis(100));
        meter.record_detection(Duration::from_millis(300));

        let stats = meter.get_reset_detections();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.mean(), Some(Duration::from_millis(200)));
        assert_eq!(meter.get_reset_detections().count, 0);
    }
}

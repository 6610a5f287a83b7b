//! Sensors module.
//!
use common::PipelineError;
use image::RgbImage;
use rscam::{Camera, Config};
use simple_error::simple_error;

/// Error type of the capability probing helpers.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// Pixel format requested from the camera.
pub const MJPG: &str = "MJPG";

/// Source of raw camera frames.
pub trait CaptureDevice: Send {
    /// Block until the next frame is available.
    ///
    /// Fails with [`PipelineError::StreamEnded`] once the device stops delivering frames.
    fn next_frame(&mut self) -> common::Result<RgbImage>;
}

/// Settings used to open the capture device.
#[derive(Debug, Clone, Default)]
pub struct CaptureConfig {
    /// Index `N` of the V4L2 device `/dev/videoN`.
    pub device_index: u32,
    /// Capture resolution, the largest supported one if `None`.
    pub resolution: Option<(u32, u32)>,
    /// Frames per second, the highest supported rate if `None`.
    pub frame_rate: Option<u32>,
}

impl CaptureConfig {
    pub fn device_name(&self) -> String {
        format!("/dev/video{}", self.device_index)
    }
}

/// MJPG webcam on a Linux machine.
pub struct V4lCamera {
    cam: Camera,
    device_name: String,
}

impl V4lCamera {
    /// Open and start the camera described by `config`.
    ///
    /// Every failure maps to [`PipelineError::DeviceUnavailable`], nothing is retried.
    pub fn open(config: &CaptureConfig) -> common::Result<Self> {
        let device_name = config.device_name();
        start_camera(&device_name, config).map_err(|err| {
            PipelineError::DeviceUnavailable(format!("{device_name}: {err}"))
        })
    }
}

impl CaptureDevice for V4lCamera {
    fn next_frame(&mut self) -> common::Result<RgbImage> {
        loop {
            let frame = match self.cam.capture() {
                Ok(frame) => frame,
                Err(err) => {
                    log::warn!("Capturing from {} failed: {err}", &self.device_name);
                    return Err(PipelineError::StreamEnded);
                }
            };

            match turbojpeg::decompress_image(&frame[..]) {
                Ok(image) => return Ok(image),
                // A single corrupt MJPG frame does not end the stream
                Err(err) => log::warn!("Dropping undecodable frame: {err}"),
            }
        }
    }
}

fn start_camera(device_name: &str, config: &CaptureConfig) -> Result<V4lCamera, Error> {
    let mut cam = Camera::new(device_name)?;
    log_supported_formats(&cam, MJPG);
    let format = MJPG.as_bytes();

    let resolution = config
        .resolution
        .map(Ok)
        .unwrap_or_else(|| get_max_resolution(&cam, format))?;

    let interval = config
        .frame_rate
        .map(|fps| Ok((1, fps)))
        .unwrap_or_else(|| get_max_frame_rate(&cam, format, resolution))?;

    cam.start(&Config {
        interval,
        resolution,
        format,
        ..Default::default()
    })?;

    log::info!(
        "Using camera {} at {}x{}, interval {}/{}s",
        device_name,
        resolution.0,
        resolution.1,
        interval.0,
        interval.1
    );

    Ok(V4lCamera {
        cam,
        device_name: device_name.to_owned(),
    })
}

/// Parse a resolution given as `WIDTHxHEIGHT`.
pub fn parse_resolution(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {value:?}"))?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|err| format!("invalid width {width:?}: {err}"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|err| format!("invalid height {height:?}: {err}"))?;

    if width == 0 || height == 0 {
        return Err(format!("resolution must not be empty, got {value:?}"));
    }

    Ok((width, height))
}

/// Get the maximum supported resolution for the given format.
fn get_max_resolution(cam: &Camera, format: &[u8]) -> Result<(u32, u32), Error> {
    let resolution_info = cam.resolutions(format)?;
    log::debug!("Found resolutions: {:?}", &resolution_info);
    match resolution_info {
        rscam::ResolutionInfo::Discretes(resolutions) => resolutions
            .into_iter()
            // Highest resolution in terms of number of pixels
            .max_by_key(|(width, height)| width * height),
        rscam::ResolutionInfo::Stepwise { max, .. } => Some(max),
    }
    .ok_or_else(|| simple_error!("No resolution found").into())
}

/// Get the frame interval of the highest supported frame rate.
///
/// Intervals are `(numerator, denominator)` in seconds, `(1, 30)` is 30 frames per second.
fn get_max_frame_rate(
    cam: &Camera,
    format: &[u8],
    resolution: (u32, u32),
) -> Result<(u32, u32), Error> {
    let interval_info = cam.intervals(format, resolution)?;
    log::debug!("Found frame intervals: {:?}", &interval_info);
    match interval_info {
        rscam::IntervalInfo::Discretes(intervals) => intervals
            .into_iter()
            .filter(|(numerator, _)| *numerator > 0)
            .max_by(|a, b| {
                let rate_a = a.1 as f64 / a.0 as f64;
                let rate_b = b.1 as f64 / b.0 as f64;
                rate_a.total_cmp(&rate_b)
            }),
        // The shortest interval is the highest frame rate
        rscam::IntervalInfo::Stepwise { min, .. } => Some(min),
    }
    .ok_or_else(|| simple_error!("No frame rate found").into())
}

fn log_supported_formats(cam: &Camera, format: &str) {
    let formats: Vec<_> = cam.formats().filter_map(|fmt| fmt.ok()).collect();
    log::debug!(
        "Supported formats: {:?}, using format {:?}",
        formats,
        format
    );
}

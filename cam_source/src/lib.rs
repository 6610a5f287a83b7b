//! Camera capture for the detection server.
//!
//! Opens a V4L2 webcam, mirrors every frame, publishes it to a [`common::LatestFrame`] slot
//! and serves the frames as a multipart JPEG stream.
pub mod frame_source;
pub mod sensors;

pub use frame_source::FrameSource;
pub use sensors::{CaptureConfig, CaptureDevice, V4lCamera};

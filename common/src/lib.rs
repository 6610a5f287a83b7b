//! Common code shared between `detect_server` and `cam_source`.
pub mod error;
pub mod frame;
pub mod protocol;

pub use error::{PipelineError, Result};
pub use frame::{Frame, LatestFrame};

//! Spoken object counts for a live webcam.
//!
//! On request, the latest camera frame is passed through a YOLO network, duplicate boxes are
//! suppressed and the remaining detections are counted per class and announced.
pub mod aggregator;
pub mod announcer;
pub mod bbox;
pub mod decoder;
pub mod endpoints;
pub mod labels;
pub mod meter;
pub mod nn;
pub mod pipeline;
pub mod suppressor;

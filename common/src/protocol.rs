//! Framing of the encoded frame stream.
//!
//! Every captured frame is sent as one part of a `multipart/x-mixed-replace` body, which
//! browsers render as a continuously replaced image.
use bytes::Bytes;

/// Boundary marker separating two frames in the stream.
pub const BOUNDARY: &str = "frame";

/// Content type of a response carrying the frame stream.
pub const MULTIPART_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Wrap a JPEG-encoded frame into one part of the multipart stream.
pub fn as_jpeg_stream_item(data: &[u8]) -> Bytes {
    Bytes::copy_from_slice(
        &[
            "--frame\r\nContent-Type: image/jpeg\r\n\r\n".as_bytes(),
            data,
            "\r\n\r\n".as_bytes(),
        ]
        .concat(),
    )
}

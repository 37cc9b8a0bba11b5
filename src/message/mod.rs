// ABOUTME: Message layer — fixed-layout binary records exchanged over the wire
// ABOUTME: Every variant owns a contiguous little-endian byte buffer and knows its own size

mod ack;
mod binary_mask;
mod calibration;
mod data;
mod frame;
mod frame_header;
mod simple;

pub use ack::AckMessage;
pub use binary_mask::BinaryMaskMessage;
pub use calibration::CalibrationMessage;
pub use data::DataMessage;
pub use frame::FrameMessage;
pub use frame_header::FrameHeaderMessage;
pub use simple::{ControlCode, ControlMessage, SimpleMessage};

/// A message backed by a contiguous byte buffer of fixed size.
///
/// All multi-byte scalars in the buffer are little-endian; all matrices are
/// row-major 32-bit floats. `size()` is the number of bytes this message
/// occupies on the wire — callers (the socket layer, the pool) only ever
/// need to know that and how to get at the raw bytes.
pub trait Message: Send + Sync {
    /// The number of bytes this message occupies on the wire.
    fn size(&self) -> usize {
        self.as_bytes().len()
    }

    /// The message's backing buffer.
    fn as_bytes(&self) -> &[u8];

    /// The message's backing buffer, for in-place writes by the socket layer.
    fn as_bytes_mut(&mut self) -> &mut [u8];
}

/// Image shape as (height, width, channels), matching
/// `CalibrationMessage`/`FrameHeaderMessage` layout order.
pub type ImageShape = (i32, i32, i32);

/// Pinhole camera intrinsics (fx, fy, cx, cy).
pub type Intrinsics = (f32, f32, f32, f32);

pub(crate) fn image_byte_size(shape: ImageShape, element_byte_size: i32) -> usize {
    let (h, w, c) = shape;
    (h as usize) * (w as usize) * (c as usize) * (element_byte_size as usize)
}

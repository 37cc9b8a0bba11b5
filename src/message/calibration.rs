use super::{ImageShape, Intrinsics, Message, image_byte_size};
use bytes::{Buf, BufMut};
use std::io::Cursor;

/// Per-slot byte size: image_shape (3×i32) + intrinsics (4×f32) + element_byte_size (i32).
const SLOT_SIZE: usize = 12 + 16 + 4;

/// Camera calibration for every image slot a connection will carry.
///
/// Laid out as `max_images: i32` followed by `max_images` fixed-size slots,
/// each `(image_shape, intrinsics, element_byte_size)`. The implementation
/// fixes `max_images` to 2 for both services (colour + depth).
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationMessage {
    max_images: i32,
    data: Vec<u8>,
}

impl CalibrationMessage {
    pub fn new(max_images: i32) -> Self {
        let size = 4 + max_images as usize * SLOT_SIZE;
        Self {
            max_images,
            data: vec![0; size],
        }
    }

    /// Build the calibration message for an RGB-D pair: an 8-bit colour
    /// image and a 16-bit depth image, both described by pinhole intrinsics.
    pub fn rgbd(
        rgb_shape: ImageShape,
        depth_shape: ImageShape,
        rgb_intrinsics: Intrinsics,
        depth_intrinsics: Intrinsics,
    ) -> Self {
        let mut msg = Self::new(2);
        msg.set_image_shapes(&[rgb_shape, depth_shape]);
        msg.set_intrinsics(&[rgb_intrinsics, depth_intrinsics]);
        msg.set_element_byte_sizes(&[1, 2]);
        msg
    }

    pub fn max_images(&self) -> i32 {
        self.max_images
    }

    fn slot_offset(&self, idx: usize) -> usize {
        4 + idx * SLOT_SIZE
    }

    pub fn image_shapes(&self) -> Vec<ImageShape> {
        (0..self.max_images as usize)
            .map(|i| {
                let mut cur = Cursor::new(&self.data[self.slot_offset(i)..]);
                (cur.get_i32_le(), cur.get_i32_le(), cur.get_i32_le())
            })
            .collect()
    }

    pub fn set_image_shapes(&mut self, shapes: &[ImageShape]) {
        assert_eq!(shapes.len(), self.max_images as usize);
        for (i, &(h, w, c)) in shapes.iter().enumerate() {
            let off = self.slot_offset(i);
            let mut buf = &mut self.data[off..off + 12];
            buf.put_i32_le(h);
            buf.put_i32_le(w);
            buf.put_i32_le(c);
        }
    }

    pub fn intrinsics(&self) -> Vec<Intrinsics> {
        (0..self.max_images as usize)
            .map(|i| {
                let off = self.slot_offset(i) + 12;
                let mut cur = Cursor::new(&self.data[off..]);
                (
                    cur.get_f32_le(),
                    cur.get_f32_le(),
                    cur.get_f32_le(),
                    cur.get_f32_le(),
                )
            })
            .collect()
    }

    pub fn set_intrinsics(&mut self, intrinsics: &[Intrinsics]) {
        assert_eq!(intrinsics.len(), self.max_images as usize);
        for (i, &(fx, fy, cx, cy)) in intrinsics.iter().enumerate() {
            let off = self.slot_offset(i) + 12;
            let mut buf = &mut self.data[off..off + 16];
            buf.put_f32_le(fx);
            buf.put_f32_le(fy);
            buf.put_f32_le(cx);
            buf.put_f32_le(cy);
        }
    }

    pub fn element_byte_sizes(&self) -> Vec<i32> {
        (0..self.max_images as usize)
            .map(|i| {
                let off = self.slot_offset(i) + 12 + 16;
                Cursor::new(&self.data[off..]).get_i32_le()
            })
            .collect()
    }

    pub fn set_element_byte_sizes(&mut self, sizes: &[i32]) {
        assert_eq!(sizes.len(), self.max_images as usize);
        for (i, &size) in sizes.iter().enumerate() {
            let off = self.slot_offset(i) + 12 + 16;
            let mut buf = &mut self.data[off..off + 4];
            buf.put_i32_le(size);
        }
    }

    /// The uncompressed byte size of each image slot: `h * w * c * element_byte_size`.
    pub fn uncompressed_image_byte_sizes(&self) -> Vec<usize> {
        self.image_shapes()
            .into_iter()
            .zip(self.element_byte_sizes())
            .map(|(shape, elt)| image_byte_size(shape, elt))
            .collect()
    }
}

impl Message for CalibrationMessage {
    fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgbd_calibration_round_trips() {
        let msg = CalibrationMessage::rgbd(
            (480, 640, 3),
            (480, 640, 1),
            (500.0, 500.0, 320.0, 240.0),
            (500.0, 500.0, 320.0, 240.0),
        );
        assert_eq!(msg.image_shapes(), vec![(480, 640, 3), (480, 640, 1)]);
        assert_eq!(
            msg.intrinsics(),
            vec![(500.0, 500.0, 320.0, 240.0), (500.0, 500.0, 320.0, 240.0)]
        );
        assert_eq!(msg.element_byte_sizes(), vec![1, 2]);
        assert_eq!(
            msg.uncompressed_image_byte_sizes(),
            vec![480 * 640 * 3, 480 * 640 * 2]
        );
    }

    #[test]
    fn parse_build_round_trip() {
        let built = CalibrationMessage::rgbd(
            (480, 640, 3),
            (480, 640, 1),
            (525.0, 525.0, 319.5, 239.5),
            (525.0, 525.0, 319.5, 239.5),
        );
        let mut parsed = CalibrationMessage::new(2);
        parsed.as_bytes_mut().copy_from_slice(built.as_bytes());
        assert_eq!(parsed.image_shapes(), built.image_shapes());
        assert_eq!(parsed.intrinsics(), built.intrinsics());
    }
}

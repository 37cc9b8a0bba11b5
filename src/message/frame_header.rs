use super::{ImageShape, Message};
use bytes::{Buf, BufMut};
use std::io::Cursor;

/// Per-slot byte size: image_shape (3×i32) + image_byte_size (i32).
const SLOT_SIZE: usize = 12 + 4;

/// Announces the shapes and on-wire byte sizes of the images a [`super::FrameMessage`]
/// is about to carry, so the receiver can size its read before the frame arrives.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameHeaderMessage {
    max_images: usize,
    data: Vec<u8>,
}

impl FrameHeaderMessage {
    pub fn new(max_images: usize) -> Self {
        Self {
            max_images,
            data: vec![0; max_images * SLOT_SIZE],
        }
    }

    fn slot_offset(&self, idx: usize) -> usize {
        idx * SLOT_SIZE
    }

    pub fn image_shapes(&self) -> Vec<ImageShape> {
        (0..self.max_images)
            .map(|i| {
                let mut cur = Cursor::new(&self.data[self.slot_offset(i)..]);
                (cur.get_i32_le(), cur.get_i32_le(), cur.get_i32_le())
            })
            .collect()
    }

    pub fn set_image_shapes(&mut self, shapes: &[ImageShape]) {
        assert_eq!(shapes.len(), self.max_images);
        for (i, &(h, w, c)) in shapes.iter().enumerate() {
            let off = self.slot_offset(i);
            let mut buf = &mut self.data[off..off + 12];
            buf.put_i32_le(h);
            buf.put_i32_le(w);
            buf.put_i32_le(c);
        }
    }

    pub fn image_byte_sizes(&self) -> Vec<usize> {
        (0..self.max_images)
            .map(|i| {
                let off = self.slot_offset(i) + 12;
                Cursor::new(&self.data[off..]).get_i32_le() as usize
            })
            .collect()
    }

    pub fn set_image_byte_sizes(&mut self, sizes: &[usize]) {
        assert_eq!(sizes.len(), self.max_images);
        for (i, &size) in sizes.iter().enumerate() {
            let off = self.slot_offset(i) + 12;
            let mut buf = &mut self.data[off..off + 4];
            buf.put_i32_le(size as i32);
        }
    }
}

impl Message for FrameHeaderMessage {
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
    fn header_round_trips_shapes_and_sizes() {
        let mut header = FrameHeaderMessage::new(2);
        header.set_image_shapes(&[(480, 640, 3), (480, 640, 1)]);
        header.set_image_byte_sizes(&[480 * 640 * 3, 480 * 640 * 2]);

        assert_eq!(header.image_shapes(), vec![(480, 640, 3), (480, 640, 1)]);
        assert_eq!(
            header.image_byte_sizes(),
            vec![480 * 640 * 3, 480 * 640 * 2]
        );
    }
}

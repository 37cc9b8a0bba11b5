use super::{ImageShape, Message};
use bytes::{Buf, BufMut};
use std::io::Cursor;

const POSE_BYTE_SIZE: usize = 16 * 4; // a 4x4 matrix of f32

/// One RGB-D observation: frame index, optional timestamp, one pose per
/// image slot, and the image bytes themselves.
///
/// A frame may hold either raw or compressed images — the byte sizes
/// passed to [`FrameMessage::new`] are whatever the images actually occupy
/// on the wire. The invariant from spec.md §3 holds by construction:
/// `size() == 4 + 8 + 64 * N + sum(image_byte_sizes)`.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMessage {
    image_shapes: Vec<ImageShape>,
    image_byte_sizes: Vec<usize>,
    poses_offset: usize,
    images_offset: usize,
    data: Vec<u8>,
}

impl FrameMessage {
    pub fn new(image_shapes: Vec<ImageShape>, image_byte_sizes: Vec<usize>) -> Self {
        assert_eq!(image_shapes.len(), image_byte_sizes.len());

        let poses_offset = 4 + 8;
        let images_offset = poses_offset + POSE_BYTE_SIZE * image_shapes.len();
        let total = images_offset + image_byte_sizes.iter().sum::<usize>();

        let mut msg = Self {
            image_shapes,
            image_byte_sizes,
            poses_offset,
            images_offset,
            data: vec![0; total],
        };
        msg.set_frame_timestamp(None);
        msg
    }

    pub fn frame_index(&self) -> i32 {
        Cursor::new(&self.data[0..4]).get_i32_le()
    }

    pub fn set_frame_index(&mut self, frame_index: i32) {
        (&mut self.data[0..4]).put_i32_le(frame_index);
    }

    /// `None` means the timestamp is unknown (wire sentinel `-1.0`).
    pub fn frame_timestamp(&self) -> Option<f64> {
        let ts = Cursor::new(&self.data[4..12]).get_f64_le();
        (ts >= 0.0).then_some(ts)
    }

    pub fn set_frame_timestamp(&mut self, frame_timestamp: Option<f64>) {
        (&mut self.data[4..12]).put_f64_le(frame_timestamp.unwrap_or(-1.0));
    }

    pub fn image_shapes(&self) -> &[ImageShape] {
        &self.image_shapes
    }

    pub fn image_byte_sizes(&self) -> &[usize] {
        &self.image_byte_sizes
    }

    fn image_offset(&self, image_idx: usize) -> usize {
        self.images_offset + self.image_byte_sizes[..image_idx].iter().sum::<usize>()
    }

    pub fn image_data(&self, image_idx: usize) -> &[u8] {
        let start = self.image_offset(image_idx);
        let end = start + self.image_byte_sizes[image_idx];
        &self.data[start..end]
    }

    pub fn set_image_data(&mut self, image_idx: usize, image_data: &[u8]) {
        let start = self.image_offset(image_idx);
        let size = self.image_byte_sizes[image_idx];
        assert_eq!(image_data.len(), size);
        self.data[start..start + size].copy_from_slice(image_data);
    }

    fn pose_offset(&self, image_idx: usize) -> usize {
        self.poses_offset + image_idx * POSE_BYTE_SIZE
    }

    /// The 4x4 pose matrix (row-major) for the given image slot.
    pub fn pose(&self, image_idx: usize) -> [[f32; 4]; 4] {
        let start = self.pose_offset(image_idx);
        let mut cur = Cursor::new(&self.data[start..start + POSE_BYTE_SIZE]);
        let mut pose = [[0.0f32; 4]; 4];
        for row in &mut pose {
            for v in row.iter_mut() {
                *v = cur.get_f32_le();
            }
        }
        pose
    }

    pub fn set_pose(&mut self, image_idx: usize, pose: &[[f32; 4]; 4]) {
        let start = self.pose_offset(image_idx);
        let mut buf = &mut self.data[start..start + POSE_BYTE_SIZE];
        for row in pose {
            for &v in row {
                buf.put_f32_le(v);
            }
        }
    }
}

impl Message for FrameMessage {
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

    fn identity() -> [[f32; 4]; 4] {
        let mut m = [[0.0; 4]; 4];
        for i in 0..4 {
            m[i][i] = 1.0;
        }
        m
    }

    #[test]
    fn size_matches_invariant() {
        let shapes = vec![(480, 640, 3), (480, 640, 1)];
        let sizes = vec![480 * 640 * 3, 480 * 640 * 2];
        let msg = FrameMessage::new(shapes.clone(), sizes.clone());
        assert_eq!(msg.size(), 4 + 8 + 64 * shapes.len() + sizes.iter().sum::<usize>());
    }

    #[test]
    fn round_trips_index_timestamp_pose_and_images() {
        let shapes = vec![(2, 2, 3), (2, 2, 1)];
        let sizes = vec![2 * 2 * 3, 2 * 2 * 2];
        let mut msg = FrameMessage::new(shapes, sizes);

        msg.set_frame_index(42);
        msg.set_frame_timestamp(Some(1.5));
        msg.set_pose(0, &identity());
        msg.set_pose(1, &identity());

        let rgb = vec![1u8; 12];
        let depth = vec![2u8; 8];
        msg.set_image_data(0, &rgb);
        msg.set_image_data(1, &depth);

        assert_eq!(msg.frame_index(), 42);
        assert_eq!(msg.frame_timestamp(), Some(1.5));
        assert_eq!(msg.pose(0), identity());
        assert_eq!(msg.image_data(0), &rgb[..]);
        assert_eq!(msg.image_data(1), &depth[..]);
    }

    #[test]
    fn unknown_timestamp_round_trips_to_none() {
        let mut msg = FrameMessage::new(vec![(1, 1, 1)], vec![1]);
        msg.set_frame_timestamp(None);
        assert_eq!(msg.frame_timestamp(), None);
    }
}

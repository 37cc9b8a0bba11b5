// ABOUTME: Minimal placeholder skeleton/joint types plus their wire serialisation
// ABOUTME: Chosen per SPEC_FULL.md §6/§9: joint count, then (id, x, y, z) tuples, skeleton count first

use crate::error::{Error, Result};
use bytes::{Buf, BufMut, BytesMut};
use std::io::Cursor;

/// A single 3-D keypoint. The `id` is library-defined (e.g. a joint-name
/// enum elsewhere); this type carries only what the wire format needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Joint {
    pub id: u32,
    pub position: [f32; 3],
}

/// A detected person: an unordered bag of joints. Skeleton geometry (bones,
/// kinematic constraints) is out of scope here — see spec.md §1.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Skeleton {
    pub joints: Vec<Joint>,
}

/// Encode `skeletons` as `skeleton_count: u32`, then per skeleton
/// `joint_count: u32` followed by that many `(id: u32, x, y, z: f32)` tuples.
pub fn encode_skeletons(skeletons: &[Skeleton]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u32_le(skeletons.len() as u32);
    for skeleton in skeletons {
        buf.put_u32_le(skeleton.joints.len() as u32);
        for joint in &skeleton.joints {
            buf.put_u32_le(joint.id);
            buf.put_f32_le(joint.position[0]);
            buf.put_f32_le(joint.position[1]);
            buf.put_f32_le(joint.position[2]);
        }
    }
    buf.to_vec()
}

pub fn decode_skeletons(data: &[u8]) -> Result<Vec<Skeleton>> {
    let mut cur = Cursor::new(data);
    let truncated = || Error::Protocol("truncated skeleton data".into());

    if cur.remaining() < 4 {
        return Err(truncated());
    }
    let skeleton_count = cur.get_u32_le();

    let mut skeletons = Vec::with_capacity(skeleton_count as usize);
    for _ in 0..skeleton_count {
        if cur.remaining() < 4 {
            return Err(truncated());
        }
        let joint_count = cur.get_u32_le();

        let mut joints = Vec::with_capacity(joint_count as usize);
        for _ in 0..joint_count {
            if cur.remaining() < 16 {
                return Err(truncated());
            }
            joints.push(Joint {
                id: cur.get_u32_le(),
                position: [cur.get_f32_le(), cur.get_f32_le(), cur.get_f32_le()],
            });
        }
        skeletons.push(Skeleton { joints });
    }

    Ok(skeletons)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_empty() {
        assert_eq!(decode_skeletons(&encode_skeletons(&[])).unwrap(), vec![]);
    }

    #[test]
    fn round_trips_joints() {
        let skeletons = vec![
            Skeleton {
                joints: vec![
                    Joint { id: 0, position: [1.0, 2.0, 3.0] },
                    Joint { id: 1, position: [-1.0, 0.0, 5.5] },
                ],
            },
            Skeleton { joints: vec![] },
        ];
        let encoded = encode_skeletons(&skeletons);
        assert_eq!(decode_skeletons(&encoded).unwrap(), skeletons);
    }

    #[test]
    fn rejects_truncated_data() {
        let encoded = encode_skeletons(&[Skeleton {
            joints: vec![Joint { id: 0, position: [1.0, 2.0, 3.0] }],
        }]);
        assert!(decode_skeletons(&encoded[..encoded.len() - 1]).is_err());
    }
}

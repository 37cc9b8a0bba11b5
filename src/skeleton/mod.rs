// ABOUTME: Skeleton-detection transport — single-client BEGIN/END/SET_CALIBRATION request-response
// ABOUTME: Mirrors smg.comms.skeletons

mod client;
mod service;
mod skeletons;

pub use client::{FrameCompressor, SkeletonDetectionClient, SkeletonDetectionClientBuilder};
pub use service::{
    FrameDecompressor, FrameProcessor, PeopleMaskRenderer, SkeletonDetectionService, SkeletonDetectionServiceBuilder,
};
pub use skeletons::{decode_skeletons, encode_skeletons, Joint, Skeleton};

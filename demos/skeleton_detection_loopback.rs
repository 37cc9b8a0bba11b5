// ABOUTME: Minimal usage demo for the skeleton-detection client/service pair
// ABOUTME: Mirrors original_source/examples/try_skeleton_detection_client.py / _service.py

use smg_comms::message::{BinaryMaskMessage, CalibrationMessage, Intrinsics};
use smg_comms::skeleton::{FrameProcessor, SkeletonDetectionClientBuilder, SkeletonDetectionServiceBuilder};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

struct NoOpProcessor;

impl FrameProcessor for NoOpProcessor {
    fn process(
        &self,
        _rgb: &[u8],
        _depth: &[u8],
        _pose: &[[f32; 4]; 4],
        _intrinsics: Intrinsics,
    ) -> (Vec<u8>, Option<BinaryMaskMessage>) {
        (smg_comms::skeleton::encode_skeletons(&[]), Some(BinaryMaskMessage::new((480, 640))))
    }
}

#[tokio::main]
async fn main() {
    tracing::subscriber::set_global_default(FmtSubscriber::new()).ok();

    let mut service = SkeletonDetectionServiceBuilder::new()
        .port(0)
        .frame_processor(Arc::new(NoOpProcessor))
        .start()
        .await
        .expect("bind service");
    let addr = service.local_addr();

    let mut client = SkeletonDetectionClientBuilder::new()
        .endpoint(addr)
        .connect()
        .await
        .expect("connect to service");

    let intrinsics = (500.0, 500.0, 320.0, 240.0);
    let calib = CalibrationMessage::rgbd((480, 640, 3), (480, 640, 1), intrinsics, intrinsics);
    client.set_calibration(calib).await.expect("set calibration");

    client.begin_detection(|_frame| {}).await.expect("begin detection");
    let result = client.end_detection().await.expect("end detection");
    info!(found = result.is_some(), "detection round-trip complete");

    client.terminate().await;
    service.terminate().await;
}

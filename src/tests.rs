//! End-to-end integration tests exercising the mapping and skeleton-detection
//! services over real loopback TCP connections.

use crate::mapping::{MappingClientBuilder, MappingServerBuilder};
use crate::message::{BinaryMaskMessage, CalibrationMessage, Intrinsics};
use crate::pool::OverflowPolicy;
use crate::skeleton::{FrameProcessor, SkeletonDetectionClientBuilder, SkeletonDetectionServiceBuilder};
use std::sync::Arc;
use std::time::Duration;

fn rgbd_calibration() -> CalibrationMessage {
    let intrinsics: Intrinsics = (500.0, 500.0, 320.0, 240.0);
    CalibrationMessage::rgbd((480, 640, 3), (480, 640, 1), intrinsics, intrinsics)
}

#[tokio::test]
async fn calibration_handshake_publishes_image_shapes() {
    let mut server = MappingServerBuilder::new().port(0).start().await.unwrap();
    let addr = server.local_addr();

    let mut client = MappingClientBuilder::new().endpoint(addr).connect().await.unwrap();
    client.send_calibration_message(rgbd_calibration()).await.unwrap();

    server.wait_for_client(0).await;
    let shapes = wait_for(|| server.image_shapes(0)).await;
    assert_eq!(shapes, vec![(480, 640, 3), (480, 640, 1)]);

    client.terminate().await;
    server.terminate().await;
}

#[tokio::test]
async fn frame_ordering_under_block_delivers_every_index_in_order() {
    let mut server = MappingServerBuilder::new()
        .port(0)
        .pool_policy(OverflowPolicy::Block)
        .start()
        .await
        .unwrap();
    let addr = server.local_addr();

    let mut client = MappingClientBuilder::new()
        .endpoint(addr)
        .pool_policy(OverflowPolicy::Block)
        .connect()
        .await
        .unwrap();
    client.send_calibration_message(rgbd_calibration()).await.unwrap();
    server.wait_for_client(0).await;

    for i in 0..10 {
        client
            .send_frame_message(move |frame| frame.set_frame_index(i))
            .await;
    }

    let mut received = Vec::new();
    for _ in 0..10 {
        let idx = server
            .get_frame(0, |frame| frame.frame_index())
            .await
            .expect("frame should arrive");
        received.push(idx);
    }
    assert_eq!(received, (0..10).collect::<Vec<_>>());

    client.terminate().await;
    server.terminate().await;
}

#[tokio::test]
async fn frame_ordering_under_discard_is_a_subsequence_ending_at_last_index() {
    let mut server = MappingServerBuilder::new()
        .port(0)
        .pool_policy(OverflowPolicy::Discard)
        .start()
        .await
        .unwrap();
    let addr = server.local_addr();

    let mut client = MappingClientBuilder::new()
        .endpoint(addr)
        .pool_policy(OverflowPolicy::Discard)
        .connect()
        .await
        .unwrap();
    client.send_calibration_message(rgbd_calibration()).await.unwrap();
    server.wait_for_client(0).await;

    // The mapping client's own queue is capacity 1, so a send that isn't
    // paced outruns the wire; pace sends so a handful actually land before
    // the final drain, exactly as the "slow consumer" scenario calls for.
    for i in 0..10 {
        client
            .send_frame_message(move |frame| frame.set_frame_index(i))
            .await;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let mut received = Vec::new();
    while server.has_frames_now(0).await {
        if let Some(idx) = server.get_frame(0, |frame| frame.frame_index()).await {
            received.push(idx);
        }
    }

    assert!(!received.is_empty());
    assert_eq!(*received.last().unwrap(), 9);
    assert!(received.windows(2).all(|w| w[0] < w[1]));

    client.terminate().await;
    server.terminate().await;
}

#[tokio::test]
async fn disconnected_client_drains_queued_frames_before_finishing() {
    let mut server = MappingServerBuilder::new()
        .port(0)
        .pool_policy(OverflowPolicy::Block)
        .start()
        .await
        .unwrap();
    let addr = server.local_addr();

    let mut client = MappingClientBuilder::new()
        .endpoint(addr)
        .pool_policy(OverflowPolicy::Block)
        .connect()
        .await
        .unwrap();
    client.send_calibration_message(rgbd_calibration()).await.unwrap();
    server.wait_for_client(0).await;

    for i in 0..3 {
        client
            .send_frame_message(move |frame| frame.set_frame_index(i))
            .await;
    }
    // Let the last frame's ack round-trip land before the client vanishes.
    tokio::time::sleep(Duration::from_millis(50)).await;
    client.terminate().await;

    // The handler stays reachable and still yields every frame it already
    // queued, even though the connection is already gone.
    let mut received = Vec::new();
    for _ in 0..3 {
        let idx = server
            .get_frame(0, |frame| frame.frame_index())
            .await
            .expect("queued frame should still be delivered after disconnect");
        received.push(idx);
    }
    assert_eq!(received, vec![0, 1, 2]);

    // Only once the queue is drained does the handler retire.
    wait_for(|| async { server.has_finished(0).await.then_some(()) }).await;
    assert_eq!(server.active_client_count().await, 0);

    server.terminate().await;
}

struct EmptySkeletonProcessor;

impl FrameProcessor for EmptySkeletonProcessor {
    fn process(
        &self,
        _rgb: &[u8],
        _depth: &[u8],
        _pose: &[[f32; 4]; 4],
        _intrinsics: Intrinsics,
    ) -> (Vec<u8>, Option<BinaryMaskMessage>) {
        (
            crate::skeleton::encode_skeletons(&[]),
            Some(BinaryMaskMessage::new((480, 640))),
        )
    }
}

fn identity_pose() -> [[f32; 4]; 4] {
    let mut m = [[0.0f32; 4]; 4];
    for i in 0..4 {
        m[i][i] = 1.0;
    }
    m
}

#[tokio::test]
async fn skeleton_begin_end_returns_empty_skeletons_and_zero_mask() {
    let mut service = SkeletonDetectionServiceBuilder::new()
        .port(0)
        .frame_processor(Arc::new(EmptySkeletonProcessor))
        .start()
        .await
        .unwrap();
    let addr = service.local_addr();

    let mut client = SkeletonDetectionClientBuilder::new().endpoint(addr).connect().await.unwrap();

    client.set_calibration(rgbd_calibration()).await.unwrap();
    client
        .begin_detection(|frame| {
            frame.set_pose(0, &identity_pose());
        })
        .await
        .unwrap();

    let (skeletons, mask) = client.end_detection().await.unwrap().expect("a BEGIN preceded this END");
    assert!(skeletons.is_empty());
    assert_eq!(mask.shape(), (480, 640));
    assert!(mask.mask().iter().all(|&px| px == 0));

    client.terminate().await;
    service.terminate().await;
}

#[tokio::test]
async fn end_before_begin_elicits_no_response() {
    let mut service = SkeletonDetectionServiceBuilder::new()
        .port(0)
        .frame_processor(Arc::new(EmptySkeletonProcessor))
        .start()
        .await
        .unwrap();
    let addr = service.local_addr();

    let mut client = SkeletonDetectionClientBuilder::new().endpoint(addr).connect().await.unwrap();

    // No begin_detection() was called, so the client must not even write
    // the request, and the service must not perturb its state.
    let result = client.end_detection().await.unwrap();
    assert!(result.is_none());

    client.terminate().await;
    service.terminate().await;
}

async fn wait_for<F, Fut, T>(mut poll: F) -> T
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Option<T>>,
{
    loop {
        if let Some(v) = poll().await {
            return v;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ABOUTME: Minimal usage demo for the mapping client/server pair
// ABOUTME: Starts a server, streams a handful of frames from a client, reads them back

use smg_comms::mapping::{MappingClientBuilder, MappingServerBuilder};
use smg_comms::message::CalibrationMessage;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() {
    tracing::subscriber::set_global_default(FmtSubscriber::new()).ok();

    let mut server = MappingServerBuilder::new().port(0).start().await.expect("bind server");
    let addr = server.local_addr();

    let mut client = MappingClientBuilder::new()
        .endpoint(addr)
        .connect()
        .await
        .expect("connect to server");

    let intrinsics = (500.0, 500.0, 320.0, 240.0);
    let calib = CalibrationMessage::rgbd((480, 640, 3), (480, 640, 1), intrinsics, intrinsics);
    client.send_calibration_message(calib).await.expect("calibration handshake");
    server.wait_for_client(0).await;

    for i in 0..5 {
        client.send_frame_message(move |frame| frame.set_frame_index(i)).await;
        let index = server.get_frame(0, |frame| frame.frame_index()).await;
        info!(?index, "received frame");
    }

    client.terminate().await;
    server.terminate().await;
}

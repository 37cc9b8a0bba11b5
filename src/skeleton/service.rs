// ABOUTME: Skeleton-detection service — single-client request/response loop over BEGIN/END/SET_CALIBRATION
// ABOUTME: Mirrors smg.comms.skeletons.SkeletonDetectionService; frame_processor/mask renderer are external collaborators

use crate::error::Result;
use crate::message::{
    AckMessage, BinaryMaskMessage, CalibrationMessage, ControlCode, ControlMessage, DataMessage, FrameHeaderMessage,
    FrameMessage, Intrinsics, SimpleMessage,
};
use crate::socket::{read_message, write_message};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Fixed number of calibrated image slots (colour + depth), per spec.md §6.
pub const MAX_IMAGES: i32 = 2;

/// A function that decompresses a frame received from a client prior to detection.
pub type FrameDecompressor = Arc<dyn Fn(&FrameMessage) -> FrameMessage + Send + Sync>;

/// The skeleton-detection algorithm itself: out of scope (spec.md §1). Given
/// a frame's colour/depth planes, pose and intrinsics, returns the detected
/// skeletons already serialised to the wire blob format (see
/// [`super::skeletons::encode_skeletons`]), plus an optional mask — if
/// `None`, the service synthesises one via [`PeopleMaskRenderer`].
pub trait FrameProcessor: Send + Sync {
    fn process(
        &self,
        rgb: &[u8],
        depth: &[u8],
        pose: &[[f32; 4]; 4],
        intrinsics: Intrinsics,
    ) -> (Vec<u8>, Option<BinaryMaskMessage>);
}

/// Renders a people-mask from a serialised skeleton blob: out of scope
/// (spec.md §1), installed as an external collaborator.
pub trait PeopleMaskRenderer: Send + Sync {
    fn render(&self, skeleton_data: &[u8], intrinsics: Intrinsics, shape: (i32, i32)) -> BinaryMaskMessage;
}

struct ServiceState {
    token: CancellationToken,
    frame_decompressor: Option<FrameDecompressor>,
    frame_processor: Option<Arc<dyn FrameProcessor>>,
    people_mask_renderer: Option<Arc<dyn PeopleMaskRenderer>>,
}

/// Builder for [`SkeletonDetectionService`].
pub struct SkeletonDetectionServiceBuilder {
    port: u16,
    frame_decompressor: Option<FrameDecompressor>,
    frame_processor: Option<Arc<dyn FrameProcessor>>,
    people_mask_renderer: Option<Arc<dyn PeopleMaskRenderer>>,
}

impl Default for SkeletonDetectionServiceBuilder {
    fn default() -> Self {
        Self {
            port: 7852,
            frame_decompressor: None,
            frame_processor: None,
            people_mask_renderer: None,
        }
    }
}

impl SkeletonDetectionServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn frame_decompressor(mut self, decompressor: FrameDecompressor) -> Self {
        self.frame_decompressor = Some(decompressor);
        self
    }

    pub fn frame_processor(mut self, processor: Arc<dyn FrameProcessor>) -> Self {
        self.frame_processor = Some(processor);
        self
    }

    pub fn people_mask_renderer(mut self, renderer: Arc<dyn PeopleMaskRenderer>) -> Self {
        self.people_mask_renderer = Some(renderer);
        self
    }

    pub async fn start(self) -> Result<SkeletonDetectionService> {
        let listener = TcpListener::bind(("127.0.0.1", self.port)).await?;
        let local_addr = listener.local_addr()?;
        let token = CancellationToken::new();

        let state = Arc::new(ServiceState {
            token: token.clone(),
            frame_decompressor: self.frame_decompressor,
            frame_processor: self.frame_processor,
            people_mask_renderer: self.people_mask_renderer,
        });

        let accept_task = tokio::spawn(accept_loop(listener, state));

        Ok(SkeletonDetectionService {
            token,
            local_addr,
            accept_task: Some(accept_task),
        })
    }
}

/// Accepts skeleton-detection clients one at a time: the accept loop only
/// resumes once the current client disconnects (spec.md §4.5).
pub struct SkeletonDetectionService {
    token: CancellationToken,
    local_addr: std::net::SocketAddr,
    accept_task: Option<tokio::task::JoinHandle<()>>,
}

impl SkeletonDetectionService {
    pub async fn start(port: u16) -> Result<Self> {
        SkeletonDetectionServiceBuilder::new().port(port).start().await
    }

    /// The address this service actually bound to (useful when `port: 0` was requested).
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    pub async fn terminate(&mut self) {
        self.token.cancel();
        if let Some(task) = self.accept_task.take()
            && let Err(e) = task.await
        {
            warn!(error = %e, "skeleton service accept loop panicked");
        }
    }
}

impl Drop for SkeletonDetectionService {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn accept_loop(listener: TcpListener, state: Arc<ServiceState>) {
    loop {
        tokio::select! {
            _ = state.token.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        info!(%addr, "skeleton detection client connected");
                        serve_client(stream, &state).await;
                    }
                    Err(e) => warn!(error = %e, "skeleton service accept failed"),
                }
            }
        }
    }
}

async fn serve_client(mut stream: tokio::net::TcpStream, state: &Arc<ServiceState>) {
    let mut known_intrinsics: Option<(Intrinsics, (i32, i32))> = None;
    let mut pending: Option<(Vec<u8>, BinaryMaskMessage)> = None;

    loop {
        let mut control = ControlMessage::default();
        if !read_message(&mut stream, &mut control, &state.token).await {
            break;
        }

        match control.code() {
            Some(ControlCode::BeginDetection) => {
                let mut header = FrameHeaderMessage::new(MAX_IMAGES as usize);
                if !read_message(&mut stream, &mut header, &state.token).await {
                    break;
                }

                let shapes = header.image_shapes();
                let sizes = header.image_byte_sizes();
                let mut frame = FrameMessage::new(shapes.clone(), sizes);
                if !read_message(&mut stream, &mut frame, &state.token).await {
                    break;
                }
                if !write_message(&mut stream, &AckMessage).await {
                    break;
                }

                let frame = match &state.frame_decompressor {
                    Some(d) => d(&frame),
                    None => frame,
                };

                let Some(processor) = &state.frame_processor else {
                    continue;
                };

                let rgb_shape = frame.image_shapes()[0];
                let pose = frame.pose(0);
                let intrinsics = known_intrinsics
                    .map(|(i, _)| i)
                    .unwrap_or((0.0, 0.0, 0.0, 0.0));

                let (skeleton_data, mask) =
                    processor.process(frame.image_data(0), frame.image_data(1), &pose, intrinsics);

                let mask = mask.or_else(|| {
                    state
                        .people_mask_renderer
                        .as_ref()
                        .map(|r| r.render(&skeleton_data, intrinsics, (rgb_shape.0, rgb_shape.1)))
                });

                if let Some(mask) = mask {
                    pending = Some((skeleton_data, mask));
                }
            }
            Some(ControlCode::EndDetection) => {
                if let Some((data, mask)) = pending.take() {
                    let length = SimpleMessage::new(data.len() as i32);
                    let data_msg = DataMessage::from_bytes(data);
                    let ok = write_message(&mut stream, &length).await
                        && write_message(&mut stream, &data_msg).await
                        && write_message(&mut stream, &mask).await;
                    if !ok {
                        break;
                    }
                }
            }
            Some(ControlCode::SetCalibration) => {
                let mut calib = CalibrationMessage::new(MAX_IMAGES);
                if !read_message(&mut stream, &mut calib, &state.token).await {
                    break;
                }
                let shapes = calib.image_shapes();
                let intrinsics = calib.intrinsics();
                known_intrinsics = Some((intrinsics[0], (shapes[0].0, shapes[0].1)));
                if !write_message(&mut stream, &AckMessage).await {
                    break;
                }
            }
            None => {
                warn!("unrecognised skeleton control code, dropping connection");
                break;
            }
        }
    }

    let _ = tokio::io::AsyncWriteExt::shutdown(&mut stream).await;
}

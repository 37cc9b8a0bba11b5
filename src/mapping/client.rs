// ABOUTME: Mapping client — calibration handshake plus a background frame-sender task
// ABOUTME: Mirrors smg.comms.mapping.MappingClient: single-slot queue, lock-step ack per frame

use crate::error::{Error, Result};
use crate::message::{AckMessage, CalibrationMessage, FrameHeaderMessage, FrameMessage};
use crate::pool::{OverflowPolicy, PooledQueue};
use crate::socket::{read_message, write_message};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A function that compresses a frame prior to transmission, leaving the
/// original (still pool-owned) frame untouched.
pub type FrameCompressor = Arc<dyn Fn(&FrameMessage) -> FrameMessage + Send + Sync>;

/// Builder for [`MappingClient`], mirroring `smpp::client::builder::ClientBuilder`.
pub struct MappingClientBuilder {
    endpoint: SocketAddr,
    pool_policy: OverflowPolicy,
    frame_compressor: Option<FrameCompressor>,
}

impl Default for MappingClientBuilder {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:7851".parse().unwrap(),
            pool_policy: OverflowPolicy::Discard,
            frame_compressor: None,
        }
    }
}

impl MappingClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoint(mut self, endpoint: SocketAddr) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn pool_policy(mut self, policy: OverflowPolicy) -> Self {
        self.pool_policy = policy;
        self
    }

    pub fn frame_compressor(mut self, compressor: FrameCompressor) -> Self {
        self.frame_compressor = Some(compressor);
        self
    }

    pub async fn connect(self) -> Result<MappingClient> {
        let stream = TcpStream::connect(self.endpoint)
            .await
            .map_err(|_| Error::ConnectRefused(self.endpoint))?;

        Ok(MappingClient {
            stream: Some(stream),
            queue: Arc::new(PooledQueue::new(self.pool_policy)),
            token: CancellationToken::new(),
            sender_task: None,
            frame_compressor: self.frame_compressor,
            alive: true,
        })
    }
}

/// A client that streams RGB-D frames to a remote [`super::server::MappingServer`].
pub struct MappingClient {
    stream: Option<TcpStream>,
    queue: Arc<PooledQueue<FrameMessage>>,
    token: CancellationToken,
    sender_task: Option<JoinHandle<()>>,
    frame_compressor: Option<FrameCompressor>,
    alive: bool,
}

impl MappingClient {
    pub async fn connect(endpoint: SocketAddr) -> Result<Self> {
        MappingClientBuilder::new().endpoint(endpoint).connect().await
    }

    /// Send the calibration handshake, then start the background sender.
    ///
    /// On success the frame queue is initialised (capacity 1, per spec.md
    /// §4.3) and the sender task begins pulling frames off it.
    pub async fn send_calibration_message(&mut self, calib: CalibrationMessage) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| Error::Protocol("client already sending frames".into()))?;

        let mut ok = write_message(stream, &calib).await;
        let mut ack = AckMessage;
        ok = ok && read_message(stream, &mut ack, &self.token).await;

        if !ok {
            return Err(Error::Protocol("failed to send calibration message".into()));
        }

        let shapes = calib.image_shapes();
        let sizes = calib.uncompressed_image_byte_sizes();
        self.queue
            .initialise(1, move || FrameMessage::new(shapes.clone(), sizes.clone()));

        let stream = self.stream.take().expect("checked above");
        let queue = self.queue.clone();
        let token = self.token.clone();
        let max_images = calib.max_images();
        let compressor = self.frame_compressor.clone();

        self.sender_task = Some(tokio::spawn(run_sender(stream, queue, token, max_images, compressor)));
        Ok(())
    }

    /// Send a frame. `filler` is invoked on the acquired slot so the caller
    /// never has to know how the slot was allocated (see spec.md §9,
    /// "Callback-based frame filling").
    pub async fn send_frame_message(&self, filler: impl FnOnce(&mut FrameMessage)) {
        let mut guard = self.queue.begin_push(&self.token).await;
        if let Some(msg) = guard.get_mut() {
            filler(msg);
        }
    }

    /// Signal termination, join the sender task, and close the socket.
    /// Idempotent.
    pub async fn terminate(&mut self) {
        if !self.alive {
            return;
        }
        self.token.cancel();
        if let Some(task) = self.sender_task.take()
            && let Err(e) = task.await
        {
            warn!(error = %e, "mapping client sender task panicked");
        }
        if let Some(mut stream) = self.stream.take() {
            let _ = tokio::io::AsyncWriteExt::shutdown(&mut stream).await;
        }
        self.alive = false;
    }
}

impl Drop for MappingClient {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn run_sender(
    mut stream: TcpStream,
    queue: Arc<PooledQueue<FrameMessage>>,
    token: CancellationToken,
    max_images: i32,
    compressor: Option<FrameCompressor>,
) {
    let mut ack = AckMessage;

    loop {
        if token.is_cancelled() {
            break;
        }

        let Some(compressed) = queue
            .peek(&token, |frame| match &compressor {
                Some(c) => c(frame),
                None => frame.clone(),
            })
            .await
        else {
            break;
        };

        let mut header = FrameHeaderMessage::new(max_images as usize);
        header.set_image_shapes(compressed.image_shapes());
        header.set_image_byte_sizes(compressed.image_byte_sizes());

        let ok = write_message(&mut stream, &header).await
            && write_message(&mut stream, &compressed).await
            && read_message(&mut stream, &mut ack, &token).await;

        if ok {
            queue.pop();
        } else {
            debug!("mapping client sender lost connection, terminating");
            token.cancel();
            break;
        }
    }

    let _ = tokio::io::AsyncWriteExt::shutdown(&mut stream).await;
}

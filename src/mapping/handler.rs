// ABOUTME: Per-client connection state for the mapping server: queue, newest-frame slot, calibration
// ABOUTME: Mirrors smg.comms.mapping.MappingClientHandler

use crate::message::{AckMessage, CalibrationMessage, FrameHeaderMessage, FrameMessage, ImageShape, Intrinsics};
use crate::pool::{OverflowPolicy, PooledQueue};
use crate::socket::{read_message, write_message};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// A function that decompresses a frame received over the wire.
pub type FrameDecompressor = std::sync::Arc<dyn Fn(&FrameMessage) -> FrameMessage + Send + Sync>;

/// Per-client queue capacity on the mapping server (spec.md §3).
pub const SERVER_QUEUE_CAPACITY: usize = 5;

/// The fixed number of calibrated image slots (colour + depth).
pub const MAX_IMAGES: i32 = 2;

/// Manages the connection to one mapping client: its calibration, its
/// bounded frame queue, the newest frame it has sent, and whether its
/// connection is still considered healthy.
pub struct MappingClientHandler {
    client_id: u64,
    calib: OnceLock<CalibrationMessage>,
    queue: PooledQueue<FrameMessage>,
    newest_frame: Mutex<Option<FrameMessage>>,
    connection_ok: AtomicBool,
}

impl MappingClientHandler {
    pub fn new(client_id: u64, pool_policy: OverflowPolicy) -> Self {
        Self {
            client_id,
            calib: OnceLock::new(),
            queue: PooledQueue::new(pool_policy),
            newest_frame: Mutex::new(None),
            connection_ok: AtomicBool::new(true),
        }
    }

    pub fn client_id(&self) -> u64 {
        self.client_id
    }

    pub fn is_connection_ok(&self) -> bool {
        self.connection_ok.load(Ordering::SeqCst)
    }

    pub fn image_shapes(&self) -> Option<Vec<ImageShape>> {
        self.calib.get().map(CalibrationMessage::image_shapes)
    }

    pub fn intrinsics(&self) -> Option<Vec<Intrinsics>> {
        self.calib.get().map(CalibrationMessage::intrinsics)
    }

    pub fn has_frames_now(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Get the oldest frame not yet processed, passing it to `receiver`
    /// while the queue's internal lock is held.
    pub async fn get_frame<F, R>(&self, token: &CancellationToken, receiver: F) -> Option<R>
    where
        F: FnOnce(&FrameMessage) -> R,
    {
        let out = self.queue.peek(token, receiver).await;
        if out.is_some() {
            self.queue.pop();
        }
        out
    }

    pub fn peek_newest_frame<F, R>(&self, receiver: F) -> Option<R>
    where
        F: FnOnce(&FrameMessage) -> R,
    {
        self.newest_frame.lock().unwrap().as_ref().map(receiver)
    }

    /// Read the calibration handshake and acknowledge it. Returns whether
    /// the connection is still ok.
    pub async fn run_pre(&self, stream: &mut TcpStream, token: &CancellationToken) -> bool {
        let mut calib = CalibrationMessage::new(MAX_IMAGES);
        let mut ok = read_message(stream, &mut calib, token).await;

        if ok {
            info!(
                client_id = self.client_id,
                shapes = ?calib.image_shapes(),
                intrinsics = ?calib.intrinsics(),
                "received camera parameters"
            );

            let shapes = calib.image_shapes();
            let sizes = calib.uncompressed_image_byte_sizes();
            self.queue
                .initialise(SERVER_QUEUE_CAPACITY, move || FrameMessage::new(shapes.clone(), sizes.clone()));
            let _ = self.calib.set(calib);

            ok = write_message(stream, &AckMessage).await;
        }

        self.connection_ok.store(ok, Ordering::SeqCst);
        ok
    }

    /// Run one iteration of the receive loop: header, frame, optional
    /// decompression, newest-frame update, queue push, ack.
    pub async fn run_iter(
        &self,
        stream: &mut TcpStream,
        token: &CancellationToken,
        decompressor: Option<&FrameDecompressor>,
    ) {
        let max_images = self
            .calib
            .get()
            .expect("run_pre must succeed before run_iter")
            .max_images();

        let mut header = FrameHeaderMessage::new(max_images as usize);
        let mut ok = read_message(stream, &mut header, token).await;

        if ok {
            let frame_shapes = header.image_shapes();
            let frame_sizes = header.image_byte_sizes();
            let mut frame = FrameMessage::new(frame_shapes, frame_sizes);
            ok = read_message(stream, &mut frame, token).await;

            if ok {
                let decompressed = match decompressor {
                    Some(d) => d(&frame),
                    None => frame,
                };

                *self.newest_frame.lock().unwrap() = Some(decompressed.clone());

                let mut guard = self.queue.begin_push(token).await;
                if let Some(slot) = guard.get_mut() {
                    *slot = decompressed;
                }
                drop(guard);

                ok = write_message(stream, &AckMessage).await;
            }
        }

        self.connection_ok.store(ok, Ordering::SeqCst);
    }
}

// ABOUTME: Skeleton-detection client — BEGIN/END request-response against a single service connection
// ABOUTME: Mirrors smg.comms.skeletons.SkeletonDetectionClient

use super::skeletons::{decode_skeletons, Skeleton};
use crate::error::{Error, Result};
use crate::message::{
    AckMessage, BinaryMaskMessage, CalibrationMessage, ControlMessage, DataMessage, FrameHeaderMessage, FrameMessage,
    ImageShape, SimpleMessage,
};
use crate::socket::{read_message, write_message};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

/// Fixed number of calibrated image slots (colour + depth), per spec.md §6.
pub const MAX_IMAGES: i32 = 2;

/// A function that compresses a frame prior to transmission.
pub type FrameCompressor = Arc<dyn Fn(&FrameMessage) -> FrameMessage + Send + Sync>;

/// Builder for [`SkeletonDetectionClient`].
pub struct SkeletonDetectionClientBuilder {
    endpoint: SocketAddr,
    frame_compressor: Option<FrameCompressor>,
}

impl Default for SkeletonDetectionClientBuilder {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:7852".parse().unwrap(),
            frame_compressor: None,
        }
    }
}

impl SkeletonDetectionClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoint(mut self, endpoint: SocketAddr) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn frame_compressor(mut self, compressor: FrameCompressor) -> Self {
        self.frame_compressor = Some(compressor);
        self
    }

    pub async fn connect(self) -> Result<SkeletonDetectionClient> {
        let stream = TcpStream::connect(self.endpoint)
            .await
            .map_err(|_| Error::ConnectRefused(self.endpoint))?;

        Ok(SkeletonDetectionClient {
            stream: Some(stream),
            token: CancellationToken::new(),
            frame_compressor: self.frame_compressor,
            image_shapes: None,
            image_byte_sizes: None,
            expected_mask_shape: None,
        })
    }
}

/// A client that asks a [`super::service::SkeletonDetectionService`] to
/// detect skeletons in a single pushed colour+depth frame.
pub struct SkeletonDetectionClient {
    stream: Option<TcpStream>,
    token: CancellationToken,
    frame_compressor: Option<FrameCompressor>,
    image_shapes: Option<Vec<ImageShape>>,
    image_byte_sizes: Option<Vec<usize>>,
    expected_mask_shape: Option<(usize, usize)>,
}

impl SkeletonDetectionClient {
    pub async fn connect(endpoint: SocketAddr) -> Result<Self> {
        SkeletonDetectionClientBuilder::new().endpoint(endpoint).connect().await
    }

    /// Send the service this client's camera calibration, which it must do
    /// once before the first `begin_detection`.
    pub async fn set_calibration(&mut self, calib: CalibrationMessage) -> Result<()> {
        let stream = self.stream.as_mut().ok_or_else(|| Error::Protocol("client terminated".into()))?;

        let ok = write_message(stream, &ControlMessage::set_calibration()).await
            && write_message(stream, &calib).await
            && read_message(stream, &mut AckMessage, &self.token).await;

        if !ok {
            return Err(Error::Protocol("set_calibration failed".into()));
        }

        self.image_shapes = Some(calib.image_shapes());
        self.image_byte_sizes = Some(calib.uncompressed_image_byte_sizes());
        Ok(())
    }

    /// Send a BEGIN_DETECTION request. `filler` is invoked on a freshly
    /// allocated frame (sized per the calibration set earlier) so the
    /// caller can fill in the colour/depth planes and pose.
    pub async fn begin_detection(&mut self, filler: impl FnOnce(&mut FrameMessage)) -> Result<()> {
        let shapes = self
            .image_shapes
            .clone()
            .ok_or_else(|| Error::Protocol("begin_detection called before set_calibration".into()))?;
        let sizes = self.image_byte_sizes.clone().expect("set alongside image_shapes");

        let mut frame = FrameMessage::new(shapes.clone(), sizes.clone());
        filler(&mut frame);
        let frame = match &self.frame_compressor {
            Some(c) => c(&frame),
            None => frame,
        };

        let mut header = FrameHeaderMessage::new(MAX_IMAGES as usize);
        header.set_image_shapes(frame.image_shapes());
        header.set_image_byte_sizes(frame.image_byte_sizes());

        let stream = self.stream.as_mut().ok_or_else(|| Error::Protocol("client terminated".into()))?;

        let ok = write_message(stream, &ControlMessage::begin_detection()).await
            && write_message(stream, &header).await
            && write_message(stream, &frame).await
            && read_message(stream, &mut AckMessage, &self.token).await;

        if !ok {
            self.expected_mask_shape = None;
            return Err(Error::Protocol("begin_detection failed".into()));
        }

        let (h, w, _) = shapes[0];
        self.expected_mask_shape = Some((h as usize, w as usize));
        Ok(())
    }

    /// Request the skeletons (and mask) detected from the last
    /// `begin_detection`. Returns `None` without sending anything if no
    /// `begin_detection` preceded this call.
    pub async fn end_detection(&mut self) -> Result<Option<(Vec<Skeleton>, BinaryMaskMessage)>> {
        let Some(mask_shape) = self.expected_mask_shape.take() else {
            return Ok(None);
        };

        let stream = self.stream.as_mut().ok_or_else(|| Error::Protocol("client terminated".into()))?;

        if !write_message(stream, &ControlMessage::end_detection()).await {
            return Err(Error::Protocol("end_detection failed".into()));
        }

        let mut length = SimpleMessage::new(0);
        if !read_message(stream, &mut length, &self.token).await {
            return Err(Error::Protocol("end_detection failed to read length".into()));
        }

        let mut data = DataMessage::new(length.value() as usize);
        if !read_message(stream, &mut data, &self.token).await {
            return Err(Error::Protocol("end_detection failed to read data".into()));
        }

        let mut mask = BinaryMaskMessage::new(mask_shape);
        if !read_message(stream, &mut mask, &self.token).await {
            return Err(Error::Protocol("end_detection failed to read mask".into()));
        }

        let skeletons = decode_skeletons(data.bytes())?;
        Ok(Some((skeletons, mask)))
    }

    pub async fn terminate(&mut self) {
        self.token.cancel();
        if let Some(mut stream) = self.stream.take() {
            let _ = tokio::io::AsyncWriteExt::shutdown(&mut stream).await;
        }
    }
}

impl Drop for SkeletonDetectionClient {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

//! QR Code Scanner
//!
//! Decodes QR codes from live camera frames and from uploaded images.

use tracing::{debug, info};

use super::camera::{CameraLease, Frame};
use crate::app::types::DecodedPayload;
use crate::error::ScanError;

/// Turns a camera frame into QR text
pub trait FrameDecoder: Send {
    /// Returns Some(content) if the frame holds a readable code
    fn decode_frame(&mut self, frame: &Frame) -> Option<String>;
}

/// QR decoder backed by rqrr
pub struct QrDecoder {
    /// Frame counter for rate limiting
    frame_count: u64,
    /// Scan every N frames (to reduce CPU usage)
    scan_interval: u64,
}

impl QrDecoder {
    pub fn new() -> Self {
        Self::with_interval(1)
    }

    pub fn with_interval(scan_interval: u64) -> Self {
        Self {
            frame_count: 0,
            scan_interval: scan_interval.max(1),
        }
    }

    /// Decode a QR code from an uploaded image (png, jpeg or webp)
    pub fn decode_image(bytes: &[u8]) -> Result<DecodedPayload, ScanError> {
        let img = image::load_from_memory(bytes)?.to_luma8();
        let (width, height) = img.dimensions();
        debug!("Scanning uploaded image ({}x{})", width, height);

        match detect_qr(img.as_raw(), width, height, width) {
            Some(content) => {
                info!("QR code read from image");
                Ok(DecodedPayload::new(content))
            }
            None => Err(ScanError::NoCodeFound),
        }
    }
}

impl Default for QrDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder for QrDecoder {
    fn decode_frame(&mut self, frame: &Frame) -> Option<String> {
        self.frame_count += 1;

        // Rate limit scanning
        if self.frame_count % self.scan_interval != 0 {
            return None;
        }

        debug!(
            "Scanning frame {} for QR code ({}x{}, stride={})",
            self.frame_count, frame.width, frame.height, frame.stride
        );
        detect_qr(&frame.luma, frame.width, frame.height, frame.stride)
    }
}

/// Detect a QR code in luma data with stride
fn detect_qr(luma: &[u8], width: u32, height: u32, stride: u32) -> Option<String> {
    if width == 0 || height == 0 || stride < width {
        return None;
    }
    let expected_size = (stride as usize) * (height as usize);
    if luma.len() < expected_size {
        debug!("Luma plane too small: {} < {}", luma.len(), expected_size);
        return None;
    }

    let stride = stride as usize;
    let mut prepared =
        rqrr::PreparedImage::prepare_from_greyscale(width as usize, height as usize, |x, y| {
            luma[y * stride + x]
        });

    let grids = prepared.detect_grids();
    debug!("Found {} potential QR grids", grids.len());

    for grid in grids {
        match grid.decode() {
            Ok((_, content)) => return Some(content),
            Err(e) => debug!("Grid decode failed: {:?}", e),
        }
    }
    None
}

// ============================================================
// Live decoding
// ============================================================

/// Start decoding frames from an acquired camera.
///
/// The returned handle owns the camera until it is stopped or dropped.
pub fn start_live_decoding(lease: CameraLease, decoder: Box<dyn FrameDecoder>) -> LiveHandle {
    info!("QR scanner started");
    LiveHandle {
        lease: Some(lease),
        decoder,
    }
}

pub struct LiveHandle {
    lease: Option<CameraLease>,
    decoder: Box<dyn FrameDecoder>,
}

impl LiveHandle {
    /// Wait for the next frame holding a code.
    ///
    /// Fires again for every later frame that still shows a code; callers
    /// suppress repeats. Returns None when the camera feed ends.
    pub async fn next_payload(&mut self) -> Option<DecodedPayload> {
        loop {
            let frame = self.lease.as_mut()?.next_frame().await?;
            if let Some(content) = self.decoder.decode_frame(&frame) {
                debug!("QR code detected in frame");
                return Some(DecodedPayload::new(content));
            }
        }
    }

    /// Stop scanning and release the camera
    pub fn stop(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(lease) = self.lease.take() {
            drop(lease);
            info!("QR scanner stopped");
        }
    }
}

impl Drop for LiveHandle {
    fn drop(&mut self) {
        self.release();
    }
}

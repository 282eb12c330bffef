//! Camera Resource
//!
//! One physical camera, owned by one scan session at a time. A [`CameraLease`]
//! is the only way to read frames; dropping it is the only way to release
//! the device.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::app::types::FacingMode;
use crate::error::ScanError;

/// 8-bit luma plane of a camera frame
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Bytes per row in `luma` (may be > width due to padding)
    pub stride: u32,
    pub luma: Vec<u8>,
}

impl Frame {
    /// Tightly packed frame (stride == width)
    pub fn packed(width: u32, height: u32, luma: Vec<u8>) -> Self {
        Self {
            width,
            height,
            stride: width,
            luma,
        }
    }
}

/// Running frame feed of an opened camera
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or None once the feed has ended
    async fn next_frame(&mut self) -> Option<Frame>;

    /// Stop capturing. Called exactly once, when the lease is dropped.
    fn close(&mut self);
}

/// Camera hardware backend
#[async_trait]
pub trait CameraDevice: Send + Sync {
    async fn open(&self, facing: FacingMode) -> Result<Box<dyn FrameSource>, ScanError>;
}

/// Exclusive owner of a camera device
#[derive(Clone)]
pub struct Camera {
    device: Arc<dyn CameraDevice>,
    in_use: Arc<AtomicBool>,
}

impl Camera {
    pub fn new(device: Arc<dyn CameraDevice>) -> Self {
        Self {
            device,
            in_use: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a lease is currently outstanding
    pub fn is_in_use(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }

    /// Open the device. Refused while another lease is alive.
    pub async fn acquire(&self, facing: FacingMode) -> Result<CameraLease, ScanError> {
        if self
            .in_use
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Camera acquisition refused: already in use");
            return Err(ScanError::CameraBusy);
        }

        // Clears the flag if opening fails or this future is dropped mid-open
        let mut claim = InUseClaim {
            in_use: &self.in_use,
            armed: true,
        };
        let source = self.device.open(facing).await?;
        claim.armed = false;

        info!("Camera acquired ({:?})", facing);
        Ok(CameraLease {
            source,
            in_use: self.in_use.clone(),
        })
    }
}

struct InUseClaim<'a> {
    in_use: &'a AtomicBool,
    armed: bool,
}

impl Drop for InUseClaim<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.in_use.store(false, Ordering::Release);
        }
    }
}

/// Open camera. Released on drop.
pub struct CameraLease {
    source: Box<dyn FrameSource>,
    in_use: Arc<AtomicBool>,
}

impl CameraLease {
    pub async fn next_frame(&mut self) -> Option<Frame> {
        self.source.next_frame().await
    }
}

impl Drop for CameraLease {
    fn drop(&mut self) {
        self.source.close();
        self.in_use.store(false, Ordering::Release);
        info!("Camera released");
    }
}

/// Placeholder device for sessions that only take uploads or typed tokens
pub struct NoCamera;

#[async_trait]
impl CameraDevice for NoCamera {
    async fn open(&self, _facing: FacingMode) -> Result<Box<dyn FrameSource>, ScanError> {
        Err(ScanError::CameraUnavailable("no camera configured".into()))
    }
}

// ============================================================
// Replay camera
// ============================================================

/// Replays captured still images from a directory as camera frames.
///
/// Files are read in name order each time the camera is opened; unreadable
/// files are skipped. The feed ends after the last file.
pub struct ReplayCamera {
    dir: PathBuf,
    frame_interval: Duration,
}

impl ReplayCamera {
    pub fn new(dir: impl Into<PathBuf>, frame_interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            frame_interval,
        }
    }

    fn list_frames(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg" | "webp"))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl CameraDevice for ReplayCamera {
    async fn open(&self, facing: FacingMode) -> Result<Box<dyn FrameSource>, ScanError> {
        let files = Self::list_frames(&self.dir)
            .map_err(|e| ScanError::CameraUnavailable(format!("{}: {}", self.dir.display(), e)))?;
        if files.is_empty() {
            return Err(ScanError::CameraUnavailable(format!(
                "no frames in {}",
                self.dir.display()
            )));
        }
        debug!("Replaying {} frames from {:?} as {:?} camera", files.len(), self.dir, facing);
        Ok(Box::new(ReplayFeed {
            files: files.into_iter(),
            frame_interval: self.frame_interval,
            closed: false,
        }))
    }
}

struct ReplayFeed {
    files: std::vec::IntoIter<PathBuf>,
    frame_interval: Duration,
    closed: bool,
}

#[async_trait]
impl FrameSource for ReplayFeed {
    async fn next_frame(&mut self) -> Option<Frame> {
        while !self.closed {
            let path = self.files.next()?;
            tokio::time::sleep(self.frame_interval).await;
            let decoded = {
                let path = path.clone();
                tokio::task::spawn_blocking(move || image::open(path).map(|img| img.to_luma8())).await
            };
            match decoded {
                Ok(Ok(luma)) => {
                    let (width, height) = luma.dimensions();
                    return Some(Frame::packed(width, height, luma.into_raw()));
                }
                Ok(Err(e)) => debug!("Skipping frame {:?}: {}", path, e),
                Err(e) => warn!("Frame decode task failed for {:?}: {}", path, e),
            }
        }
        None
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

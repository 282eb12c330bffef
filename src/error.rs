//! Scan Errors
//!
//! Failures raised locally by the scan flow, before or instead of a network call.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    /// A lease on the camera is already outstanding
    #[error("camera is already in use")]
    CameraBusy,

    /// Permission denied, no device, or the device failed to start
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),

    /// Static image decoded fine but holds no readable QR code
    #[error("no QR code found in image")]
    NoCodeFound,

    #[error("failed to read image: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("token is empty")]
    EmptyToken,

    /// Payload was read but is not usable by the current flow
    #[error("{0}")]
    Rejected(String),

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("admin login required")]
    LoginRequired,

    /// A result is still displayed; it has to be cleared first
    #[error("a scan result is still pending")]
    ResultPending,

    #[error("operation not available in {0} mode")]
    WrongMode(&'static str),
}

//! Scan Session Controller
//!
//! Owns the camera for one scanning surface and turns decoded payloads into
//! at most one claim at a time:
//!
//! ```text
//! Idle -> Acquiring -> Live -> Suspended -> Live   (reset)
//!                        \          \----> Idle    (mode switch, unmount)
//!                         \--------------> Idle    (mode switch, unmount, feed ended)
//! ```
//!
//! The camera is released the moment a payload becomes a claim, so later
//! frames of the same code are never read. All operations take `&mut self`;
//! a session is driven by a single task and can never have two claims in
//! flight.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::camera::Camera;
use super::flow::ScanFlow;
use super::presenter::{Notice, OutcomeView, ResultState};
use super::qr_scanner::{start_live_decoding, FrameDecoder, LiveHandle, QrDecoder};
use crate::app::types::{ClaimRequest, DecodedPayload, FacingMode, Outcome, ScanMode};
use crate::error::ScanError;

pub const IMAGE_UNREADABLE_MESSAGE: &str = "QR code could not be read from the image";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No camera held
    Idle,
    /// Camera requested, not yet delivering frames
    Acquiring,
    /// Frames are being decoded
    Live,
    /// A claim was produced; camera released until reset
    Suspended,
}

type DecoderFactory = Arc<dyn Fn() -> Box<dyn FrameDecoder> + Send + Sync>;

pub struct ScanSession<F: ScanFlow> {
    flow: F,
    camera: Camera,
    make_decoder: DecoderFactory,
    facing: FacingMode,
    mode: ScanMode,
    state: SessionState,
    live: Option<LiveHandle>,
    results: ResultState,
    notices: Vec<Notice>,
    /// Last payload rejected by the flow, to avoid a notice per frame
    last_rejected: Option<String>,
    claims_submitted: u64,
}

impl<F: ScanFlow> ScanSession<F> {
    pub fn new(flow: F, camera: Camera) -> Self {
        Self {
            flow,
            camera,
            make_decoder: Arc::new(|| Box::new(QrDecoder::new()) as Box<dyn FrameDecoder>),
            facing: FacingMode::default(),
            mode: ScanMode::Camera,
            state: SessionState::Idle,
            live: None,
            results: ResultState::new(),
            notices: Vec::new(),
            last_rejected: None,
            claims_submitted: 0,
        }
    }

    pub fn with_mode(mut self, mode: ScanMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_facing(mut self, facing: FacingMode) -> Self {
        self.facing = facing;
        self
    }

    /// Decoder used for each camera acquisition
    pub fn with_decoder<D>(mut self, make_decoder: D) -> Self
    where
        D: Fn() -> Box<dyn FrameDecoder> + Send + Sync + 'static,
    {
        self.make_decoder = Arc::new(make_decoder);
        self
    }

    pub fn flow(&self) -> &F {
        &self.flow
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    pub fn facing(&self) -> FacingMode {
        self.facing
    }

    /// Camera acquired and delivering frames
    pub fn camera_active(&self) -> bool {
        self.state == SessionState::Live
    }

    pub fn is_suspended(&self) -> bool {
        self.state == SessionState::Suspended
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.results.current()
    }

    pub fn claims_submitted(&self) -> u64 {
        self.claims_submitted
    }

    /// Drain queued notices
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    fn notify(&mut self, notice: Notice) {
        debug!("Notice: {:?}", notice);
        self.notices.push(notice);
    }

    // ============================================================
    // Camera lifecycle
    // ============================================================

    /// Start scanning if the session is in camera mode
    pub async fn mount(&mut self) {
        if self.mode == ScanMode::Camera
            && self.state == SessionState::Idle
            && !self.results.is_showing()
        {
            self.acquire().await;
        }
    }

    /// Release the camera for good
    pub fn unmount(&mut self) {
        self.release();
        self.state = SessionState::Idle;
    }

    async fn acquire(&mut self) -> bool {
        self.state = SessionState::Acquiring;
        match self.camera.acquire(self.facing).await {
            Ok(lease) => {
                self.live = Some(start_live_decoding(lease, (self.make_decoder)()));
                self.last_rejected = None;
                self.state = SessionState::Live;
                true
            }
            Err(e) => {
                warn!("Camera acquisition failed: {}", e);
                self.notify(Notice::error(format!("Camera could not be opened: {}", e)));
                self.state = SessionState::Idle;
                false
            }
        }
    }

    fn release(&mut self) {
        if let Some(handle) = self.live.take() {
            handle.stop();
        }
    }

    /// Switch between the camera and upload tabs.
    ///
    /// Leaving camera mode releases the camera before returning. Any
    /// displayed result is dismissed.
    pub async fn select_mode(&mut self, mode: ScanMode) {
        self.results.clear();
        if mode == ScanMode::Camera
            && self.mode == ScanMode::Camera
            && self.state == SessionState::Live
        {
            return;
        }

        info!("Scan mode: {} -> {}", self.mode.label(), mode.label());
        self.release();
        self.state = SessionState::Idle;
        self.mode = mode;
        if mode == ScanMode::Camera {
            self.acquire().await;
        }
    }

    /// Toggle front/rear camera and try again. Also the retry path after a
    /// failed acquisition.
    pub async fn switch_camera(&mut self) {
        self.facing = self.facing.toggled();
        if self.mode != ScanMode::Camera || self.results.is_showing() {
            return;
        }
        self.release();
        self.state = SessionState::Idle;
        self.acquire().await;
    }

    /// Dismiss the displayed result and resume scanning
    pub async fn reset(&mut self) {
        self.results.clear();
        if self.mode == ScanMode::Camera
            && matches!(self.state, SessionState::Suspended | SessionState::Idle)
        {
            self.acquire().await;
        }
    }

    // ============================================================
    // Claims
    // ============================================================

    /// Decode callback. Returns the claim request if this payload produced one.
    ///
    /// Only the first usable payload while live produces a request; the
    /// camera is stopped before this returns.
    pub fn on_decoded(&mut self, payload: DecodedPayload) -> Option<ClaimRequest> {
        if self.state != SessionState::Live || payload.is_blank() {
            return None;
        }

        match self.flow.prepare(&payload) {
            Ok(request) => {
                self.release();
                self.state = SessionState::Suspended;
                Some(request)
            }
            Err(notice) => {
                if self.last_rejected.as_deref() != Some(payload.as_str()) {
                    self.last_rejected = Some(payload.as_str().to_string());
                    self.notify(notice);
                }
                None
            }
        }
    }

    /// Read frames until one yields a claim, then submit it.
    ///
    /// Returns None if the session is not live or the camera feed ended.
    pub async fn next_outcome(&mut self) -> Option<&Outcome> {
        loop {
            if self.state != SessionState::Live {
                return None;
            }
            let next = match self.live.as_mut() {
                Some(handle) => handle.next_payload().await,
                None => return None,
            };
            let payload = match next {
                Some(payload) => payload,
                None => {
                    info!("Camera feed ended");
                    self.release();
                    self.state = SessionState::Idle;
                    self.notify(Notice::info("Camera feed ended"));
                    return None;
                }
            };
            if let Some(request) = self.on_decoded(payload) {
                return Some(self.submit(request).await);
            }
        }
    }

    /// Decode an uploaded image and submit its code (upload mode only)
    pub async fn upload(&mut self, image: &[u8]) -> Result<&Outcome, ScanError> {
        if self.mode != ScanMode::Upload {
            return Err(ScanError::WrongMode(self.mode.label()));
        }
        if self.results.is_showing() {
            return Err(ScanError::ResultPending);
        }

        let payload = match QrDecoder::decode_image(image) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Uploaded image not readable: {}", e);
                self.notify(Notice::error(IMAGE_UNREADABLE_MESSAGE));
                return Err(e);
            }
        };
        self.submit_text(payload.as_str()).await
    }

    /// Submit text as if it had been scanned (manual entry, uploads)
    pub async fn submit_text(&mut self, text: &str) -> Result<&Outcome, ScanError> {
        if self.results.is_showing() {
            return Err(ScanError::ResultPending);
        }

        let request = match self.flow.prepare(&DecodedPayload::new(text)) {
            Ok(request) => request,
            Err(notice) => {
                let message = notice.message.clone();
                self.notify(notice);
                return Err(ScanError::Rejected(message));
            }
        };

        if self.mode == ScanMode::Camera {
            self.release();
            self.state = SessionState::Suspended;
        }
        Ok(self.submit(request).await)
    }

    async fn submit(&mut self, request: ClaimRequest) -> &Outcome {
        self.claims_submitted += 1;
        info!(
            "Submitting {} claim{}",
            self.flow.name(),
            request
                .context_id()
                .map(|c| format!(" for {}", c))
                .unwrap_or_default()
        );

        let outcome = self.flow.submit(&request).await;
        let notice = OutcomeView::from_outcome(&outcome).notice();
        self.notify(notice);
        self.results.set_outcome(outcome)
    }
}

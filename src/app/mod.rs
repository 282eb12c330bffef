//! Application State Management
//!
//! Wires settings, the admin session and the API client together and builds
//! scan sessions for each scanning surface.

pub mod cache;
pub mod config;
pub mod types;

pub use config::Settings;
pub use types::{
    AdminSession, ClaimRequest, DecodedPayload, EventInfo, FacingMode, Outcome, ScanMode, Ticket,
};

use log::info;
use std::path::Path;
use std::sync::Arc;

use crate::api::{ApiError, EventApiClient};
use crate::error::ScanError;
use crate::scan::{
    Camera, CheckinRedirectFlow, ConsumptionClaimFlow, FrameDecoder, NoCamera, QrDecoder,
    ReplayCamera, ScanFlow, ScanSession, TicketValidatorFlow,
};

/// Main application structure
pub struct App {
    /// User settings
    pub settings: Settings,

    /// Admin session, if logged in
    session: Option<AdminSession>,

    /// API client (carries the session)
    api: Arc<EventApiClient>,
}

impl App {
    pub fn new(settings: Settings, session: Option<AdminSession>) -> Result<Self, ApiError> {
        let api = Arc::new(EventApiClient::from_settings(&settings)?.with_session(session.clone()));
        Ok(Self {
            settings,
            session,
            api,
        })
    }

    pub fn api(&self) -> &Arc<EventApiClient> {
        &self.api
    }

    pub fn session(&self) -> Option<&AdminSession> {
        self.session.as_ref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.is_some()
    }

    fn set_session(&mut self, session: Option<AdminSession>) -> Result<(), ApiError> {
        self.api = Arc::new(EventApiClient::from_settings(&self.settings)?.with_session(session.clone()));
        self.session = session;
        Ok(())
    }

    /// Log in and persist the session
    pub async fn login(&mut self, email: &str, password: &str) -> Result<&AdminSession, ApiError> {
        let session = self.api.login(email, password).await?;
        cache::save_session(&session).map_err(ScanError::Io)?;
        self.set_session(Some(session))?;
        self.session.as_ref().ok_or_else(|| ApiError::Decode("session missing".into()))
    }

    /// Forget the session, locally and on disk
    pub fn logout(&mut self) -> Result<(), ApiError> {
        cache::clear_session().map_err(ScanError::Io)?;
        self.set_session(None)?;
        info!("Logged out");
        Ok(())
    }

    // ============================================================
    // Scan sessions
    // ============================================================

    /// Camera replaying frames from `frames_dir`, or no camera at all
    pub fn camera(&self, frames_dir: Option<&Path>) -> Camera {
        match frames_dir {
            Some(dir) => Camera::new(Arc::new(ReplayCamera::new(
                dir,
                self.settings.frame_interval(),
            ))),
            None => Camera::new(Arc::new(NoCamera)),
        }
    }

    fn build_session<F: ScanFlow>(&self, flow: F, camera: Camera, mode: ScanMode) -> ScanSession<F> {
        let scan_interval = self.settings.scan_interval;
        ScanSession::new(flow, camera)
            .with_mode(mode)
            .with_facing(self.settings.preferred_camera)
            .with_decoder(move || Box::new(QrDecoder::with_interval(scan_interval)) as Box<dyn FrameDecoder>)
    }

    /// Public kiosk: event QR -> check-in link
    pub fn checkin_session(&self, camera: Camera, mode: ScanMode) -> ScanSession<CheckinRedirectFlow> {
        let flow = CheckinRedirectFlow::new(&self.settings.public_base_url);
        self.build_session(flow, camera, mode)
    }

    /// Ticket validator
    pub fn validator_session(&self, camera: Camera, mode: ScanMode) -> ScanSession<TicketValidatorFlow> {
        let flow = TicketValidatorFlow::new(self.api.clone());
        self.build_session(flow, camera, mode)
    }

    /// Consumption claim desk for one event. Admin only.
    pub fn consumption_session(
        &self,
        event_id: &str,
        camera: Camera,
        mode: ScanMode,
    ) -> Result<ScanSession<ConsumptionClaimFlow>, ScanError> {
        if !self.is_logged_in() {
            return Err(ScanError::LoginRequired);
        }
        if event_id.trim().is_empty() {
            return Err(ScanError::MissingField("event id"));
        }
        let flow = ConsumptionClaimFlow::new(self.api.clone(), event_id.trim());
        Ok(self.build_session(flow, camera, mode))
    }
}

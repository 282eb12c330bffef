//! Scan Module
//!
//! QR scanning for the three attendance surfaces: public check-in kiosk,
//! ticket validator and consumption claim desk.

pub mod camera;
pub mod extract;
pub mod flow;
pub mod presenter;
pub mod qr_scanner;
pub mod session;

pub use camera::{Camera, CameraDevice, CameraLease, Frame, FrameSource, NoCamera, ReplayCamera};
pub use extract::extract_scope_id;
pub use flow::{
    classify, CheckinRedirectFlow, ClaimKind, ConsumptionClaimFlow, ScanFlow, TicketValidatorFlow,
};
pub use presenter::{Notice, NoticeLevel, OutcomeView, ResultState, Tone};
pub use qr_scanner::{start_live_decoding, FrameDecoder, LiveHandle, QrDecoder};
pub use session::{ScanSession, SessionState};

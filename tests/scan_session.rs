//! End-to-end scan session behaviour through the public API, using a scripted
//! camera whose frames carry their decoded text.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use evtscan::api::ApiReply;
use evtscan::app::types::{ClaimRequest, DecodedPayload, FacingMode, Outcome, ScanMode};
use evtscan::app::{cache, Settings};
use evtscan::scan::{
    classify, extract_scope_id, Camera, CameraDevice, CheckinRedirectFlow, ClaimKind, Frame,
    FrameDecoder, FrameSource, Notice, NoticeLevel, ScanFlow, ScanSession, SessionState,
};
use evtscan::scan::flow::UNRECOGNIZED_QR_MESSAGE;
use evtscan::ScanError;

#[derive(Default)]
struct Counters {
    opens: AtomicUsize,
    closes: AtomicUsize,
    frames: AtomicUsize,
}

struct ScriptedCamera {
    frames: Vec<&'static str>,
    counters: Arc<Counters>,
}

#[async_trait]
impl CameraDevice for ScriptedCamera {
    async fn open(&self, _facing: FacingMode) -> Result<Box<dyn FrameSource>, ScanError> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedFeed {
            frames: self.frames.clone().into_iter(),
            counters: self.counters.clone(),
        }))
    }
}

struct ScriptedFeed {
    frames: std::vec::IntoIter<&'static str>,
    counters: Arc<Counters>,
}

#[async_trait]
impl FrameSource for ScriptedFeed {
    async fn next_frame(&mut self) -> Option<Frame> {
        let text = self.frames.next()?;
        self.counters.frames.fetch_add(1, Ordering::SeqCst);
        Some(Frame::packed(text.len() as u32, 1, text.as_bytes().to_vec()))
    }

    fn close(&mut self) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Frame bytes are the code; empty frames hold none
struct TextDecoder;

impl FrameDecoder for TextDecoder {
    fn decode_frame(&mut self, frame: &Frame) -> Option<String> {
        if frame.luma.is_empty() {
            return None;
        }
        String::from_utf8(frame.luma.clone()).ok()
    }
}

/// Accepts any token, counts submissions
struct CountingFlow {
    submitted: Arc<AtomicUsize>,
}

#[async_trait]
impl ScanFlow for CountingFlow {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn prepare(&self, payload: &DecodedPayload) -> Result<ClaimRequest, Notice> {
        ClaimRequest::new(payload.as_str(), None).map_err(|e| Notice::error(e.to_string()))
    }

    async fn submit(&self, _request: &ClaimRequest) -> Outcome {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        Outcome::invalid("Ticket is not valid")
    }
}

fn scripted(frames: &[&'static str]) -> (Camera, Arc<Counters>) {
    let counters = Arc::new(Counters::default());
    let camera = Camera::new(Arc::new(ScriptedCamera {
        frames: frames.to_vec(),
        counters: counters.clone(),
    }));
    (camera, counters)
}

#[tokio::test]
async fn same_code_on_many_frames_is_claimed_once() {
    let (camera, counters) = scripted(&["", "TKN-1", "TKN-1", "TKN-1", "TKN-1"]);
    let submitted = Arc::new(AtomicUsize::new(0));
    let flow = CountingFlow {
        submitted: submitted.clone(),
    };
    let mut session = ScanSession::new(flow, camera.clone())
        .with_decoder(|| Box::new(TextDecoder) as Box<dyn FrameDecoder>);

    session.mount().await;
    assert_eq!(session.state(), SessionState::Live);

    let outcome = session.next_outcome().await.cloned();
    assert!(matches!(outcome, Some(Outcome::Invalid { .. })));
    assert_eq!(submitted.load(Ordering::SeqCst), 1);

    // Camera is released as soon as the claim is made
    assert!(session.is_suspended());
    assert!(!camera.is_in_use());
    assert_eq!(counters.frames.load(Ordering::SeqCst), 2);
    assert_eq!(counters.closes.load(Ordering::SeqCst), 1);

    // Nothing more without a reset
    assert!(session.next_outcome().await.is_none());
    assert_eq!(submitted.load(Ordering::SeqCst), 1);

    session.unmount();
    assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn checkin_kiosk_skips_foreign_codes_and_links_to_event() {
    let (camera, counters) = scripted(&[
        "https://example.com/promo",
        "https://example.com/promo",
        "https://kiosk.example/checkin/evt-77",
    ]);
    let mut session = ScanSession::new(CheckinRedirectFlow::new("https://kiosk.example/"), camera)
        .with_decoder(|| Box::new(TextDecoder) as Box<dyn FrameDecoder>);

    session.mount().await;
    let outcome = session.next_outcome().await.cloned();

    // One error notice for the repeated foreign code
    let errors: Vec<_> = session
        .take_notices()
        .into_iter()
        .filter(|n| n.level == NoticeLevel::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, UNRECOGNIZED_QR_MESSAGE);

    let Some(Outcome::Success(success)) = outcome.clone() else {
        panic!("expected success, got {:?}", outcome);
    };
    let event = success.event.expect("event snapshot");
    assert_eq!(event.code.as_deref(), Some("EVT-77"));
    assert_eq!(
        event.link.as_deref(),
        Some("https://kiosk.example/checkin/EVT-77")
    );

    session.unmount();
    assert_eq!(counters.opens.load(Ordering::SeqCst), 1);
    assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reset_reacquires_and_mode_switch_releases() {
    let (camera, counters) = scripted(&["TKN-1"]);
    let flow = CountingFlow {
        submitted: Arc::new(AtomicUsize::new(0)),
    };
    let mut session = ScanSession::new(flow, camera.clone())
        .with_decoder(|| Box::new(TextDecoder) as Box<dyn FrameDecoder>);

    session.mount().await;
    assert!(session.next_outcome().await.is_some());

    session.reset().await;
    assert!(session.outcome().is_none());
    assert_eq!(session.state(), SessionState::Live);
    assert_eq!(counters.opens.load(Ordering::SeqCst), 2);

    session.select_mode(ScanMode::Upload).await;
    assert_eq!(session.state(), SessionState::Idle);
    assert!(!camera.is_in_use());
    assert_eq!(counters.closes.load(Ordering::SeqCst), 2);

    // Upload mode accepts typed tokens
    let outcome = session.submit_text("TKN-2").await.map(|o| o.clone());
    assert!(matches!(outcome, Ok(Outcome::Invalid { .. })));
    assert!(matches!(
        session.submit_text("TKN-3").await,
        Err(ScanError::ResultPending)
    ));
}

#[test]
fn extract_scope_id_forms() {
    assert_eq!(
        extract_scope_id("https://host/checkin/EVT-1?ref=qr").as_deref(),
        Some("EVT-1")
    );
    assert_eq!(extract_scope_id("EVT-9 \n").as_deref(), Some("EVT-9"));
    assert_eq!(extract_scope_id("hello"), None);
}

#[test]
fn classifier_prefers_code_over_status() {
    let reply = ApiReply {
        status: reqwest::StatusCode::FORBIDDEN,
        body: json!({ "code": "ALREADY_CLAIMED", "data": { "nama": "Rina" } }),
    };
    assert_eq!(classify(ClaimKind::Consumption, &reply).kind(), "duplicate");

    let reply = ApiReply {
        status: reqwest::StatusCode::FORBIDDEN,
        body: json!({ "message": "Belum check-in" }),
    };
    assert_eq!(classify(ClaimKind::Consumption, &reply).kind(), "not_eligible");
}

#[test]
fn settings_and_session_survive_restart() {
    let dir = tempfile::tempdir().unwrap();

    let settings_path = dir.path().join("settings.json");
    let mut settings = Settings::default();
    settings.api_base_url = "https://api.example".into();
    settings.scan_interval = 3;
    settings.save_to(&settings_path).unwrap();
    let loaded = Settings::load_from(&settings_path).unwrap();
    assert_eq!(loaded.api_base_url, "https://api.example");
    assert_eq!(loaded.scan_interval, 3);

    let session_path = dir.path().join("session.json");
    assert!(cache::load_session_from(&session_path).is_none());
    let session = evtscan::app::AdminSession {
        token: "jwt".into(),
        admin: Default::default(),
    };
    cache::save_session_to(&session_path, &session).unwrap();
    assert_eq!(cache::load_session_from(&session_path), Some(session));
    cache::clear_session_at(&session_path).unwrap();
    assert!(cache::load_session_from(&session_path).is_none());
}

//! Scan Flows
//!
//! The three scanning surfaces share one session controller and differ only
//! in how a payload becomes a request and how the backend answer is
//! classified:
//!
//! - check-in redirect: payload must be a check-in link or event code; no
//!   network call, the outcome carries the check-in link
//! - ticket validator: payload is the ticket token, validated globally
//! - consumption claim: payload is the ticket token, claimed against one event

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use super::extract::extract_scope_id;
use super::presenter::Notice;
use crate::api::{ApiReply, EventApiClient};
use crate::app::types::{
    ClaimRecord, ClaimRequest, ClaimSuccess, DecodedPayload, EventSnapshot, Outcome,
    ParticipantSnapshot,
};

pub const DEFAULT_INVALID_MESSAGE: &str = "Ticket is not valid";
pub const UNRECOGNIZED_QR_MESSAGE: &str = "QR code is not valid";

const DEFAULT_NOT_ELIGIBLE_MESSAGE: &str =
    "Participant has not checked in yet. Send them to the check-in desk.";
const DEFAULT_WRONG_SCOPE_MESSAGE: &str = "This ticket is not for this event.";

/// Request shape and outcome classifier of one scanning surface
#[async_trait]
pub trait ScanFlow: Send + Sync {
    fn name(&self) -> &'static str;

    /// Map a decoded payload to the request this flow submits.
    /// A rejection is shown as a notice and never reaches the network.
    fn prepare(&self, payload: &DecodedPayload) -> Result<ClaimRequest, Notice>;

    /// One round trip, classified. Never retried.
    async fn submit(&self, request: &ClaimRequest) -> Outcome;
}

fn pass_through(payload: &DecodedPayload, context_id: Option<String>) -> Result<ClaimRequest, Notice> {
    ClaimRequest::new(payload.as_str(), context_id).map_err(|e| Notice::error(e.to_string()))
}

// ============================================================
// Check-in redirect
// ============================================================

/// Public kiosk scan: reads the event QR and points to its check-in form
pub struct CheckinRedirectFlow {
    public_base_url: String,
}

impl CheckinRedirectFlow {
    pub fn new(public_base_url: &str) -> Self {
        Self {
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn checkin_link(&self, event_code: &str) -> String {
        format!(
            "{}/checkin/{}",
            self.public_base_url,
            urlencoding::encode(event_code)
        )
    }
}

#[async_trait]
impl ScanFlow for CheckinRedirectFlow {
    fn name(&self) -> &'static str {
        "checkin"
    }

    fn prepare(&self, payload: &DecodedPayload) -> Result<ClaimRequest, Notice> {
        match extract_scope_id(payload.as_str()) {
            Some(code) => pass_through(&DecodedPayload::new(code), None),
            None => Err(Notice::error(UNRECOGNIZED_QR_MESSAGE)),
        }
    }

    async fn submit(&self, request: &ClaimRequest) -> Outcome {
        let code = request.token().to_uppercase();
        info!("Event QR read: {}", code);
        Outcome::Success(ClaimSuccess {
            event: Some(EventSnapshot {
                link: Some(self.checkin_link(&code)),
                code: Some(code),
                ..Default::default()
            }),
            ..Default::default()
        })
    }
}

// ============================================================
// Ticket validator
// ============================================================

pub struct TicketValidatorFlow {
    api: Arc<EventApiClient>,
}

impl TicketValidatorFlow {
    pub fn new(api: Arc<EventApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ScanFlow for TicketValidatorFlow {
    fn name(&self) -> &'static str {
        "validator"
    }

    fn prepare(&self, payload: &DecodedPayload) -> Result<ClaimRequest, Notice> {
        pass_through(payload, None)
    }

    async fn submit(&self, request: &ClaimRequest) -> Outcome {
        match self.api.validate_ticket(request.token()).await {
            Ok(reply) => classify(ClaimKind::Validation, &reply),
            Err(e) => {
                warn!("Ticket validation failed: {}", e);
                Outcome::invalid(e.user_message())
            }
        }
    }
}

// ============================================================
// Consumption claim
// ============================================================

pub struct ConsumptionClaimFlow {
    api: Arc<EventApiClient>,
    event_id: String,
}

impl ConsumptionClaimFlow {
    pub fn new(api: Arc<EventApiClient>, event_id: &str) -> Self {
        Self {
            api,
            event_id: event_id.to_string(),
        }
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }
}

#[async_trait]
impl ScanFlow for ConsumptionClaimFlow {
    fn name(&self) -> &'static str {
        "consumption"
    }

    fn prepare(&self, payload: &DecodedPayload) -> Result<ClaimRequest, Notice> {
        pass_through(payload, Some(self.event_id.clone()))
    }

    async fn submit(&self, request: &ClaimRequest) -> Outcome {
        let event_id = request.context_id().unwrap_or(&self.event_id);
        match self.api.claim_consumption(event_id, request.token()).await {
            Ok(reply) => classify(ClaimKind::Consumption, &reply),
            Err(e) => {
                warn!("Consumption claim failed: {}", e);
                Outcome::invalid(e.user_message())
            }
        }
    }
}

// ============================================================
// Classification
// ============================================================

/// Shape of the success body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimKind {
    /// `{ valid: true, data: { token, peserta, event } }`
    Validation,
    /// `{ data: { nama, jam } }`
    Consumption,
}

fn str_field(body: &Value, key: &str) -> Option<String> {
    body.get(key).and_then(Value::as_str).map(str::to_string)
}

fn parse<T: serde::de::DeserializeOwned>(value: Option<&Value>) -> Option<T> {
    value.and_then(|v| serde_json::from_value(v.clone()).ok())
}

/// Classify a claim/validation reply into an outcome.
///
/// The `code` field wins over the HTTP status, since business outcomes
/// arrive with structured non-2xx bodies as well as 2xx ones.
pub fn classify(kind: ClaimKind, reply: &ApiReply) -> Outcome {
    let body = &reply.body;
    let message = str_field(body, "message");

    match body.get("code").and_then(Value::as_str) {
        Some("DUPLICATE") | Some("ALREADY_CLAIMED") | Some("ALREADY_CHECKED_IN") => {
            let record = parse::<ClaimRecord>(body.get("detail"))
                .or_else(|| parse::<ClaimRecord>(body.get("data")))
                .unwrap_or_default();
            return Outcome::Duplicate(record);
        }
        Some("WRONG_EVENT") => {
            return Outcome::WrongScope {
                expected: str_field(body, "expected_event"),
                actual: str_field(body, "actual_event"),
                participant: str_field(body, "nama"),
                message: message.unwrap_or_else(|| DEFAULT_WRONG_SCOPE_MESSAGE.to_string()),
            };
        }
        Some("NOT_CHECKED_IN") | Some("NOT_PRESENT") => {
            return Outcome::NotEligible {
                reason: message.unwrap_or_else(|| DEFAULT_NOT_ELIGIBLE_MESSAGE.to_string()),
            };
        }
        _ => {}
    }

    if reply.status == StatusCode::FORBIDDEN {
        return Outcome::NotEligible {
            reason: message.unwrap_or_else(|| DEFAULT_NOT_ELIGIBLE_MESSAGE.to_string()),
        };
    }

    if !reply.status.is_success() {
        return Outcome::invalid(message.unwrap_or_else(|| DEFAULT_INVALID_MESSAGE.to_string()));
    }

    match kind {
        ClaimKind::Validation => {
            if body.get("valid").and_then(Value::as_bool) != Some(true) {
                return Outcome::invalid(
                    message.unwrap_or_else(|| DEFAULT_INVALID_MESSAGE.to_string()),
                );
            }
            let data = body.get("data");
            Outcome::Success(ClaimSuccess {
                token: data.and_then(|d| str_field(d, "token")),
                participant: parse::<ParticipantSnapshot>(data.and_then(|d| d.get("peserta"))),
                event: parse::<EventSnapshot>(data.and_then(|d| d.get("event"))),
                claimed_at: None,
            })
        }
        ClaimKind::Consumption => {
            let data = body.get("data");
            let participant = parse::<ParticipantSnapshot>(data)
                .filter(|p| !p.name.is_empty());
            Outcome::Success(ClaimSuccess {
                token: data.and_then(|d| str_field(d, "token")),
                participant,
                event: None,
                claimed_at: data.and_then(|d| str_field(d, "jam")),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::types::{AdminInfo, AdminSession};
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn reply(status: u16, body: Value) -> ApiReply {
        ApiReply {
            status: StatusCode::from_u16(status).unwrap(),
            body,
        }
    }

    /// Answers one HTTP request with `status` and `body`; yields the raw request
    async fn serve_once(status: u16, body: Value) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = stream.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..n]);
                if let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&request[..end]).to_lowercase();
                    let length = head
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
            }

            let payload = body.to_string();
            let response = format!(
                "HTTP/1.1 {} Reply\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                payload.len(),
                payload
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });
        (format!("http://{}", addr), handle)
    }

    fn request_body(raw: &str) -> Value {
        let body = raw.split("\r\n\r\n").nth(1).unwrap_or_default();
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_validation_success() {
        let r = reply(
            200,
            json!({
                "valid": true,
                "data": {
                    "token": "TKT-77",
                    "peserta": { "nama": "Sari", "no_hp": "0812", "domisili": "Depok" },
                    "event": { "nama": "Gathering", "tanggal": "2025-03-09", "waktu_scan": "2025-03-09T02:15:00Z" }
                }
            }),
        );
        match classify(ClaimKind::Validation, &r) {
            Outcome::Success(s) => {
                assert_eq!(s.token.as_deref(), Some("TKT-77"));
                let p = s.participant.unwrap();
                assert_eq!(p.name, "Sari");
                assert_eq!(p.address.as_deref(), Some("Depok"));
                let e = s.event.unwrap();
                assert_eq!(e.name, "Gathering");
                assert_eq!(e.scanned_at.as_deref(), Some("2025-03-09T02:15:00Z"));
            }
            other => panic!("Expected Success, got {:?}", other),
        }
    }

    #[test]
    fn test_validation_not_valid_is_invalid() {
        let r = reply(200, json!({ "valid": false }));
        assert_eq!(
            classify(ClaimKind::Validation, &r),
            Outcome::invalid(DEFAULT_INVALID_MESSAGE)
        );
    }

    #[test]
    fn test_already_checked_in_is_duplicate_not_invalid() {
        let r = reply(
            409,
            json!({ "code": "ALREADY_CHECKED_IN", "data": { "nama": "Sari", "waktu_scan": "2025-03-09T02:15:00Z" } }),
        );
        assert_eq!(
            classify(ClaimKind::Validation, &r),
            Outcome::Duplicate(ClaimRecord {
                participant_name: Some("Sari".into()),
                claimed_at: Some("2025-03-09T02:15:00Z".into()),
            })
        );
    }

    #[test]
    fn test_consumption_duplicate_on_2xx_keeps_original_claim() {
        let r = reply(
            200,
            json!({ "code": "DUPLICATE", "detail": { "nama": "Budi", "jam_ambil": "2025-03-09T05:00:00Z" } }),
        );
        assert_eq!(
            classify(ClaimKind::Consumption, &r),
            Outcome::Duplicate(ClaimRecord {
                participant_name: Some("Budi".into()),
                claimed_at: Some("2025-03-09T05:00:00Z".into()),
            })
        );
    }

    #[test]
    fn test_duplicate_with_both_time_keys_keeps_record() {
        let r = reply(
            409,
            json!({ "code": "DUPLICATE", "detail": { "nama": "Budi", "jam": "2025-03-09T05:00:00Z", "jam_ambil": "2025-03-09T05:02:00Z" } }),
        );
        assert_eq!(
            classify(ClaimKind::Consumption, &r),
            Outcome::Duplicate(ClaimRecord {
                participant_name: Some("Budi".into()),
                claimed_at: Some("2025-03-09T05:00:00Z".into()),
            })
        );
    }

    #[test]
    fn test_validation_participant_with_null_name() {
        let r = reply(
            200,
            json!({ "valid": true, "data": { "peserta": { "nama": null, "no_hp": "0812", "domisili": "Depok" } } }),
        );
        match classify(ClaimKind::Validation, &r) {
            Outcome::Success(s) => {
                let p = s.participant.unwrap();
                assert_eq!(p.name, "");
                assert_eq!(p.phone.as_deref(), Some("0812"));
                assert_eq!(p.address.as_deref(), Some("Depok"));
            }
            other => panic!("Expected Success, got {:?}", other),
        }
    }

    #[test]
    fn test_consumption_success() {
        let r = reply(200, json!({ "data": { "nama": "Budi", "jam": "2025-03-09T05:00:00Z" } }));
        match classify(ClaimKind::Consumption, &r) {
            Outcome::Success(s) => {
                assert_eq!(s.participant.unwrap().name, "Budi");
                assert_eq!(s.claimed_at.as_deref(), Some("2025-03-09T05:00:00Z"));
            }
            other => panic!("Expected Success, got {:?}", other),
        }
    }

    #[test]
    fn test_forbidden_is_not_eligible() {
        let r = reply(403, json!({ "message": "Peserta belum check-in" }));
        assert_eq!(
            classify(ClaimKind::Consumption, &r),
            Outcome::NotEligible {
                reason: "Peserta belum check-in".into()
            }
        );
    }

    #[test]
    fn test_wrong_event_with_labels() {
        let r = reply(
            400,
            json!({
                "code": "WRONG_EVENT",
                "message": "Tiket untuk event lain",
                "expected_event": "Gathering 2025",
                "actual_event": "Seminar",
                "nama": "Sari"
            }),
        );
        assert_eq!(
            classify(ClaimKind::Consumption, &r),
            Outcome::WrongScope {
                expected: Some("Gathering 2025".into()),
                actual: Some("Seminar".into()),
                participant: Some("Sari".into()),
                message: "Tiket untuk event lain".into(),
            }
        );
    }

    #[test]
    fn test_wrong_event_code_beats_forbidden_status() {
        let r = reply(403, json!({ "code": "WRONG_EVENT", "message": "Salah event" }));
        assert_eq!(
            classify(ClaimKind::Consumption, &r),
            Outcome::WrongScope {
                expected: None,
                actual: None,
                participant: None,
                message: "Salah event".into(),
            }
        );
    }

    #[test]
    fn test_server_errors_are_invalid() {
        let r = reply(404, json!({ "message": "Token tidak ditemukan" }));
        assert_eq!(
            classify(ClaimKind::Consumption, &r),
            Outcome::invalid("Token tidak ditemukan")
        );

        let r = reply(500, Value::Null);
        assert_eq!(
            classify(ClaimKind::Validation, &r),
            Outcome::invalid(DEFAULT_INVALID_MESSAGE)
        );
    }

    #[test]
    fn test_checkin_prepare_rejects_unrecognized_qr() {
        let flow = CheckinRedirectFlow::new("https://absen.example.org/");
        let notice = flow
            .prepare(&DecodedPayload::new("https://other.org/promo"))
            .unwrap_err();
        assert_eq!(notice.message, UNRECOGNIZED_QR_MESSAGE);

        let request = flow
            .prepare(&DecodedPayload::new("https://absen.example.org/checkin/evt-42"))
            .unwrap();
        assert_eq!(request.token(), "evt-42");
    }

    #[tokio::test]
    async fn test_checkin_submit_builds_link_without_network() {
        let flow = CheckinRedirectFlow::new("https://absen.example.org/");
        let request = flow.prepare(&DecodedPayload::new("EVT-abc")).unwrap();
        match flow.submit(&request).await {
            Outcome::Success(s) => {
                let event = s.event.unwrap();
                assert_eq!(event.code.as_deref(), Some("EVT-ABC"));
                assert_eq!(
                    event.link.as_deref(),
                    Some("https://absen.example.org/checkin/EVT-ABC")
                );
            }
            other => panic!("Expected Success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_checkin_link_encodes_code_once() {
        let flow = CheckinRedirectFlow::new("https://absen.example.org");
        let request = flow
            .prepare(&DecodedPayload::new("https://absen.example.org/checkin/evt%20a1"))
            .unwrap();
        match flow.submit(&request).await {
            Outcome::Success(s) => assert_eq!(
                s.event.unwrap().link.as_deref(),
                Some("https://absen.example.org/checkin/EVT%20A1")
            ),
            other => panic!("Expected Success, got {:?}", other),
        }
    }

    #[test]
    fn test_pass_through_flows_reject_blank_tokens() {
        let api = Arc::new(EventApiClient::new("http://127.0.0.1:9"));
        let validator = TicketValidatorFlow::new(api.clone());
        assert!(validator.prepare(&DecodedPayload::new("   ")).is_err());

        let consumption = ConsumptionClaimFlow::new(api, "12");
        let request = consumption.prepare(&DecodedPayload::new(" TKT-1 ")).unwrap();
        assert_eq!(request.token(), "TKT-1");
        assert_eq!(request.context_id(), Some("12"));
    }

    #[tokio::test]
    async fn test_consumption_claim_request_and_duplicate_reply() {
        let (base, server) = serve_once(
            409,
            json!({
                "code": "DUPLICATE",
                "detail": { "nama": "Budi", "jam": "2025-03-09T05:00:00Z", "jam_ambil": "2025-03-09T05:01:00Z" }
            }),
        )
        .await;
        let session = AdminSession {
            token: "jwt-admin".into(),
            admin: AdminInfo::default(),
        };
        let api = Arc::new(EventApiClient::new(&base).with_session(Some(session)));
        let flow = ConsumptionClaimFlow::new(api, "ev 7");
        let request = flow.prepare(&DecodedPayload::new(" TKT-9 ")).unwrap();

        assert_eq!(
            flow.submit(&request).await,
            Outcome::Duplicate(ClaimRecord {
                participant_name: Some("Budi".into()),
                claimed_at: Some("2025-03-09T05:00:00Z".into()),
            })
        );

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /api/consumption/claim/ev%207 HTTP/1.1\r\n"), "{}", raw);
        assert!(raw.to_lowercase().contains("\r\nauthorization: bearer jwt-admin\r\n"));
        assert_eq!(request_body(&raw), json!({ "token": "TKT-9" }));
    }

    #[tokio::test]
    async fn test_validator_request_without_session() {
        let (base, server) = serve_once(
            200,
            json!({
                "valid": true,
                "data": { "token": "TKT-1", "peserta": { "nama": null, "no_hp": "0812", "domisili": "Depok" } }
            }),
        )
        .await;
        let flow = TicketValidatorFlow::new(Arc::new(EventApiClient::new(&base)));
        let request = flow.prepare(&DecodedPayload::new("TKT-1")).unwrap();

        match flow.submit(&request).await {
            Outcome::Success(s) => {
                let p = s.participant.unwrap();
                assert_eq!(p.phone.as_deref(), Some("0812"));
                assert_eq!(p.address.as_deref(), Some("Depok"));
            }
            other => panic!("Expected Success, got {:?}", other),
        }

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /api/validator/validate HTTP/1.1\r\n"), "{}", raw);
        assert!(!raw.to_lowercase().contains("authorization:"));
        assert_eq!(request_body(&raw), json!({ "token": "TKT-1" }));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_invalid() {
        let api = Arc::new(EventApiClient::new("http://127.0.0.1:9"));
        let flow = TicketValidatorFlow::new(api);
        let request = flow.prepare(&DecodedPayload::new("TKT-1")).unwrap();
        assert!(matches!(flow.submit(&request).await, Outcome::Invalid { .. }));
    }
}

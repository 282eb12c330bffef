//! Application Types
//!
//! Data model shared by the scan flow, the API client and the CLI.
//! Backend field names are Indonesian (`nama`, `no_hp`, ...); they are
//! mapped onto English field names here and nowhere else.

use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// Input mode of a scan session (the "Live Scan" / "Upload Image" tabs)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanMode {
    #[default]
    Camera,
    Upload,
}

impl ScanMode {
    pub fn label(&self) -> &'static str {
        match self {
            ScanMode::Camera => "camera",
            ScanMode::Upload => "upload",
        }
    }
}

/// Which physical camera to prefer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Rear camera
    #[default]
    Environment,
    /// Front camera
    User,
}

impl FacingMode {
    pub fn toggled(self) -> Self {
        match self {
            FacingMode::Environment => FacingMode::User,
            FacingMode::User => FacingMode::Environment,
        }
    }
}

/// Text read from a single successful decode. Consumed immediately, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPayload(String);

impl DecodedPayload {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

/// Token submitted to the backend, optionally bound to a scope (event)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRequest {
    token: String,
    context_id: Option<String>,
}

impl ClaimRequest {
    /// Builds a request from a trimmed token. Blank tokens never reach the network.
    pub fn new(token: &str, context_id: Option<String>) -> Result<Self, ScanError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ScanError::EmptyToken);
        }
        Ok(Self {
            token: token.to_string(),
            context_id,
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn context_id(&self) -> Option<&str> {
        self.context_id.as_deref()
    }
}

/// Participant data as shown on a result card
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ParticipantBody")]
pub struct ParticipantSnapshot {
    #[serde(rename = "nama")]
    pub name: String,
    #[serde(rename = "no_hp")]
    pub phone: Option<String>,
    #[serde(rename = "domisili")]
    pub address: Option<String>,
}

/// Wire shape of a participant; either address key may be present, or both
#[derive(Deserialize)]
struct ParticipantBody {
    #[serde(default)]
    nama: Option<String>,
    #[serde(default)]
    no_hp: Option<String>,
    #[serde(default)]
    domisili: Option<String>,
    #[serde(default)]
    alamat: Option<String>,
}

impl From<ParticipantBody> for ParticipantSnapshot {
    fn from(body: ParticipantBody) -> Self {
        Self {
            name: body.nama.unwrap_or_default(),
            phone: body.no_hp,
            address: body.domisili.or(body.alamat),
        }
    }
}

/// Treats an explicit `null` like a missing string
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Event data as shown on a result card
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSnapshot {
    #[serde(alias = "kode_event", alias = "event_code", default)]
    pub code: Option<String>,
    #[serde(rename = "nama", alias = "nama_event", default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(rename = "tanggal", alias = "tanggal_event", default)]
    pub date: Option<String>,
    /// When the ticket was checked in at this event
    #[serde(rename = "waktu_scan", default)]
    pub scanned_at: Option<String>,
    /// Public check-in link, only set by the check-in redirect flow
    #[serde(skip)]
    pub link: Option<String>,
}

/// Payload of a successful claim or validation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimSuccess {
    pub token: Option<String>,
    pub participant: Option<ParticipantSnapshot>,
    pub event: Option<EventSnapshot>,
    pub claimed_at: Option<String>,
}

/// The earlier claim reported back on a duplicate attempt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ClaimRecordBody")]
pub struct ClaimRecord {
    #[serde(rename = "nama")]
    pub participant_name: Option<String>,
    #[serde(rename = "jam_ambil")]
    pub claimed_at: Option<String>,
}

/// Wire shape of an earlier claim; the time arrives under any of three keys
#[derive(Deserialize)]
struct ClaimRecordBody {
    #[serde(default)]
    nama: Option<String>,
    #[serde(default)]
    jam: Option<String>,
    #[serde(default)]
    jam_ambil: Option<String>,
    #[serde(default)]
    waktu_scan: Option<String>,
}

impl From<ClaimRecordBody> for ClaimRecord {
    fn from(body: ClaimRecordBody) -> Self {
        Self {
            participant_name: body.nama,
            claimed_at: body.jam.or(body.jam_ambil).or(body.waktu_scan),
        }
    }
}

/// Classified result of one claim/validation attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(ClaimSuccess),
    Duplicate(ClaimRecord),
    NotEligible {
        reason: String,
    },
    WrongScope {
        expected: Option<String>,
        actual: Option<String>,
        participant: Option<String>,
        message: String,
    },
    Invalid {
        message: String,
    },
}

impl Outcome {
    pub fn invalid(message: impl Into<String>) -> Self {
        Outcome::Invalid {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Success(_) => "success",
            Outcome::Duplicate(_) => "duplicate",
            Outcome::NotEligible { .. } => "not_eligible",
            Outcome::WrongScope { .. } => "wrong_scope",
            Outcome::Invalid { .. } => "invalid",
        }
    }
}

/// Event as listed by the public endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventInfo {
    #[serde(alias = "kode_event", alias = "event_code", default)]
    pub code: Option<String>,
    #[serde(rename = "nama_event", default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(rename = "tanggal_event", default)]
    pub date: Option<String>,
    #[serde(rename = "status_event", default)]
    pub status: Option<String>,
    #[serde(default)]
    pub is_checkin_open: bool,
}

/// Self check-in form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckinForm {
    pub name: String,
    pub phone: String,
    pub address: String,
}

/// Body of a check-in submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckinPayload {
    pub nama: String,
    pub no_hp: String,
    pub alamat: String,
}

impl CheckinForm {
    /// Validates required fields and normalizes them for submission
    pub fn to_payload(&self) -> Result<CheckinPayload, ScanError> {
        if self.name.trim().is_empty() {
            return Err(ScanError::MissingField("name"));
        }
        let phone: String = self.phone.chars().filter(|c| !c.is_whitespace()).collect();
        if phone.is_empty() {
            return Err(ScanError::MissingField("phone"));
        }
        Ok(CheckinPayload {
            nama: self.name.trim().to_string(),
            no_hp: phone,
            alamat: self.address.trim().to_string(),
        })
    }
}

/// Ticket issued by a check-in
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub token: String,
    /// QR image as a data URL
    #[serde(default)]
    pub qr_image: Option<String>,
    #[serde(rename = "jam_masuk", default)]
    pub checked_in_at: Option<String>,
}

/// Ticket page data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketDetails {
    #[serde(default)]
    pub participant: Option<ParticipantSnapshot>,
    #[serde(default)]
    pub event: Option<EventSnapshot>,
    #[serde(default)]
    pub ticket: Option<Ticket>,
}

/// Logged-in administrator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminInfo {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(alias = "nama", default)]
    pub name: Option<String>,
}

/// Admin credentials kept between runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminSession {
    pub token: String,
    #[serde(default)]
    pub admin: AdminInfo,
}

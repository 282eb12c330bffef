//! Result presentation state and transient notices.

use chrono::{DateTime, Local, NaiveDate};
use tracing::{info, warn};

use crate::app::types::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// Short-lived user message (a toast)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Last classified outcome, held until the user dismisses it
#[derive(Debug, Default)]
pub struct ResultState {
    outcome: Option<Outcome>,
}

impl ResultState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever is displayed with a new outcome
    pub fn set_outcome(&mut self, outcome: Outcome) -> &Outcome {
        info!("Scan outcome: {}", outcome.kind());
        self.outcome.insert(outcome)
    }

    pub fn clear(&mut self) {
        self.outcome = None;
    }

    pub fn current(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    pub fn is_showing(&self) -> bool {
        self.outcome.is_some()
    }
}

/// Color/icon family of a result card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Positive,
    Repeat,
    Caution,
    Negative,
}

/// Display projection of an outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeView {
    pub tone: Tone,
    pub title: &'static str,
    pub message: String,
    /// Label/value rows for the participant card
    pub details: Vec<(&'static str, String)>,
}

impl OutcomeView {
    pub fn from_outcome(outcome: &Outcome) -> Self {
        let mut details = Vec::new();
        match outcome {
            Outcome::Success(success) => {
                if let Some(p) = &success.participant {
                    if !p.name.is_empty() {
                        details.push(("Participant", p.name.clone()));
                    }
                    if let Some(phone) = &p.phone {
                        details.push(("Phone", phone.clone()));
                    }
                    if let Some(address) = &p.address {
                        details.push(("Address", address.clone()));
                    }
                }
                let event_link = success.event.as_ref().is_some_and(|e| e.link.is_some());
                if let Some(e) = &success.event {
                    if !e.name.is_empty() {
                        details.push(("Event", e.name.clone()));
                    }
                    if let Some(code) = &e.code {
                        details.push(("Event code", code.clone()));
                    }
                    if let Some(date) = e.date.as_deref().and_then(format_date) {
                        details.push(("Date", date));
                    }
                    if let Some(time) = e.scanned_at.as_deref().and_then(format_time) {
                        details.push(("Checked in", time));
                    }
                    if let Some(link) = &e.link {
                        details.push(("Check-in link", link.clone()));
                    }
                }
                if let Some(time) = success.claimed_at.as_deref().and_then(format_time) {
                    details.push(("Claimed at", time));
                }
                if let Some(token) = &success.token {
                    details.push(("Token", token.clone()));
                }
                Self {
                    tone: Tone::Positive,
                    title: "SUCCESS",
                    message: if event_link {
                        "Event found. Continue to the check-in form.".to_string()
                    } else {
                        "Ticket accepted.".to_string()
                    },
                    details,
                }
            }
            Outcome::Duplicate(record) => {
                if let Some(name) = &record.participant_name {
                    details.push(("Participant", name.clone()));
                }
                if let Some(at) = &record.claimed_at {
                    let when = match (format_time(at), format_date(at)) {
                        (Some(time), Some(date)) => format!("{} ({})", time, date),
                        _ => at.clone(),
                    };
                    details.push(("Claimed at", when));
                }
                Self {
                    tone: Tone::Repeat,
                    title: "ALREADY CLAIMED",
                    message: "This ticket has already been used here.".to_string(),
                    details,
                }
            }
            Outcome::NotEligible { reason } => Self {
                tone: Tone::Caution,
                title: "NOT CHECKED IN",
                message: reason.clone(),
                details,
            },
            Outcome::WrongScope {
                expected,
                actual,
                participant,
                message,
            } => {
                if let Some(name) = participant {
                    details.push(("Participant", name.clone()));
                }
                if let Some(expected) = expected {
                    details.push(("This event", expected.clone()));
                }
                if let Some(actual) = actual {
                    details.push(("Ticket event", actual.clone()));
                }
                Self {
                    tone: Tone::Negative,
                    title: "WRONG EVENT",
                    message: message.clone(),
                    details,
                }
            }
            Outcome::Invalid { message } => Self {
                tone: Tone::Negative,
                title: "INVALID",
                message: message.clone(),
                details,
            },
        }
    }

    /// Notice raised alongside the result card
    pub fn notice(&self) -> Notice {
        match self.tone {
            Tone::Positive => Notice::success(self.message.clone()),
            _ => {
                warn!("{}: {}", self.title, self.message);
                Notice::error(format!("{}: {}", self.title, self.message))
            }
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Local>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Local))
}

/// `HH:MM` in local time
pub fn format_time(raw: &str) -> Option<String> {
    parse_timestamp(raw).map(|t| t.format("%H:%M").to_string())
}

/// Long date in local time; accepts full timestamps and plain `YYYY-MM-DD`
pub fn format_date(raw: &str) -> Option<String> {
    if let Some(t) = parse_timestamp(raw) {
        return Some(t.format("%-d %B %Y").to_string());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%-d %B %Y").to_string())
}

//! Event code extraction from check-in QR payloads.

use url::Url;

/// Path segment preceding the event code in a check-in link
pub const CHECKIN_ANCHOR: &str = "checkin";

/// Prefix of bare event codes printed as QR
pub const EVENT_CODE_PREFIX: &str = "EVT-";

/// Maps a decoded QR payload to an event code.
///
/// Absolute URLs must contain `/checkin/<code>` in their path; the segment
/// after the first `checkin` is returned. Text that is not a URL is accepted
/// only if it starts with [`EVENT_CODE_PREFIX`], and is returned trimmed.
pub fn extract_scope_id(raw_text: &str) -> Option<String> {
    match Url::parse(raw_text) {
        Ok(url) => {
            let segments: Vec<&str> = url
                .path_segments()?
                .filter(|s| !s.is_empty())
                .collect();
            let idx = segments.iter().position(|s| *s == CHECKIN_ANCHOR)?;
            segments.get(idx + 1).map(|s| {
                urlencoding::decode(s)
                    .map(|d| d.into_owned())
                    .unwrap_or_else(|_| s.to_string())
            })
        }
        Err(_) if raw_text.starts_with(EVENT_CODE_PREFIX) => Some(raw_text.trim().to_string()),
        Err(_) => None,
    }
}

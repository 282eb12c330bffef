//! App Data Cache Management
//!
//! Keeps the admin session between runs. The session is read once at startup
//! and handed to the API client; only login and logout write it.

use log::{error, info, warn};
use std::io;
use std::path::{Path, PathBuf};

use super::types::AdminSession;

/// Get the application data directory
/// Creates directory if it doesn't exist
pub fn get_app_data_dir() -> Option<PathBuf> {
    use std::sync::OnceLock;
    static APP_DATA_DIR: OnceLock<Option<PathBuf>> = OnceLock::new();

    APP_DATA_DIR
        .get_or_init(|| {
            let app_dir = dirs::data_dir()?.join("evtscan");

            if let Err(e) = std::fs::create_dir_all(&app_dir) {
                error!("Failed to create app data directory: {}", e);
            }

            Some(app_dir)
        })
        .clone()
}

// ============================================================
// Admin Session
// ============================================================

pub fn session_path() -> Option<PathBuf> {
    get_app_data_dir().map(|p| p.join("session.json"))
}

pub fn load_session() -> Option<AdminSession> {
    load_session_from(&session_path()?)
}

pub fn load_session_from(path: &Path) -> Option<AdminSession> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<AdminSession>(&content) {
        Ok(session) if !session.token.is_empty() => Some(session),
        Ok(_) => None,
        Err(e) => {
            warn!("Ignoring unreadable session file {:?}: {}", path, e);
            None
        }
    }
}

pub fn save_session(session: &AdminSession) -> io::Result<()> {
    save_session_to(&require_session_path()?, session)
}

pub fn save_session_to(path: &Path, session: &AdminSession) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(session).map_err(io::Error::other)?;
    std::fs::write(path, json).map_err(|e| {
        error!("Failed to save session: {}", e);
        e
    })?;
    info!("Saved admin session to {:?}", path);
    Ok(())
}

pub fn clear_session() -> io::Result<()> {
    clear_session_at(&require_session_path()?)
}

/// Remove the stored session. A missing file is not an error.
pub fn clear_session_at(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!("Cleared admin session");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            warn!("Failed to remove session file: {}", e);
            Err(e)
        }
    }
}

fn require_session_path() -> io::Result<PathBuf> {
    session_path().ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no data directory"))
}

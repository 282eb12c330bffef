//! evtscan - QR scanning client for event attendance
//!
//! Check-in kiosk, ticket validator and consumption claim desk on top of the
//! attendance backend API.

pub mod api;
pub mod app;
pub mod error;
pub mod scan;

pub use error::ScanError;

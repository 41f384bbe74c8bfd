//! State shared by every handler

use std::sync::Arc;

use devcert_dispenser::CertificateDispenser;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Issuer behind every download
    pub dispenser: Arc<CertificateDispenser>,
}

impl AppState {
    /// Share `dispenser` across handlers
    pub fn new(dispenser: CertificateDispenser) -> Self {
        Self {
            dispenser: Arc::new(dispenser),
        }
    }
}

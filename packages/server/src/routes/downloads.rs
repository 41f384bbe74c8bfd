//! `/downloads` endpoints

use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use devcert_dispenser::IssuedCertificatePackage;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Routes nested under `/downloads`
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/root-ca", get(download_root_ca))
        .route("/certificate", get(download_certificate))
}

/// The CA certificate, for installing into local trust stores
async fn download_root_ca(State(state): State<AppState>) -> Response {
    debug!("Downloading root CA");
    attachment(
        "application/force-download",
        "attachment; filename=\"ca.crt\"",
        state.dispenser.ca_certificate().to_vec(),
    )
}

/// Issue a certificate for `?domain=a&domain=b...`; the first domain is the CN
async fn download_certificate(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response> {
    let domains = requested_domains(params);
    let Some((primary, alternates)) = domains.split_first() else {
        return Err(AppError::BadRequest("at least one domain is required".to_string()));
    };
    debug!("Domains submitted for certificate: {domains:?}");

    let package: IssuedCertificatePackage = state.dispenser.issue(primary, alternates).await?;
    let archive = package.to_zip()?;

    Ok(attachment(
        "application/zip",
        "attachment; filename=\"cert.zip\"",
        archive,
    ))
}

/// Values of `domain` (or `domain[]`) in query order, blanks dropped
fn requested_domains(params: Vec<(String, String)>) -> Vec<String> {
    params
        .into_iter()
        .filter(|(key, _)| key == "domain" || key == "domain[]")
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

fn attachment(content_type: &'static str, disposition: &'static str, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response()
}

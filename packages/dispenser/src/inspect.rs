//! Certificate inspection
//!
//! Summaries are used to sanity-check the CA at startup, by the `inspect`
//! command and to assert on issued leaves.

use serde::Serialize;
use time::OffsetDateTime;
use x509_parser::extensions::GeneralName;
use x509_parser::parse_x509_certificate;
use x509_parser::pem::parse_x509_pem;

use crate::error::{DispenserError, Result};

/// Fields of a certificate relevant to development issuance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateSummary {
    /// First subject CN, if any
    pub common_name: Option<String>,
    /// DNS names of the SAN extension, empty when there is none
    pub san_dns_names: Vec<String>,
    /// Whether a SAN extension is present at all
    pub has_subject_alt_name: bool,
    /// Upper-case hex without DER sign padding
    pub serial_hex: String,
    /// Start of the validity window
    #[serde(with = "time::serde::rfc3339")]
    pub not_before: OffsetDateTime,
    /// End of the validity window
    #[serde(with = "time::serde::rfc3339")]
    pub not_after: OffsetDateTime,
    /// Basic constraints mark it as a CA
    pub is_ca: bool,
}

impl CertificateSummary {
    /// Past `not_after` now
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() > self.not_after
    }

    /// Whether `at` falls inside the validity window
    pub fn is_valid_at(&self, at: OffsetDateTime) -> bool {
        at >= self.not_before && at <= self.not_after
    }
}

/// Summarize the first certificate of a PEM document, or a DER certificate.
///
/// Text before the PEM block, such as the dump `openssl ca` prepends, is skipped.
pub fn summarize(data: &[u8]) -> Result<CertificateSummary> {
    let pem;
    let der: &[u8] = if looks_like_pem(data) {
        let (_, block) = parse_x509_pem(data)
            .map_err(|e| DispenserError::CertificateParsing(format!("Invalid PEM: {e}")))?;
        if block.label != "CERTIFICATE" {
            return Err(DispenserError::CertificateParsing(format!(
                "Expected CERTIFICATE block, got {}",
                block.label
            )));
        }
        pem = block;
        &pem.contents
    } else {
        data
    };

    let (_, cert) = parse_x509_certificate(der)
        .map_err(|e| DispenserError::CertificateParsing(format!("Invalid certificate: {e}")))?;

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_owned);

    let san = cert
        .subject_alternative_name()
        .map_err(|e| DispenserError::CertificateParsing(format!("Invalid SAN extension: {e}")))?;
    let has_subject_alt_name = san.is_some();
    let san_dns_names = san
        .map(|ext| {
            ext.value
                .general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::DNSName(dns) => Some((*dns).to_owned()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    let is_ca = matches!(cert.basic_constraints(), Ok(Some(bc)) if bc.value.ca);

    let raw_serial = cert.raw_serial();
    let significant = raw_serial
        .iter()
        .position(|b| *b != 0)
        .map_or(&raw_serial[raw_serial.len().saturating_sub(1)..], |i| &raw_serial[i..]);

    Ok(CertificateSummary {
        common_name,
        san_dns_names,
        has_subject_alt_name,
        serial_hex: hex::encode_upper(significant),
        not_before: cert.validity().not_before.to_datetime(),
        not_after: cert.validity().not_after.to_datetime(),
        is_ca,
    })
}

const PEM_MARKER: &[u8] = b"-----BEGIN";

fn looks_like_pem(data: &[u8]) -> bool {
    data.windows(PEM_MARKER.len()).any(|w| w == PEM_MARKER)
}

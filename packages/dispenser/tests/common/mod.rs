//! Shared fixtures for dispenser integration tests

#![allow(dead_code)]

use std::path::PathBuf;

use devcert_dispenser::CertificateAuthority;
use tempfile::TempDir;

/// A throwaway CA under its own temp directory
pub struct TestCa {
    pub dir: TempDir,
    pub base: PathBuf,
    pub authority: CertificateAuthority,
}

pub async fn test_ca() -> TestCa {
    let dir = tempfile::tempdir().expect("Failed to create CA directory");
    let base = dir.path().join("rootCA");
    let authority = CertificateAuthority::create(&base, "Dispenser Test Root", 30)
        .await
        .expect("Failed to create test CA");
    TestCa {
        dir,
        base,
        authority,
    }
}

pub fn domains(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

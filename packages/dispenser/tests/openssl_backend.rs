//! The `openssl` backend, driven by stand-in scripts and, when available,
//! the real binary

#![cfg(unix)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use devcert_dispenser::{summarize, Backend, CertificateDispenser, DispenserError, ExecutionError};
use tempfile::TempDir;

use common::{domains, test_ca, TestCa};

/// Writes `-out` targets like openssl would and logs each argument vector
const FAKE_OPENSSL: &str = r#"#!/bin/sh
echo "$@" >> "__LOG__"
out=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "-out" ]; then out="$arg"; fi
  prev="$arg"
done
case "$1" in
  genrsa) __GENRSA__ ;;
  req) __REQ__ ;;
  x509) __X509__ ;;
esac
"#;

struct FakeOpenssl {
    _dir: TempDir,
    executable: PathBuf,
    log: PathBuf,
}

const WRITE_KEY: &str = r#"printf 'fake key\n' > "$out""#;
const WRITE_CSR: &str = r#"printf 'fake csr\n' > "$out""#;
const WRITE_CERT: &str = r#"printf 'fake cert\n' > "$out""#;

/// Leaves a partial output behind, then fails
const FAIL_AFTER_WRITE: &str = r#"printf 'partial\n' > "$out"; echo boom >&2; exit 1"#;

impl FakeOpenssl {
    fn new(x509: &str) -> Self {
        Self::scripted(WRITE_KEY, WRITE_CSR, x509)
    }

    fn scripted(genrsa: &str, req: &str, x509: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let executable = dir.path().join("openssl");
        let log = dir.path().join("invocations.log");
        let script = FAKE_OPENSSL
            .replace("__LOG__", &log.display().to_string())
            .replace("__GENRSA__", genrsa)
            .replace("__REQ__", req)
            .replace("__X509__", x509);
        std::fs::write(&executable, script).unwrap();
        std::fs::set_permissions(&executable, std::fs::Permissions::from_mode(0o755)).unwrap();
        Self {
            _dir: dir,
            executable,
            log,
        }
    }

    fn signing() -> Self {
        Self::new(WRITE_CERT)
    }

    fn failing_x509() -> Self {
        Self::new("echo boom >&2; exit 1")
    }

    fn failing_genrsa() -> Self {
        Self::scripted(FAIL_AFTER_WRITE, WRITE_CSR, WRITE_CERT)
    }

    fn failing_req() -> Self {
        Self::scripted(WRITE_KEY, FAIL_AFTER_WRITE, WRITE_CERT)
    }

    fn invocations(&self) -> Vec<String> {
        std::fs::read_to_string(&self.log)
            .unwrap_or_default()
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

fn dispenser(ca: TestCa, executable: &Path, scratch: &Path) -> (CertificateDispenser, TempDir) {
    let dispenser = CertificateDispenser::builder(ca.authority)
        .backend(Backend::Openssl)
        .openssl_path(executable)
        .scratch_dir(scratch)
        .build();
    (dispenser, ca.dir)
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path).unwrap().next().is_none()
}

#[tokio::test]
async fn test_openssl_pipeline_arguments_with_alternates() {
    let fake = FakeOpenssl::signing();
    let scratch = tempfile::tempdir().unwrap();
    let ca = test_ca().await;
    let serial_path = ca.authority.serial().path().to_path_buf();
    let (dispenser, _ca_dir) = dispenser(ca, &fake.executable, scratch.path());

    let package = dispenser
        .issue("primary.test", &domains(&["a.test", "b.test"]))
        .await
        .expect("Scripted openssl should succeed");
    assert_eq!(package.certificate(), b"fake cert\n");
    assert_eq!(package.private_key(), b"fake key\n");

    let calls = fake.invocations();
    assert_eq!(calls.len(), 3, "genrsa, req and x509 run once each: {calls:?}");
    assert!(calls[0].starts_with("genrsa -out "));
    assert!(calls[0].ends_with(" 2048"));

    assert!(calls[1].starts_with("req -new -sha256 -key "));
    assert!(calls[1].contains("-subj /C=NZ/ST=AKL/O=ACME Inc./CN=primary.test"));
    assert!(calls[1].ends_with("-reqexts san_request"));

    assert!(calls[2].starts_with("x509 -req -sha256 -in "));
    assert!(calls[2].contains("-days 1825"));
    assert!(calls[2].contains("-extensions SAN"));
    assert!(calls[2].contains("-extfile "));
    assert!(calls[2].ends_with("-CAcreateserial"));
    assert!(!serial_path.exists());

    assert!(is_empty_dir(scratch.path()), "Scratch files must not outlive the issuance");
}

#[tokio::test]
async fn test_openssl_pipeline_without_alternates_skips_extensions() {
    let fake = FakeOpenssl::signing();
    let scratch = tempfile::tempdir().unwrap();
    let ca = test_ca().await;
    let serial_path = ca.authority.serial().path().to_path_buf();
    std::fs::write(&serial_path, "4F00\n").unwrap();
    let (dispenser, _ca_dir) = dispenser(ca, &fake.executable, scratch.path());

    dispenser.issue("solo.test", &[]).await.unwrap();

    let calls = fake.invocations();
    assert!(!calls[1].contains("-reqexts"));
    assert!(!calls[2].contains("-extfile"));
    assert!(!calls[2].contains("-extensions"));
    assert!(calls[2].ends_with(&format!("-CAserial {}", serial_path.display())));
    assert!(is_empty_dir(scratch.path()));
}

#[tokio::test]
async fn test_openssl_failure_propagates_captured_output() {
    let fake = FakeOpenssl::failing_x509();
    let scratch = tempfile::tempdir().unwrap();
    let ca = test_ca().await;
    let (dispenser, _ca_dir) = dispenser(ca, &fake.executable, scratch.path());

    let err = dispenser
        .issue("broken.test", &domains(&["alt.test"]))
        .await
        .expect_err("Failing x509 should fail the issuance");

    match err {
        DispenserError::Execution(ExecutionError::NonZeroExit {
            exit_code, stderr, ..
        }) => {
            assert_eq!(exit_code, Some(1));
            assert_eq!(stderr.trim(), "boom");
        }
        other => panic!("Unexpected error: {other:?}"),
    }
    assert!(
        is_empty_dir(scratch.path()),
        "Key and CSR from earlier stages must be removed on failure"
    );
}

#[tokio::test]
async fn test_openssl_early_stage_failures_leave_no_scratch_files() {
    for (fake, expected_calls) in [(FakeOpenssl::failing_genrsa(), 1), (FakeOpenssl::failing_req(), 2)] {
        let scratch = tempfile::tempdir().unwrap();
        let ca = test_ca().await;
        let serial_path = ca.authority.serial().path().to_path_buf();
        let (dispenser, _ca_dir) = dispenser(ca, &fake.executable, scratch.path());

        let err = dispenser
            .issue("early.test", &domains(&["alt.test"]))
            .await
            .expect_err("Failing stage should fail the issuance");

        assert_eq!(
            err.to_string(),
            format!("`{}` exited with exit code 1", fake.executable.display())
        );
        assert_eq!(fake.invocations().len(), expected_calls, "later stages must not run");
        assert!(!serial_path.exists(), "No serial is consumed before signing");
        assert!(
            is_empty_dir(scratch.path()),
            "Partial outputs and earlier artifacts must be removed"
        );
    }
}

#[tokio::test]
async fn test_openssl_timeout_kills_hung_toolchain() {
    let fake = FakeOpenssl::new("sleep 30");
    let scratch = tempfile::tempdir().unwrap();
    let ca = test_ca().await;
    let dispenser = CertificateDispenser::builder(ca.authority)
        .backend(Backend::Openssl)
        .openssl_path(&fake.executable)
        .scratch_dir(scratch.path())
        .command_timeout(Duration::from_millis(500))
        .build();

    let err = dispenser.issue("slow.test", &[]).await.unwrap_err();
    assert!(
        matches!(err, DispenserError::Execution(ExecutionError::TimedOut { .. })),
        "got {err:?}"
    );
    assert!(is_empty_dir(scratch.path()));
}

fn system_openssl() -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join("openssl"))
        .find(|candidate| candidate.is_file())
}

#[tokio::test]
async fn test_real_openssl_issues_certificate_with_san() {
    let Some(openssl) = system_openssl() else {
        eprintln!("openssl not on PATH, skipping");
        return;
    };
    let scratch = tempfile::tempdir().unwrap();
    let ca = test_ca().await;
    let serial_path = ca.authority.serial().path().to_path_buf();
    let (dispenser, _ca_dir) = dispenser(ca, &openssl, scratch.path());

    let first = dispenser
        .issue("real.test", &domains(&["one.test", "two.test"]))
        .await
        .expect("openssl issuance should succeed");
    let summary = summarize(first.certificate()).unwrap();
    assert_eq!(summary.common_name.as_deref(), Some("real.test"));
    assert_eq!(summary.san_dns_names, vec!["one.test", "two.test"]);
    assert!(serial_path.exists(), "-CAcreateserial writes <base>.srl");

    let second = dispenser.issue("real.test", &[]).await.unwrap();
    let summary = summarize(second.certificate()).unwrap();
    assert!(!summary.has_subject_alt_name);
    assert!(is_empty_dir(scratch.path()));
}

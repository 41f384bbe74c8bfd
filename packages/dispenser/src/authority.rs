//! Root certificate authority loaded from `<base>.crt` / `<base>.key`

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rcgen::{BasicConstraints, CertificateParams, IsCa, Issuer, KeyPair, KeyUsagePurpose};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use time::OffsetDateTime;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::error::{DispenserError, Result};
use crate::inspect::{self, CertificateSummary};
use crate::secure_file;
use crate::serial::SerialStore;
use crate::subject;
use crate::toolchain::native::generate_rsa_pem;

/// `<base>.<suffix>`, keeping any dots already in the base name
pub(crate) fn suffixed(base: &Path, suffix: &str) -> PathBuf {
    let mut path = OsString::from(base.as_os_str());
    path.push(".");
    path.push(suffix);
    PathBuf::from(path)
}

/// The signing CA.
///
/// Certificate and key are read once and never change afterwards; only the
/// serial counter next to them is written, once per signature.
pub struct CertificateAuthority {
    certificate_path: PathBuf,
    key_path: PathBuf,
    certificate: Vec<u8>,
    issuer: Arc<Issuer<'static, KeyPair>>,
    serial: SerialStore,
    summary: CertificateSummary,
}

impl fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("certificate_path", &self.certificate_path)
            .field("key_path", &self.key_path)
            .field("serial", &self.serial)
            .field("summary", &self.summary)
            .finish_non_exhaustive()
    }
}

impl CertificateAuthority {
    /// Load the CA at `base`. Missing or unreadable files are fatal.
    pub async fn load(base: impl AsRef<Path>) -> Result<Self> {
        let base = base.as_ref();
        let certificate_path = suffixed(base, "crt");
        let key_path = suffixed(base, "key");

        let certificate = tokio::fs::read(&certificate_path).await.map_err(|e| {
            DispenserError::Authority(format!(
                "Failed to read CA certificate {}: {e}",
                certificate_path.display()
            ))
        })?;
        let key_pem = Zeroizing::new(tokio::fs::read_to_string(&key_path).await.map_err(|e| {
            DispenserError::Authority(format!(
                "Failed to read CA private key {}: {e}",
                key_path.display()
            ))
        })?);

        let summary = inspect::summarize(&certificate).map_err(|e| {
            DispenserError::Authority(format!("{}: {e}", certificate_path.display()))
        })?;
        if !summary.is_ca {
            warn!(
                "CA certificate {} is not marked CA:TRUE, clients may reject issued leaves",
                certificate_path.display()
            );
        }
        if summary.is_expired() {
            warn!("CA certificate {} has expired", certificate_path.display());
        }

        let certificate_pem = std::str::from_utf8(&certificate).map_err(|_| {
            DispenserError::Authority(format!(
                "CA certificate {} is not PEM encoded",
                certificate_path.display()
            ))
        })?;
        let key_pair = KeyPair::from_pem(&normalize_key_pem(&key_pem)?)
            .map_err(|e| DispenserError::Authority(format!("Failed to parse CA private key: {e}")))?;
        let issuer = Issuer::from_ca_cert_pem(certificate_pem, key_pair)
            .map_err(|e| DispenserError::Authority(format!("Failed to build CA issuer: {e}")))?;

        info!(
            "Loaded certificate authority '{}' from {}",
            summary.common_name.as_deref().unwrap_or("<no CN>"),
            certificate_path.display()
        );

        Ok(Self {
            serial: SerialStore::new(suffixed(base, "srl")),
            certificate_path,
            key_path,
            certificate,
            issuer: Arc::new(issuer),
            summary,
        })
    }

    /// Create a self-signed RSA-2048 development CA at `base` and load it.
    ///
    /// Refuses to touch an existing certificate or key.
    pub async fn create(base: impl AsRef<Path>, common_name: &str, valid_for_days: u32) -> Result<Self> {
        let base = base.as_ref();
        let certificate_path = suffixed(base, "crt");
        let key_path = suffixed(base, "key");

        for path in [&certificate_path, &key_path] {
            if tokio::fs::try_exists(path).await? {
                return Err(DispenserError::Authority(format!(
                    "{} already exists, refusing to overwrite",
                    path.display()
                )));
            }
        }

        let common_name = common_name.to_string();
        let (certificate_pem, key_pem) =
            tokio::task::spawn_blocking(move || self_signed_root(&common_name, valid_for_days))
                .await
                .map_err(|e| DispenserError::Authority(format!("CA generation task failed: {e}")))??;

        if let Some(parent) = base.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        secure_file::write_owner_only(&key_path, key_pem.as_bytes(), true).await?;
        tokio::fs::write(&certificate_path, certificate_pem.as_bytes()).await?;

        info!("Created certificate authority at {}", certificate_path.display());
        Self::load(base).await
    }

    /// `<base>.crt`
    pub fn certificate_path(&self) -> &Path {
        &self.certificate_path
    }

    /// `<base>.key`
    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// CA certificate exactly as read from disk
    pub fn certificate(&self) -> &[u8] {
        &self.certificate
    }

    /// Parsed view of the CA certificate
    pub fn summary(&self) -> &CertificateSummary {
        &self.summary
    }

    /// Serial counter kept in `<base>.srl`
    pub fn serial(&self) -> &SerialStore {
        &self.serial
    }

    pub(crate) fn issuer(&self) -> Arc<Issuer<'static, KeyPair>> {
        Arc::clone(&self.issuer)
    }
}

/// rcgen only reads PKCS#8; openssl 1.x `genrsa` writes PKCS#1
fn normalize_key_pem(pem: &str) -> Result<Zeroizing<String>> {
    if !pem.contains("BEGIN RSA PRIVATE KEY") {
        return Ok(Zeroizing::new(pem.to_string()));
    }
    let key = RsaPrivateKey::from_pkcs1_pem(pem)
        .map_err(|e| DispenserError::Authority(format!("Failed to parse PKCS#1 CA key: {e}")))?;
    key.to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| DispenserError::Authority(format!("Failed to re-encode CA key: {e}")))
}

fn self_signed_root(common_name: &str, valid_for_days: u32) -> Result<(String, Zeroizing<String>)> {
    let key_pem = generate_rsa_pem(crate::toolchain::RSA_KEY_BITS).map_err(DispenserError::Authority)?;
    let key_pair = KeyPair::from_pem(&key_pem)
        .map_err(|e| DispenserError::Authority(format!("Failed to load generated CA key: {e}")))?;

    let mut params = CertificateParams::default();
    params.distinguished_name = subject::distinguished_name(common_name);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    let now = OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + time::Duration::days(i64::from(valid_for_days));

    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| DispenserError::Authority(format!("Failed to self-sign CA: {e}")))?;
    Ok((cert.pem(), key_pem))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_keeps_dotted_base_names() {
        assert_eq!(
            suffixed(Path::new("/etc/devcert/root.dev"), "srl"),
            PathBuf::from("/etc/devcert/root.dev.srl")
        );
    }

    #[tokio::test]
    async fn load_fails_without_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = CertificateAuthority::load(dir.path().join("missing")).await.unwrap_err();
        assert!(matches!(err, DispenserError::Authority(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn create_writes_ca_and_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("ca").join("rootCA");

        let ca = CertificateAuthority::create(&base, "Dispenser Test CA", 30).await.unwrap();
        assert!(ca.summary().is_ca);
        assert_eq!(ca.summary().common_name.as_deref(), Some("Dispenser Test CA"));
        assert_eq!(ca.certificate(), std::fs::read(ca.certificate_path()).unwrap().as_slice());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(ca.key_path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        let err = CertificateAuthority::create(&base, "Again", 30).await.unwrap_err();
        assert!(matches!(err, DispenserError::Authority(_)));
    }

    #[tokio::test]
    async fn load_accepts_certificate_with_text_dump() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("rootCA");
        let ca = CertificateAuthority::create(&base, "Dumped CA", 30).await.unwrap();

        let mut dumped = String::from("Certificate:\n    Data:\n        Version: 3 (0x2)\n");
        for line in 0..30 {
            dumped.push_str(&format!("                {}\n", format!("{line:02x}:").repeat(15)));
        }
        dumped.push_str(std::str::from_utf8(ca.certificate()).unwrap());
        std::fs::write(ca.certificate_path(), &dumped).unwrap();

        let reloaded = CertificateAuthority::load(&base).await.unwrap();
        assert_eq!(reloaded.summary().common_name.as_deref(), Some("Dumped CA"));
        assert_eq!(reloaded.certificate(), dumped.as_bytes());
    }

    #[tokio::test]
    async fn load_accepts_pkcs1_key() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("rootCA");
        let ca = CertificateAuthority::create(&base, "PKCS1 CA", 30).await.unwrap();

        let pkcs8 = std::fs::read_to_string(ca.key_path()).unwrap();
        let key = <RsaPrivateKey as rsa::pkcs8::DecodePrivateKey>::from_pkcs8_pem(&pkcs8).unwrap();
        let pkcs1 = rsa::pkcs1::EncodeRsaPrivateKey::to_pkcs1_pem(&key, LineEnding::LF).unwrap();
        std::fs::write(ca.key_path(), pkcs1.as_bytes()).unwrap();

        let reloaded = CertificateAuthority::load(&base).await.unwrap();
        assert_eq!(reloaded.certificate(), ca.certificate());
    }
}

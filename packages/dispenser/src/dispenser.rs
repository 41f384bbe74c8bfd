//! Issuance orchestration

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::authority::CertificateAuthority;
use crate::error::{DispenserError, ExecutionError, Result, Stage};
use crate::extensions::ExtensionTemplate;
use crate::package::IssuedCertificatePackage;
use crate::process::{ProcessRunner, DEFAULT_TIMEOUT};
use crate::toolchain::{Backend, NativeToolchain, OpensslToolchain, Toolchain};

/// Progress of a single issuance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuanceState {
    /// Request accepted, nothing run yet
    Start,
    /// Leaf key exists
    KeyGenerated,
    /// CSR built from the key
    CsrBuilt,
    /// CA signed the CSR
    Signed,
    /// Key and certificate read back; terminal success
    Packaged,
    /// A stage failed; terminal
    Failed,
}

/// Turns domain names into signed key/certificate pairs.
///
/// Shareable across tasks; concurrent issuances only contend on the CA
/// serial counter.
pub struct CertificateDispenser {
    authority: CertificateAuthority,
    toolchain: Arc<dyn Toolchain>,
}

impl std::fmt::Debug for CertificateDispenser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateDispenser")
            .field("authority", &self.authority)
            .field("toolchain", &self.toolchain.name())
            .finish()
    }
}

impl CertificateDispenser {
    /// Dispenser running an explicit toolchain
    pub fn new(authority: CertificateAuthority, toolchain: Arc<dyn Toolchain>) -> Self {
        Self {
            authority,
            toolchain,
        }
    }

    /// Assemble a dispenser from configuration values
    pub fn builder(authority: CertificateAuthority) -> DispenserBuilder {
        DispenserBuilder::new(authority)
    }

    /// CA used for signing
    pub fn authority(&self) -> &CertificateAuthority {
        &self.authority
    }

    /// Name of the backend in use, `native` or `openssl`
    pub fn toolchain_name(&self) -> &'static str {
        self.toolchain.name()
    }

    /// The CA certificate as loaded at startup
    pub fn ca_certificate(&self) -> &[u8] {
        self.authority.certificate()
    }

    /// Issue a fresh key and certificate for `primary_domain`.
    ///
    /// `primary_domain` becomes the CN; a SAN extension listing
    /// `alternate_domains` is added only when there are any. Every name is
    /// trimmed, and a blank one is rejected. A failure in any stage is
    /// returned as is, and every intermediate artifact is dropped with it.
    pub async fn issue(
        &self,
        primary_domain: &str,
        alternate_domains: &[String],
    ) -> Result<IssuedCertificatePackage> {
        let primary_domain = primary_domain.trim();
        if primary_domain.is_empty() {
            return Err(DispenserError::InvalidRequest(
                "primary domain must not be empty".to_string(),
            ));
        }
        let alternate_domains: Vec<String> = alternate_domains
            .iter()
            .map(|domain| domain.trim().to_string())
            .collect();
        if alternate_domains.iter().any(String::is_empty) {
            return Err(DispenserError::InvalidRequest(
                "alternate domains must not be empty".to_string(),
            ));
        }

        let id = Uuid::new_v4();
        debug!(
            "[{id}] issuing {primary_domain} with {} alternate(s) via {}",
            alternate_domains.len(),
            self.toolchain.name()
        );

        let (_, outcome) = self.run_tracked(id, primary_domain, &alternate_domains).await;
        let package = outcome?;
        info!("[{id}] issued certificate for {primary_domain}");
        Ok(package)
    }

    /// Run the pipeline and report the terminal state alongside the outcome
    async fn run_tracked(
        &self,
        id: Uuid,
        primary_domain: &str,
        alternate_domains: &[String],
    ) -> (IssuanceState, Result<IssuedCertificatePackage, ExecutionError>) {
        let mut state = IssuanceState::Start;
        let outcome = self
            .run_pipeline(id, &mut state, primary_domain, alternate_domains)
            .await;
        if let Err(e) = &outcome {
            warn!("[{id}] issuance failed after {state:?}: {e}");
            advance(id, &mut state, IssuanceState::Failed);
        }
        (state, outcome)
    }

    async fn run_pipeline(
        &self,
        id: Uuid,
        state: &mut IssuanceState,
        primary_domain: &str,
        alternate_domains: &[String],
    ) -> Result<IssuedCertificatePackage, ExecutionError> {
        let key = self.toolchain.generate_key().await?;
        advance(id, state, IssuanceState::KeyGenerated);

        let request = self
            .toolchain
            .build_csr(&key, primary_domain, alternate_domains)
            .await?;
        advance(id, state, IssuanceState::CsrBuilt);

        let certificate = self.toolchain.sign(request, &self.authority).await?;
        advance(id, state, IssuanceState::Signed);

        let (certificate_bytes, key_bytes) =
            tokio::try_join!(certificate.artifact().read(), key.artifact().read())
                .map_err(|e| ExecutionError::artifact(Stage::ReadBack, e))?;
        advance(id, state, IssuanceState::Packaged);

        Ok(IssuedCertificatePackage::new(certificate_bytes, key_bytes))
    }
}

fn advance(id: Uuid, state: &mut IssuanceState, next: IssuanceState) {
    debug!("[{id}] {state:?} -> {next:?}");
    *state = next;
}

/// Builder for [`CertificateDispenser`]
pub struct DispenserBuilder {
    authority: CertificateAuthority,
    template: Arc<ExtensionTemplate>,
    backend: Backend,
    openssl_path: PathBuf,
    timeout: Duration,
    scratch_dir: Option<PathBuf>,
}

impl DispenserBuilder {
    fn new(authority: CertificateAuthority) -> Self {
        Self {
            authority,
            template: Arc::new(ExtensionTemplate::default()),
            backend: Backend::default(),
            openssl_path: PathBuf::from("openssl"),
            timeout: DEFAULT_TIMEOUT,
            scratch_dir: None,
        }
    }

    /// Extension profile for issued leaves
    pub fn template(self, template: ExtensionTemplate) -> Self {
        Self {
            template: Arc::new(template),
            ..self
        }
    }

    /// Toolchain implementation, [`Backend::Native`] by default
    pub fn backend(self, backend: Backend) -> Self {
        Self { backend, ..self }
    }

    /// Executable used by [`Backend::Openssl`]
    pub fn openssl_path(self, path: impl Into<PathBuf>) -> Self {
        Self {
            openssl_path: path.into(),
            ..self
        }
    }

    /// Per-command timeout used by [`Backend::Openssl`]
    pub fn command_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    /// Scratch directory used by [`Backend::Openssl`]
    pub fn scratch_dir(self, dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: Some(dir.into()),
            ..self
        }
    }

    /// Finish with the selected backend
    pub fn build(self) -> CertificateDispenser {
        let toolchain: Arc<dyn Toolchain> = match self.backend {
            Backend::Native => Arc::new(NativeToolchain::new(self.template)),
            Backend::Openssl => {
                let toolchain = OpensslToolchain::new(
                    self.openssl_path,
                    ProcessRunner::new(self.timeout),
                    self.template,
                );
                match self.scratch_dir {
                    Some(dir) => Arc::new(toolchain.with_scratch_dir(dir)),
                    None => Arc::new(toolchain),
                }
            }
        };
        CertificateDispenser::new(self.authority, toolchain)
    }
}

//! Key generation, CSR construction and signing backends
//!
//! [`Toolchain`] is the seam between the orchestrator and whatever does the
//! cryptography. [`native::NativeToolchain`] works in process with rcgen and
//! rsa; [`openssl::OpensslToolchain`] drives the `openssl` command line.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;
use crate::authority::CertificateAuthority;
use crate::error::ExecutionError;
use crate::extensions::ExtensionSet;

pub mod native;
pub mod openssl;

pub use native::NativeToolchain;
pub use openssl::OpensslToolchain;

/// Modulus size of every generated key
pub const RSA_KEY_BITS: usize = 2048;
/// Validity of issued leaves, counted from the moment of signing
pub const LEAF_VALIDITY_DAYS: u32 = 1825;

/// Which [`Toolchain`] implementation to run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// rcgen and rsa, in process
    #[default]
    Native,
    /// The `openssl` command line
    Openssl,
}

/// A freshly generated leaf private key (PEM)
#[derive(Debug)]
pub struct KeyHandle(Artifact);

impl KeyHandle {
    /// Wrap a generated artifact
    pub fn new(artifact: Artifact) -> Self {
        Self(artifact)
    }

    /// Underlying artifact
    pub fn artifact(&self) -> &Artifact {
        &self.0
    }
}

/// A signed leaf certificate (PEM)
#[derive(Debug)]
pub struct CertificateHandle(Artifact);

impl CertificateHandle {
    /// Wrap a generated artifact
    pub fn new(artifact: Artifact) -> Self {
        Self(artifact)
    }

    /// Underlying artifact
    pub fn artifact(&self) -> &Artifact {
        &self.0
    }
}

/// A CSR together with the extensions the signer must apply.
///
/// Built by [`Toolchain::build_csr`] and consumed by [`Toolchain::sign`].
#[derive(Debug)]
pub struct SigningRequest {
    csr: Artifact,
    config: Option<Artifact>,
    extensions: ExtensionSet,
}

impl SigningRequest {
    /// `config` is the rendered openssl config the CSR was built with, if any
    pub fn new(csr: Artifact, config: Option<Artifact>, extensions: ExtensionSet) -> Self {
        Self {
            csr,
            config,
            extensions,
        }
    }

    /// PEM CSR
    pub fn csr(&self) -> &Artifact {
        &self.csr
    }

    /// Rendered openssl config, when the backend needed one
    pub fn config(&self) -> Option<&Artifact> {
        self.config.as_ref()
    }

    /// Extensions the signer applies
    pub fn extensions(&self) -> &ExtensionSet {
        &self.extensions
    }

    /// Whether the signer copies the SAN section into the leaf
    pub fn san_active(&self) -> bool {
        self.extensions.san_active()
    }

    /// CSR, config and extensions, moved out
    pub fn into_parts(self) -> (Artifact, Option<Artifact>, ExtensionSet) {
        (self.csr, self.config, self.extensions)
    }
}

/// The three cryptographic stages of one issuance
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Generate a new [`RSA_KEY_BITS`] RSA private key
    async fn generate_key(&self) -> Result<KeyHandle, ExecutionError>;

    /// Build a CSR for `primary_domain`, requesting a SAN for the alternates
    async fn build_csr(
        &self,
        key: &KeyHandle,
        primary_domain: &str,
        alternate_domains: &[String],
    ) -> Result<SigningRequest, ExecutionError>;

    /// Sign the request with the CA, allocating the next serial
    async fn sign(
        &self,
        request: SigningRequest,
        ca: &CertificateAuthority,
    ) -> Result<CertificateHandle, ExecutionError>;
}

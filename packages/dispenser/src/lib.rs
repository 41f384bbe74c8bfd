//! Development TLS certificate issuance.
//!
//! A [`CertificateDispenser`] holds a root CA and turns a primary domain plus
//! optional alternates into a fresh RSA key and a CA-signed leaf:
//!
//! ```no_run
//! # async fn run() -> devcert_dispenser::Result<()> {
//! use devcert_dispenser::{Backend, CertificateAuthority, CertificateDispenser};
//!
//! let ca = CertificateAuthority::load("ca/rootCA").await?;
//! let dispenser = CertificateDispenser::builder(ca).backend(Backend::Native).build();
//!
//! let package = dispenser
//!     .issue("app.localhost", &["api.localhost".to_string()])
//!     .await?;
//! std::fs::write("cert.zip", package.to_zip()?)?;
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod authority;
pub mod dispenser;
pub mod error;
pub mod extensions;
pub mod inspect;
pub mod package;
pub mod process;
mod secure_file;
pub mod serial;
pub mod subject;
pub mod toolchain;

pub use artifact::Artifact;
pub use authority::CertificateAuthority;
pub use dispenser::{CertificateDispenser, DispenserBuilder, IssuanceState};
pub use error::{DispenserError, ExecutionError, Result, Stage};
pub use extensions::{ExtendedKeyUsage, ExtensionSet, ExtensionTemplate, KeyUsage, SubjectAltNames};
pub use inspect::{summarize, CertificateSummary};
pub use package::IssuedCertificatePackage;
pub use process::{ProcessOutput, ProcessRunner, DEFAULT_TIMEOUT};
pub use toolchain::{
    Backend, CertificateHandle, KeyHandle, NativeToolchain, OpensslToolchain, SigningRequest, Toolchain,
};

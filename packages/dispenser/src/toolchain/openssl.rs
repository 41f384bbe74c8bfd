//! `openssl` command-line backend
//!
//! Every artifact is a scratch file owned by the handle passed to the next
//! stage. The files disappear with their handles, whether the issuance
//! finished or not.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::{NamedTempFile, TempPath};
use tracing::{debug, info};

use super::{
    CertificateHandle, KeyHandle, SigningRequest, Toolchain, LEAF_VALIDITY_DAYS, RSA_KEY_BITS,
};
use crate::artifact::Artifact;
use crate::authority::CertificateAuthority;
use crate::error::{ExecutionError, Stage};
use crate::extensions::{ExtensionSet, ExtensionTemplate};
use crate::process::ProcessRunner;
use crate::subject::LeafSubject;

/// A path handed to openssl, either borrowed from an artifact or a copy
/// written for this call
enum StagedFile<'a> {
    Borrowed(&'a Path),
    Owned(TempPath),
}

impl StagedFile<'_> {
    fn path(&self) -> &Path {
        match self {
            Self::Borrowed(path) => path,
            Self::Owned(path) => path,
        }
    }
}

/// Backend that shells out to `openssl`
#[derive(Debug, Clone)]
pub struct OpensslToolchain {
    executable: PathBuf,
    runner: ProcessRunner,
    template: Arc<ExtensionTemplate>,
    scratch_dir: PathBuf,
}

impl OpensslToolchain {
    /// Scratch files go to the system temp directory
    pub fn new(executable: impl Into<PathBuf>, runner: ProcessRunner, template: Arc<ExtensionTemplate>) -> Self {
        Self {
            executable: executable.into(),
            runner,
            template,
            scratch_dir: std::env::temp_dir(),
        }
    }

    /// Put scratch files in `dir` instead
    pub fn with_scratch_dir(self, dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: dir.into(),
            ..self
        }
    }

    /// The `openssl` binary invoked
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn scratch_file(&self, stage: Stage, suffix: &str) -> Result<TempPath, ExecutionError> {
        tempfile::Builder::new()
            .prefix("devcert-")
            .suffix(suffix)
            .tempfile_in(&self.scratch_dir)
            .map(NamedTempFile::into_temp_path)
            .map_err(|e| ExecutionError::artifact(stage, e))
    }

    async fn write_scratch(&self, stage: Stage, suffix: &str, contents: &[u8]) -> Result<TempPath, ExecutionError> {
        let path = self.scratch_file(stage, suffix)?;
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| ExecutionError::artifact(stage, e))?;
        Ok(path)
    }

    /// File path for `artifact`, spilling in-memory buffers to scratch
    async fn stage_file<'a>(
        &self,
        artifact: &'a Artifact,
        stage: Stage,
        suffix: &str,
    ) -> Result<StagedFile<'a>, ExecutionError> {
        match artifact {
            Artifact::File(path) => Ok(StagedFile::Borrowed(path)),
            Artifact::Memory(bytes) => Ok(StagedFile::Owned(self.write_scratch(stage, suffix, bytes).await?)),
        }
    }
}

#[async_trait]
impl Toolchain for OpensslToolchain {
    fn name(&self) -> &'static str {
        "openssl"
    }

    async fn generate_key(&self) -> Result<KeyHandle, ExecutionError> {
        let key = self.scratch_file(Stage::KeyGeneration, ".key")?;

        let args: Vec<OsString> = vec![
            "genrsa".into(),
            "-out".into(),
            key.as_os_str().to_owned(),
            RSA_KEY_BITS.to_string().into(),
        ];
        self.runner.run(&self.executable, &args).await?;

        debug!("Generated {RSA_KEY_BITS}-bit RSA key at {}", key.display());
        Ok(KeyHandle::new(Artifact::file(key)))
    }

    async fn build_csr(
        &self,
        key: &KeyHandle,
        primary_domain: &str,
        alternate_domains: &[String],
    ) -> Result<SigningRequest, ExecutionError> {
        let extensions = ExtensionSet::new(Arc::clone(&self.template), alternate_domains);
        let config = self
            .write_scratch(Stage::CsrBuild, ".cnf", extensions.render_openssl_config().as_bytes())
            .await?;
        let key_file = self.stage_file(key.artifact(), Stage::CsrBuild, ".key").await?;
        let csr = self.scratch_file(Stage::CsrBuild, ".csr")?;

        let mut args: Vec<OsString> = vec![
            "req".into(),
            "-new".into(),
            "-sha256".into(),
            "-key".into(),
            key_file.path().as_os_str().to_owned(),
            "-subj".into(),
            LeafSubject::new(primary_domain).openssl_subject().into(),
            "-out".into(),
            csr.as_os_str().to_owned(),
            "-config".into(),
            config.as_os_str().to_owned(),
        ];
        if extensions.san_active() {
            args.push("-reqexts".into());
            args.push(ExtensionSet::REQUEST_SECTION.into());
        }
        self.runner.run(&self.executable, &args).await?;

        debug!("Built CSR for {primary_domain} at {}", csr.display());
        Ok(SigningRequest::new(
            Artifact::file(csr),
            Some(Artifact::file(config)),
            extensions,
        ))
    }

    async fn sign(
        &self,
        request: SigningRequest,
        ca: &CertificateAuthority,
    ) -> Result<CertificateHandle, ExecutionError> {
        let (csr, config, extensions) = request.into_parts();
        let csr_file = self.stage_file(&csr, Stage::Signing, ".csr").await?;
        let certificate = self.scratch_file(Stage::Signing, ".crt")?;

        let mut args: Vec<OsString> = vec![
            "x509".into(),
            "-req".into(),
            "-sha256".into(),
            "-in".into(),
            csr_file.path().as_os_str().to_owned(),
            "-CA".into(),
            ca.certificate_path().as_os_str().to_owned(),
            "-CAkey".into(),
            ca.key_path().as_os_str().to_owned(),
            "-out".into(),
            certificate.as_os_str().to_owned(),
            "-days".into(),
            LEAF_VALIDITY_DAYS.to_string().into(),
        ];

        let _config_file = if extensions.san_active() {
            let staged = match &config {
                Some(artifact) => self.stage_file(artifact, Stage::Signing, ".cnf").await?,
                None => StagedFile::Owned(
                    self.write_scratch(Stage::Signing, ".cnf", extensions.render_openssl_config().as_bytes())
                        .await?,
                ),
            };
            args.push("-extfile".into());
            args.push(staged.path().as_os_str().to_owned());
            args.push("-extensions".into());
            args.push(ExtensionSet::SIGNING_SECTION.into());
            Some(staged)
        } else {
            None
        };

        // openssl reads and rewrites the serial file itself
        let serial = ca.serial().lock().await;
        if serial
            .exists()
            .await
            .map_err(|e| ExecutionError::artifact(Stage::Signing, e))?
        {
            args.push("-CAserial".into());
            args.push(serial.path().as_os_str().to_owned());
        } else {
            args.push("-CAcreateserial".into());
        }
        self.runner.run(&self.executable, &args).await?;
        drop(serial);

        info!("Signed leaf certificate at {}", certificate.display());
        Ok(CertificateHandle::new(Artifact::file(certificate)))
    }
}

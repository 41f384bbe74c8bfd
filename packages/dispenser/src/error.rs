//! Error types for the issuance pipeline

use std::fmt;
use std::time::Duration;

/// Pipeline stage a failure originated in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Leaf private key generation
    KeyGeneration,
    /// Certificate signing request construction
    CsrBuild,
    /// CA signing of the request
    Signing,
    /// Reading the finished key and certificate back
    ReadBack,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::KeyGeneration => "key generation",
            Stage::CsrBuild => "CSR build",
            Stage::Signing => "signing",
            Stage::ReadBack => "read-back",
        };
        f.write_str(name)
    }
}

/// Failure of a single pipeline stage, whatever backend ran it
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// An external command exited unsuccessfully
    #[error("`{program}` exited with {}", describe_exit(.exit_code))]
    NonZeroExit {
        /// Executable that was run
        program: String,
        /// Exit status, `None` when the child was killed by a signal
        exit_code: Option<i32>,
        /// Captured standard output
        stdout: String,
        /// Captured standard error
        stderr: String,
    },
    /// An external command ran past its timeout and was killed
    #[error("`{program}` did not finish within {timeout:?}")]
    TimedOut {
        /// Executable that was run
        program: String,
        /// Timeout that elapsed
        timeout: Duration,
        /// Standard output written before the child was killed
        stdout: String,
        /// Standard error written before the child was killed
        stderr: String,
    },
    /// An external command could not be spawned or waited on
    #[error("Failed to run `{program}`: {source}")]
    Io {
        /// Executable that was run
        program: String,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },
    /// An in-process library call failed
    #[error("{stage} failed: {message}")]
    Native {
        /// Stage the call belonged to
        stage: Stage,
        /// Library error, rendered
        message: String,
    },
    /// A key, CSR, config or certificate artifact could not be read or written
    #[error("{stage} artifact unavailable: {source}")]
    Artifact {
        /// Stage that needed the artifact
        stage: Stage,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

impl ExecutionError {
    /// In-process library failure at `stage`
    pub fn native(stage: Stage, message: impl Into<String>) -> Self {
        Self::Native {
            stage,
            message: message.into(),
        }
    }

    /// Reading or writing a stage artifact failed
    pub fn artifact(stage: Stage, source: std::io::Error) -> Self {
        Self::Artifact { stage, source }
    }

    /// Exit code of a failed external command, when there was one
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::NonZeroExit { exit_code, .. } => *exit_code,
            _ => None,
        }
    }

    /// Captured standard error of a failed or killed external command
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::NonZeroExit { stderr, .. } | Self::TimedOut { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

/// Errors surfaced by the dispenser to its callers
#[derive(Debug, thiserror::Error)]
pub enum DispenserError {
    /// A pipeline stage failed
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    /// Configuration or extension template could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
    /// CA certificate or key missing or unusable
    #[error("Certificate authority unavailable: {0}")]
    Authority(String),
    /// Request rejected before any stage ran
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// Bytes are not a readable X.509 certificate
    #[error("Certificate parsing failed: {0}")]
    CertificateParsing(String),
    /// ZIP archive could not be produced
    #[error("Packaging failed: {0}")]
    Packaging(String),
    /// Filesystem error outside a pipeline stage
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the crate
pub type Result<T, E = DispenserError> = std::result::Result<T, E>;

impl From<zip::result::ZipError> for DispenserError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Packaging(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_zero_exit_reports_code() {
        let err = ExecutionError::NonZeroExit {
            program: "openssl".into(),
            exit_code: Some(1),
            stdout: String::new(),
            stderr: "unable to load CA".into(),
        };
        assert_eq!(err.to_string(), "`openssl` exited with exit code 1");
        assert_eq!(err.exit_code(), Some(1));
        assert_eq!(err.stderr(), Some("unable to load CA"));
    }

    #[test]
    fn execution_error_is_transparent_in_dispenser_error() {
        let err: DispenserError = ExecutionError::native(Stage::Signing, "bad issuer").into();
        assert_eq!(err.to_string(), "signing failed: bad issuer");
    }
}

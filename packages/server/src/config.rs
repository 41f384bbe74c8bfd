//! TOML configuration
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [certificate]
//! ca_path = "ca/rootCA"          # <ca_path>.crt, .key and .srl
//! template_path = "leaf.toml"    # optional, built-in profile otherwise
//! backend = "native"             # or "openssl"
//! openssl_path = "openssl"
//! command_timeout_secs = 5
//! scratch_dir = "/tmp/devcert"   # optional
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use devcert_dispenser::{Backend, DEFAULT_TIMEOUT};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AppError, Result};

/// File name looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "devcert.toml";

/// Whole configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispenserConfig {
    /// `[server]`
    pub server: ServerConfig,
    /// `[certificate]`
    pub certificate: CertificateConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address, `127.0.0.1:8080` by default
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// CA location and issuance backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateConfig {
    /// Base path of the CA files, without suffix
    #[serde(default = "default_ca_path")]
    pub ca_path: PathBuf,
    /// Extension template; the built-in leaf profile when unset
    #[serde(default)]
    pub template_path: Option<PathBuf>,
    /// Toolchain, `native` unless set
    #[serde(default)]
    pub backend: Backend,
    /// `openssl` binary for the openssl backend
    #[serde(default = "default_openssl_path")]
    pub openssl_path: PathBuf,
    /// Per-command timeout of the openssl backend
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    /// Scratch directory for the openssl backend; system temp dir when unset
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            ca_path: default_ca_path(),
            template_path: None,
            backend: Backend::default(),
            openssl_path: default_openssl_path(),
            command_timeout_secs: default_command_timeout_secs(),
            scratch_dir: None,
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_ca_path() -> PathBuf {
    PathBuf::from("ca/rootCA")
}

fn default_openssl_path() -> PathBuf {
    PathBuf::from("openssl")
}

fn default_command_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

impl DispenserConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: DispenserConfig =
            toml::from_str(content).map_err(|e| AppError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Use `explicit` if given, otherwise the first existing default location,
    /// otherwise built-in defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            info!("Loading config from: {}", path.display());
            return Self::from_file(path);
        }

        let candidates = [
            Some(PathBuf::from(DEFAULT_CONFIG_FILE)),
            dirs::config_dir().map(|dir| dir.join("devcert-dispenser").join("config.toml")),
        ];
        for path in candidates.into_iter().flatten() {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::from_file(&path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Reject values no dispenser can start with
    pub fn validate(&self) -> Result<()> {
        if self.certificate.ca_path.as_os_str().is_empty() {
            return Err(AppError::Config("certificate.ca_path must not be empty".to_string()));
        }
        if self.certificate.command_timeout_secs == 0 {
            return Err(AppError::Config(
                "certificate.command_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.certificate.backend == Backend::Openssl
            && self.certificate.openssl_path.as_os_str().is_empty()
        {
            return Err(AppError::Config(
                "certificate.openssl_path is required for the openssl backend".to_string(),
            ));
        }
        Ok(())
    }

    /// `command_timeout_secs` as a [`Duration`]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.certificate.command_timeout_secs)
    }
}

//! CLI command definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Issue locally-trusted TLS certificates for development
#[derive(Parser)]
#[command(name = "devcert-dispenser")]
pub struct Cli {
    /// Configuration file (defaults to ./devcert.toml when present)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands
#[derive(Clone, Subcommand)]
pub enum Commands {
    /// Serve the download endpoints
    Serve,

    /// Issue one certificate and write it to disk
    ///
    /// The primary domain becomes the certificate's common name; any
    /// alternates are listed in its subject alternative names.
    Issue {
        /// Primary domain
        primary: String,

        /// Alternate domains
        alternates: Vec<String>,

        /// Output directory
        #[arg(long, short = 'o', default_value = ".")]
        out: PathBuf,

        /// Write cert.zip instead of cert.crt and cert.key
        #[arg(long)]
        zip: bool,
    },

    /// Create a self-signed development CA at the configured path
    InitCa {
        /// Common name of the CA certificate
        #[arg(long, default_value = "DevCert Dispenser Root CA")]
        common_name: String,

        /// Validity in days
        #[arg(long, default_value_t = 3650)]
        days: u32,
    },

    /// Print a JSON summary of a PEM or DER certificate
    Inspect {
        /// Certificate file
        file: PathBuf,
    },
}

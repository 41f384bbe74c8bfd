//! HTTP delivery layer and command line for the development certificate dispenser

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod routes;
pub mod state;

use devcert_dispenser::{summarize, CertificateAuthority, CertificateDispenser, ExtensionTemplate};
use tracing::info;

use crate::cli::{Cli, Commands};
use crate::config::DispenserConfig;
use crate::error::Result;
use crate::state::AppState;

/// Load the CA and extension template and assemble the dispenser.
///
/// A missing CA or a configured but missing template is fatal.
pub async fn build_dispenser(config: &DispenserConfig) -> Result<CertificateDispenser> {
    let certificate = &config.certificate;
    let authority = CertificateAuthority::load(&certificate.ca_path).await?;
    let template = match &certificate.template_path {
        Some(path) => ExtensionTemplate::load(path).await?,
        None => ExtensionTemplate::default(),
    };

    let mut builder = CertificateDispenser::builder(authority)
        .template(template)
        .backend(certificate.backend)
        .openssl_path(&certificate.openssl_path)
        .command_timeout(config.command_timeout());
    if let Some(dir) = &certificate.scratch_dir {
        builder = builder.scratch_dir(dir);
    }
    Ok(builder.build())
}

/// Bind and serve until Ctrl-C
pub async fn serve(config: &DispenserConfig) -> Result<()> {
    let dispenser = build_dispenser(config).await?;
    let backend = dispenser.toolchain_name();
    let app = routes::create_routes(AppState::new(dispenser));

    let listener = tokio::net::TcpListener::bind(config.server.bind).await?;
    info!("Listening on http://{} ({backend} backend)", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;
    Ok(())
}

/// Execute a parsed command line
pub async fn run(cli: Cli) -> Result<()> {
    let config = DispenserConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve => serve(&config).await,
        Commands::Issue {
            primary,
            alternates,
            out,
            zip,
        } => {
            let dispenser = build_dispenser(&config).await?;
            let package = dispenser.issue(&primary, &alternates).await?;
            if zip {
                tokio::fs::create_dir_all(&out).await?;
                let archive = out.join("cert.zip");
                tokio::fs::write(&archive, package.to_zip()?).await?;
                println!("{}", archive.display());
            } else {
                let (certificate, key) = package.write_to(&out).await?;
                println!("{}\n{}", certificate.display(), key.display());
            }
            Ok(())
        }
        Commands::InitCa { common_name, days } => {
            let authority =
                CertificateAuthority::create(&config.certificate.ca_path, &common_name, days).await?;
            println!("{}", authority.certificate_path().display());
            Ok(())
        }
        Commands::Inspect { file } => {
            let data = tokio::fs::read(&file).await?;
            let summary = summarize(&data)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
    }
}

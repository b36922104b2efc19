use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;

use pdf_mirror::{MirrorCommand, MirrorConfig, MirrorError, MirrorReport, PdfMirror};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = MirrorCommand::parse();

    // RUST_LOG wins over -q/-v
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(args.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(?args, "CLI arguments parsed");
    let config = args.to_config();

    match run(&config).await {
        Ok(report) => Ok(ExitCode::from(report.exit_code(config.fail_on_errors))),
        Err(e) => {
            eprintln!("{}", e);
            Ok(ExitCode::from(e.exit_code()))
        }
    }
}

async fn run(config: &MirrorConfig) -> Result<MirrorReport, MirrorError> {
    let mirror = PdfMirror::with_http(config.clone())?;
    mirror.run().await
}

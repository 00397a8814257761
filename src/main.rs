//! rss2epub CLI entrypoint

use clap::error::ErrorKind;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rss2epub::cli::Cli;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Bad arguments exit with 1; --help and --version exit normally
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
            _ => {
                let _ = e.print();
                std::process::exit(1);
            }
        },
    };

    if let Err(e) = cli.execute().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

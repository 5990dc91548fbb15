use clap::Parser;
use tracing_subscriber::EnvFilter;

use complyscan::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional; absence is not an error
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let code = cli.run().await?;
    std::process::exit(code);
}

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = rust_margin_cli::Cli::parse();
    rust_margin_cli::run(cli).await
}

use clap::Parser;

use storycut::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    storycut::logging::init();

    let cli = Cli::parse();
    if let Err(e) = cli::run(cli).await {
        let message = format!("{e:#}");
        tracing::error!(error = %message, "storycut failed");
        return Err(e);
    }
    Ok(())
}

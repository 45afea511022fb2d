mod address;
mod app;
mod count;
mod entity;
mod grep;
mod lastnode;
mod noderef;
mod pipeline;
mod sinks;
mod stats;
mod store;
mod utils;

use anyhow::Result;
use clap::Parser;

use app::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.wants_debug_log() {
        tracing::Level::DEBUG
    } else if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let start = std::time::Instant::now();
    app::run(cli)?;
    tracing::info!("Done in {:.2}s", start.elapsed().as_secs_f64());

    Ok(())
}

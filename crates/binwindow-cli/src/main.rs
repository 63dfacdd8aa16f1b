//! binwindow command-line entry point

mod cli;

use anyhow::Context;
use binwindow::WindowAnalyzer;
use clap::Parser;
use cli::Cli;
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(&cli).await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = cli.to_run_config().context("invalid arguments")?;
    debug!("Run configuration: {:?}", config);
    let analyzer = WindowAnalyzer::mysql(config);

    if cli.list_ranges {
        let listing = analyzer.list_ranges().await?;
        print!("{}", listing.render());
        return Ok(());
    }

    let report = analyzer.run().await?;
    let config = analyzer.config();
    report
        .write(config.format, config.output.as_deref())
        .context("failed to write report")?;
    if let Some(path) = &config.output {
        eprintln!("Report written to {}", path.display());
    }
    eprintln!("{}", report.summary());
    Ok(())
}

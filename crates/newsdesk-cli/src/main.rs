use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use newsdesk_core::SinkKind;

mod clean;
mod crawl;

#[derive(Debug, Parser)]
#[command(name = "newsdesk")]
#[command(about = "Concurrent news crawler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Crawl every configured source and write accepted articles to the sink.
    Crawl(CrawlArgs),
    /// Rewrite an article CSV as `title|url|category`, dropping short titles
    /// and repeated urls.
    Clean {
        input: PathBuf,
        /// Defaults to `<input>_cleaned.csv` next to the input.
        output: Option<PathBuf>,
    },
}

/// Flags that override the corresponding `NEWSDESK_*` settings.
#[derive(Debug, Default, clap::Args)]
pub(crate) struct CrawlArgs {
    /// Source configuration YAML.
    #[arg(long)]
    pub sources: Option<PathBuf>,
    /// `csv` or `kv`.
    #[arg(long)]
    pub sink: Option<SinkKind>,
    #[arg(long)]
    pub output: Option<PathBuf>,
    #[arg(long, value_parser = at_least_one())]
    pub max_articles: Option<usize>,
    #[arg(long, value_parser = at_least_one())]
    pub per_source: Option<usize>,
    #[arg(long)]
    pub deadline_secs: Option<u64>,
    /// Repeat the crawl until interrupted.
    #[arg(long)]
    pub continuous: bool,
    /// Minutes between runs in continuous mode.
    #[arg(long, requires = "continuous")]
    pub interval_minutes: Option<u64>,
}

/// Caps of zero are rejected, matching the `NEWSDESK_*` checks.
fn at_least_one() -> clap::builder::RangedU64ValueParser<usize> {
    clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = newsdesk_core::load_app_config()?;

    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Commands::Crawl(args) => {
            let shutdown = CancellationToken::new();
            let signal_token = shutdown.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                signal_token.cancel();
            });
            crawl::run_crawl(&config, &args, shutdown).await
        }
        Commands::Clean { input, output } => {
            clean::run_clean(&config, &input, output.as_deref()).await
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, stopping crawl");
}

#[cfg(test)]
mod tests;

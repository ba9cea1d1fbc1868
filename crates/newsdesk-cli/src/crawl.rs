//! `newsdesk crawl`: a single run, or repeated runs until interrupted.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use newsdesk_core::AppConfig;
use newsdesk_crawler::{
    open_sink, ContentAnalyzer, CrawlSettings, DisabledAnalyzer, OpenAiAnalyzer, Orchestrator,
    RunSummary,
};

use crate::CrawlArgs;

/// Load sources, build the pipeline and crawl.
///
/// In continuous mode a failed run is logged and retried after
/// `retry_delay_secs`; only configuration errors end the command.
///
/// # Errors
///
/// Returns an error if the sources file is invalid, a selector does not
/// parse, the analyzer cannot be built, or (single-run mode) the run fails.
pub(crate) async fn run_crawl(
    config: &AppConfig,
    args: &CrawlArgs,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let sources_path = args
        .sources
        .clone()
        .unwrap_or_else(|| config.sources_path.clone());
    let sources = newsdesk_core::load_sources(&sources_path)?.sources;
    tracing::info!(path = %sources_path.display(), sources = sources.len(), "sources loaded");

    let mut settings = CrawlSettings::from_app_config(config);
    apply_overrides(&mut settings, args);
    let orchestrator = Orchestrator::new(settings, sources, build_analyzer(config)?)?;

    if !args.continuous {
        let summary = run_once(config, args, &orchestrator, shutdown).await?;
        print!("{summary}");
        return Ok(());
    }

    let interval_minutes = args
        .interval_minutes
        .unwrap_or(config.crawl_interval_minutes);
    let interval = Duration::from_secs(interval_minutes.saturating_mul(60));
    let retry_delay = Duration::from_secs(config.retry_delay_secs);
    let mut runs = 0u64;

    while !shutdown.is_cancelled() {
        runs += 1;
        let pause = match run_once(config, args, &orchestrator, shutdown.clone()).await {
            Ok(summary) => {
                print!("{summary}");
                interval
            }
            Err(e) => {
                tracing::error!(run = runs, error = %e, "crawl run failed");
                retry_delay
            }
        };
        tracing::info!(run = runs, next_in_secs = pause.as_secs(), "waiting for next run");
        tokio::select! {
            () = shutdown.cancelled() => break,
            () = tokio::time::sleep(pause) => {}
        }
    }

    tracing::info!(runs, "continuous crawl stopped");
    Ok(())
}

/// The sink is reopened for every run so an append file picks up rows a
/// previous run wrote.
async fn run_once(
    config: &AppConfig,
    args: &CrawlArgs,
    orchestrator: &Orchestrator,
    shutdown: CancellationToken,
) -> anyhow::Result<RunSummary> {
    let kind = args.sink.unwrap_or(config.sink);
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| config.output_path.clone());
    let mut sink = open_sink(kind, &output, config.csv_delimiter).await?;
    tracing::info!(sink = %kind, path = %output.display(), "sink opened");

    Ok(orchestrator.run(sink.as_mut(), shutdown).await?)
}

pub(crate) fn apply_overrides(settings: &mut CrawlSettings, args: &CrawlArgs) {
    if let Some(max) = args.max_articles {
        settings.max_articles = max;
    }
    if let Some(per_source) = args.per_source {
        settings.articles_per_source = per_source;
    }
    if let Some(secs) = args.deadline_secs {
        settings.run_deadline = Duration::from_secs(secs);
    }
}

fn build_analyzer(config: &AppConfig) -> anyhow::Result<Arc<dyn ContentAnalyzer>> {
    match &config.ai {
        Some(ai) => {
            tracing::info!(endpoint = %ai.endpoint, model = %ai.model, "content analysis enabled");
            Ok(Arc::new(OpenAiAnalyzer::from_config(ai)?))
        }
        None => {
            tracing::info!("no content-analysis endpoint configured; extraction is structural-only");
            Ok(Arc::new(DisabledAnalyzer))
        }
    }
}

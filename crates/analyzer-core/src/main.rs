mod config;
mod ingest;
mod pipeline;
mod state;

use anyhow::Result;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;

use config::AnalyzerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let config = AnalyzerConfig::load()?;
    let stores = state::load_or_bootstrap(&config.state)?;

    info!(
        input = %config
            .input_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "stdin".to_string()),
        shards = config.pipeline.shards,
        flush_interval_secs = config.pipeline.flush_interval_secs,
        "flowsentry started"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut run = tokio::spawn(pipeline::run(config.clone(), stores.clone(), shutdown_rx));

    let summary = tokio::select! {
        _ = signal::ctrl_c() => {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
            (&mut run).await??
        }
        finished = &mut run => finished??,
    };

    state::persist(&config.state, &stores)?;
    info!(
        records = summary.records,
        parse_errors = summary.parse_errors,
        out_of_order = summary.out_of_order,
        windows = summary.windows,
        findings = summary.findings,
        alerts = summary.alerts,
        "flowsentry stopped"
    );
    Ok(())
}

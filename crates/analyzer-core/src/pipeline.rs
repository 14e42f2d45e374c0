//! Staged analytics pipeline over bounded channels:
//! reader -> router -> shard window workers -> detector fan-out ->
//! aggregator -> sink.
//!
//! Every channel is bounded, so `send().await` backpressures ingestion
//! when a downstream stage saturates; nothing is dropped. Shutdown is a
//! watch signal into the reader; channel closure cascades through the
//! stages and each one drains before returning its counters.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use detection::{
    apply_record_baselines, default_detectors, is_novelty_recording_spec,
    record_window_identifiers, Alert, Detector, Finding, FindingAggregator, FlowRecord,
    GroupingEngine, GroupingSpec, ScoringConfig, StoreHandles, Window,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::AnalyzerConfig;
use crate::ingest;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub records: u64,
    pub parse_errors: u64,
    pub out_of_order: u64,
    pub windows: u64,
    pub findings: u64,
    pub alerts: u64,
}

struct Routed {
    spec_idx: usize,
    record: FlowRecord,
}

pub async fn run(
    config: AnalyzerConfig,
    stores: StoreHandles,
    shutdown: watch::Receiver<bool>,
) -> Result<RunSummary> {
    match config.input_path.clone() {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("failed opening input {}", path.display()))?;
            run_with_reader(config, stores, shutdown, BufReader::new(file)).await
        }
        None => run_with_reader(config, stores, shutdown, BufReader::new(tokio::io::stdin())).await,
    }
}

pub async fn run_with_reader<R>(
    config: AnalyzerConfig,
    stores: StoreHandles,
    shutdown: watch::Receiver<bool>,
    reader: R,
) -> Result<RunSummary>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let detectors = default_detectors(&config.detection);
    // Union of detector subscriptions; subscribers[i] holds the indices
    // of the detectors consuming specs[i].
    let mut specs: Vec<GroupingSpec> = Vec::new();
    let mut subscribers: Vec<Vec<usize>> = Vec::new();
    for (idx, detector) in detectors.iter().enumerate() {
        for spec in detector.subscriptions() {
            match specs.iter().position(|s| *s == spec) {
                Some(pos) => subscribers[pos].push(idx),
                None => {
                    specs.push(spec);
                    subscribers.push(vec![idx]);
                }
            }
        }
    }

    let capacity = config.pipeline.channel_capacity;
    let shards = config.pipeline.shards;

    let (record_tx, record_rx) = mpsc::channel::<FlowRecord>(capacity);
    let (window_tx, window_rx) = mpsc::channel::<(usize, Arc<Window>)>(capacity);
    let (finding_tx, finding_rx) = mpsc::channel::<Finding>(capacity);
    let (alert_tx, alert_rx) = mpsc::channel::<Alert>(capacity);

    let mut shard_txs = Vec::with_capacity(shards);
    let mut shard_handles = Vec::with_capacity(shards);
    for _ in 0..shards {
        let (tx, rx) = mpsc::channel::<Routed>(capacity);
        shard_txs.push(tx);
        shard_handles.push(tokio::spawn(shard_stage(
            rx,
            window_tx.clone(),
            specs.clone(),
            config.detection.reorder_tolerance_secs,
        )));
    }
    drop(window_tx);

    let reader_handle = tokio::spawn(read_stage(reader, record_tx, shutdown));
    let router_handle = tokio::spawn(route_stage(
        record_rx,
        shard_txs,
        stores.clone(),
        specs,
        config.detection.reorder_tolerance_secs,
    ));
    let fanout_handle = tokio::spawn(fanout_stage(
        window_rx,
        finding_tx,
        detectors,
        subscribers,
        stores.clone(),
    ));
    let aggregate_handle = tokio::spawn(aggregate_stage(
        finding_rx,
        alert_tx,
        config.scoring.clone(),
        config.pipeline.flush_interval_secs,
    ));
    let sink_handle = tokio::spawn(sink_stage(alert_rx));

    let parse_errors = reader_handle.await?;
    let (records, out_of_order) = router_handle.await?;
    for handle in shard_handles {
        handle.await?;
    }
    let (windows, findings) = fanout_handle.await?;
    aggregate_handle.await?;
    let alerts = sink_handle.await?;

    Ok(RunSummary {
        records,
        parse_errors,
        out_of_order,
        windows,
        findings,
        alerts,
    })
}

async fn read_stage<R>(
    reader: R,
    records: mpsc::Sender<FlowRecord>,
    mut shutdown: watch::Receiver<bool>,
) -> u64
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no = 0u64;
    let mut parse_errors = 0u64;
    loop {
        if *shutdown.borrow() {
            info!("ingest stopping on shutdown signal");
            break;
        }
        let next = tokio::select! {
            changed = shutdown.changed() => match changed {
                Ok(()) => continue,
                // Shutdown side dropped without signaling; plain reads
                // from here on.
                Err(_) => lines.next_line().await,
            },
            next = lines.next_line() => next,
        };
        match next {
            Ok(Some(line)) => {
                line_no += 1;
                match ingest::parse_line(&line) {
                    None => {}
                    Some(Ok(record)) => {
                        if records.send(record).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(err)) => {
                        parse_errors += 1;
                        debug!(line = line_no, error = %err, "malformed flow record skipped");
                    }
                }
            }
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "input read failed");
                break;
            }
        }
    }
    parse_errors
}

/// Validates ordering, applies the per-record baseline updates (single
/// writer path per dimension key), and forwards the record to the shard
/// owning each grouping's key.
async fn route_stage(
    mut records: mpsc::Receiver<FlowRecord>,
    shard_txs: Vec<mpsc::Sender<Routed>>,
    stores: StoreHandles,
    specs: Vec<GroupingSpec>,
    reorder_tolerance_secs: i64,
) -> (u64, u64) {
    let mut accepted = 0u64;
    let mut rejected = 0u64;
    let mut max_observed_ts = i64::MIN;
    while let Some(record) = records.recv().await {
        let horizon = max_observed_ts.saturating_sub(reorder_tolerance_secs);
        if record.start_unix < horizon {
            rejected += 1;
            debug!(
                ts = record.start_unix,
                horizon, "record behind the reorder horizon; skipped"
            );
            continue;
        }
        max_observed_ts = max_observed_ts.max(record.start_unix);
        accepted += 1;

        stores.novelty.observe_clock(record.start_unix);
        apply_record_baselines(&stores, &record);

        for (spec_idx, spec) in specs.iter().enumerate() {
            let key = spec.key.project(&record);
            let shard = shard_for(spec_idx, &key, shard_txs.len());
            let routed = Routed {
                spec_idx,
                record: record.clone(),
            };
            if shard_txs[shard].send(routed).await.is_err() {
                return (accepted, rejected);
            }
        }
    }
    (accepted, rejected)
}

fn shard_for(spec_idx: usize, key: &impl Hash, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    spec_idx.hash(&mut hasher);
    key.hash(&mut hasher);
    (hasher.finish() % shards as u64) as usize
}

/// One shard owns its grouping engines exclusively; every key of every
/// spec is routed to exactly one shard, so windows have a single writer.
async fn shard_stage(
    mut routed: mpsc::Receiver<Routed>,
    windows: mpsc::Sender<(usize, Arc<Window>)>,
    specs: Vec<GroupingSpec>,
    reorder_tolerance_secs: i64,
) {
    let mut engines: Vec<GroupingEngine> = specs
        .iter()
        .map(|spec| GroupingEngine::new(*spec, reorder_tolerance_secs))
        .collect();

    while let Some(Routed { spec_idx, record }) = routed.recv().await {
        // The router's shared horizon check is at least as strict as
        // this engine's own, so ingest cannot fail here.
        if let Ok(Some(window)) = engines[spec_idx].ingest(&record) {
            if windows.send((spec_idx, Arc::new(window))).await.is_err() {
                return;
            }
        }
    }

    for (spec_idx, engine) in engines.iter_mut().enumerate() {
        for window in engine.drain() {
            if windows.send((spec_idx, Arc::new(window))).await.is_err() {
                return;
            }
        }
    }
}

/// Runs every subscribed detector over each flushed window, each in its
/// own task, then records the window's destination identifiers for the
/// novelty grouping. Detectors only read the stores, so they can run in
/// parallel over the same window.
async fn fanout_stage(
    mut windows: mpsc::Receiver<(usize, Arc<Window>)>,
    findings: mpsc::Sender<Finding>,
    detectors: Vec<Box<dyn Detector>>,
    subscribers: Vec<Vec<usize>>,
    stores: StoreHandles,
) -> (u64, u64) {
    let detectors: Vec<Arc<Mutex<Box<dyn Detector>>>> = detectors
        .into_iter()
        .map(|d| Arc::new(Mutex::new(d)))
        .collect();

    let mut window_count = 0u64;
    let mut finding_count = 0u64;
    while let Some((spec_idx, window)) = windows.recv().await {
        window_count += 1;

        let mut tasks: JoinSet<Vec<Finding>> = JoinSet::new();
        for &det_idx in &subscribers[spec_idx] {
            let detector = detectors[det_idx].clone();
            let window = window.clone();
            let stores = stores.clone();
            tasks.spawn(async move { detector.lock().await.detect(&window, &stores) });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(batch) => {
                    for finding in batch {
                        finding_count += 1;
                        if findings.send(finding).await.is_err() {
                            return (window_count, finding_count);
                        }
                    }
                }
                Err(err) => warn!(error = %err, "detector task join failed"),
            }
        }

        if is_novelty_recording_spec(window.spec()) {
            record_window_identifiers(&stores, &window);
        }
    }
    (window_count, finding_count)
}

async fn aggregate_stage(
    mut findings: mpsc::Receiver<Finding>,
    alerts: mpsc::Sender<Alert>,
    config: ScoringConfig,
    flush_interval_secs: u64,
) {
    let mut aggregator = FindingAggregator::new(config);
    let mut ticker = tokio::time::interval(Duration::from_secs(flush_interval_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            maybe = findings.recv() => match maybe {
                Some(finding) => aggregator.ingest(finding),
                None => break,
            },
            _ = ticker.tick() => {
                for alert in aggregator.flush() {
                    if alerts.send(alert).await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    for alert in aggregator.flush() {
        if alerts.send(alert).await.is_err() {
            return;
        }
    }
}

/// JSON-lines alerts on stdout, one structured log line each.
async fn sink_stage(mut alerts: mpsc::Receiver<Alert>) -> u64 {
    let mut stdout = tokio::io::stdout();
    let mut emitted = 0u64;
    while let Some(alert) = alerts.recv().await {
        emitted += 1;
        info!(
            entity = %alert.entity,
            composite_score = alert.composite_score,
            detectors = alert.contributing.len(),
            "alert emitted"
        );
        match serde_json::to_string(&alert) {
            Ok(mut line) => {
                line.push('\n');
                if let Err(err) = stdout.write_all(line.as_bytes()).await {
                    warn!(error = %err, "alert write failed");
                }
            }
            Err(err) => warn!(error = %err, "alert serialization failed"),
        }
    }
    if let Err(err) = stdout.flush().await {
        warn!(error = %err, "stdout flush failed");
    }
    emitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use detection::Protocol;

    fn flow(src: &str, dst: &str, dst_port: u16, start_unix: i64) -> FlowRecord {
        FlowRecord {
            src_ip: src.parse().unwrap(),
            dst_ip: dst.parse().unwrap(),
            src_port: 50_000,
            dst_port,
            protocol: Protocol::Tcp,
            start_unix,
            duration_ms: 50,
            bytes_in: 500,
            bytes_out: 500,
            domain: None,
        }
    }

    fn ndjson(records: &[FlowRecord]) -> Vec<u8> {
        let mut out = Vec::new();
        for record in records {
            out.extend_from_slice(serde_json::to_string(record).unwrap().as_bytes());
            out.push(b'\n');
        }
        out
    }

    async fn run_over(config: AnalyzerConfig, input: Vec<u8>) -> RunSummary {
        let stores = StoreHandles::in_memory();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        run_with_reader(
            config,
            stores,
            shutdown_rx,
            BufReader::new(std::io::Cursor::new(input)),
        )
        .await
        .expect("pipeline run")
    }

    #[tokio::test]
    async fn scan_burst_yields_one_alert_end_to_end() {
        let mut config = AnalyzerConfig::default();
        // A lone scanning finding (severity < 1.0) should clear it.
        config.scoring.alert_score_threshold = 0.5;

        let records: Vec<FlowRecord> = (0..25)
            .map(|i| flow("10.0.0.5", &format!("10.0.1.{}", i + 1), 445, (i as i64) * 7))
            .collect();
        let mut input = ndjson(&records);
        input.extend_from_slice(b"{broken line\n");

        let summary = run_over(config, input).await;
        assert_eq!(summary.records, 25);
        assert_eq!(summary.parse_errors, 1);
        assert_eq!(summary.out_of_order, 0);
        assert!(summary.findings >= 1);
        assert_eq!(summary.alerts, 1);
    }

    #[tokio::test]
    async fn tiny_channels_still_drain_everything() {
        let mut config = AnalyzerConfig::default();
        config.scoring.alert_score_threshold = 0.5;
        config.pipeline.channel_capacity = 2;
        config.pipeline.shards = 2;

        let records: Vec<FlowRecord> = (0..25)
            .map(|i| flow("10.0.0.5", &format!("10.0.1.{}", i + 1), 445, (i as i64) * 7))
            .collect();

        let summary = run_over(config, ndjson(&records)).await;
        assert_eq!(summary.records, 25);
        assert_eq!(summary.alerts, 1);
    }

    #[tokio::test]
    async fn out_of_order_records_are_counted_not_ingested() {
        let config = AnalyzerConfig::default();
        let records = vec![
            flow("10.0.0.5", "10.0.1.1", 445, 10_000),
            flow("10.0.0.5", "10.0.1.2", 445, 9_000),
        ];

        let summary = run_over(config, ndjson(&records)).await;
        assert_eq!(summary.records, 1);
        assert_eq!(summary.out_of_order, 1);
    }

    #[tokio::test]
    async fn extreme_timestamps_route_without_wrapping() {
        let config = AnalyzerConfig::default();
        let records = vec![
            flow("10.0.0.5", "10.0.1.1", 445, i64::MIN),
            flow("10.0.0.5", "10.0.1.2", 445, 0),
        ];

        let summary = run_over(config, ndjson(&records)).await;
        assert_eq!(summary.records, 2);
        assert_eq!(summary.out_of_order, 0);
    }

    #[tokio::test]
    async fn shutdown_signal_stops_ingest_and_drains() {
        let mut config = AnalyzerConfig::default();
        config.scoring.alert_score_threshold = 0.5;

        let records: Vec<FlowRecord> = (0..25)
            .map(|i| flow("10.0.0.5", &format!("10.0.1.{}", i + 1), 445, (i as i64) * 7))
            .collect();

        let stores = StoreHandles::in_memory();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        // Signalled before the run starts: the reader must exit without
        // consuming input, and every stage must still drain cleanly.
        shutdown_tx.send(true).expect("receiver alive");

        let summary = run_with_reader(
            config,
            stores,
            shutdown_rx,
            BufReader::new(std::io::Cursor::new(ndjson(&records))),
        )
        .await
        .expect("pipeline run");
        assert_eq!(summary.records, 0);
        assert_eq!(summary.alerts, 0);
    }
}

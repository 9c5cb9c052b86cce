use std::time::Duration;

use crate::collector::Collector;
use crate::config::XappConfig;
use crate::error::{Result, XappError};
use crate::sdk::RicSdk;
use crate::subscriber::TelemetrySubscriber;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionSummary {
    pub nodes: usize,
    pub subscriptions: usize,
    pub mac: usize,
    pub rlc: usize,
    pub pdcp: usize,
}

/// Subscribes on every connected node, waits out the collection window and
/// tears all subscriptions down. Samples stay queued in `collector`.
pub async fn collect(sdk: &dyn RicSdk, cfg: &XappConfig, collector: &Collector) -> Result<CollectionSummary> {
    let interval = cfg.interval()?;

    let nodes = sdk.conn_e2_nodes();
    if nodes.is_empty() {
        return Err(XappError::NoE2Nodes);
    }
    for (i, node) in nodes.iter().enumerate() {
        tracing::info!(
            "global E2 node [{}]: PLMN MCC = {}, MNC = {}",
            i,
            node.id.plmn.mcc,
            node.id.plmn.mnc
        );
    }

    let mut subscriber = TelemetrySubscriber::new(sdk);
    subscriber
        .subscribe_all(&nodes, &cfg.families, interval, cfg.registration_gap(), collector)
        .await?;
    let subscriptions = subscriber.handles().len();

    run_window(cfg.runtime(), Duration::from_secs(cfg.progress_every_secs)).await;

    subscriber.unsubscribe_all();
    tracing::info!("collection finished after {:?}", cfg.runtime());

    let summary = CollectionSummary {
        nodes: nodes.len(),
        subscriptions,
        mac: collector.mac.len(),
        rlc: collector.rlc.len(),
        pdcp: collector.pdcp.len(),
    };
    tracing::info!("MAC queue size: {} samples", summary.mac);
    tracing::info!("RLC queue size: {} samples", summary.rlc);
    tracing::info!("PDCP queue size: {} samples", summary.pdcp);
    Ok(summary)
}

async fn run_window(runtime: Duration, progress_every: Duration) {
    tracing::info!("xApp will run for {:?}...", runtime);
    let step = if progress_every.is_zero() { runtime } else { progress_every };
    let mut elapsed = Duration::ZERO;
    while elapsed < runtime {
        let chunk = step.min(runtime - elapsed);
        tokio::time::sleep(chunk).await;
        elapsed += chunk;
        if elapsed < runtime {
            tracing::info!("running... {:?}/{:?}", elapsed, runtime);
        }
    }
}

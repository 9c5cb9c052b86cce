use anyhow::Context;
use std::sync::Arc;

use rssi_xapp::{collector::Collector, config::XappConfig, pipeline, sim::SimulatedRic, xapp};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cfg = XappConfig::from_env().context("failed to load xApp configuration")?;
    tracing::info!("output directory: {}", cfg.output_dir.display());

    let ric = SimulatedRic::new(cfg.sim.clone());
    let collector = Arc::new(Collector::new());

    let summary = xapp::collect(&ric, &cfg, &collector)
        .await
        .context("telemetry collection failed")?;
    tracing::info!(
        "{} subscriptions on {} node(s) torn down",
        summary.subscriptions,
        summary.nodes
    );

    let mac_samples = collector.mac.drain();
    if mac_samples.is_empty() {
        tracing::error!("no MAC data collected, skipping model training");
        return Ok(());
    }
    tracing::info!("collected {} MAC samples", mac_samples.len());

    // CPU-bound; keep it off the async workers
    let outcome = tokio::task::spawn_blocking(move || pipeline::run(&mac_samples, &cfg))
        .await
        .context("learning task panicked")?;

    match outcome {
        Ok(o) => {
            tracing::info!(
                "pipeline complete: {} rows, {} features, test MSE = {:.6}",
                o.dataset_rows,
                o.retained_features.len(),
                o.test_mse
            );
            tracing::info!("model ready for inference in {}", o.artifacts.dir.display());
            Ok(())
        }
        Err(e) if e.is_data_shortfall() => {
            tracing::error!("ERROR: {}", e);
            Ok(())
        }
        Err(e) => Err(e).context("learning pipeline failed"),
    }
}

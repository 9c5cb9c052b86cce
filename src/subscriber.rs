use std::{sync::Arc, time::Duration};

use crate::collector::{Collector, MacCallback, PdcpCallback, RlcCallback};
use crate::error::Result;
use crate::sdk::{RicSdk, SubscriptionHandle};
use crate::types::{E2Node, Interval, StatFamily};

/// Registers one periodic report per (family, node) and tears them down together.
pub struct TelemetrySubscriber<'a> {
    sdk: &'a dyn RicSdk,
    handles: Vec<SubscriptionHandle>,
}

impl<'a> TelemetrySubscriber<'a> {
    pub fn new(sdk: &'a dyn RicSdk) -> Self {
        Self { sdk, handles: Vec::new() }
    }

    pub fn handles(&self) -> &[SubscriptionHandle] {
        &self.handles
    }

    /// Families are registered in the given order, every node per family. On
    /// failure the handles already registered are removed before returning.
    pub async fn subscribe_all(
        &mut self,
        nodes: &[E2Node],
        families: &[StatFamily],
        interval: Interval,
        gap: Duration,
        collector: &Collector,
    ) -> Result<()> {
        for &family in families {
            for node in nodes {
                let res = match family {
                    StatFamily::Mac => self.sdk.report_mac_sm(
                        &node.id,
                        interval,
                        Arc::new(MacCallback::new(collector.mac.clone())),
                    ),
                    StatFamily::Rlc => self.sdk.report_rlc_sm(
                        &node.id,
                        interval,
                        Arc::new(RlcCallback::new(collector.rlc.clone())),
                    ),
                    StatFamily::Pdcp => self.sdk.report_pdcp_sm(
                        &node.id,
                        interval,
                        Arc::new(PdcpCallback::new(collector.pdcp.clone())),
                    ),
                };
                match res {
                    Ok(handle) => self.handles.push(handle),
                    Err(e) => {
                        tracing::error!("{}", e);
                        self.unsubscribe_all();
                        return Err(e);
                    }
                }
                if !gap.is_zero() {
                    tokio::time::sleep(gap).await;
                }
                tracing::info!(
                    "started {} reporting on [{}] with {}ms interval",
                    family,
                    node.id,
                    interval.as_millis()
                );
            }
        }
        Ok(())
    }

    /// Removes every registered subscription; returns how many were removed.
    pub fn unsubscribe_all(&mut self) -> usize {
        let mut removed = 0;
        for handle in self.handles.drain(..) {
            match self.sdk.rm_report(handle) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!("failed to remove {}: {}", handle, e),
            }
        }
        removed
    }
}

//! Seam between the xApp and the RIC SDK that owns E2 connections.

use std::{fmt, sync::Arc};

use crate::error::Result;
use crate::types::{
    E2Node, GlobalE2NodeId, Interval, MacIndication, PdcpIndication, RlcIndication, StatFamily,
};

/// Receives indications for one subscription. Called from SDK-owned tasks.
pub trait IndicationHandler<M>: Send + Sync {
    fn handle(&self, ind: &M);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub id: u64,
    pub family: StatFamily,
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.family, self.id)
    }
}

pub trait RicSdk: Send + Sync {
    /// E2 nodes currently connected to the RIC.
    fn conn_e2_nodes(&self) -> Vec<E2Node>;

    fn report_mac_sm(
        &self,
        node: &GlobalE2NodeId,
        interval: Interval,
        cb: Arc<dyn IndicationHandler<MacIndication>>,
    ) -> Result<SubscriptionHandle>;

    fn report_rlc_sm(
        &self,
        node: &GlobalE2NodeId,
        interval: Interval,
        cb: Arc<dyn IndicationHandler<RlcIndication>>,
    ) -> Result<SubscriptionHandle>;

    fn report_pdcp_sm(
        &self,
        node: &GlobalE2NodeId,
        interval: Interval,
        cb: Arc<dyn IndicationHandler<PdcpIndication>>,
    ) -> Result<SubscriptionHandle>;

    /// Stops a subscription. No callback for it runs after this returns.
    fn rm_report(&self, handle: SubscriptionHandle) -> Result<()>;
}

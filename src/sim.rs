//! In-process RIC with simulated E2 nodes.
//!
//! Each node carries one attached UE on one bearer. Radio conditions follow a
//! seeded random walk so the next RSSI depends on the current one.

use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{SystemTime, UNIX_EPOCH},
};
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::error::{Result, XappError};
use crate::sdk::{IndicationHandler, RicSdk, SubscriptionHandle};
use crate::types::{
    E2Node, GlobalE2NodeId, Interval, MacIndication, MacUeStats, PdcpIndication, PdcpRbStats, Plmn,
    RlcIndication, RlcRbStats, StatFamily,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub nodes: usize,
    pub seed: u64,
    /// Share of reports emitted with no UE/bearer record, in [0, 1].
    pub empty_report_ratio: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            nodes: 1,
            seed: 7,
            empty_report_ratio: 0.02,
        }
    }
}

fn now_us() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

// ---------- Radio model ----------

/// Shared per-UE channel state; MAC, RLC and PDCP generators draw from it.
struct UeChannel {
    rng: StdRng,
    rnti: u32,
    ul_rssi: f64,
    dl_tbs: u64,
    ul_tbs: u64,
    tx_bytes: u64,
    rx_bytes: u64,
    tx_pkts: u64,
    rx_pkts: u64,
}

impl UeChannel {
    fn new(seed: u64, rnti: u32) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            rnti,
            ul_rssi: -60.0,
            dl_tbs: 0,
            ul_tbs: 0,
            tx_bytes: 0,
            rx_bytes: 0,
            tx_pkts: 0,
            rx_pkts: 0,
        }
    }

    fn emit_empty(&mut self, ratio: f64) -> bool {
        ratio > 0.0 && self.rng.gen_bool(ratio.min(1.0))
    }

    fn step(&mut self) {
        // mean-reverting walk around -60 dBFS
        let drift = (-60.0 - self.ul_rssi) * 0.05;
        self.ul_rssi = (self.ul_rssi + drift + self.rng.gen_range(-1.0..1.0)).clamp(-100.0, -20.0);
    }

    fn mac_stats(&mut self) -> MacUeStats {
        self.step();
        let snr = (self.ul_rssi + 85.0 + self.rng.gen_range(-0.5..0.5)).max(0.0);
        let cqi = ((snr / 2.0) as u8).clamp(1, 15);
        let mcs = ((snr * 0.9) as u8).min(28);
        let prb = self.rng.gen_range(5..50u32);
        let dl_tbs = prb as u64 * (mcs as u64 + 1) * 12;
        let ul_tbs = dl_tbs / 3;
        self.dl_tbs += dl_tbs;
        self.ul_tbs += ul_tbs;
        let bler = (0.1 - snr * 0.003).max(0.0) + self.rng.gen_range(0.0..0.01);

        MacUeStats {
            rnti: self.rnti,
            phr: (40.0 + (self.ul_rssi + 60.0) * 0.5) as i32,
            dl_aggr_tbs: self.dl_tbs,
            ul_aggr_tbs: self.ul_tbs,
            dl_aggr_prb: prb,
            wb_cqi: cqi,
            pusch_snr: snr as f32,
            pucch_snr: (snr - 3.0 + self.rng.gen_range(-0.5..0.5)) as f32,
            ul_rssi: self.ul_rssi as f32,
            dl_bler: bler as f32,
            ul_bler: (bler * 0.8) as f32,
            dl_mcs1: mcs,
            ul_mcs1: mcs.saturating_sub(2),
        }
    }

    fn traffic(&mut self) -> (u64, u64, u64, u64) {
        let tx = self.rng.gen_range(0..3u64);
        let rx = self.rng.gen_range(0..2u64);
        self.tx_pkts += tx;
        self.rx_pkts += rx;
        self.tx_bytes += tx * 1400;
        self.rx_bytes += rx * 1400;
        (self.tx_pkts, self.tx_bytes, self.rx_pkts, self.rx_bytes)
    }

    fn rlc_stats(&mut self) -> RlcRbStats {
        let (tx_pkts, tx_bytes, rx_pkts, rx_bytes) = self.traffic();
        let backlog = self.rng.gen_range(0..4u32);
        RlcRbStats {
            rnti: self.rnti,
            rbid: 1,
            mode: 0,
            txpdu_pkts: tx_pkts as u32,
            txpdu_bytes: (tx_bytes + tx_pkts * 2) as u32,
            rxpdu_pkts: rx_pkts as u32,
            rxpdu_bytes: (rx_bytes + rx_pkts * 2) as u32,
            txsdu_pkts: tx_pkts as u32,
            txsdu_bytes: tx_bytes as u32,
            rxsdu_pkts: rx_pkts as u32,
            rxsdu_bytes: rx_bytes as u32,
            txbuf_occ_bytes: backlog * 1400,
            txbuf_occ_pkts: backlog,
            rxbuf_occ_bytes: 0,
            rxbuf_occ_pkts: 0,
        }
    }

    fn pdcp_stats(&mut self) -> PdcpRbStats {
        let (tx_pkts, tx_bytes, rx_pkts, rx_bytes) = self.traffic();
        PdcpRbStats {
            rnti: self.rnti,
            rbid: 1,
            txpdu_pkts: tx_pkts as u32,
            txpdu_bytes: tx_bytes as u32,
            rxpdu_pkts: rx_pkts as u32,
            rxpdu_bytes: rx_bytes as u32,
        }
    }
}

// ---------- RIC ----------

pub struct SimulatedRic {
    nodes: Vec<E2Node>,
    cfg: SimConfig,
    channels: HashMap<GlobalE2NodeId, Arc<Mutex<UeChannel>>>,
    next_id: AtomicU64,
    tasks: Mutex<HashMap<u64, Subscription>>,
}

/// A running report task. Deliveries happen with `live` held, so clearing it
/// under the lock waits out any callback already in progress.
struct Subscription {
    task: JoinHandle<()>,
    live: Arc<Mutex<bool>>,
}

impl Subscription {
    fn stop(self) {
        *self.live.lock() = false;
        self.task.abort();
    }
}

impl SimulatedRic {
    pub fn new(cfg: SimConfig) -> Self {
        let plmn = Plmn { mcc: 208, mnc: 92, mnc_digit_len: 2 };
        let nodes: Vec<E2Node> = (0..cfg.nodes)
            .map(|i| E2Node { id: GlobalE2NodeId { plmn, nb_id: i as u32 + 1 } })
            .collect();
        let channels = nodes
            .iter()
            .map(|n| {
                let seed = cfg.seed ^ (n.id.nb_id as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
                let rnti = 0x4600 + n.id.nb_id;
                (n.id, Arc::new(Mutex::new(UeChannel::new(seed, rnti))))
            })
            .collect();

        Self {
            nodes,
            cfg,
            channels,
            next_id: AtomicU64::new(1),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn active_subscriptions(&self) -> usize {
        self.tasks.lock().len()
    }

    fn spawn_report<M, F>(
        &self,
        family: StatFamily,
        node: &GlobalE2NodeId,
        interval: Interval,
        cb: Arc<dyn IndicationHandler<M>>,
        mut make: F,
    ) -> Result<SubscriptionHandle>
    where
        M: Send + 'static,
        F: FnMut(&mut UeChannel, bool) -> M + Send + 'static,
    {
        let subscribe_err = |reason: String| XappError::Subscribe {
            family,
            node: node.to_string(),
            reason,
        };
        let channel = self
            .channels
            .get(node)
            .cloned()
            .ok_or_else(|| subscribe_err("node not connected".into()))?;
        let rt = tokio::runtime::Handle::try_current().map_err(|e| subscribe_err(e.to_string()))?;

        let empty_ratio = self.cfg.empty_report_ratio;
        let live = Arc::new(Mutex::new(true));
        let gate = live.clone();
        let task = rt.spawn(async move {
            let mut ticker = tokio::time::interval(interval.as_duration());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let live = gate.lock();
                if !*live {
                    break;
                }
                let ind = {
                    let mut ch = channel.lock();
                    let empty = ch.emit_empty(empty_ratio);
                    make(&mut *ch, empty)
                };
                cb.handle(&ind);
                drop(live);
            }
        });

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.tasks.lock().insert(id, Subscription { task, live });
        tracing::debug!("sim: {} subscription #{} on [{}] every {}ms", family, id, node, interval.as_millis());
        Ok(SubscriptionHandle { id, family })
    }
}

impl RicSdk for SimulatedRic {
    fn conn_e2_nodes(&self) -> Vec<E2Node> {
        self.nodes.clone()
    }

    fn report_mac_sm(
        &self,
        node: &GlobalE2NodeId,
        interval: Interval,
        cb: Arc<dyn IndicationHandler<MacIndication>>,
    ) -> Result<SubscriptionHandle> {
        self.spawn_report(StatFamily::Mac, node, interval, cb, |ch, empty| MacIndication {
            tstamp: now_us(),
            ue_stats: if empty { vec![] } else { vec![ch.mac_stats()] },
        })
    }

    fn report_rlc_sm(
        &self,
        node: &GlobalE2NodeId,
        interval: Interval,
        cb: Arc<dyn IndicationHandler<RlcIndication>>,
    ) -> Result<SubscriptionHandle> {
        self.spawn_report(StatFamily::Rlc, node, interval, cb, |ch, empty| RlcIndication {
            tstamp: now_us(),
            rb_stats: if empty { vec![] } else { vec![ch.rlc_stats()] },
        })
    }

    fn report_pdcp_sm(
        &self,
        node: &GlobalE2NodeId,
        interval: Interval,
        cb: Arc<dyn IndicationHandler<PdcpIndication>>,
    ) -> Result<SubscriptionHandle> {
        self.spawn_report(StatFamily::Pdcp, node, interval, cb, |ch, empty| PdcpIndication {
            tstamp: now_us(),
            rb_stats: if empty { vec![] } else { vec![ch.pdcp_stats()] },
        })
    }

    /// Returns once no callback of this subscription is running or can start.
    fn rm_report(&self, handle: SubscriptionHandle) -> Result<()> {
        let sub = self
            .tasks
            .lock()
            .remove(&handle.id)
            .ok_or(XappError::UnknownSubscription(handle.id))?;
        sub.stop();
        Ok(())
    }
}

impl Drop for SimulatedRic {
    fn drop(&mut self) {
        for (_, sub) in self.tasks.lock().drain() {
            sub.stop();
        }
    }
}

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use crate::sdk::IndicationHandler;
use crate::types::{MacIndication, PdcpIndication, RlcIndication, StatFamily};

// ---------- Sample ----------

/// One flattened statistics record taken from the first entity of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub family: StatFamily,
    /// Node timestamp of the report, in microseconds.
    pub timestamp: f64,
    pub fields: BTreeMap<String, f64>,
}

impl Sample {
    pub fn new(family: StatFamily, timestamp: f64) -> Self {
        Self {
            family,
            timestamp,
            fields: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        if name == "timestamp" {
            return Some(self.timestamp);
        }
        self.fields.get(name).copied()
    }

    pub fn has(&self, name: &str) -> bool {
        name == "timestamp" || self.fields.contains_key(name)
    }
}

// ---------- Queues ----------

/// Unbounded FIFO written by SDK callbacks and drained once by the main flow.
#[derive(Debug, Default)]
pub struct SampleQueue {
    inner: Mutex<VecDeque<Sample>>,
}

impl SampleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, sample: Sample) {
        self.inner.lock().push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Removes every queued sample, oldest first.
    pub fn drain(&self) -> Vec<Sample> {
        self.inner.lock().drain(..).collect()
    }
}

#[derive(Debug, Default)]
pub struct Collector {
    pub mac: Arc<SampleQueue>,
    pub rlc: Arc<SampleQueue>,
    pub pdcp: Arc<SampleQueue>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self, family: StatFamily) -> &Arc<SampleQueue> {
        match family {
            StatFamily::Mac => &self.mac,
            StatFamily::Rlc => &self.rlc,
            StatFamily::Pdcp => &self.pdcp,
        }
    }
}

fn now_us() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as f64 / 1000.0)
        .unwrap_or(0.0)
}

// ---------- Callbacks ----------

pub struct MacCallback {
    queue: Arc<SampleQueue>,
}

impl MacCallback {
    pub fn new(queue: Arc<SampleQueue>) -> Self {
        Self { queue }
    }
}

impl IndicationHandler<MacIndication> for MacCallback {
    fn handle(&self, ind: &MacIndication) {
        let Some(stats) = ind.ue_stats.first() else {
            return;
        };
        let t_mac = ind.tstamp as f64;
        let t_diff = now_us() - t_mac;

        let sample = Sample::new(StatFamily::Mac, t_mac)
            .with("rnti", stats.rnti as f64)
            .with("phr", stats.phr as f64)
            .with("dl_tbs", stats.dl_aggr_tbs as f64)
            .with("ul_tbs", stats.ul_aggr_tbs as f64)
            .with("dl_aggr_prb", stats.dl_aggr_prb as f64)
            .with("wb_cqi", stats.wb_cqi as f64)
            .with("pusch_snr", stats.pusch_snr as f64)
            .with("pucch_snr", stats.pucch_snr as f64)
            .with("ul_rssi", stats.ul_rssi as f64)
            .with("dl_bler", stats.dl_bler as f64)
            .with("ul_bler", stats.ul_bler as f64)
            .with("dl_mcs", stats.dl_mcs1 as f64)
            .with("ul_mcs", stats.ul_mcs1 as f64);
        self.queue.push(sample);

        tracing::debug!(
            "MAC rnti={} (0x{:x}) phr={} dl_tbs={} ul_tbs={} dl_prb={} latency={:.0}us",
            stats.rnti, stats.rnti, stats.phr, stats.dl_aggr_tbs, stats.ul_aggr_tbs, stats.dl_aggr_prb, t_diff
        );
        tracing::debug!(
            "MAC rf wb_cqi={} pusch_snr={:.1}dB pucch_snr={:.1}dB ul_rssi={:.2}dBFS",
            stats.wb_cqi, stats.pusch_snr, stats.pucch_snr, stats.ul_rssi
        );
        tracing::debug!(
            "MAC link dl_bler={:.6} ul_bler={:.6} dl_mcs={} ul_mcs={}",
            stats.dl_bler, stats.ul_bler, stats.dl_mcs1, stats.ul_mcs1
        );
    }
}

pub struct RlcCallback {
    queue: Arc<SampleQueue>,
}

impl RlcCallback {
    pub fn new(queue: Arc<SampleQueue>) -> Self {
        Self { queue }
    }
}

impl IndicationHandler<RlcIndication> for RlcCallback {
    fn handle(&self, ind: &RlcIndication) {
        let Some(stats) = ind.rb_stats.first() else {
            return;
        };
        let t_rlc = ind.tstamp as f64;
        let t_diff = now_us() - t_rlc;

        let sample = Sample::new(StatFamily::Rlc, t_rlc)
            .with("rnti", stats.rnti as f64)
            .with("rbid", stats.rbid as f64)
            .with("mode", stats.mode as f64)
            .with("txpdu_pkts", stats.txpdu_pkts as f64)
            .with("txpdu_bytes", stats.txpdu_bytes as f64)
            .with("rxpdu_pkts", stats.rxpdu_pkts as f64)
            .with("rxpdu_bytes", stats.rxpdu_bytes as f64)
            .with("txsdu_pkts", stats.txsdu_pkts as f64)
            .with("txsdu_bytes", stats.txsdu_bytes as f64)
            .with("rxsdu_pkts", stats.rxsdu_pkts as f64)
            .with("rxsdu_bytes", stats.rxsdu_bytes as f64)
            .with("txbuf_occ_bytes", stats.txbuf_occ_bytes as f64)
            .with("txbuf_occ_pkts", stats.txbuf_occ_pkts as f64)
            .with("rxbuf_occ_bytes", stats.rxbuf_occ_bytes as f64)
            .with("rxbuf_occ_pkts", stats.rxbuf_occ_pkts as f64);
        self.queue.push(sample);

        tracing::debug!(
            "RLC rnti={} (0x{:x}) rb={} mode={} latency={:.0}us",
            stats.rnti, stats.rnti, stats.rbid, stats.mode_str(), t_diff
        );
        tracing::debug!(
            "RLC pdu tx={:.1}kB ({} pkts) rx={:.1}kB ({} pkts)",
            stats.txpdu_bytes as f64 / 1000.0, stats.txpdu_pkts,
            stats.rxpdu_bytes as f64 / 1000.0, stats.rxpdu_pkts
        );
        tracing::debug!(
            "RLC sdu tx={:.1}kB ({} pkts) rx={:.1}kB ({} pkts)",
            stats.txsdu_bytes as f64 / 1000.0, stats.txsdu_pkts,
            stats.rxsdu_bytes as f64 / 1000.0, stats.rxsdu_pkts
        );
    }
}

pub struct PdcpCallback {
    queue: Arc<SampleQueue>,
}

impl PdcpCallback {
    pub fn new(queue: Arc<SampleQueue>) -> Self {
        Self { queue }
    }
}

impl IndicationHandler<PdcpIndication> for PdcpCallback {
    fn handle(&self, ind: &PdcpIndication) {
        let Some(stats) = ind.rb_stats.first() else {
            return;
        };
        let t_pdcp = ind.tstamp as f64;
        let t_diff = now_us() - t_pdcp;

        let sample = Sample::new(StatFamily::Pdcp, t_pdcp)
            .with("rnti", stats.rnti as f64)
            .with("rbid", stats.rbid as f64)
            .with("txpdu_pkts", stats.txpdu_pkts as f64)
            .with("txpdu_bytes", stats.txpdu_bytes as f64)
            .with("rxpdu_pkts", stats.rxpdu_pkts as f64)
            .with("rxpdu_bytes", stats.rxpdu_bytes as f64);
        self.queue.push(sample);

        tracing::debug!(
            "PDCP rnti={} (0x{:x}) rb={} latency={:.0}us",
            stats.rnti, stats.rnti, stats.rbid, t_diff
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MacUeStats, PdcpRbStats, RlcRbStats};

    fn mac_ind(tstamp: i64, rssi: f32) -> MacIndication {
        MacIndication {
            tstamp,
            ue_stats: vec![MacUeStats {
                rnti: 0x4601,
                phr: 40,
                ul_rssi: rssi,
                wb_cqi: 12,
                ..Default::default()
            }],
        }
    }

    #[test]
    fn test_empty_reports_are_dropped() {
        let collector = Collector::new();
        let mac = MacCallback::new(collector.mac.clone());
        let rlc = RlcCallback::new(collector.rlc.clone());
        let pdcp = PdcpCallback::new(collector.pdcp.clone());

        for t in 0..5 {
            mac.handle(&MacIndication { tstamp: t, ue_stats: vec![] });
            rlc.handle(&RlcIndication { tstamp: t, rb_stats: vec![] });
            pdcp.handle(&PdcpIndication { tstamp: t, rb_stats: vec![] });
        }

        assert!(collector.mac.is_empty(), "empty MAC report must not enqueue");
        assert!(collector.rlc.is_empty(), "empty RLC report must not enqueue");
        assert!(collector.pdcp.is_empty(), "empty PDCP report must not enqueue");
    }

    #[test]
    fn test_mac_fields_copied_from_first_ue() {
        let queue = Arc::new(SampleQueue::new());
        let cb = MacCallback::new(queue.clone());

        let mut ind = mac_ind(1_000, -61.5);
        ind.ue_stats.push(MacUeStats { rnti: 0x4602, ul_rssi: -90.0, ..Default::default() });
        cb.handle(&ind);

        let samples = queue.drain();
        assert_eq!(samples.len(), 1);
        let s = &samples[0];
        assert_eq!(s.family, StatFamily::Mac);
        assert_eq!(s.timestamp, 1_000.0);
        assert_eq!(s.get("rnti"), Some(0x4601 as f64));
        assert_eq!(s.get("ul_rssi"), Some(-61.5));
        assert_eq!(s.get("wb_cqi"), Some(12.0));
        assert_eq!(s.get("timestamp"), Some(1_000.0));
        assert_eq!(s.fields.len(), 13);
    }

    #[test]
    fn test_rlc_and_pdcp_fields() {
        let collector = Collector::new();
        RlcCallback::new(collector.rlc.clone()).handle(&RlcIndication {
            tstamp: 7,
            rb_stats: vec![RlcRbStats { rnti: 1, rbid: 3, mode: 1, txpdu_bytes: 1500, ..Default::default() }],
        });
        PdcpCallback::new(collector.pdcp.clone()).handle(&PdcpIndication {
            tstamp: 8,
            rb_stats: vec![PdcpRbStats { rnti: 1, rbid: 3, rxpdu_pkts: 9, ..Default::default() }],
        });

        let rlc = collector.rlc.drain();
        assert_eq!(rlc[0].get("mode"), Some(1.0));
        assert_eq!(rlc[0].get("txpdu_bytes"), Some(1500.0));
        assert_eq!(rlc[0].fields.len(), 15);

        let pdcp = collector.pdcp.drain();
        assert_eq!(pdcp[0].get("rbid"), Some(3.0));
        assert_eq!(pdcp[0].get("rxpdu_pkts"), Some(9.0));
    }

    #[test]
    fn test_drain_is_fifo_and_exhaustive() {
        let queue = Arc::new(SampleQueue::new());
        let cb = MacCallback::new(queue.clone());
        for i in 0..10 {
            cb.handle(&mac_ind(i, i as f32));
        }

        let samples = queue.drain();
        let ts: Vec<f64> = samples.iter().map(|s| s.timestamp).collect();
        assert_eq!(ts, (0..10).map(|i| i as f64).collect::<Vec<_>>());
        assert!(queue.is_empty(), "drain must empty the queue");
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_concurrent_producers() {
        let queue = Arc::new(SampleQueue::new());
        std::thread::scope(|s| {
            for p in 0..4 {
                let cb = MacCallback::new(queue.clone());
                s.spawn(move || {
                    for i in 0..250 {
                        cb.handle(&mac_ind(p * 1000 + i, -60.0));
                    }
                });
            }
        });
        assert_eq!(queue.len(), 1000);
        println!("✓ 4 producers enqueued {} samples", queue.len());
    }
}

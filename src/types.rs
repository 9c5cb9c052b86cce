use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

// ---------- E2 node identity ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Plmn {
    pub mcc: u16,
    pub mnc: u16,
    pub mnc_digit_len: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GlobalE2NodeId {
    pub plmn: Plmn,
    pub nb_id: u32,
}

impl fmt::Display for GlobalE2NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mcc={} mnc={:0width$} nb_id={}",
            self.plmn.mcc,
            self.plmn.mnc,
            self.nb_id,
            width = self.plmn.mnc_digit_len as usize
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct E2Node {
    pub id: GlobalE2NodeId,
}

// ---------- Subscription parameters ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatFamily {
    Mac,
    Rlc,
    Pdcp,
}

impl fmt::Display for StatFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StatFamily::Mac => "MAC",
            StatFamily::Rlc => "RLC",
            StatFamily::Pdcp => "PDCP",
        })
    }
}

/// Report periods a service model accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interval {
    Ms1,
    Ms2,
    Ms5,
    Ms10,
}

impl Interval {
    pub fn from_millis(ms: u64) -> Option<Self> {
        match ms {
            1 => Some(Interval::Ms1),
            2 => Some(Interval::Ms2),
            5 => Some(Interval::Ms5),
            10 => Some(Interval::Ms10),
            _ => None,
        }
    }

    pub fn as_millis(self) -> u64 {
        match self {
            Interval::Ms1 => 1,
            Interval::Ms2 => 2,
            Interval::Ms5 => 5,
            Interval::Ms10 => 10,
        }
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_millis(self.as_millis())
    }
}

// ---------- Indication messages ----------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MacUeStats {
    pub rnti: u32,
    pub phr: i32,
    pub dl_aggr_tbs: u64,
    pub ul_aggr_tbs: u64,
    pub dl_aggr_prb: u32,
    pub wb_cqi: u8,
    pub pusch_snr: f32,
    pub pucch_snr: f32,
    pub ul_rssi: f32, // dBFS
    pub dl_bler: f32,
    pub ul_bler: f32,
    pub dl_mcs1: u8,
    pub ul_mcs1: u8,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MacIndication {
    /// Microseconds since the Unix epoch, stamped by the node.
    pub tstamp: i64,
    pub ue_stats: Vec<MacUeStats>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RlcRbStats {
    pub rnti: u32,
    pub rbid: u8,
    pub mode: u8,
    pub txpdu_pkts: u32,
    pub txpdu_bytes: u32,
    pub rxpdu_pkts: u32,
    pub rxpdu_bytes: u32,
    pub txsdu_pkts: u32,
    pub txsdu_bytes: u32,
    pub rxsdu_pkts: u32,
    pub rxsdu_bytes: u32,
    pub txbuf_occ_bytes: u32,
    pub txbuf_occ_pkts: u32,
    pub rxbuf_occ_bytes: u32,
    pub rxbuf_occ_pkts: u32,
}

impl RlcRbStats {
    pub fn mode_str(&self) -> &'static str {
        match self.mode {
            0 => "AM",
            1 => "UM",
            2 => "TM",
            _ => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RlcIndication {
    pub tstamp: i64,
    pub rb_stats: Vec<RlcRbStats>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PdcpRbStats {
    pub rnti: u32,
    pub rbid: u8,
    pub txpdu_pkts: u32,
    pub txpdu_bytes: u32,
    pub rxpdu_pkts: u32,
    pub rxpdu_bytes: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PdcpIndication {
    pub tstamp: i64,
    pub rb_stats: Vec<PdcpRbStats>,
}

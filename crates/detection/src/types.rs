use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    Other(u8),
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
            Self::Icmp => write!(f, "icmp"),
            Self::Other(n) => write!(f, "proto{}", n),
        }
    }
}

impl TryFrom<String> for Protocol {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_ascii_lowercase().as_str() {
            "tcp" | "6" => Ok(Self::Tcp),
            "udp" | "17" => Ok(Self::Udp),
            "icmp" | "1" => Ok(Self::Icmp),
            other => {
                let digits = other.strip_prefix("proto").unwrap_or(other);
                digits
                    .parse::<u8>()
                    .map(Self::Other)
                    .map_err(|_| format!("unrecognized protocol {:?}", value))
            }
        }
    }
}

impl From<Protocol> for String {
    fn from(value: Protocol) -> Self {
        value.to_string()
    }
}

/// One normalized network flow. Immutable once ingested; ordered by
/// `start_unix`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: Protocol,
    pub start_unix: i64,
    pub duration_ms: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl FlowRecord {
    /// Dimension key for the global (protocol, destination port) table.
    pub fn proto_port_key(&self) -> String {
        format!("{}/{}", self.protocol, self.dst_port)
    }

    pub fn hour_of_day(&self) -> u8 {
        (self.start_unix.rem_euclid(86_400) / 3_600) as u8
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DetectorId {
    Beaconing,
    Exfiltration,
    Scanning,
    C2Channel,
    ProtocolRarity,
    NoveltyBurst,
    BruteForce,
    Staging,
    DgaDomain,
}

impl DetectorId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Beaconing => "beaconing",
            Self::Exfiltration => "exfiltration",
            Self::Scanning => "scanning",
            Self::C2Channel => "c2_channel",
            Self::ProtocolRarity => "protocol_rarity",
            Self::NoveltyBurst => "novelty_burst",
            Self::BruteForce => "brute_force",
            Self::Staging => "staging",
            Self::DgaDomain => "dga_domain",
        }
    }
}

impl fmt::Display for DetectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time span covered by a flushed window; part of the finding dedup key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct WindowSpan {
    pub start_unix: i64,
    pub end_unix: i64,
}

/// One scored observation from one detector over one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Attributed host, so corroborating detectors merge per entity.
    pub entity: String,
    pub detector: DetectorId,
    /// In `[0, 1]`.
    pub severity: f64,
    pub evidence: BTreeMap<String, String>,
    pub span: WindowSpan,
}

/// Aggregator output: corroborated findings for one entity whose
/// composite score cleared the alert threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub entity: String,
    pub composite_score: f64,
    pub contributing: Vec<DetectorId>,
    pub findings: Vec<Finding>,
}

use std::convert::TryInto;
use std::net::{Ipv4Addr, Ipv6Addr};

use chrono::{DateTime, Utc};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct FlowRecord {
    pub src_addr: IpAddr,
    pub dst_addr: IpAddr,
    pub dst_port: u16,
    pub first: DateTime<Utc>,
    pub last: DateTime<Utc>,
    pub in_packets: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IpAddr {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
}

impl std::fmt::Display for IpAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IpAddr::V4(a) => write!(f, "{}", a),
            IpAddr::V6(a) => write!(f, "{}", a),
        }
    }
}

impl From<Ipv4Addr> for IpAddr {
    fn from(a: Ipv4Addr) -> Self {
        IpAddr::V4(a)
    }
}

impl From<Ipv6Addr> for IpAddr {
    fn from(a: Ipv6Addr) -> Self {
        IpAddr::V6(a)
    }
}

impl FlowRecord {
    /// Accepts both `first`/`last` and `t_first`/`t_last` (nfdump 1.7 vs 1.6).
    pub fn from_json(value: &Value) -> Result<FlowRecord, String> {
        let in_packets = value
            .get("in_packets")
            .and_then(Value::as_u64)
            .ok_or("missing or non-integer in_packets")?;
        if in_packets == 0 {
            return Err("in_packets must be a positive integer".to_string());
        }

        let dst_port = value
            .get("dst_port")
            .and_then(Value::as_u64)
            .ok_or("missing or non-integer dst_port")?;
        let dst_port: u16 = dst_port
            .try_into()
            .map_err(|_| "dst_port out of range".to_string())?;

        let first = parse_timestamp(value, "first", "t_first")
            .ok_or_else(|| "a NetFlow record must have a first timestamp".to_string())?;
        let last = parse_timestamp(value, "last", "t_last")
            .ok_or_else(|| "a NetFlow record must have a last timestamp".to_string())?;
        if last < first {
            return Err("last timestamp precedes first timestamp".to_string());
        }

        let src_addr = parse_addr_pair(value, "src4_addr", "src6_addr")
            .ok_or_else(|| "a NetFlow record must have an IPv4 or IPv6 source".to_string())?;
        let dst_addr = parse_addr_pair(value, "dst4_addr", "dst6_addr")
            .ok_or_else(|| "a NetFlow record must have an IPv4 or IPv6 destination".to_string())?;

        Ok(FlowRecord {
            src_addr,
            dst_addr,
            dst_port,
            first,
            last,
            in_packets,
        })
    }
}

fn parse_timestamp(value: &Value, primary: &str, legacy: &str) -> Option<DateTime<Utc>> {
    let raw = value
        .get(primary)
        .and_then(Value::as_str)
        .or_else(|| value.get(legacy).and_then(Value::as_str))?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_addr_pair(value: &Value, v4_field: &str, v6_field: &str) -> Option<IpAddr> {
    if let Some(raw) = value.get(v4_field).and_then(Value::as_str) {
        if let Ok(addr) = raw.parse::<Ipv4Addr>() {
            return Some(IpAddr::V4(addr));
        }
    }
    if let Some(raw) = value.get(v6_field).and_then(Value::as_str) {
        if let Ok(addr) = raw.parse::<Ipv6Addr>() {
            return Some(IpAddr::V6(addr));
        }
    }
    None
}

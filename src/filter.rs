use crate::config::Configuration;
use crate::record::FlowRecord;

const DNS_PORT: u16 = 53;

/// Address-family mismatch between the record's destination and a configured
/// prefix is a non-match, not an error: `IpNetwork::contains` simply returns
/// `false` for a `V4` address tested against a `V6` network and vice versa.
pub fn is_protected_dns_traffic(record: &FlowRecord, config: &Configuration) -> bool {
    if record.dst_port != DNS_PORT {
        return false;
    }

    let dst: std::net::IpAddr = match record.dst_addr {
        crate::record::IpAddr::V4(a) => a.into(),
        crate::record::IpAddr::V6(a) => a.into(),
    };

    config.protected_prefixes.iter().any(|net| net.contains(dst))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::IpAddr;
    use chrono::{TimeZone, Utc};

    fn record(dst_port: u16, dst: &str) -> FlowRecord {
        FlowRecord {
            src_addr: IpAddr::V4("192.0.2.7".parse().unwrap()),
            dst_addr: if dst.contains(':') {
                IpAddr::V6(dst.parse().unwrap())
            } else {
                IpAddr::V4(dst.parse().unwrap())
            },
            dst_port,
            first: Utc.timestamp_opt(0, 0).unwrap(),
            last: Utc.timestamp_opt(0, 0).unwrap(),
            in_packets: 1,
        }
    }

    #[test]
    fn keeps_dns_traffic_to_protected_prefix() {
        let cfg = Configuration::default();
        assert!(is_protected_dns_traffic(&record(53, "203.0.113.1"), &cfg));
    }

    #[test]
    fn drops_non_dns_port() {
        let cfg = Configuration::default();
        assert!(!is_protected_dns_traffic(&record(443, "203.0.113.1"), &cfg));
    }

    #[test]
    fn drops_unprotected_destination() {
        let mut cfg = Configuration::default();
        cfg.protected_prefixes = vec!["198.51.100.0/24".parse().unwrap()];
        assert!(!is_protected_dns_traffic(&record(53, "203.0.113.1"), &cfg));
    }

    #[test]
    fn address_family_mismatch_is_a_non_match() {
        let mut cfg = Configuration::default();
        cfg.protected_prefixes = vec!["2001:db8::/32".parse().unwrap()];
        assert!(!is_protected_dns_traffic(&record(53, "203.0.113.1"), &cfg));
    }
}

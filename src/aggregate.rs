use std::collections::HashMap;

use ipnetwork::{Ipv4Network, Ipv6Network};

use crate::config::Configuration;
use crate::record::{FlowRecord, IpAddr};

/// A source address masked to the configured per-family aggregation prefix
/// length. Holds a network address only, never a prefix length.
pub type SourceKey = IpAddr;

pub type CountMap = HashMap<SourceKey, HashMap<i64, u64>>;

/// Align a timestamp (in seconds) down to the nearest multiple of
/// `aggregation_time`.
pub fn bucket_of(timestamp: i64, aggregation_time: u64) -> i64 {
    let agg = aggregation_time as i64;
    timestamp - timestamp.rem_euclid(agg)
}

fn mask_source(addr: IpAddr, config: &Configuration) -> SourceKey {
    match addr {
        IpAddr::V4(a) => {
            let net = Ipv4Network::new(a, config.ipv4_aggregation)
                .expect("ipv4_aggregation validated to be in 0..=32 at config load");
            IpAddr::V4(net.network())
        }
        IpAddr::V6(a) => {
            let net = Ipv6Network::new(a, config.ipv6_aggregation)
                .expect("ipv6_aggregation validated to be in 0..=128 at config load");
            IpAddr::V6(net.network())
        }
    }
}

pub fn aggregate_flow(data: &mut CountMap, config: &Configuration, record: &FlowRecord) {
    let key = mask_source(record.src_addr, config);
    let buckets = data.entry(key).or_default();

    let first = record.first.timestamp();
    let last = record.last.timestamp();
    let n = record.in_packets;

    // n == 1 must stay on the single-bucket path even if first/last straddle
    // a bucket boundary, or step = span / (n - 1) divides by zero below.
    if n == 1 || bucket_of(first, config.aggregation_time) == bucket_of(last, config.aggregation_time) {
        let bucket = bucket_of(first, config.aggregation_time);
        *buckets.entry(bucket).or_insert(0) += n;
        return;
    }

    let total_span = (last - first) as f64;
    let step = total_span / (n - 1) as f64;

    for i in 0..n {
        let t = first as f64 + i as f64 * step;
        let bucket = bucket_of(t as i64, config.aggregation_time);
        *buckets.entry(bucket).or_insert(0) += 1;
    }
}

/// Merge `incoming` into `accumulator` in place: a key present only in
/// `incoming` moves its bucket map in wholesale, a key present in both adds
/// bucket counts. Commutative and associative.
///
/// Keeping the smaller map as the iteration source is a minor constant-factor
/// optimization, not a correctness requirement.
pub fn merge_count_maps(accumulator: &mut CountMap, mut incoming: CountMap) {
    if accumulator.len() < incoming.len() {
        std::mem::swap(accumulator, &mut incoming);
    }

    for (key, buckets) in incoming {
        match accumulator.get_mut(&key) {
            None => {
                accumulator.insert(key, buckets);
            }
            Some(existing) => {
                for (bucket, count) in buckets {
                    *existing.entry(bucket).or_insert(0) += count;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::IpAddr;
    use chrono::{TimeZone, Utc};

    fn record_at(src: &str, first: i64, last: i64, in_packets: u64) -> FlowRecord {
        FlowRecord {
            src_addr: IpAddr::V4(src.parse().unwrap()),
            dst_addr: IpAddr::V4("203.0.113.1".parse().unwrap()),
            dst_port: 53,
            first: Utc.timestamp_opt(first, 0).unwrap(),
            last: Utc.timestamp_opt(last, 0).unwrap(),
            in_packets,
        }
    }

    #[test]
    fn single_bucket_credits_all_packets() {
        let cfg = Configuration::default();
        let mut data = CountMap::new();
        let r = record_at("192.0.2.7", 1704067800, 1704067800, 200);
        aggregate_flow(&mut data, &cfg, &r);

        let key = IpAddr::V4("192.0.2.0".parse().unwrap());
        let buckets = &data[&key];
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[&1704067200], 200);
    }

    #[test]
    fn spanning_two_buckets_splits_evenly() {
        let cfg = Configuration::default();
        let mut data = CountMap::new();
        // first is the last second of one hour bucket, last is the first
        // second of the next: two packets, one per bucket.
        let r = record_at("192.0.2.7", 1704070799, 1704070801, 2);
        aggregate_flow(&mut data, &cfg, &r);

        let key = IpAddr::V4("192.0.2.0".parse().unwrap());
        let buckets = &data[&key];
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets.values().sum::<u64>(), 2);
        for &count in buckets.values() {
            assert_eq!(count, 1);
        }
    }

    #[test]
    fn single_packet_straddling_a_bucket_boundary_credits_first_bucket() {
        let cfg = Configuration::default();
        let mut data = CountMap::new();
        let r = record_at("192.0.2.7", 1704070799, 1704070801, 1);
        aggregate_flow(&mut data, &cfg, &r);

        let key = IpAddr::V4("192.0.2.0".parse().unwrap());
        let buckets = &data[&key];
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[&1704067200], 1);
    }

    #[test]
    fn total_packets_conserved_across_buckets() {
        let cfg = Configuration::default();
        let mut data = CountMap::new();
        let r = record_at("192.0.2.7", 1704067200, 1704070800, 37);
        aggregate_flow(&mut data, &cfg, &r);

        let key = IpAddr::V4("192.0.2.0".parse().unwrap());
        let total: u64 = data[&key].values().sum();
        assert_eq!(total, 37);
    }

    #[test]
    fn bucket_keys_are_aligned() {
        let cfg = Configuration::default();
        let mut data = CountMap::new();
        let r = record_at("192.0.2.7", 1704067200, 1704074400, 5);
        aggregate_flow(&mut data, &cfg, &r);

        let key = IpAddr::V4("192.0.2.0".parse().unwrap());
        for &bucket in data[&key].keys() {
            assert_eq!(bucket % cfg.aggregation_time as i64, 0);
        }
    }

    #[test]
    fn prefix_aggregation_collapses_same_block() {
        let cfg = Configuration::default();
        let mut data = CountMap::new();
        aggregate_flow(&mut data, &cfg, &record_at("192.0.2.7", 0, 0, 1));
        aggregate_flow(&mut data, &cfg, &record_at("192.0.2.200", 0, 0, 1));

        assert_eq!(data.len(), 1);
        let key = IpAddr::V4("192.0.2.0".parse().unwrap());
        assert_eq!(data[&key][&0], 2);
    }

    #[test]
    fn masking_is_idempotent() {
        let cfg = Configuration::default();
        let addr = IpAddr::V4("192.0.2.200".parse().unwrap());
        let once = mask_source(addr, &cfg);
        let twice = mask_source(once, &cfg);
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_is_commutative() {
        let cfg = Configuration::default();
        let mut a = CountMap::new();
        aggregate_flow(&mut a, &cfg, &record_at("192.0.2.7", 0, 0, 3));
        let mut b = CountMap::new();
        aggregate_flow(&mut b, &cfg, &record_at("192.0.2.7", 3600, 3600, 5));
        aggregate_flow(&mut b, &cfg, &record_at("198.51.100.9", 0, 0, 2));

        let mut ab = a.clone();
        merge_count_maps(&mut ab, b.clone());
        let mut ba = b.clone();
        merge_count_maps(&mut ba, a.clone());

        assert_eq!(ab, ba);
    }

    #[test]
    fn merge_is_associative() {
        let cfg = Configuration::default();
        let mut a = CountMap::new();
        aggregate_flow(&mut a, &cfg, &record_at("192.0.2.7", 0, 0, 3));
        let mut b = CountMap::new();
        aggregate_flow(&mut b, &cfg, &record_at("192.0.2.7", 3600, 3600, 5));
        let mut c = CountMap::new();
        aggregate_flow(&mut c, &cfg, &record_at("198.51.100.9", 0, 0, 2));

        let mut ab_c = a.clone();
        merge_count_maps(&mut ab_c, b.clone());
        merge_count_maps(&mut ab_c, c.clone());

        let mut bc = b.clone();
        merge_count_maps(&mut bc, c.clone());
        let mut a_bc = a.clone();
        merge_count_maps(&mut a_bc, bc);

        assert_eq!(ab_c, a_bc);
    }
}

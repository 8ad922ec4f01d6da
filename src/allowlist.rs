use std::collections::HashMap;

use crate::aggregate::{bucket_of, CountMap, SourceKey};
use crate::config::Configuration;

pub type Allowlist = HashMap<SourceKey, u64>;

/// The window is `[now_bucket - aggregation_time * param_w_train, now)`.
/// Note the asymmetry: the start is bucket-aligned but the end is the raw
/// reference time, so the bucket containing `now` itself is always excluded.
pub fn build_allowlist(data: &CountMap, config: &Configuration, now: i64) -> Allowlist {
    let now_bucket = bucket_of(now, config.aggregation_time);
    let window_start = now_bucket - config.aggregation_time as i64 * config.param_w_train as i64;

    let mut allowlist = Allowlist::new();

    for (key, buckets) in data {
        let mut in_window = buckets
            .iter()
            .filter(|&(&time, _)| window_start <= time && time < now)
            .map(|(_, &count)| count);

        let mut steady_count = 0usize;
        let mut peak = 0u64;
        for count in in_window.by_ref() {
            steady_count += 1;
            if count > peak {
                peak = count;
            }
        }

        if steady_count < config.param_steady {
            continue;
        }
        if peak < config.param_heavy {
            continue;
        }
        allowlist.insert(*key, peak);
    }

    allowlist
}

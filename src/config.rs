use std::path::Path;

use ipnetwork::IpNetwork;
use serde::Deserialize;

use crate::error::ConfigError;

/// Immutable run configuration, loaded once and validated up front.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub protected_prefixes: Vec<IpNetwork>,
    pub aggregation_time: u64,
    pub ipv4_aggregation: u8,
    pub ipv6_aggregation: u8,
    pub param_w_train: u64,
    pub param_steady: usize,
    pub param_heavy: u64,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            protected_prefixes: vec![
                "0.0.0.0/0".parse().expect("static CIDR literal"),
                "::/0".parse().expect("static CIDR literal"),
            ],
            aggregation_time: 3600,
            ipv4_aggregation: 24,
            ipv6_aggregation: 48,
            param_w_train: 24,
            param_steady: 3,
            param_heavy: 128,
        }
    }
}

/// Raw, on-disk shape of the configuration document. Every field is
/// optional so that omitted fields fall back to `Configuration::default()`;
/// unrecognized fields are tolerated by simply not being named here.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawConfiguration {
    destination_addresses: Option<Vec<String>>,
    aggregation_time: Option<u64>,
    ipv4_aggregation: Option<u8>,
    ipv6_aggregation: Option<u8>,
    param_w_train: Option<u64>,
    param_steady: Option<u64>,
    param_heavy: Option<u64>,
}

impl Configuration {
    /// Load and validate a configuration file, or fall back to
    /// `Configuration::default()` when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Configuration, ConfigError> {
        let path = match path {
            Some(p) => p,
            None => return Ok(Configuration::default()),
        };

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let stripped = strip_line_comments(&text);
        let raw: RawConfiguration = serde_json::from_str(&stripped)?;
        Configuration::from_raw(raw)
    }

    fn from_raw(raw: RawConfiguration) -> Result<Configuration, ConfigError> {
        let defaults = Configuration::default();

        let protected_prefixes = match raw.destination_addresses {
            Some(nets) => nets
                .into_iter()
                .map(|s| {
                    s.parse::<IpNetwork>().map_err(|source| ConfigError::Cidr {
                        prefix: s,
                        source,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => defaults.protected_prefixes,
        };

        let aggregation_time = raw.aggregation_time.unwrap_or(defaults.aggregation_time);
        if aggregation_time == 0 {
            return Err(ConfigError::InvalidValue {
                field: "aggregation_time",
                reason: "must be greater than zero".to_string(),
            });
        }

        let ipv4_aggregation = raw.ipv4_aggregation.unwrap_or(defaults.ipv4_aggregation);
        if ipv4_aggregation > 32 {
            return Err(ConfigError::InvalidValue {
                field: "ipv4_aggregation",
                reason: "must be between 0 and 32 bits".to_string(),
            });
        }

        let ipv6_aggregation = raw.ipv6_aggregation.unwrap_or(defaults.ipv6_aggregation);
        if ipv6_aggregation > 128 {
            return Err(ConfigError::InvalidValue {
                field: "ipv6_aggregation",
                reason: "must be between 0 and 128 bits".to_string(),
            });
        }

        let param_w_train = raw.param_w_train.unwrap_or(defaults.param_w_train);
        if param_w_train == 0 {
            return Err(ConfigError::InvalidValue {
                field: "param_w_train",
                reason: "must be greater than zero".to_string(),
            });
        }

        let param_steady = raw.param_steady.unwrap_or(defaults.param_steady as u64);
        if param_steady == 0 {
            return Err(ConfigError::InvalidValue {
                field: "param_steady",
                reason: "must be greater than zero".to_string(),
            });
        }

        let param_heavy = raw.param_heavy.unwrap_or(defaults.param_heavy);
        if param_heavy == 0 {
            return Err(ConfigError::InvalidValue {
                field: "param_heavy",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(Configuration {
            protected_prefixes,
            aggregation_time,
            ipv4_aggregation,
            ipv6_aggregation,
            param_w_train,
            param_steady: param_steady as usize,
            param_heavy,
        })
    }
}

/// A line counts as a comment only when `//` is the first non-space content
/// on that line, so a literal `//` inside a JSON string value is untouched.
fn strip_line_comments(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("//"))
        .collect::<Vec<_>>()
        .join("\n")
}

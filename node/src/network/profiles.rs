//! Built-in peer seed lists and endpoint validation.

use crate::config::ConfigValidationError;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MAINNET_SEEDS: &[&str] = &[
    "https://seed1.neo.org:10331",
    "http://seed2.neo.org:10332",
    "http://seed3.neo.org:10332",
    "http://seed4.neo.org:10332",
    "http://seed5.neo.org:10332",
];

const TESTNET_SEEDS: &[&str] = &[
    "https://seed1.neo.org:20331",
    "http://seed2.neo.org:20332",
    "http://seed3.neo.org:20332",
    "http://seed4.neo.org:20332",
    "http://seed5.neo.org:20332",
];

/// Which public network's seed endpoints to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkProfile {
    Mainnet,
    Testnet,
}

impl NetworkProfile {
    pub fn seed_endpoints(&self) -> &'static [&'static str] {
        match self {
            NetworkProfile::Mainnet => MAINNET_SEEDS,
            NetworkProfile::Testnet => TESTNET_SEEDS,
        }
    }
}

impl fmt::Display for NetworkProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkProfile::Mainnet => write!(f, "mainnet"),
            NetworkProfile::Testnet => write!(f, "testnet"),
        }
    }
}

impl FromStr for NetworkProfile {
    type Err = ConfigValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(NetworkProfile::Mainnet),
            "testnet" => Ok(NetworkProfile::Testnet),
            other => Err(ConfigValidationError::InvalidValue(format!(
                "unknown network profile '{other}'"
            ))),
        }
    }
}

/// Endpoints must be absolute http(s) URLs with a host.
pub fn validate_endpoint(endpoint: &str) -> Result<(), ConfigValidationError> {
    let url = Url::parse(endpoint)
        .map_err(|e| ConfigValidationError::InvalidEndpoint(format!("{endpoint}: {e}")))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigValidationError::InvalidEndpoint(format!(
            "{endpoint}: scheme must be http or https"
        )));
    }
    if url.host_str().is_none() {
        return Err(ConfigValidationError::InvalidEndpoint(format!(
            "{endpoint}: missing host"
        )));
    }
    Ok(())
}

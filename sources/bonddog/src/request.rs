//! The request module turns the caller's JSON payload into a validated `ReconfigurationRequest`.
//!
//! The payload is first deserialized into loosely typed structures with every field optional, so a
//! single pass can report every problem at once instead of stopping at the first missing field.

use crate::bonding::{BondingMode, NetworkType};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use log::{error, warn};
use regex::Regex;
use serde::Deserialize;
use snafu::ensure;
use std::collections::BTreeSet;

lazy_static! {
    // Hostnames are handed to ssh as the destination, so they may not look like options
    static ref HOSTNAME: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap();
}

#[derive(Debug, Deserialize)]
pub(crate) struct Payload {
    network_types: Option<IndexMap<NetworkType, PayloadNetwork>>,
    num_participating_computes: Option<u64>,
    participating_computes: Option<Vec<PayloadCompute>>,
}

#[derive(Debug, Deserialize)]
struct PayloadNetwork {
    bonding_mode: Option<PayloadTransition>,
}

#[derive(Debug, Deserialize)]
struct PayloadTransition {
    current: Option<BondingMode>,
    new: Option<BondingMode>,
}

#[derive(Debug, Deserialize)]
struct PayloadCompute {
    compute_node_alias: Option<String>,
    compute_node_hostname: Option<String>,
}

/// The bonding mode a network runs in now, and the one it should run in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct ModeTransition {
    pub(crate) current: BondingMode,
    pub(crate) new: BondingMode,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Compute {
    pub(crate) alias: String,
    pub(crate) hostname: String,
}

/// A request that passed validation.  Network types keep the order of the payload, which is the
/// order they are processed on each host.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ReconfigurationRequest {
    pub(crate) network_types: IndexMap<NetworkType, ModeTransition>,
    pub(crate) computes: Vec<Compute>,
}

impl TryFrom<Payload> for ReconfigurationRequest {
    type Error = error::Error;

    fn try_from(payload: Payload) -> Result<Self> {
        let mut problems = Vec::new();

        let mut network_types = IndexMap::new();
        match payload.network_types {
            None => problems.push("missing network_types".to_string()),
            Some(networks) if networks.is_empty() => {
                problems.push("network_types names no network".to_string())
            }
            Some(networks) => {
                for (network_type, network) in networks {
                    let transition = match network.bonding_mode {
                        Some(transition) => transition,
                        None => {
                            problems.push(format!("missing bonding_mode for {}", network_type));
                            continue;
                        }
                    };
                    match (transition.current, transition.new) {
                        (Some(current), Some(new)) => {
                            network_types.insert(network_type, ModeTransition { current, new });
                        }
                        (current, new) => {
                            if current.is_none() {
                                problems.push(format!("missing current bonding mode for {}", network_type));
                            }
                            if new.is_none() {
                                problems.push(format!("missing new bonding mode for {}", network_type));
                            }
                        }
                    }
                }
            }
        }

        let mut computes = Vec::new();
        match payload.participating_computes {
            None => problems.push("missing participating_computes".to_string()),
            Some(list) if list.is_empty() => {
                problems.push("participating_computes is empty".to_string())
            }
            Some(list) => {
                let mut seen = BTreeSet::new();
                for (index, compute) in list.into_iter().enumerate() {
                    let hostname = compute.compute_node_hostname.unwrap_or_default();
                    let hostname = hostname.trim();
                    if hostname.is_empty() {
                        problems.push(format!("participating compute {} has no hostname", index));
                    } else if !HOSTNAME.is_match(hostname) {
                        problems.push(format!("invalid hostname '{}'", hostname));
                    } else if !seen.insert(hostname.to_string()) {
                        problems.push(format!("host '{}' is listed more than once", hostname));
                    } else {
                        computes.push(Compute {
                            alias: compute.compute_node_alias.unwrap_or_default(),
                            hostname: hostname.to_string(),
                        });
                    }
                }
            }
        }

        for problem in &problems {
            error!("Invalid payload: {}", problem);
        }
        ensure!(
            problems.is_empty(),
            error::InvalidRequestSnafu {
                problems: problems.join("; ")
            }
        );

        if let Some(declared) = payload.num_participating_computes {
            if declared != computes.len() as u64 {
                warn!(
                    "Payload declares {} participating computes but lists {}",
                    declared,
                    computes.len()
                );
            }
        }

        Ok(Self {
            network_types,
            computes,
        })
    }
}

mod error {
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(crate)))]
    pub(crate) enum Error {
        #[snafu(display("{}", problems))]
        InvalidRequest { problems: String },
    }
}

pub(crate) use error::Error;
type Result<T> = std::result::Result<T, error::Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<ReconfigurationRequest> {
        let payload: Payload = serde_json::from_str(json).unwrap();
        ReconfigurationRequest::try_from(payload)
    }

    #[test]
    fn valid_request_keeps_payload_order() {
        let request = parse(
            r#"{
                "network_types": {
                    "backup": {"bonding_mode": {"current": "lacp", "new": "active-backup"}},
                    "client": {"bonding_mode": {"current": "active-backup", "new": "lacp"}}
                },
                "num_participating_computes": 2,
                "participating_computes": [
                    {"compute_node_alias": "node-1", "compute_node_hostname": "host1.example.com"},
                    {"compute_node_alias": "node-2", "compute_node_hostname": "host2.example.com"}
                ]
            }"#,
        )
        .unwrap();

        let order: Vec<NetworkType> = request.network_types.keys().copied().collect();
        assert_eq!(order, vec![NetworkType::Backup, NetworkType::Client]);
        assert_eq!(
            request.network_types[&NetworkType::Client],
            ModeTransition {
                current: BondingMode::ActiveBackup,
                new: BondingMode::Lacp
            }
        );
        assert_eq!(request.computes.len(), 2);
        assert_eq!(request.computes[1].alias, "node-2");
        assert_eq!(request.computes[1].hostname, "host2.example.com");
    }

    #[test]
    fn every_problem_is_reported() {
        let err = parse(
            r#"{
                "network_types": {
                    "client": {"bonding_mode": {"current": "active-backup"}},
                    "backup": {}
                },
                "participating_computes": [{"compute_node_alias": "node-1"}]
            }"#,
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("missing new bonding mode for client"));
        assert!(message.contains("missing bonding_mode for backup"));
        assert!(message.contains("participating compute 0 has no hostname"));
    }

    #[test]
    fn missing_sections() {
        let message = parse("{}").unwrap_err().to_string();
        assert!(message.contains("missing network_types"));
        assert!(message.contains("missing participating_computes"));

        let message = parse(
            r#"{"network_types": {"client": {"bonding_mode": {"current": "lacp", "new": "lacp"}}},
                "participating_computes": []}"#,
        )
        .unwrap_err()
        .to_string();
        assert_eq!(message, "participating_computes is empty");
    }

    #[test]
    fn unsafe_and_duplicate_hosts() {
        let message = parse(
            r#"{"network_types": {"client": {"bonding_mode": {"current": "lacp", "new": "lacp"}}},
                "participating_computes": [
                    {"compute_node_hostname": "-oProxyCommand=id"},
                    {"compute_node_hostname": "host1"},
                    {"compute_node_hostname": "host1"}
                ]}"#,
        )
        .unwrap_err()
        .to_string();
        assert!(message.contains("invalid hostname '-oProxyCommand=id'"));
        assert!(message.contains("host 'host1' is listed more than once"));
    }

    #[test]
    fn unknown_values_fail_to_deserialize() {
        assert!(serde_json::from_str::<Payload>(
            r#"{"network_types": {"admin": {"bonding_mode": {"current": "lacp", "new": "lacp"}}}}"#
        )
        .is_err());
        assert!(serde_json::from_str::<Payload>(
            r#"{"network_types": {"client": {"bonding_mode": {"current": "lacp", "new": "balance-rr"}}}}"#
        )
        .is_err());
    }
}

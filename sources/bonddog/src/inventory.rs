//! The inventory module describes the cluster: what kind of deployment it is, and which interfaces
//! back each bonded network of each host.
//!
//! The inventory is read from a JSON file:
//!
//! ```json
//! {
//!   "deployment": "oci-exacc",
//!   "hosts": {
//!     "dom0-1.example.com": {
//!       "client": {"bridge": "vmbondeth0", "bond_master": "bondeth0", "bond_slaves": "eth1 eth2"},
//!       "backup": {"bridge": "vmbondeth1", "bond_master": "bondeth1", "bond_slaves": ["eth3", "eth4"]}
//!     }
//!   }
//! }
//! ```

use crate::bonding::NetworkType;
use crate::interface_name::InterfaceName;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use snafu::ResultExt;
use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::fs;
use std::path::Path;

/// The kind of cloud deployment a cluster belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) enum Deployment {
    /// Exadata Cloud@Customer managed from OCI, the only deployment with reconfigurable bonding
    OciExacc,
    Exacc,
    Exacs,
    #[serde(other)]
    Other,
}

impl Display for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Deployment::OciExacc => write!(f, "oci-exacc"),
            Deployment::Exacc => write!(f, "exacc"),
            Deployment::Exacs => write!(f, "exacs"),
            Deployment::Other => write!(f, "unknown"),
        }
    }
}

/// The interfaces backing one bonded network.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub(crate) struct NetworkInterfaces {
    pub(crate) bridge: InterfaceName,
    pub(crate) bond_master: InterfaceName,
    #[serde(deserialize_with = "deserialize_slaves")]
    pub(crate) bond_slaves: Vec<InterfaceName>,
}

/// Slaves are listed either as a JSON array or as one whitespace-separated string.
fn deserialize_slaves<'de, D>(deserializer: D) -> std::result::Result<Vec<InterfaceName>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Slaves {
        List(Vec<String>),
        Joined(String),
    }

    let names = match Slaves::deserialize(deserializer)? {
        Slaves::List(names) => names,
        Slaves::Joined(joined) => joined.split_whitespace().map(str::to_string).collect(),
    };
    if names.is_empty() {
        return Err(D::Error::custom("bond_slaves must name at least one interface"));
    }
    names
        .into_iter()
        .map(|name| InterfaceName::try_from(name).map_err(D::Error::custom))
        .collect()
}

/// The bonded networks configured on one host.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(transparent)]
pub(crate) struct HostNetworkInterfaces {
    networks: BTreeMap<NetworkType, NetworkInterfaces>,
}

impl HostNetworkInterfaces {
    pub(crate) fn get(&self, network_type: NetworkType) -> Option<&NetworkInterfaces> {
        self.networks.get(&network_type)
    }

    /// Finds a slave interface claimed by two of the given networks, returning it with both network
    /// types in the order given.  Networks the host does not have are skipped.
    pub(crate) fn slave_collision<I>(
        &self,
        network_types: I,
    ) -> Option<(InterfaceName, NetworkType, NetworkType)>
    where
        I: IntoIterator<Item = NetworkType>,
    {
        let mut owners: BTreeMap<&InterfaceName, NetworkType> = BTreeMap::new();
        for network_type in network_types {
            let interfaces = match self.networks.get(&network_type) {
                Some(interfaces) => interfaces,
                None => continue,
            };
            for slave in &interfaces.bond_slaves {
                match owners.get(slave) {
                    Some(owner) if *owner != network_type => {
                        return Some((slave.clone(), *owner, network_type))
                    }
                    _ => {
                        owners.insert(slave, network_type);
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
impl HostNetworkInterfaces {
    pub(crate) fn insert(&mut self, network_type: NetworkType, interfaces: NetworkInterfaces) {
        self.networks.insert(network_type, interfaces);
    }
}

/// The cluster topology the controller consults before touching any host.
pub(crate) trait Cluster: Send + Sync {
    fn deployment(&self) -> Deployment;

    /// Returns `None` for hosts that are not part of the cluster.
    fn host_interfaces(&self, host: &str) -> Option<HostNetworkInterfaces>;
}

/// A cluster topology loaded from a JSON file.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Inventory {
    deployment: Deployment,
    hosts: BTreeMap<String, HostNetworkInterfaces>,
}

impl Inventory {
    pub(crate) fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path).context(error::InventoryReadSnafu { path })?;
        let inventory: Inventory =
            serde_json::from_str(&s).context(error::InventoryParseSnafu { path })?;
        Ok(inventory)
    }
}

impl Cluster for Inventory {
    fn deployment(&self) -> Deployment {
        self.deployment
    }

    fn host_interfaces(&self, host: &str) -> Option<HostNetworkInterfaces> {
        self.hosts.get(host).cloned()
    }
}

mod error {
    use snafu::Snafu;
    use std::path::PathBuf;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(crate)))]
    pub(crate) enum Error {
        #[snafu(display("Failed to parse inventory {}: {}", path.display(), source))]
        InventoryParse {
            path: PathBuf,
            source: serde_json::Error,
        },

        #[snafu(display("Failed to read inventory {}: {}", path.display(), source))]
        InventoryRead {
            path: PathBuf,
            source: std::io::Error,
        },
    }
}

pub(crate) use error::Error;
type Result<T> = std::result::Result<T, error::Error>;

//! The bonding module contains the types describing bonded networks and the kernel bonding options
//! written for each supported mode.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// A customer-facing bonded network on a hypervisor host.  The hypervisor's own admin network is
/// never a valid target.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) enum NetworkType {
    Client,
    Backup,
    Dr,
}

impl Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkType::Client => write!(f, "client"),
            NetworkType::Backup => write!(f, "backup"),
            NetworkType::Dr => write!(f, "dr"),
        }
    }
}

// Only modes 1 (active-backup) and 4 (802.3ad) are used on these networks
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) enum BondingMode {
    ActiveBackup,
    Lacp,
}

impl BondingMode {
    /// The text the kernel prints in `/proc/net/bonding/<master>` when the bond runs in this mode.
    pub(crate) fn proc_signature(&self) -> &'static str {
        match self {
            BondingMode::ActiveBackup => "active-backup",
            BondingMode::Lacp => "802.3ad Dynamic link aggregation",
        }
    }

    /// The bonding driver options an interface must be configured with to run in this mode.
    pub(crate) fn options(&self) -> BondingOptions {
        match self {
            BondingMode::ActiveBackup => BondingOptions {
                mode: *self,
                monitoring: MiiMonitoringConfig {
                    frequency: 100,
                    downdelay: 2000,
                    updelay: 5000,
                },
                mode_options: ModeOptions::ActiveBackup { num_grat_arp: 100 },
            },
            BondingMode::Lacp => BondingOptions {
                mode: *self,
                monitoring: MiiMonitoringConfig {
                    frequency: 100,
                    downdelay: 200,
                    updelay: 200,
                },
                mode_options: ModeOptions::Lacp {
                    lacp_rate: LacpRate::Fast,
                    xmit_hash_policy: XmitHashPolicy::Layer3Plus4,
                },
            },
        }
    }

    fn driver_name(&self) -> &'static str {
        match self {
            BondingMode::ActiveBackup => "active-backup",
            BondingMode::Lacp => "802.3ad",
        }
    }
}

impl Display for BondingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BondingMode::ActiveBackup => write!(f, "active-backup"),
            BondingMode::Lacp => write!(f, "lacp"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct MiiMonitoringConfig {
    pub(crate) frequency: u32,
    pub(crate) downdelay: u32,
    pub(crate) updelay: u32,
}

// Only the fast (1s) LACPDU rate is used, eventually slow could be added
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum LacpRate {
    Fast,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum XmitHashPolicy {
    Layer3Plus4,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ModeOptions {
    ActiveBackup {
        num_grat_arp: u32,
    },
    Lacp {
        lacp_rate: LacpRate,
        xmit_hash_policy: XmitHashPolicy,
    },
}

/// The full set of options handed to the bonding driver, rendered in the order the host images
/// expect to find them in `BONDING_OPTS`.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct BondingOptions {
    pub(crate) mode: BondingMode,
    pub(crate) monitoring: MiiMonitoringConfig,
    pub(crate) mode_options: ModeOptions,
}

impl Display for BondingOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mode={} miimon={} downdelay={} updelay={}",
            self.mode.driver_name(),
            self.monitoring.frequency,
            self.monitoring.downdelay,
            self.monitoring.updelay
        )?;
        match &self.mode_options {
            ModeOptions::ActiveBackup { num_grat_arp } => write!(f, " num_grat_arp={}", num_grat_arp),
            ModeOptions::Lacp {
                lacp_rate,
                xmit_hash_policy,
            } => {
                let rate = match lacp_rate {
                    LacpRate::Fast => 1,
                };
                let policy = match xmit_hash_policy {
                    XmitHashPolicy::Layer3Plus4 => "layer3+4",
                };
                write!(f, " lacp_rate={} xmit_hash_policy={}", rate, policy)
            }
        }
    }
}

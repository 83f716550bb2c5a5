//! A unit is the work done for one network type on one host.  The validator and modifier both
//! operate on a `BondingUnitContext` through a `Session`, which pairs it with the remote host.

pub(crate) mod modifier;
pub(crate) mod validator;

use crate::bonding::{BondingMode, NetworkType};
use crate::error::ErrorCode;
use crate::interface_name::InterfaceName;
use crate::inventory::NetworkInterfaces;
use crate::remote::{CommandOutput, RemoteExec};
use crate::request::{Compute, ModeTransition};
use log::info;
pub(crate) use modifier::Modifier;
use snafu::{ensure, ResultExt};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
pub(crate) use validator::Validator;

const PROC_BONDING_DIR: &str = "/proc/net/bonding";
const NETWORK_SCRIPTS_DIR: &str = "/etc/sysconfig/network-scripts";
const BRIDGE_METADATA_DIR: &str = "/etc/exadata/ovm/bridge.conf.d";

/// Everything needed to work on one bonded network of one host.  Built once per unit and never
/// changed afterwards.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct BondingUnitContext {
    pub(crate) host: String,
    pub(crate) network_type: NetworkType,
    pub(crate) current_mode: BondingMode,
    pub(crate) new_mode: BondingMode,
    pub(crate) master: InterfaceName,
    pub(crate) slaves: Vec<InterfaceName>,
    pub(crate) bridge: InterfaceName,
    pub(crate) backup_dir: PathBuf,
}

impl BondingUnitContext {
    pub(crate) fn new<P>(
        compute: &Compute,
        network_type: NetworkType,
        transition: ModeTransition,
        interfaces: &NetworkInterfaces,
        backup_dir: P,
    ) -> Self
    where
        P: Into<PathBuf>,
    {
        Self {
            host: compute.hostname.clone(),
            network_type,
            current_mode: transition.current,
            new_mode: transition.new,
            master: interfaces.bond_master.clone(),
            slaves: interfaces.bond_slaves.clone(),
            bridge: interfaces.bridge.clone(),
            backup_dir: backup_dir.into(),
        }
    }

    pub(crate) fn is_noop(&self) -> bool {
        self.current_mode == self.new_mode
    }

    /// The kernel's runtime view of the bond.
    pub(crate) fn proc_path(&self) -> PathBuf {
        Path::new(PROC_BONDING_DIR).join(&*self.master)
    }

    /// The network script configuring the bond.
    pub(crate) fn ifcfg_path(&self) -> PathBuf {
        Path::new(NETWORK_SCRIPTS_DIR).join(format!("ifcfg-{}", self.master))
    }

    /// A shell glob matching every bridge descriptor that mentions the bond.
    pub(crate) fn bridge_metadata_glob(&self) -> String {
        format!("{}/*{}*", BRIDGE_METADATA_DIR, self.master)
    }
}

/// Knobs shared by every unit of an operation.
#[derive(Clone, Debug)]
pub(crate) struct UnitSettings {
    /// Time given to an interface after each `ifdown`/`ifup`
    pub(crate) settle_delay: Duration,
}

/// What the controller asks of each unit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Operation {
    Validation,
    Modification,
}

impl Operation {
    pub(crate) fn parse(operation: &str) -> Option<Self> {
        match operation {
            "validation" => Some(Operation::Validation),
            "modification" => Some(Operation::Modification),
            _ => None,
        }
    }

    /// Runs the operation for one unit, returning the success message.
    pub(crate) fn perform(&self, session: &Session<'_>) -> Result<String> {
        match self {
            Operation::Validation => Validator::new(session).perform_operation(),
            Operation::Modification => Modifier::new(session).perform_operation(),
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Validation => write!(f, "validation"),
            Operation::Modification => write!(f, "modification"),
        }
    }
}

/// A unit's context paired with access to its host.
pub(crate) struct Session<'a> {
    pub(crate) context: &'a BondingUnitContext,
    remote: &'a dyn RemoteExec,
    settings: &'a UnitSettings,
}

impl<'a> Session<'a> {
    pub(crate) fn new(
        context: &'a BondingUnitContext,
        remote: &'a dyn RemoteExec,
        settings: &'a UnitSettings,
    ) -> Self {
        Self {
            context,
            remote,
            settings,
        }
    }

    /// Runs `command` on the unit's host.  Failing to reach the host is reported with `code`.
    pub(crate) fn execute(&self, command: &str, code: ErrorCode) -> Result<CommandOutput> {
        self.remote
            .execute(&self.context.host, command)
            .context(error::RemoteSnafu { code })
    }

    pub(crate) fn read_file(&self, path: &Path) -> std::result::Result<String, crate::remote::Error> {
        self.remote.read_file(&self.context.host, path)
    }

    pub(crate) fn write_file(
        &self,
        path: &Path,
        contents: &str,
    ) -> std::result::Result<(), crate::remote::Error> {
        self.remote.write_file(&self.context.host, path, contents)
    }

    fn settle(&self) {
        if !self.settings.settle_delay.is_zero() {
            thread::sleep(self.settings.settle_delay);
        }
    }

    /// Takes the bond down and back up, waiting for it to settle after each step.  Failures are
    /// reported with the caller's `code`.
    pub(crate) fn bump_interface(&self, code: ErrorCode) -> Result<()> {
        let host = &self.context.host;
        let master = &self.context.master;
        info!("Bumping bonded interface {} on host {}", master, host);

        let down = self.execute(&format!("ifdown {}", master), code)?;
        ensure!(
            down.success(),
            error::InterfaceDownSnafu {
                interface: master.to_string(),
                host,
                code
            }
        );
        self.settle();

        let up = self.execute(&format!("ifup {}", master), code)?;
        ensure!(
            up.success(),
            error::InterfaceUpSnafu {
                interface: master.to_string(),
                host,
                code
            }
        );
        self.settle();
        Ok(())
    }
}

mod error {
    use crate::bonding::{BondingMode, NetworkType};
    use crate::error::ErrorCode;
    use snafu::Snafu;
    use std::path::PathBuf;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(crate)))]
    pub(crate) enum Error {
        // Validation failures
        #[snafu(display(
            "Bonding config is incorrect for {} network on {}, expected {} mode; check the file {} on the host and retry",
            network_type,
            host,
            mode,
            path.display()
        ))]
        ConfigMismatch {
            network_type: NetworkType,
            host: String,
            mode: BondingMode,
            path: PathBuf,
        },

        #[snafu(display(
            "LACPDU packets seen on {} of the {} network on host {}; check the switch configuration and retry",
            slaves,
            network_type,
            host
        ))]
        LacpduSeen {
            slaves: String,
            network_type: NetworkType,
            host: String,
        },

        #[snafu(display("Failed to validate bonding mode on {}", host))]
        ChurnCheck { host: String },

        #[snafu(display("LACP bonds currently in negotiation state; retry later"))]
        Negotiating { network_type: NetworkType, host: String },

        #[snafu(display(
            "LACP bonds in churned state; check switch configuration for {} on {}",
            network_type,
            host
        ))]
        Churned { network_type: NetworkType, host: String },

        #[snafu(display("Failed to check state of physical interfaces on {}", host))]
        LinkCheck { host: String },

        #[snafu(display(
            "Waiting for physical interfaces of {} network to be up on {} ({} not up)",
            network_type,
            host,
            slaves
        ))]
        LinksDown {
            network_type: NetworkType,
            host: String,
            slaves: String,
        },

        // Modification failures
        #[snafu(display("Failed to create backup dir {} on {}: {}", dir.display(), host, stderr))]
        BackupDir {
            dir: PathBuf,
            host: String,
            stderr: String,
        },

        #[snafu(display("Failed to take backup of {} on {}: {}", path.display(), host, stderr))]
        BackupConfig {
            path: PathBuf,
            host: String,
            stderr: String,
        },

        #[snafu(display("Failed to take backup of {} bridge metadata on {}: {}", network_type, host, stderr))]
        BackupMetadata {
            network_type: NetworkType,
            host: String,
            stderr: String,
        },

        #[snafu(display("Couldn't update {} on {}: {}", path.display(), host, source))]
        UpdateConfig {
            path: PathBuf,
            host: String,
            source: crate::remote::Error,
        },

        #[snafu(display("Failed to retrieve {} bridge files on {}", network_type, host))]
        ListBridgeFiles { network_type: NetworkType, host: String },

        #[snafu(display("Couldn't update bridge file {} on {}: {}", path.display(), host, source))]
        UpdateBridgeFile {
            path: PathBuf,
            host: String,
            source: crate::remote::Error,
        },

        #[snafu(display("Couldn't update bridge file {} on {}: {}", path.display(), host, source))]
        RewriteBridgeFile {
            path: PathBuf,
            host: String,
            source: crate::bridge_conf::Error,
        },

        // Shared by both components
        #[snafu(display("Failed to bring down the interface {} on host {}", interface, host))]
        InterfaceDown {
            interface: String,
            host: String,
            code: ErrorCode,
        },

        #[snafu(display("Failed to bring up the interface {} on host {}", interface, host))]
        InterfaceUp {
            interface: String,
            host: String,
            code: ErrorCode,
        },

        #[snafu(display("{}", source))]
        Remote {
            source: crate::remote::Error,
            code: ErrorCode,
        },

        #[snafu(display("Work on {} did not complete: {}", host, source))]
        Worker {
            host: String,
            source: tokio::task::JoinError,
            code: ErrorCode,
        },
    }
}

pub(crate) use error::Error;
pub(crate) type Result<T> = std::result::Result<T, error::Error>;

impl Error {
    /// The code reported for this failure.
    pub(crate) fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigMismatch { .. }
            | Error::LacpduSeen { .. }
            | Error::ChurnCheck { .. }
            | Error::Negotiating { .. }
            | Error::Churned { .. }
            | Error::LinkCheck { .. }
            | Error::LinksDown { .. } => ErrorCode::ValidationFailed,
            Error::BackupDir { .. }
            | Error::BackupConfig { .. }
            | Error::BackupMetadata { .. }
            | Error::UpdateConfig { .. }
            | Error::ListBridgeFiles { .. }
            | Error::UpdateBridgeFile { .. }
            | Error::RewriteBridgeFile { .. } => ErrorCode::ModifyFailed,
            Error::InterfaceDown { code, .. }
            | Error::InterfaceUp { code, .. }
            | Error::Remote { code, .. }
            | Error::Worker { code, .. } => *code,
        }
    }

    /// Whether the failure describes a state that settles by itself, so checking again later may
    /// succeed.
    pub(crate) fn is_retryable(&self) -> bool {
        matches!(self, Error::Negotiating { .. } | Error::LinksDown { .. })
    }
}

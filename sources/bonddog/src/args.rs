use argh::FromArgs;
use log::LevelFilter;
use std::path::PathBuf;

/// Validates or changes the bonding mode of bonded networks across a cluster's hosts.
#[derive(FromArgs, Debug, PartialEq)]
pub(crate) struct Arguments {
    /// path to the TOML config file [default: /etc/bonddog.toml]
    #[argh(option, short = 'c')]
    pub(crate) config: Option<PathBuf>,
    /// log-level trace|debug|info|warn|error
    #[argh(option, default = "LevelFilter::Info", short = 'l')]
    pub(crate) log_level: LevelFilter,
    /// path to the JSON request payload
    #[argh(option, short = 'p')]
    pub(crate) payload: PathBuf,
    /// path to the JSON cluster inventory
    #[argh(option, short = 'i')]
    pub(crate) inventory: PathBuf,
    /// identifier of this job, used to name the backup directory on each host
    #[argh(option, short = 's')]
    pub(crate) scope_id: String,
    /// write the result document here instead of printing it
    #[argh(option, short = 'o')]
    pub(crate) output: Option<PathBuf>,
    /// the operation to run: validation or modification
    #[argh(positional)]
    pub(crate) operation: String,
}

#![deny(unused_imports)]

/*!
# Introduction

bonddog validates or changes the bonding mode of the bonded networks on a set of Exadata
Cloud@Customer compute hosts.  Each bonded network (`client`, `backup` or `dr`) runs either in
`active-backup` mode or in `lacp` (802.3ad link aggregation) mode.  A request names the networks, the
mode each one runs in now and the mode it should run in, and the hosts to work on.

Two operations are supported:
* `validation`: read-only checks that each bond runs in its new mode, that its physical links are up,
  and that the switch agrees: LACP negotiation has finished, or no LACPDUs arrive on an active-backup
  bond.
* `modification`: backs up the bond's network script and bridge descriptors below
  `<backup-root>/<scope-id>`, rewrites them for the new mode, and restarts the bond and its bridge.

Hosts are reached over `ssh` and are worked on concurrently; the networks of one host are handled one
at a time.  The outcome of every (host, network) pair is reported in a single JSON result document,
printed on stdout or written to `--output`.  A request refused before any host is touched also yields
a result document, with an error code and no hosts.

# Inputs

The request payload:

```json
{
  "network_types": {
    "client": {"bonding_mode": {"current": "active-backup", "new": "lacp"}}
  },
  "num_participating_computes": 1,
  "participating_computes": [
    {"compute_node_alias": "node-1", "compute_node_hostname": "host1.example.com"}
  ]
}
```

The cluster inventory, describing the deployment and the interfaces of each host:

```json
{
  "deployment": "oci-exacc",
  "hosts": {
    "host1.example.com": {
      "client": {"bridge": "vmbondeth0", "bond_master": "bondeth0", "bond_slaves": "eth1 eth2"}
    }
  }
}
```

# Configuration

Configuration is read from `/etc/bonddog.toml` if it exists, or from the file given with `--config`:

```toml
# per-job backups are kept below this directory on each host
backup-root = "/opt/exacloud/nw_bonding"
# how many hosts are worked on at once
max-parallel-hosts = 4
# seconds to wait after each ifdown/ifup
settle-delay-secs = 5

[ssh]
binary = "/usr/bin/ssh"
user = "root"
connect-timeout-secs = 30
options = ["-o", "StrictHostKeyChecking=no"]

[validation]
# how often a validation that found LACP still negotiating, or links still down, is repeated
retries = 0
retry-interval-secs = 30
```

# Usage

```sh
bonddog validation --payload request.json --inventory inventory.json --scope-id job-1
```

bonddog exits with status 0 when the operation ran, even if some hosts failed; the result document
tells which.  It exits with status 1 when the request was refused or bonddog itself failed.
*/

mod args;
mod bonding;
mod bridge_conf;
mod config;
mod controller;
mod error;
mod ifcfg;
mod interface_name;
mod inventory;
#[cfg(test)]
mod main_test;
mod proc_bonding;
mod remote;
mod report;
mod request;
#[cfg(test)]
mod test_util;
mod unit;

use crate::args::Arguments;
use crate::config::Config;
use crate::controller::Controller;
use crate::error::Result;
use crate::inventory::Inventory;
use crate::remote::{RemoteExec, ScopeId, SshExec};
use crate::report::{FileSink, OperationResult, ResultSink, StreamSink};
use crate::request::Payload;
use log::{debug, error, info};
use simplelog::{Config as LogConfig, WriteLogger};
use snafu::ResultExt;
use std::fs;
use std::path::Path;
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ! {
    let args: Arguments = argh::from_env();
    process::exit(match run(args).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("{}", err);
            1
        }
    })
}

async fn run(args: Arguments) -> Result<()> {
    // stdout may carry the result document, so every log level goes to stderr.
    WriteLogger::init(args.log_level, LogConfig::default(), std::io::stderr())
        .context(error::LoggerSnafu)?;

    let config = match &args.config {
        None => Config::new()?,
        Some(filepath) => Config::from_file(filepath)?,
    };
    let remote = Arc::new(SshExec::new(config.ssh.clone()));
    let sink: Box<dyn ResultSink> = match &args.output {
        Some(path) => Box::new(FileSink::new(path)),
        None => Box::new(StreamSink::stdout()),
    };

    main_inner(args, &config, remote, sink.as_ref()).await
}

/// pub(crate) for testing.
pub(crate) async fn main_inner(
    arguments: Arguments,
    config: &Config,
    remote: Arc<dyn RemoteExec>,
    sink: &dyn ResultSink,
) -> Result<()> {
    match reconfigure(&arguments, config, remote, sink).await {
        Ok(result) => {
            if !result.is_success() {
                info!("Some units failed; see the result document for details");
            }
            Ok(())
        }
        Err(err) => {
            // Callers expect a result document for every refused request
            if let Some(code) = err.code() {
                let rejected = OperationResult::rejected(code, err.to_string());
                if let Err(e) = sink.record(&rejected) {
                    error!("Unable to record rejected request: {}", e);
                }
            }
            Err(err)
        }
    }
}

async fn reconfigure(
    arguments: &Arguments,
    config: &Config,
    remote: Arc<dyn RemoteExec>,
    sink: &dyn ResultSink,
) -> Result<OperationResult> {
    let payload = load_payload(&arguments.payload)?;
    let scope = ScopeId::try_from(arguments.scope_id.as_str()).context(error::ScopeIdSnafu)?;
    let inventory = Inventory::from_file(&arguments.inventory).context(error::InventorySnafu)?;

    let controller = Controller::new(payload, &inventory, remote, config, &scope)?;
    controller.apply(&arguments.operation, sink).await
}

fn load_payload(path: &Path) -> Result<Payload> {
    let contents = fs::read_to_string(path).context(error::PayloadReadSnafu { path })?;
    debug!("Request payload: {}", contents.trim());
    serde_json::from_str(&contents).context(error::PayloadParseSnafu { path })
}

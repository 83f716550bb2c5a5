//! The controller checks a reconfiguration request against the cluster, then runs the requested
//! operation for every (host, network type) unit and gathers the outcomes into one result.
//!
//! Hosts are worked on concurrently, up to a configured limit.  The units of a single host run one
//! after the other, in the order the request lists the network types, so a host never has two of its
//! bonds down at the same time.

use crate::config::{Config, ValidationConfig};
use crate::error::{self, ErrorCode, Result};
use crate::inventory::{Cluster, Deployment};
use crate::remote::{backup_dir, RemoteExec, ScopeId};
use crate::report::{OperationResult, ResultSink, Status};
use crate::request::{Payload, ReconfigurationRequest};
use crate::unit::{self, BondingUnitContext, Operation, Session, UnitSettings};
use log::{debug, error, info, warn};
use snafu::{ensure, OptionExt, ResultExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;

/// The outcome of one unit, as sent to the aggregator.
#[derive(Debug)]
struct UnitOutcome {
    host: usize,
    /// Position of the network type in the request
    network: usize,
    context: Arc<BondingUnitContext>,
    result: unit::Result<String>,
}

/// The units of one host, in processing order.
#[derive(Debug, Clone)]
struct HostPlan {
    index: usize,
    hostname: String,
    units: Vec<Arc<BondingUnitContext>>,
}

pub(crate) struct Controller {
    plans: Vec<HostPlan>,
    result: OperationResult,
    remote: Arc<dyn RemoteExec>,
    settings: Arc<UnitSettings>,
    validation: ValidationConfig,
    max_parallel_hosts: usize,
}

impl Controller {
    /// Checks the request and the cluster, and builds the context of every unit.  Nothing is run on
    /// any host yet.
    pub(crate) fn new(
        payload: Payload,
        cluster: &dyn Cluster,
        remote: Arc<dyn RemoteExec>,
        config: &Config,
        scope: &ScopeId,
    ) -> Result<Self> {
        let deployment = cluster.deployment();
        ensure!(
            deployment == Deployment::OciExacc,
            error::UnsupportedDeploymentSnafu {
                deployment: deployment.to_string()
            }
        );

        let request = ReconfigurationRequest::try_from(payload).context(error::RequestSnafu)?;
        let backup_dir = backup_dir(&config.backup_root, scope);

        let mut plans = Vec::with_capacity(request.computes.len());
        for (index, compute) in request.computes.iter().enumerate() {
            let interfaces = cluster
                .host_interfaces(&compute.hostname)
                .context(error::UnknownHostSnafu {
                    host: &compute.hostname,
                })?;

            if let Some((slave, first, second)) =
                interfaces.slave_collision(request.network_types.keys().copied())
            {
                return error::SlaveCollisionSnafu {
                    host: &compute.hostname,
                    slave,
                    first,
                    second,
                }
                .fail();
            }

            let mut units = Vec::with_capacity(request.network_types.len());
            for (network_type, transition) in &request.network_types {
                let network = interfaces
                    .get(*network_type)
                    .context(error::MissingNetworkSnafu {
                        host: &compute.hostname,
                        network_type: *network_type,
                    })?;
                units.push(Arc::new(BondingUnitContext::new(
                    compute,
                    *network_type,
                    *transition,
                    network,
                    &backup_dir,
                )));
            }
            plans.push(HostPlan {
                index,
                hostname: compute.hostname.clone(),
                units,
            });
        }

        Ok(Self {
            plans,
            result: OperationResult::new(&request),
            remote,
            settings: Arc::new(UnitSettings {
                settle_delay: config.settle_delay(),
            }),
            validation: config.validation.clone(),
            max_parallel_hosts: config.max_parallel_hosts.max(1),
        })
    }

    /// Runs `operation` on every unit and delivers the result document to `sink`.  An operation
    /// that is not recognized is rejected before any host is touched.
    pub(crate) async fn apply(self, operation: &str, sink: &dyn ResultSink) -> Result<OperationResult> {
        let operation = Operation::parse(operation).context(error::UnsupportedOperationSnafu {
            operation,
        })?;

        info!(
            "========== Starting network bonding {} on {} host(s) ==========",
            operation,
            self.plans.len()
        );
        let result = self.run(operation).await;
        info!(
            "========== Network bonding {} finished: {} ==========",
            operation,
            if result.is_success() { "SUCCESS" } else { "FAILURE" }
        );

        sink.record(&result).context(error::SinkSnafu)?;
        Ok(result)
    }

    async fn run(self, operation: Operation) -> OperationResult {
        let (tx, rx) = mpsc::channel(self.plans.iter().map(|p| p.units.len()).sum::<usize>().max(1));
        let aggregator = tokio::spawn(aggregate(self.result, operation, rx));

        let permits = Arc::new(Semaphore::new(self.max_parallel_hosts));
        let mut hosts = JoinSet::new();
        for plan in self.plans {
            let worker = HostWorker {
                operation,
                remote: Arc::clone(&self.remote),
                settings: Arc::clone(&self.settings),
                validation: self.validation.clone(),
                tx: tx.clone(),
            };
            let permits = Arc::clone(&permits);
            hosts.spawn(async move {
                // The semaphore is never closed
                if let Ok(_permit) = permits.acquire_owned().await {
                    worker.run(plan).await;
                }
            });
        }
        // Only the host workers hold senders now, so the aggregator stops once they are all done
        drop(tx);

        while let Some(joined) = hosts.join_next().await {
            if let Err(e) = joined {
                error!("Host worker did not complete: {}", e);
            }
        }

        match aggregator.await {
            Ok(result) => result,
            Err(e) => {
                error!("Result aggregation did not complete: {}", e);
                OperationResult::rejected(operation_code(operation), e.to_string())
            }
        }
    }
}

/// The code reported for unit failures that carry none of their own.
fn operation_code(operation: Operation) -> ErrorCode {
    match operation {
        Operation::Validation => ErrorCode::ValidationFailed,
        Operation::Modification => ErrorCode::ModifyFailed,
    }
}

/// Everything a host task needs; cheap to clone into each task.
struct HostWorker {
    operation: Operation,
    remote: Arc<dyn RemoteExec>,
    settings: Arc<UnitSettings>,
    validation: ValidationConfig,
    tx: mpsc::Sender<UnitOutcome>,
}

impl HostWorker {
    async fn run(self, plan: HostPlan) {
        debug!("Working on host {}", plan.hostname);
        for (network, context) in plan.units.into_iter().enumerate() {
            let result = self.run_unit(Arc::clone(&context)).await;
            let outcome = UnitOutcome {
                host: plan.index,
                network,
                context,
                result,
            };
            if self.tx.send(outcome).await.is_err() {
                warn!("Result aggregator stopped; abandoning host {}", plan.hostname);
                return;
            }
        }
    }

    /// Runs the unit on the blocking pool.  Validation failures that describe a transient state are
    /// retried when configured to.
    async fn run_unit(&self, context: Arc<BondingUnitContext>) -> unit::Result<String> {
        let retries = match self.operation {
            Operation::Validation => self.validation.retries,
            Operation::Modification => 0,
        };
        let strategy = FixedInterval::new(self.validation.retry_interval()).take(retries);

        RetryIf::start(
            strategy,
            || {
                let context = Arc::clone(&context);
                let remote = Arc::clone(&self.remote);
                let settings = Arc::clone(&self.settings);
                let operation = self.operation;
                async move {
                    let host = context.host.clone();
                    tokio::task::spawn_blocking(move || {
                        let session = Session::new(&context, remote.as_ref(), &settings);
                        operation.perform(&session)
                    })
                    .await
                    .unwrap_or_else(|source| {
                        Err(unit::Error::Worker {
                            host,
                            source,
                            code: operation_code(operation),
                        })
                    })
                }
            },
            |e: &unit::Error| {
                let retry = e.is_retryable();
                if retry {
                    info!(
                        "{} of {} network on {} will be retried: {}",
                        self.operation, context.network_type, context.host, e
                    );
                }
                retry
            },
        )
        .await
    }
}

/// Owns the result document while units report in.  Returns it, finished, once every sender is gone.
async fn aggregate(
    mut result: OperationResult,
    operation: Operation,
    mut rx: mpsc::Receiver<UnitOutcome>,
) -> OperationResult {
    // Keyed by request order, so the first entry is the first failure
    let mut failures: BTreeMap<(usize, usize), (ErrorCode, String)> = BTreeMap::new();

    while let Some(outcome) = rx.recv().await {
        let context = &outcome.context;
        match outcome.result {
            Ok(msg) => {
                info!(
                    "{} of {} network on {} succeeded: {}",
                    operation, context.network_type, context.host, msg
                );
                result.set_unit(outcome.host, context.network_type, Status::Success, msg);
            }
            Err(e) => {
                let msg = e.to_string();
                error!(
                    "{} of {} network on {} failed: {}",
                    operation, context.network_type, context.host, msg
                );
                result.set_unit(outcome.host, context.network_type, Status::Failure, msg.clone());
                failures.insert((outcome.host, outcome.network), (e.code(), msg));
            }
        }
    }

    let first_failure = failures
        .into_iter()
        .next()
        .map(|(_, failure)| failure)
        // A unit that never reported has no error of its own
        .unwrap_or_else(|| {
            (
                operation_code(operation),
                format!("Network bonding {} did not complete on every host", operation),
            )
        });
    result.finish(Some(first_failure));
    result
}

#[cfg(test)]
#[path = "controller_test.rs"]
mod controller_test;

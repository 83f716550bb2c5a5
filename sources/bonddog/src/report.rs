//! The report module holds the result document of an operation and the sinks it is delivered to.

use crate::bonding::{BondingMode, NetworkType};
use crate::error::ErrorCode;
use crate::request::ReconfigurationRequest;
use indexmap::IndexMap;
use serde::Serialize;
use snafu::ResultExt;
use std::fs;
use std::io::{Stdout, Write};
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum Status {
    Success,
    Failure,
}

/// The outcome of one (host, network type) unit.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub(crate) struct UnitResult {
    /// The mode the unit was asked to reach
    pub(crate) bonding_mode: BondingMode,
    pub(crate) status: Status,
    pub(crate) msg: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub(crate) struct HostResult {
    pub(crate) compute_node_alias: String,
    pub(crate) compute_node_hostname: String,
    pub(crate) network_types: IndexMap<NetworkType, UnitResult>,
}

/// The single document describing how an operation went.  Each unit starts out as a failure with
/// no message, so a unit that never reports back reads as failed.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub(crate) struct OperationResult {
    #[serde(rename = "overallStatus")]
    pub(crate) overall_status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) errorcode: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) msg: Option<String>,
    pub(crate) participating_computes: Vec<HostResult>,
}

impl OperationResult {
    pub(crate) fn new(request: &ReconfigurationRequest) -> Self {
        let participating_computes = request
            .computes
            .iter()
            .map(|compute| HostResult {
                compute_node_alias: compute.alias.clone(),
                compute_node_hostname: compute.hostname.clone(),
                network_types: request
                    .network_types
                    .iter()
                    .map(|(network_type, transition)| {
                        (
                            *network_type,
                            UnitResult {
                                bonding_mode: transition.new,
                                status: Status::Failure,
                                msg: String::new(),
                            },
                        )
                    })
                    .collect(),
            })
            .collect();

        Self {
            overall_status: Status::Failure,
            errorcode: None,
            msg: None,
            participating_computes,
        }
    }

    /// The document for a request refused before any host was touched.
    pub(crate) fn rejected<S>(code: ErrorCode, msg: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            overall_status: Status::Failure,
            errorcode: Some(code),
            msg: Some(msg.into()),
            participating_computes: Vec::new(),
        }
    }

    /// Records the outcome of the unit for the `host`-th participating compute.  Unknown slots are
    /// ignored.
    pub(crate) fn set_unit<S>(&mut self, host: usize, network_type: NetworkType, status: Status, msg: S)
    where
        S: Into<String>,
    {
        if let Some(unit) = self
            .participating_computes
            .get_mut(host)
            .and_then(|h| h.network_types.get_mut(&network_type))
        {
            unit.status = status;
            unit.msg = msg.into();
        }
    }

    /// Computes the overall status once every unit has reported.  `first_failure` is the code and
    /// message of the earliest failed unit in request order.
    pub(crate) fn finish(&mut self, first_failure: Option<(ErrorCode, String)>) {
        let all_succeeded = self
            .participating_computes
            .iter()
            .flat_map(|h| h.network_types.values())
            .all(|unit| unit.status == Status::Success);

        if all_succeeded {
            self.overall_status = Status::Success;
            self.errorcode = None;
            self.msg = None;
        } else {
            self.overall_status = Status::Failure;
            if let Some((code, msg)) = first_failure {
                self.errorcode = Some(code);
                self.msg = Some(msg);
            }
        }
    }

    pub(crate) fn is_success(&self) -> bool {
        self.overall_status == Status::Success
    }

    /// Pretty JSON with object keys sorted.
    pub(crate) fn to_json(&self) -> Result<String> {
        // serde_json's own map is ordered by key
        let value = serde_json::to_value(self).context(error::SerializeSnafu)?;
        serde_json::to_string_pretty(&value).context(error::SerializeSnafu)
    }
}

/// Receives the result document of an operation, exactly once.
pub(crate) trait ResultSink {
    fn record(&self, result: &OperationResult) -> Result<()>;
}

/// Writes the result document to a file, replacing it.
#[derive(Debug, Clone)]
pub(crate) struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub(crate) fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl ResultSink for FileSink {
    fn record(&self, result: &OperationResult) -> Result<()> {
        let mut json = result.to_json()?;
        json.push('\n');
        fs::write(&self.path, json).context(error::WriteSnafu { path: &self.path })
    }
}

/// Prints the result document on a stream, normally stdout.  The document must be the only thing
/// written there, so logging goes to stderr.
pub(crate) struct StreamSink<W> {
    stream: Mutex<W>,
}

impl StreamSink<Stdout> {
    pub(crate) fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> StreamSink<W> {
    pub(crate) fn new(stream: W) -> Self {
        Self {
            stream: Mutex::new(stream),
        }
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> W {
        self.stream
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<W: Write> ResultSink for StreamSink<W> {
    fn record(&self, result: &OperationResult) -> Result<()> {
        let json = result.to_json()?;
        // A panic elsewhere while holding the lock leaves the stream itself usable
        let mut stream = self
            .stream
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writeln!(stream, "{}", json).context(error::StdoutSnafu)?;
        stream.flush().context(error::StdoutSnafu)
    }
}

mod error {
    use snafu::Snafu;
    use std::path::PathBuf;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(crate)))]
    pub(crate) enum Error {
        #[snafu(display("Unable to serialize result: {}", source))]
        Serialize { source: serde_json::Error },

        #[snafu(display("Unable to print result: {}", source))]
        Stdout { source: std::io::Error },

        #[snafu(display("Unable to write result to {}: {}", path.display(), source))]
        Write {
            path: PathBuf,
            source: std::io::Error,
        },
    }
}

pub(crate) use error::Error;
type Result<T> = std::result::Result<T, error::Error>;

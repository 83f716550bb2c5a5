//! Provides the list of errors for `bonddog`, and the error codes reported to callers.

use crate::bonding::NetworkType;
use crate::interface_name::InterfaceName;
use serde::Serialize;
use snafu::Snafu;
use std::fmt::{self, Display};
use std::path::PathBuf;

/// The failure categories a caller can see in a result document.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum ErrorCode {
    InvalidPayload,
    OperationNotSupported,
    ValidationFailed,
    ModifyFailed,
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::InvalidPayload => write!(f, "INVALID_PAYLOAD"),
            ErrorCode::OperationNotSupported => write!(f, "OPERATION_NOT_SUPPORTED"),
            ErrorCode::ValidationFailed => write!(f, "VALIDATION_FAILED"),
            ErrorCode::ModifyFailed => write!(f, "MODIFY_FAILED"),
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub(crate) enum Error {
    #[snafu(display("Failed to parse config file {}: {}", path.display(), source))]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[snafu(display("Failed to read config file {}: {}", path.display(), source))]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to load inventory: {}", source))]
    Inventory { source: crate::inventory::Error },

    #[snafu(display("Logger setup error: {}", source))]
    Logger { source: log::SetLoggerError },

    #[snafu(display("Host '{}' has no {} network in the inventory", host, network_type))]
    MissingNetwork {
        host: String,
        network_type: NetworkType,
    },

    #[snafu(display("Failed to parse payload {}: {}", path.display(), source))]
    PayloadParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display("Failed to read payload {}: {}", path.display(), source))]
    PayloadRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Invalid payload: {}", source))]
    Request { source: crate::request::Error },

    #[snafu(display("{}", source))]
    ScopeId { source: crate::remote::Error },

    #[snafu(display("Unable to record result: {}", source))]
    Sink { source: crate::report::Error },

    #[snafu(display(
        "Interface '{}' on host '{}' is a slave of both the {} and {} networks",
        slave,
        host,
        first,
        second
    ))]
    SlaveCollision {
        host: String,
        slave: InterfaceName,
        first: NetworkType,
        second: NetworkType,
    },

    #[snafu(display("Host '{}' is not part of the cluster", host))]
    UnknownHost { host: String },

    #[snafu(display(
        "Bonding mode changes are not supported for {} deployments",
        deployment
    ))]
    UnsupportedDeployment { deployment: String },

    #[snafu(display("Wrong operation {} identified", operation))]
    UnsupportedOperation { operation: String },
}

impl Error {
    /// The code reported for a rejected request, or `None` for failures of bonddog's own
    /// surroundings, which never produce a result document.
    pub(crate) fn code(&self) -> Option<ErrorCode> {
        match self {
            Error::MissingNetwork { .. }
            | Error::PayloadParse { .. }
            | Error::PayloadRead { .. }
            | Error::Request { .. }
            | Error::ScopeId { .. }
            | Error::SlaveCollision { .. }
            | Error::UnknownHost { .. } => Some(ErrorCode::InvalidPayload),
            Error::UnsupportedDeployment { .. } | Error::UnsupportedOperation { .. } => {
                Some(ErrorCode::OperationNotSupported)
            }
            Error::ConfigParse { .. }
            | Error::ConfigRead { .. }
            | Error::Inventory { .. }
            | Error::Logger { .. }
            | Error::Sink { .. } => None,
        }
    }
}

pub(crate) type Result<T> = std::result::Result<T, Error>;

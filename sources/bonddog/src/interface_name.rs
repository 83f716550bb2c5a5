//! The interface_name module contains the definition of a valid network interface name and the code
//! to support creation of the structure from string.
//!
//! A valid network interface name is defined by the criteria in the linux kernel:
//! https://elixir.bootlin.com/linux/v5.10.102/source/net/core/dev.c#L1138
//!
//! Interface names end up inside shell commands run on remote hosts, so on top of the kernel's rules
//! we only accept characters that have no meaning to a POSIX shell.
use serde::{Deserialize, Serialize, Serializer};
use snafu::ensure;
use std::fmt::Display;
use std::ops::Deref;

/// InterfaceName can only be created from a string that contains a valid network interface name.
/// Validation is handled in the `TryFrom` implementation below.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Deserialize)]
#[serde(try_from = "String")]
pub(crate) struct InterfaceName {
    inner: String,
}

impl TryFrom<String> for InterfaceName {
    type Error = error::Error;

    fn try_from(input: String) -> Result<Self> {
        // IFNAMSIZ is 16 including the trailing NUL
        // https://elixir.bootlin.com/linux/v5.10.102/source/include/uapi/linux/if.h#L33
        ensure!(
            !input.is_empty() && input.len() <= 15,
            error::InvalidNetworkDeviceNameSnafu {
                input,
                msg: "invalid length, must be 1 to 15 characters long"
            }
        );

        // Stricter than the kernel's dev_valid_name(): the name goes into remote command lines as is
        let unsafe_char = input
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '@' | '+')));
        if let Some(c) = unsafe_char {
            return error::InvalidNetworkDeviceNameSnafu {
                msg: format!("contains invalid character {:?}", c),
                input,
            }
            .fail();
        }

        Ok(Self { inner: input })
    }
}

impl TryFrom<&str> for InterfaceName {
    type Error = error::Error;

    fn try_from(input: &str) -> Result<Self> {
        Self::try_from(input.to_string())
    }
}

impl Deref for InterfaceName {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl AsRef<str> for InterfaceName {
    fn as_ref(&self) -> &str {
        &self.inner
    }
}

impl Serialize for InterfaceName {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.inner)
    }
}

impl Display for InterfaceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

mod error {
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(crate)))]
    pub(crate) enum Error {
        #[snafu(display("Invalid network device name '{}': {}", input, msg))]
        InvalidNetworkDeviceName { input: String, msg: String },
    }
}

type Result<T> = std::result::Result<T, error::Error>;

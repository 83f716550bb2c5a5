//! The remote module runs shell commands on hypervisor hosts and moves whole files to and from them.
//!
//! Callers interpret exit codes themselves; `execute` only fails when the host could not be reached
//! at all.

use crate::config::SshConfig;
use log::{debug, trace};
use snafu::{ensure, ResultExt};
use std::borrow::Cow;
use std::fmt::Display;
use std::io::Write;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

/// ssh reserves this exit status for its own failures, e.g. the host refusing the connection
const SSH_CONNECTION_FAILURE: i32 = 255;

/// The exit status and captured output of one remote command.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct CommandOutput {
    pub(crate) exit: i32,
    pub(crate) stdout: String,
    pub(crate) stderr: String,
}

impl CommandOutput {
    pub(crate) fn success(&self) -> bool {
        self.exit == 0
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        CommandOutput {
            exit: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into(),
            stderr: String::from_utf8_lossy(&output.stderr).into(),
        }
    }
}

/// Access to the hosts of the cluster.  Every call is synchronous and opens its own session.
pub(crate) trait RemoteExec: Send + Sync {
    /// Runs `command` through the host's shell.  A non-zero exit code is not an error.
    fn execute(&self, host: &str, command: &str) -> Result<CommandOutput>;

    /// Returns the full contents of `path` on `host`.
    fn read_file(&self, host: &str, path: &Path) -> Result<String> {
        let outcome = self.execute(host, &format!("cat {}", quote_path(path)))?;
        ensure!(
            outcome.success(),
            error::FileReadSnafu {
                host,
                path,
                stderr: outcome.stderr.trim(),
            }
        );
        Ok(outcome.stdout)
    }

    /// Replaces the contents of `path` on `host`.
    fn write_file(&self, host: &str, path: &Path, contents: &str) -> Result<()>;
}

/// Quotes a path for use in a remote shell command.  Paths made only of safe characters are left
/// untouched, so the commands stay byte-for-byte what the host images expect.
pub(crate) fn quote_path(path: &Path) -> Cow<'_, str> {
    match path.to_string_lossy() {
        Cow::Borrowed(s) => shell_words::quote(s),
        Cow::Owned(s) => Cow::Owned(shell_words::quote(&s).into_owned()),
    }
}

/// The identifier of the enclosing job.  It names the directory holding this job's backups, so it
/// must be a single, plain path component.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct ScopeId {
    inner: String,
}

impl TryFrom<String> for ScopeId {
    type Error = error::Error;

    fn try_from(input: String) -> Result<Self> {
        ensure!(
            !input.is_empty() && input != "." && input != "..",
            error::InvalidScopeIdSnafu {
                input,
                msg: "must name a directory"
            }
        );
        ensure!(
            input
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')),
            error::InvalidScopeIdSnafu {
                input,
                msg: "may only contain letters, digits, '-', '_' and '.'"
            }
        );
        Ok(Self { inner: input })
    }
}

impl TryFrom<&str> for ScopeId {
    type Error = error::Error;

    fn try_from(input: &str) -> Result<Self> {
        Self::try_from(input.to_string())
    }
}

impl Deref for ScopeId {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Display for ScopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

/// Where configuration touched by the job identified by `scope` is backed up on each host.
pub(crate) fn backup_dir<P>(root: P, scope: &ScopeId) -> PathBuf
where
    P: AsRef<Path>,
{
    root.as_ref().join(&scope.inner)
}

/// Runs commands through the system's ssh client in batch mode, so a missing key fails instead of
/// prompting.
#[derive(Debug, Clone)]
pub(crate) struct SshExec {
    config: SshConfig,
}

impl SshExec {
    pub(crate) fn new(config: SshConfig) -> Self {
        Self { config }
    }

    fn ssh_command(&self, host: &str, remote_command: &str) -> Command {
        let mut command = Command::new(&self.config.binary);
        command
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.config.connect_timeout_secs))
            .args(&self.config.options)
            .arg("-l")
            .arg(&self.config.user)
            .arg(host)
            .arg("--")
            .arg(remote_command);
        command
    }

    fn check_connection(&self, host: &str, outcome: &CommandOutput) -> Result<()> {
        ensure!(
            outcome.exit != SSH_CONNECTION_FAILURE,
            error::ConnectionSnafu {
                host,
                stderr: outcome.stderr.trim(),
            }
        );
        Ok(())
    }
}

impl RemoteExec for SshExec {
    fn execute(&self, host: &str, command: &str) -> Result<CommandOutput> {
        trace!("calling '{}' on '{}'", command, host);
        let outcome: CommandOutput = self
            .ssh_command(host, command)
            .output()
            .context(error::SpawnSnafu { host, command })?
            .into();
        self.check_connection(host, &outcome)?;

        debug!("'{}' on '{}' exited {}", command, host, outcome.exit);
        trace!("stdout: {}", outcome.stdout);
        trace!("stderr: {}", outcome.stderr);
        Ok(outcome)
    }

    fn write_file(&self, host: &str, path: &Path, contents: &str) -> Result<()> {
        let command = format!("cat > {}", quote_path(path));
        trace!("calling '{}' on '{}'", command, host);
        let mut child = self
            .ssh_command(host, &command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context(error::SpawnSnafu {
                host,
                command: &command,
            })?;

        // Dropping stdin at the end of this block closes it, which ends the remote `cat`
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(source) = stdin.write_all(contents.as_bytes()) {
                drop(stdin);
                // Reap the child so a failed write does not leave a zombie ssh behind
                let _ = child.kill();
                let _ = child.wait();
                return Err(source).context(error::StdinSnafu { host, path });
            }
        }

        let outcome: CommandOutput = child
            .wait_with_output()
            .context(error::SpawnSnafu { host, command })?
            .into();
        self.check_connection(host, &outcome)?;
        ensure!(
            outcome.success(),
            error::FileWriteSnafu {
                host,
                path,
                stderr: outcome.stderr.trim(),
            }
        );

        debug!("wrote {} bytes to '{}' on '{}'", contents.len(), path.display(), host);
        Ok(())
    }
}

mod error {
    use snafu::Snafu;
    use std::io;
    use std::path::PathBuf;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(crate)))]
    pub(crate) enum Error {
        #[snafu(display("Unable to connect to '{}': {}", host, stderr))]
        Connection { host: String, stderr: String },

        #[snafu(display("Failed to read '{}' on '{}': {}", path.display(), host, stderr))]
        FileRead {
            host: String,
            path: PathBuf,
            stderr: String,
        },

        #[snafu(display("Failed to write '{}' on '{}': {}", path.display(), host, stderr))]
        FileWrite {
            host: String,
            path: PathBuf,
            stderr: String,
        },

        #[snafu(display("Invalid scope id '{}': {}", input, msg))]
        InvalidScopeId { input: String, msg: String },

        #[snafu(display("Failed to run '{}' for '{}': {}", command, host, source))]
        Spawn {
            host: String,
            command: String,
            source: io::Error,
        },

        #[snafu(display("Failed to send '{}' to '{}': {}", path.display(), host, source))]
        Stdin {
            host: String,
            path: PathBuf,
            source: io::Error,
        },
    }
}

pub(crate) use error::Error;
pub(crate) type Result<T> = std::result::Result<T, error::Error>;

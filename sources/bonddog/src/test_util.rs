//! Shared test helpers: a scripted stand-in for the remote hosts and ready-made unit contexts.

use crate::bonding::{BondingMode, NetworkType};
use crate::interface_name::InterfaceName;
use crate::remote::{self, CommandOutput, RemoteExec};
use crate::unit::{BondingUnitContext, UnitSettings};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

pub(crate) const HOST: &str = "dom0.example.com";

struct Rule {
    host: Option<String>,
    pattern: String,
    // The last output is repeated once the others are used up
    outputs: VecDeque<CommandOutput>,
}

/// Answers commands from a script of rules, matched in the order they were added by substring of
/// the command.  Unmatched commands succeed with no output.  Every command is recorded.
#[derive(Default)]
pub(crate) struct FakeRemote {
    rules: Mutex<Vec<Rule>>,
    files: Mutex<BTreeMap<(String, PathBuf), String>>,
    log: Mutex<Vec<(String, String)>>,
    unreachable: Vec<String>,
    unreachable_everywhere: bool,
}

pub(crate) fn output(exit: i32, stdout: &str) -> CommandOutput {
    CommandOutput {
        exit,
        stdout: stdout.to_string(),
        stderr: if exit == 0 {
            String::new()
        } else {
            "command failed".to_string()
        },
    }
}

impl FakeRemote {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn add_rule(self, host: Option<&str>, pattern: &str, outputs: Vec<CommandOutput>) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule {
                host: host.map(str::to_string),
                pattern: pattern.to_string(),
                outputs: outputs.into(),
            });
        }
        self
    }

    /// Commands containing `pattern` exit with `exit` and print `stdout`.
    pub(crate) fn respond(self, pattern: &str, exit: i32, stdout: &str) -> Self {
        self.add_rule(None, pattern, vec![output(exit, stdout)])
    }

    /// Like `respond`, but only on `host`.
    pub(crate) fn respond_on(self, host: &str, pattern: &str, exit: i32, stdout: &str) -> Self {
        self.add_rule(Some(host), pattern, vec![output(exit, stdout)])
    }

    /// Commands containing `pattern` answer with each of `outputs` in turn.
    pub(crate) fn respond_seq(self, pattern: &str, outputs: Vec<CommandOutput>) -> Self {
        self.add_rule(None, pattern, outputs)
    }

    /// Commands containing `pattern` exit with status 1.
    pub(crate) fn fail(self, pattern: &str) -> Self {
        self.respond(pattern, 1, "")
    }

    pub(crate) fn unreachable(mut self) -> Self {
        self.unreachable_everywhere = true;
        self
    }

    pub(crate) fn unreachable_host(mut self, host: &str) -> Self {
        self.unreachable.push(host.to_string());
        self
    }

    pub(crate) fn with_file<P: Into<PathBuf>>(self, path: P, contents: &str) -> Self {
        if let Ok(mut files) = self.files.lock() {
            files.insert((HOST.to_string(), path.into()), contents.to_string());
        }
        self
    }

    pub(crate) fn with_file_on<P: Into<PathBuf>>(self, host: &str, path: P, contents: &str) -> Self {
        if let Ok(mut files) = self.files.lock() {
            files.insert((host.to_string(), path.into()), contents.to_string());
        }
        self
    }

    /// Every command run, on any host, in order.
    pub(crate) fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap().iter().map(|(_, c)| c.clone()).collect()
    }

    pub(crate) fn commands_on(&self, host: &str) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(h, _)| h == host)
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub(crate) fn file(&self, path: &str) -> Option<String> {
        self.file_on(HOST, path)
    }

    pub(crate) fn file_on(&self, host: &str, path: &str) -> Option<String> {
        self.files
            .lock()
            .unwrap()
            .get(&(host.to_string(), PathBuf::from(path)))
            .cloned()
    }

    fn check_reachable(&self, host: &str) -> remote::Result<()> {
        if self.unreachable_everywhere || self.unreachable.iter().any(|h| h == host) {
            return Err(remote::Error::Connection {
                host: host.to_string(),
                stderr: "Connection refused".to_string(),
            });
        }
        Ok(())
    }
}

impl RemoteExec for FakeRemote {
    fn execute(&self, host: &str, command: &str) -> remote::Result<CommandOutput> {
        self.check_reachable(host)?;
        self.log
            .lock()
            .unwrap()
            .push((host.to_string(), command.to_string()));

        let mut rules = self.rules.lock().unwrap();
        let rule = rules.iter_mut().find(|rule| {
            command.contains(&rule.pattern) && rule.host.as_deref().map_or(true, |h| h == host)
        });
        Ok(match rule {
            Some(rule) if rule.outputs.len() > 1 => rule.outputs.pop_front().unwrap(),
            Some(rule) => rule.outputs.front().cloned().unwrap_or_default(),
            None => CommandOutput::default(),
        })
    }

    fn read_file(&self, host: &str, path: &Path) -> remote::Result<String> {
        self.check_reachable(host)?;
        self.files
            .lock()
            .unwrap()
            .get(&(host.to_string(), path.to_path_buf()))
            .cloned()
            .ok_or_else(|| remote::Error::FileRead {
                host: host.to_string(),
                path: path.to_path_buf(),
                stderr: "No such file or directory".to_string(),
            })
    }

    fn write_file(&self, host: &str, path: &Path, contents: &str) -> remote::Result<()> {
        self.check_reachable(host)?;
        self.files
            .lock()
            .unwrap()
            .insert((host.to_string(), path.to_path_buf()), contents.to_string());
        Ok(())
    }
}

pub(crate) fn settings() -> UnitSettings {
    UnitSettings {
        settle_delay: Duration::ZERO,
    }
}

/// A unit for bondeth0 (slaves eth1 and eth2, bridge vmbondeth0) on `HOST`.
pub(crate) fn context(
    network_type: NetworkType,
    current_mode: BondingMode,
    new_mode: BondingMode,
) -> BondingUnitContext {
    BondingUnitContext {
        host: HOST.to_string(),
        network_type,
        current_mode,
        new_mode,
        master: InterfaceName::try_from("bondeth0").unwrap(),
        slaves: vec![
            InterfaceName::try_from("eth1").unwrap(),
            InterfaceName::try_from("eth2").unwrap(),
        ],
        bridge: InterfaceName::try_from("vmbondeth0").unwrap(),
        backup_dir: PathBuf::from("/opt/exacloud/nw_bonding/job-1"),
    }
}

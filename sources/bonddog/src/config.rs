use crate::error::{self, Result};
use serde::Deserialize;
use snafu::ResultExt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "/etc/bonddog.toml";
const DEFAULT_BACKUP_ROOT: &str = "/opt/exacloud/nw_bonding";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub(crate) struct Config {
    /// Per-job backups of the files a modification touches are kept below this directory
    pub(crate) backup_root: PathBuf,
    pub(crate) max_parallel_hosts: usize,
    /// Seconds to wait after each `ifdown`/`ifup` while bumping a bond
    pub(crate) settle_delay_secs: u64,
    pub(crate) ssh: SshConfig,
    pub(crate) validation: ValidationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backup_root: PathBuf::from(DEFAULT_BACKUP_ROOT),
            max_parallel_hosts: 4,
            settle_delay_secs: 5,
            ssh: SshConfig::default(),
            validation: ValidationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub(crate) struct SshConfig {
    pub(crate) binary: PathBuf,
    pub(crate) user: String,
    pub(crate) connect_timeout_secs: u64,
    /// Extra arguments passed to ssh ahead of the destination
    pub(crate) options: Vec<String>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("/usr/bin/ssh"),
            user: "root".to_string(),
            connect_timeout_secs: 30,
            options: Vec::new(),
        }
    }
}

// Zero retries hands retryable failures straight back to the caller
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub(crate) struct ValidationConfig {
    pub(crate) retries: usize,
    pub(crate) retry_interval_secs: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            retries: 0,
            retry_interval_secs: 30,
        }
    }
}

impl ValidationConfig {
    pub(crate) fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}

impl Config {
    /// Loads the default config file, falling back to built-in defaults when it does not exist.
    pub(crate) fn new() -> Result<Self> {
        let path = Path::new(DEFAULT_CONFIG_PATH);
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    pub(crate) fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path).context(error::ConfigReadSnafu { path })?;
        let config: Config = toml::from_str(&s).context(error::ConfigParseSnafu { path })?;
        Ok(config)
    }

    pub(crate) fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }
}

#[cfg(test)]
mod test {
    use crate::config::Config;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const FULL_CONFIG: &str = r#"
    backup-root = "/var/lib/bonddog"
    max-parallel-hosts = 8
    settle-delay-secs = 2

    [ssh]
    binary = "/usr/local/bin/ssh"
    user = "opc"
    connect-timeout-secs = 10
    options = ["-o", "StrictHostKeyChecking=no"]

    [validation]
    retries = 3
    retry-interval-secs = 60
    "#;

    const PARTIAL_CONFIG: &str = r#"
    [ssh]
    user = "opc"
    "#;

    #[test]
    fn full_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bonddog.toml");
        std::fs::write(&path, FULL_CONFIG).unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(PathBuf::from("/var/lib/bonddog"), config.backup_root);
        assert_eq!(8, config.max_parallel_hosts);
        assert_eq!(2, config.settle_delay().as_secs());
        assert_eq!(PathBuf::from("/usr/local/bin/ssh"), config.ssh.binary);
        assert_eq!("opc", config.ssh.user);
        assert_eq!(10, config.ssh.connect_timeout_secs);
        assert_eq!(
            vec!["-o".to_string(), "StrictHostKeyChecking=no".to_string()],
            config.ssh.options
        );
        assert_eq!(3, config.validation.retries);
        assert_eq!(60, config.validation.retry_interval().as_secs());
    }

    #[test]
    fn partial_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bonddog.toml");
        std::fs::write(&path, PARTIAL_CONFIG).unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!("opc", config.ssh.user);
        assert_eq!(30, config.ssh.connect_timeout_secs);
        assert_eq!(PathBuf::from("/opt/exacloud/nw_bonding"), config.backup_root);
        assert_eq!(4, config.max_parallel_hosts);
        assert_eq!(5, config.settle_delay_secs);
        assert_eq!(0, config.validation.retries);
    }

    #[test]
    fn unknown_keys_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bonddog.toml");
        std::fs::write(&path, "backup-dir = \"/tmp\"\n").unwrap();
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(Config::from_file(dir.path().join("absent.toml")).is_err());
    }
}

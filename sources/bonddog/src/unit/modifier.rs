//! Switches a bond to a new mode.
//!
//! The network script and bridge descriptors are backed up before anything is changed.  There is no
//! automatic rollback: when a step fails the remaining steps are skipped and the backups stay in
//! place for the operator.

use super::error;
use super::{Result, Session};
use crate::bridge_conf;
use crate::error::ErrorCode;
use crate::ifcfg;
use crate::remote::quote_path;
use log::{debug, info};
use snafu::{ensure, ResultExt};
use std::path::PathBuf;

const CODE: ErrorCode = ErrorCode::ModifyFailed;

pub(crate) struct Modifier<'a> {
    session: &'a Session<'a>,
}

impl<'a> Modifier<'a> {
    pub(crate) fn new(session: &'a Session<'a>) -> Self {
        Self { session }
    }

    pub(crate) fn create_backup_dir(&self) -> Result<()> {
        let ctx = self.session.context;
        debug!("Creating backup directory {} on {}", ctx.backup_dir.display(), ctx.host);
        let command = format!("mkdir -p {}", quote_path(&ctx.backup_dir));
        let outcome = self.session.execute(&command, CODE)?;
        ensure!(
            outcome.success(),
            error::BackupDirSnafu {
                dir: &ctx.backup_dir,
                host: &ctx.host,
                stderr: outcome.stderr.trim(),
            }
        );
        Ok(())
    }

    pub(crate) fn backup_bonding_config(&self) -> Result<()> {
        let ctx = self.session.context;
        let path = ctx.ifcfg_path();
        debug!("Backing up {} on {}", path.display(), ctx.host);
        let command = format!(
            "cp {} {}",
            quote_path(&path),
            quote_path(&ctx.backup_dir)
        );
        let outcome = self.session.execute(&command, CODE)?;
        ensure!(
            outcome.success(),
            error::BackupConfigSnafu {
                path,
                host: &ctx.host,
                stderr: outcome.stderr.trim(),
            }
        );
        Ok(())
    }

    pub(crate) fn backup_guest_metadata(&self) -> Result<()> {
        let ctx = self.session.context;
        debug!(
            "Backing up {} bridge metadata on {}",
            ctx.network_type, ctx.host
        );
        // The glob is left for the remote shell to expand
        let command = format!(
            "cp {} {}",
            ctx.bridge_metadata_glob(),
            quote_path(&ctx.backup_dir)
        );
        let outcome = self.session.execute(&command, CODE)?;
        ensure!(
            outcome.success(),
            error::BackupMetadataSnafu {
                network_type: ctx.network_type,
                host: &ctx.host,
                stderr: outcome.stderr.trim(),
            }
        );
        Ok(())
    }

    /// Rewrites the bond's `BONDING_OPTS` for the new mode.
    pub(crate) fn modify_bonding_config(&self) -> Result<()> {
        let ctx = self.session.context;
        let path = ctx.ifcfg_path();
        debug!("Updating file {} on {}", path.display(), ctx.host);

        let contents = self
            .session
            .read_file(&path)
            .context(error::UpdateConfigSnafu {
                path: &path,
                host: &ctx.host,
            })?;
        let updated = ifcfg::rewrite_bonding_opts(&contents, ctx.new_mode);
        self.session
            .write_file(&path, &updated)
            .context(error::UpdateConfigSnafu {
                path: &path,
                host: &ctx.host,
            })?;
        Ok(())
    }

    /// Sets the new mode in every bridge descriptor that mentions the bond.
    pub(crate) fn update_bridge_metadata(&self) -> Result<()> {
        let ctx = self.session.context;
        info!(
            "Fetching the list of {} bridge files on {}",
            ctx.network_type, ctx.host
        );
        let command = format!("ls {}", ctx.bridge_metadata_glob());
        let outcome = self.session.execute(&command, CODE)?;
        let files: Vec<PathBuf> = outcome
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .collect();
        ensure!(
            outcome.success() && !files.is_empty(),
            error::ListBridgeFilesSnafu {
                network_type: ctx.network_type,
                host: &ctx.host,
            }
        );

        debug!("Bridge files for {} network: {:?}", ctx.network_type, files);
        info!("Updating {} bridge files on {}", ctx.network_type, ctx.host);
        for path in files {
            let xml = self
                .session
                .read_file(&path)
                .context(error::UpdateBridgeFileSnafu {
                    path: &path,
                    host: &ctx.host,
                })?;
            let updated = bridge_conf::set_bond_mode(&xml, &ctx.master, ctx.new_mode).context(
                error::RewriteBridgeFileSnafu {
                    path: &path,
                    host: &ctx.host,
                },
            )?;
            self.session
                .write_file(&path, &updated)
                .context(error::UpdateBridgeFileSnafu {
                    path: &path,
                    host: &ctx.host,
                })?;
        }
        Ok(())
    }

    /// Restarts the bond so the kernel picks up the new options, then brings its bridge back up.
    pub(crate) fn bring_bridge_up(&self) -> Result<()> {
        let ctx = self.session.context;
        info!("Bouncing the interface {} on {}", ctx.master, ctx.host);
        self.session.bump_interface(CODE)?;

        let outcome = self
            .session
            .execute(&format!("ifup {}", ctx.bridge), CODE)?;
        ensure!(
            outcome.success(),
            error::InterfaceUpSnafu {
                interface: ctx.bridge.to_string(),
                host: &ctx.host,
                code: CODE,
            }
        );
        self.session.settle();
        Ok(())
    }

    pub(crate) fn perform_operation(&self) -> Result<String> {
        let ctx = self.session.context;
        if ctx.is_noop() {
            info!(
                "Current and new bonding modes are same ({}) for the {} network on {}, no changes needed",
                ctx.new_mode, ctx.network_type, ctx.host
            );
            return Ok("Current and new bonding modes are same, no changes needed".to_string());
        }

        self.create_backup_dir()?;
        self.backup_bonding_config()?;
        self.backup_guest_metadata()?;
        self.modify_bonding_config()?;
        self.update_bridge_metadata()?;
        self.bring_bridge_up()?;

        info!(
            "Changed {} network on {} from {} to {}",
            ctx.network_type, ctx.host, ctx.current_mode, ctx.new_mode
        );
        Ok("Network bonding mode change successful".to_string())
    }
}

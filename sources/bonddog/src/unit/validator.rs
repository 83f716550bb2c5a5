//! Read-only checks that a bond is really running in the mode it was asked for.
//!
//! Validation first makes sure the bond's physical links are up, then looks at the mode the kernel
//! reports and at what the switch is doing:
//! * an LACP bond must have finished negotiating with the switch,
//! * an active-backup bond must not be receiving LACPDUs, which would mean the switch ports are still
//!   set up for link aggregation.

use super::error;
use super::{Result, Session};
use crate::bonding::BondingMode;
use crate::error::ErrorCode;
use crate::interface_name::InterfaceName;
use crate::proc_bonding::{lacp_negotiation, slaves_not_up, LacpNegotiation};
use crate::remote::quote_path;
use log::{debug, info};
use snafu::ensure;

const CODE: ErrorCode = ErrorCode::ValidationFailed;

/// Slow-protocol ethertype, carried by LACPDUs
const LACPDU_ETHERTYPE: &str = "0x8809";
/// LACP partners send at least one LACPDU every 30 seconds
const LACPDU_CAPTURE_SECS: u32 = 35;

pub(crate) struct Validator<'a> {
    session: &'a Session<'a>,
}

impl<'a> Validator<'a> {
    pub(crate) fn new(session: &'a Session<'a>) -> Self {
        Self { session }
    }

    /// Checks that the kernel reports the bond in `mode`.
    pub(crate) fn validate_config(&self, mode: BondingMode) -> Result<()> {
        let ctx = self.session.context;
        let path = ctx.proc_path();
        let command = format!("grep -ie '{}' {}", mode.proc_signature(), quote_path(&path));
        let outcome = self.session.execute(&command, CODE)?;
        ensure!(
            outcome.success(),
            error::ConfigMismatchSnafu {
                network_type: ctx.network_type,
                host: &ctx.host,
                mode,
                path,
            }
        );

        info!(
            "Bonding config checked successfully for {} network on host {}",
            ctx.network_type, ctx.host
        );
        Ok(())
    }

    /// Listens on every slave for an incoming LACPDU, returning the slaves that saw one.  Every slave
    /// is probed so the log names all of them.
    pub(crate) fn detect_lacpdu_on_slaves(&self) -> Result<Vec<&'a InterfaceName>> {
        let ctx = self.session.context;
        let mut seen = Vec::new();
        for slave in &ctx.slaves {
            let command = format!(
                "timeout {} tcpdump --direction=in -nn -xx -i {} -s 0 -c 1 ether proto {} 2>/dev/null",
                LACPDU_CAPTURE_SECS, slave, LACPDU_ETHERTYPE
            );
            if self.session.execute(&command, CODE)?.success() {
                debug!(
                    "LACPDU packets seen on interface {} of the {} network on host {}",
                    slave, ctx.network_type, ctx.host
                );
                seen.push(slave);
            }
        }
        Ok(seen)
    }

    pub(crate) fn validate_active_backup(&self) -> Result<()> {
        let ctx = self.session.context;
        self.validate_config(BondingMode::ActiveBackup)?;

        let seen = self.detect_lacpdu_on_slaves()?;
        ensure!(
            seen.is_empty(),
            error::LacpduSeenSnafu {
                slaves: join(&seen),
                network_type: ctx.network_type,
                host: &ctx.host,
            }
        );
        Ok(())
    }

    pub(crate) fn validate_lacp(&self) -> Result<()> {
        let ctx = self.session.context;
        self.validate_config(BondingMode::Lacp)?;

        let command = format!("grep -ie 'Churn State' {}", quote_path(&ctx.proc_path()));
        let outcome = self.session.execute(&command, CODE)?;
        if !outcome.success() {
            self.session.bump_interface(CODE)?;
            return error::ChurnCheckSnafu { host: &ctx.host }.fail();
        }

        match lacp_negotiation(&outcome.stdout) {
            LacpNegotiation::Complete => {
                info!(
                    "LACP negotiations complete for {} network on host {}",
                    ctx.network_type, ctx.host
                );
                Ok(())
            }
            LacpNegotiation::Negotiating => {
                info!(
                    "LACP negotiations not yet complete for {} network on host {}",
                    ctx.network_type, ctx.host
                );
                debug!("Current LACP bond status: {}", outcome.stdout.trim());
                error::NegotiatingSnafu {
                    network_type: ctx.network_type,
                    host: &ctx.host,
                }
                .fail()
            }
            LacpNegotiation::Churned => {
                debug!("Current LACP bond status: {}", outcome.stdout.trim());
                // Renegotiation may clear the churn once the switch is fixed
                self.session.bump_interface(CODE)?;
                error::ChurnedSnafu {
                    network_type: ctx.network_type,
                    host: &ctx.host,
                }
                .fail()
            }
        }
    }

    /// Checks that the bond and all of its configured slaves are reported up by the MII monitor.
    pub(crate) fn validate_interfaces_up(&self) -> Result<()> {
        let ctx = self.session.context;
        let command = format!("grep -B 1 -ie 'MII Status' {}", quote_path(&ctx.proc_path()));
        let outcome = self.session.execute(&command, CODE)?;
        ensure!(outcome.success(), error::LinkCheckSnafu { host: &ctx.host });

        let down = slaves_not_up(&outcome.stdout, &ctx.slaves);
        if !down.is_empty() {
            debug!("Current interfaces' state: {}", outcome.stdout.trim());
            return error::LinksDownSnafu {
                network_type: ctx.network_type,
                host: &ctx.host,
                slaves: down.join(", "),
            }
            .fail();
        }

        info!(
            "All physical interfaces up for {} network on host {}",
            ctx.network_type, ctx.host
        );
        Ok(())
    }

    pub(crate) fn perform_operation(&self) -> Result<String> {
        let ctx = self.session.context;
        self.validate_interfaces_up()?;

        if ctx.is_noop() {
            info!(
                "Current and new bonding modes are same ({}) for the {} network on {}, no validation needed",
                ctx.new_mode, ctx.network_type, ctx.host
            );
            return Ok("Current and new bonding modes are same, no validation needed".to_string());
        }

        match ctx.new_mode {
            BondingMode::Lacp => self.validate_lacp()?,
            BondingMode::ActiveBackup => self.validate_active_backup()?,
        }
        Ok("Network bonding mode validation successful".to_string())
    }
}

fn join(interfaces: &[&InterfaceName]) -> String {
    interfaces
        .iter()
        .map(|i| i.as_ref())
        .collect::<Vec<&str>>()
        .join(", ")
}

//! The proc_bonding module parses the `grep` excerpts of `/proc/net/bonding/<master>` that the
//! validator collects from a host.
//!
//! The kernel prints one block for the bond followed by one block per slave:
//!
//! ```text
//! Currently Active Slave: eth1
//! MII Status: up
//! --
//! Slave Interface: eth1
//! MII Status: up
//! ...
//! Actor Churn State: none
//! Partner Churn State: none
//! ```
//!
//! These functions never run commands; they only interpret text.

use lazy_static::lazy_static;
use log::trace;
use regex::Regex;

lazy_static! {
    static ref CHURN_STATE: Regex =
        Regex::new(r"(?i)^\s*(?:actor|partner)?\s*churn state:\s*(?P<state>\S+)").unwrap();
    static ref SLAVE_INTERFACE: Regex =
        Regex::new(r"(?i)^\s*slave interface:\s*(?P<name>\S+)").unwrap();
    static ref MII_STATUS: Regex =
        Regex::new(r"(?i)^\s*mii status:\s*(?P<status>.+?)\s*$").unwrap();
}

/// The churn state the 802.3ad state machine reports for one side of an aggregation port.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ChurnState {
    None,
    Monitoring,
    Churned,
}

/// Where LACP negotiation stands for a whole bond.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum LacpNegotiation {
    /// Every actor and partner reports `none`
    Complete,
    /// At least one port is still being monitored; this resolves by itself
    Negotiating,
    /// At least one port gave up negotiating, usually a switch misconfiguration
    Churned,
}

/// Returns every churn state found in `output`, in order.  Lines that are not churn states, or that
/// carry a state the kernel does not define, are skipped.
pub(crate) fn churn_states(output: &str) -> Vec<ChurnState> {
    output
        .lines()
        .filter_map(|line| CHURN_STATE.captures(line))
        .filter_map(|cap| {
            let state = cap.name("state")?.as_str();
            match state.to_ascii_lowercase().as_str() {
                "none" => Some(ChurnState::None),
                "monitoring" => Some(ChurnState::Monitoring),
                "churned" => Some(ChurnState::Churned),
                other => {
                    trace!("ignoring unknown churn state '{}'", other);
                    None
                }
            }
        })
        .collect()
}

/// Classifies the output of `grep -ie 'Churn State'`.  Ports still being monitored take precedence
/// over churned ones, since the churned verdict may not be final yet.
pub(crate) fn lacp_negotiation(output: &str) -> LacpNegotiation {
    let states = churn_states(output);
    if states.contains(&ChurnState::Monitoring) {
        LacpNegotiation::Negotiating
    } else if states.contains(&ChurnState::Churned) {
        LacpNegotiation::Churned
    } else {
        LacpNegotiation::Complete
    }
}

/// Link state reported by the MII monitor.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct MiiStatus {
    /// `None` for the bond's own status line
    pub(crate) slave: Option<String>,
    pub(crate) up: bool,
}

/// Parses the output of `grep -B 1 -ie 'MII Status'`, attributing each status line to the slave
/// named on the line before it, or to the bond itself.
pub(crate) fn mii_statuses(output: &str) -> Vec<MiiStatus> {
    let mut statuses = Vec::new();
    let mut previous_slave: Option<String> = None;
    for line in output.lines() {
        if let Some(cap) = SLAVE_INTERFACE.captures(line) {
            previous_slave = cap.name("name").map(|m| m.as_str().to_string());
            continue;
        }
        if let Some(cap) = MII_STATUS.captures(line) {
            let up = cap
                .name("status")
                .map(|m| m.as_str().eq_ignore_ascii_case("up"))
                .unwrap_or(false);
            statuses.push(MiiStatus {
                slave: previous_slave.take(),
                up,
            });
            continue;
        }
        // "--" separators and the bond's context lines reset attribution
        previous_slave = None;
    }
    statuses
}

/// Returns the slaves in `expected` that are not reported up, either because the monitor says so or
/// because they are missing from the output.  A bond that is itself down reports every slave.
pub(crate) fn slaves_not_up<'a, S>(output: &str, expected: &'a [S]) -> Vec<&'a str>
where
    S: AsRef<str>,
{
    let statuses = mii_statuses(output);
    let bond_down = statuses.iter().any(|s| s.slave.is_none() && !s.up);
    expected
        .iter()
        .map(AsRef::as_ref)
        .filter(|name| {
            bond_down
                || !statuses
                    .iter()
                    .any(|s| s.up && s.slave.as_deref() == Some(*name))
        })
        .collect()
}

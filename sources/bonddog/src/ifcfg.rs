//! The ifcfg module rewrites the bonding options of an `ifcfg-<master>` network script.

use crate::bonding::BondingMode;

const BONDING_OPTS: &str = "BONDING_OPTS";

/// The `BONDING_OPTS` assignment that configures a bond for `mode`.
pub(crate) fn bonding_opts_line(mode: BondingMode) -> String {
    format!("{}=\"{}\"", BONDING_OPTS, mode.options())
}

fn is_bonding_opts(line: &str) -> bool {
    line.trim_start()
        .strip_prefix(BONDING_OPTS)
        .map(|rest| rest.trim_start().starts_with('='))
        .unwrap_or(false)
}

/// Returns `contents` with every `BONDING_OPTS` assignment replaced by the one for `mode`.  Every
/// other line, including comments and the trailing newline, is kept as is.  A script without a
/// `BONDING_OPTS` assignment gets one appended.
pub(crate) fn rewrite_bonding_opts(contents: &str, mode: BondingMode) -> String {
    let replacement = bonding_opts_line(mode);
    let mut found = false;
    let mut lines: Vec<&str> = contents
        .split('\n')
        .map(|line| {
            if is_bonding_opts(line) {
                found = true;
                replacement.as_str()
            } else {
                line
            }
        })
        .collect();

    if !found {
        // A trailing newline leaves an empty last element; put the new line in front of it
        match lines.last() {
            Some(last) if last.is_empty() => {
                let at = lines.len() - 1;
                lines.insert(at, replacement.as_str());
            }
            _ => {
                lines.push(replacement.as_str());
                lines.push("");
            }
        }
    }

    lines.join("\n")
}

//! Preflight checks for the tools an archive-executable needs at run time.
//!
//! Building an archive needs nothing beyond this crate, but executing one
//! requires a POSIX shell and `unzip` on the target machine. Checking up
//! front turns a cryptic bootstrap failure into an actionable message.

use anyhow::{bail, Result};

/// Tools the bootstrap header depends on, as (command, package) pairs.
pub const RUNTIME_TOOLS: &[(&str, &str)] = &[("sh", "a POSIX shell"), ("unzip", "unzip")];

/// Check if a command exists on this machine's PATH.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Check that specific tools are available.
///
/// Returns an error listing every missing tool and what provides it.
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let mut missing = Vec::new();
    for (tool, package) in tools {
        if !command_exists(tool) {
            missing.push((*tool, *package));
        }
    }

    if !missing.is_empty() {
        let msg = missing
            .iter()
            .map(|(t, p)| format!("  {} (install: {})", t, p))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("Missing required tools:\n{}", msg);
    }

    Ok(())
}

/// Check that everything the bootstrap header needs is available here.
pub fn check_runtime_tools() -> Result<()> {
    check_required_tools(RUNTIME_TOOLS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_exists_finds_common_binaries() {
        assert!(command_exists("ls"));
        assert!(!command_exists("definitely_not_a_real_command_12345"));
    }

    #[test]
    fn missing_tools_are_listed_with_their_packages() {
        let tools = &[("nonexistent_command_xyz", "fake-package")];
        let err = check_required_tools(tools).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("nonexistent_command_xyz"), "{msg}");
        assert!(msg.contains("fake-package"), "{msg}");
    }

    #[test]
    fn present_tools_pass() {
        let tools = &[("ls", "coreutils"), ("cat", "coreutils")];
        assert!(check_required_tools(tools).is_ok());
    }
}

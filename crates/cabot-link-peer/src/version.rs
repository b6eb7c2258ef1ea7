use tracing::{info, warn};

use crate::error::{PeerError, Result};

/// Protocol version this build speaks.
pub const PROTOCOL_VERSION: &str = "20230222";

const MAX_VERSION_LEN: usize = 32;

/// Outcome of comparing the robot's announced version with ours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionCheck {
    pub local: String,
    pub remote: String,
    pub matched: bool,
}

/// Compare an announced version with `local`.
///
/// A mismatch is not an error: the link keeps running and the application
/// decides what to tell the user. Only a malformed announcement is rejected.
pub fn check_version(local: &str, remote: &str) -> Result<VersionCheck> {
    let remote = remote.trim();
    validate_version(remote)?;

    let matched = remote == local;
    if matched {
        info!(version = remote, "robot protocol version matches");
    } else {
        warn!(local, remote, "robot protocol version mismatch");
    }

    Ok(VersionCheck {
        local: local.to_string(),
        remote: remote.to_string(),
        matched,
    })
}

fn validate_version(version: &str) -> Result<()> {
    if version.is_empty() || version.len() > MAX_VERSION_LEN {
        return Err(PeerError::InvalidVersion(format!(
            "invalid version length: {}",
            version.len()
        )));
    }
    if !version.chars().all(|c| c.is_ascii_graphic()) {
        return Err(PeerError::InvalidVersion(format!(
            "version '{}' contains non-printable characters",
            version.escape_debug()
        )));
    }
    Ok(())
}

//! LTP provisioning for ltp-harness
//!
//! This crate prepares a target node so the LTP runner can execute: it detects
//! the distribution family, installs build dependencies, tunes the kernel
//! settings the suite depends on, then clones, builds and installs a pinned
//! LTP release.

pub mod ltp;
pub mod os;

use node::NodeError;
use thiserror::Error;

pub use ltp::{InstallConfig, LtpInstaller};
pub use os::{OsFamily, OsInfo, OsRelease};

/// Errors related to provisioning a node
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Unsupported environment: {os} is not supported")]
    UnsupportedEnvironment { os: String },
    #[error("Installation failed: {path} does not exist after install")]
    InstallationFailed { path: String },
    #[error("Unexpected value '{value}' in {path}")]
    InvalidTunable { path: String, value: String },
    #[error("Node error: {0}")]
    Node(#[from] NodeError),
}

pub type ProvisionResult<T> = Result<T, ProvisionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ProvisionError::UnsupportedEnvironment {
            os: "FreeBSD 14.0".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Unsupported environment: FreeBSD 14.0 is not supported"
        );

        let error = ProvisionError::InstallationFailed {
            path: "/opt/ltp/runltp".to_string(),
        };
        assert!(error.to_string().contains("/opt/ltp/runltp"));
    }

    #[test]
    fn test_node_error_conversion() {
        let error: ProvisionError = NodeError::InvalidConfig {
            message: "bad".to_string(),
        }
        .into();
        assert!(matches!(error, ProvisionError::Node(_)));
    }
}

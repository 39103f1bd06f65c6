//! Error types for the provisioning core.
//!
//! Every failure carries a formatted operation context chained in front of
//! its underlying cause, so diagnostics preserve causal order
//! ("attaching boot volume: VBoxManage exited 1").

use thiserror::Error;

/// Result alias used throughout the provisioning crates.
pub type UnikResult<T> = Result<T, UnikError>;

/// Errors produced by the provisioning core and its collaborators.
#[derive(Error, Debug)]
pub enum UnikError {
    /// State-store or filesystem persistence failure.
    #[error("storage: {0}")]
    Storage(String),

    /// Hypervisor control-plane call failed.
    #[error("hypervisor: {0}")]
    Hypervisor(String),

    /// Compiling source into a raw image failed.
    #[error("compiler: {0}")]
    Compiler(String),

    /// Packaging a raw image into a bootable image failed.
    #[error("staging: {0}")]
    Staging(String),

    /// Network discovery probe failed or timed out.
    #[error("discovery: {0}")]
    Discovery(String),

    /// A referenced entity or mapping does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Entity or spec fields are inconsistent with the declared infrastructure.
    #[error("invalid spec: {0}")]
    InvalidSpec(String),

    /// Invariant violation inside the core itself.
    #[error("internal: {0}")]
    Internal(String),
}

impl UnikError {
    /// True if this error is a NotFound-style lookup miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, UnikError::NotFound(_))
    }
}

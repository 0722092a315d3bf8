//! Error types for the blur pipeline
//!
//! Every failure surfaces synchronously from the call that caused it. Nothing
//! here is retried: shader sources are static, so a compile or link failure
//! will fail the same way every time.

use crate::device::ShaderStage;

/// Errors produced while building or running a blur pipeline
#[derive(Debug, thiserror::Error)]
pub enum BlurError {
    /// A shader stage failed to compile; carries the device diagnostic
    #[error("failed to compile {stage} shader: {log}")]
    ShaderCompile {
        /// The stage that failed
        stage: ShaderStage,
        /// Diagnostic text reported by the device
        log: String,
    },

    /// Two compiled stages failed to link into a program
    #[error("failed to link shader program: {log}")]
    ProgramLink {
        /// Diagnostic text reported by the device
        log: String,
    },

    /// A texture, framebuffer or buffer could not be created
    #[error("failed to allocate {resource}: {reason}")]
    ResourceAllocation {
        /// Kind of resource that failed
        resource: &'static str,
        /// Why the device refused it
        reason: String,
    },

    /// The pipeline or device was used in a way that is never valid
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The supplied image is malformed
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// A configuration value is out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A configuration file could not be read or parsed
    #[error("failed to load configuration: {0}")]
    Config(String),

    /// The backend failed outside of resource creation (adapter, readback)
    #[error("device error: {0}")]
    Device(String),
}

impl BlurError {
    /// Shorthand for [`BlurError::ResourceAllocation`]
    pub(crate) fn allocation(resource: &'static str, reason: impl Into<String>) -> Self {
        Self::ResourceAllocation { resource, reason: reason.into() }
    }

    /// Shorthand for [`BlurError::InvalidState`]
    pub(crate) fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, BlurError>;

//! Protocol Stack Layers Library
//!
//! This crate implements the 5G NR PDCP layer according to 3GPP TS 38.323.

pub mod pdcp;

use interfaces::InterfaceError;
use thiserror::Error;

/// Common errors for protocol layers
#[derive(Error, Debug)]
pub enum LayerError {
    #[error("Layer not initialized")]
    NotInitialized,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid protocol data unit: {0}")]
    InvalidPdu(String),

    #[error("Security not configured")]
    SecurityNotConfigured,

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Integrity check failed for COUNT {count}")]
    IntegrityFailure { count: u32 },

    #[error("Duplicate or stale PDU with COUNT {count}")]
    DuplicateOrStalePdu { count: u32 },

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Maximum COUNT reached")]
    MaxCountReached,

    #[error("Interface error: {0}")]
    Interface(#[from] InterfaceError),
}

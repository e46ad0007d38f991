//! PDCP Collaborator Interfaces Library
//!
//! This crate provides the service access points between PDCP and its
//! neighbours (RLC below, RRC and GW above), plus channel-backed adapters.

pub mod channel;
pub mod message_types;
pub mod pdcp_sap;

pub use channel::{ChannelRlc, ChannelUpperLayer};
pub use message_types::{LowerLayerMessage, UpperLayerEvent};
pub use pdcp_sap::{GwInterfacePdcp, RlcInterfacePdcp, RrcInterfacePdcp};

use thiserror::Error;

/// Interface errors
#[derive(Error, Debug)]
pub enum InterfaceError {
    #[error("Peer disconnected: {0}")]
    Disconnected(String),

    #[error("Timed out after {0} ms waiting for the lower layer")]
    Timeout(u64),
}

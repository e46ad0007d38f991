//! Message Types for PDCP Collaborators
//!
//! Defines the messages carried over the channel-backed adapters

use bytes::Bytes;
use common::types::Lcid;
use serde::Serialize;

/// Message from PDCP to RLC
#[derive(Debug, Clone, PartialEq)]
pub enum LowerLayerMessage {
    /// PDU ready for transmission
    Pdu {
        /// Logical channel
        lcid: Lcid,
        /// Complete PDCP PDU
        pdu: Bytes,
    },
    /// Discard timer expired for a PDU not yet confirmed
    Discard {
        /// Logical channel
        lcid: Lcid,
        /// PDCP SN of the PDU to drop
        sn: u32,
    },
}

/// Event from PDCP to RRC or GW
#[derive(Debug, Clone, PartialEq)]
pub enum UpperLayerEvent {
    /// SDU delivered on a signalling bearer
    SrbSdu {
        /// Logical channel
        lcid: Lcid,
        /// Deciphered SDU
        sdu: Bytes,
    },
    /// SDU delivered on a data bearer
    DrbSdu {
        /// Logical channel
        lcid: Lcid,
        /// Deciphered SDU
        sdu: Bytes,
    },
    /// Integrity verification failed
    IntegrityFailure {
        /// Logical channel
        lcid: Lcid,
    },
    /// TX COUNT exhausted
    MaxCountReached {
        /// Logical channel
        lcid: Lcid,
    },
}

/// Kind of upper layer event, used for summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UpperLayerEventKind {
    Sdu,
    IntegrityFailure,
    MaxCountReached,
}

impl UpperLayerEvent {
    /// Event classification
    pub fn kind(&self) -> UpperLayerEventKind {
        match self {
            UpperLayerEvent::SrbSdu { .. } | UpperLayerEvent::DrbSdu { .. } => {
                UpperLayerEventKind::Sdu
            }
            UpperLayerEvent::IntegrityFailure { .. } => UpperLayerEventKind::IntegrityFailure,
            UpperLayerEvent::MaxCountReached { .. } => UpperLayerEventKind::MaxCountReached,
        }
    }

    /// Payload of a delivery event
    pub fn sdu(&self) -> Option<&Bytes> {
        match self {
            UpperLayerEvent::SrbSdu { sdu, .. } | UpperLayerEvent::DrbSdu { sdu, .. } => Some(sdu),
            _ => None,
        }
    }
}

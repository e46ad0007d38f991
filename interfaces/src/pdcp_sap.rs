//! PDCP Service Access Points
//!
//! Traits implemented by the layers PDCP talks to. The PDCP entity only
//! borrows these through `Arc` handles, the bearer manager owns them.

use crate::InterfaceError;
use async_trait::async_trait;
use bytes::Bytes;
use common::types::Lcid;

/// RLC as seen from PDCP
#[async_trait]
pub trait RlcInterfacePdcp: Send + Sync {
    /// Submit a PDCP PDU for transmission.
    ///
    /// With `blocking` set the call waits (bounded) until RLC accepts the
    /// PDU, otherwise RLC may drop it when its queue is full.
    async fn write_sdu(&self, lcid: Lcid, pdu: Bytes, blocking: bool) -> Result<(), InterfaceError>;

    /// Ask RLC to drop a not yet transmitted PDU. Must not block.
    fn discard_sdu(&self, lcid: Lcid, sn: u32);
}

/// RRC as seen from PDCP. All methods must not block, they are called with
/// the PDCP entity lock held.
pub trait RrcInterfacePdcp: Send + Sync {
    /// Deliver a signalling SDU received on an SRB
    fn write_pdu(&self, lcid: Lcid, sdu: Bytes);

    /// A PDU failed integrity verification
    fn notify_integrity_failure(&self, lcid: Lcid);

    /// TX COUNT is exhausted, the bearer needs new keys or release
    fn notify_max_count_reached(&self, lcid: Lcid);
}

/// GW (user plane) as seen from PDCP. Must not block.
pub trait GwInterfacePdcp: Send + Sync {
    /// Deliver a user-plane SDU received on a DRB
    fn write_pdu(&self, lcid: Lcid, sdu: Bytes);
}

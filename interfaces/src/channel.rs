//! Channel-backed Collaborator Adapters
//!
//! Implements the PDCP service access points on top of tokio mpsc channels,
//! so a PDCP entity can be wired to tasks playing RLC, RRC and GW.

use crate::{
    message_types::{LowerLayerMessage, UpperLayerEvent},
    pdcp_sap::{GwInterfacePdcp, RlcInterfacePdcp, RrcInterfacePdcp},
    InterfaceError,
};
use async_trait::async_trait;
use bytes::Bytes;
use common::types::Lcid;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// RLC adapter feeding a bounded channel
pub struct ChannelRlc {
    tx: mpsc::Sender<LowerLayerMessage>,
    send_timeout: Duration,
    dropped: AtomicU64,
}

impl ChannelRlc {
    /// Create an adapter; `send_timeout` bounds blocking submissions
    pub fn new(tx: mpsc::Sender<LowerLayerMessage>, send_timeout: Duration) -> Self {
        Self {
            tx,
            send_timeout,
            dropped: AtomicU64::new(0),
        }
    }

    /// Number of PDUs dropped by non-blocking submissions on a full queue
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RlcInterfacePdcp for ChannelRlc {
    async fn write_sdu(
        &self,
        lcid: Lcid,
        pdu: Bytes,
        blocking: bool,
    ) -> Result<(), InterfaceError> {
        let msg = LowerLayerMessage::Pdu { lcid, pdu };

        if blocking {
            return match tokio::time::timeout(self.send_timeout, self.tx.send(msg)).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(_)) => Err(InterfaceError::Disconnected("RLC".to_string())),
                Err(_) => Err(InterfaceError::Timeout(self.send_timeout.as_millis() as u64)),
            };
        }

        match self.tx.try_send(msg) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("RLC queue full on LCID {}, dropping PDU", lcid);
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(InterfaceError::Disconnected("RLC".to_string())),
        }
    }

    fn discard_sdu(&self, lcid: Lcid, sn: u32) {
        if let Err(e) = self.tx.try_send(LowerLayerMessage::Discard { lcid, sn }) {
            debug!("Could not forward discard of SN {} on LCID {}: {}", sn, lcid, e);
        }
    }
}

/// RRC and GW adapter feeding one unbounded event channel
#[derive(Clone)]
pub struct ChannelUpperLayer {
    tx: mpsc::UnboundedSender<UpperLayerEvent>,
}

impl ChannelUpperLayer {
    /// Create an adapter and the receiving end of its events
    pub fn new() -> (Self, mpsc::UnboundedReceiver<UpperLayerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: UpperLayerEvent) {
        if self.tx.send(event).is_err() {
            warn!("Upper layer receiver closed, event lost");
        }
    }
}

impl RrcInterfacePdcp for ChannelUpperLayer {
    fn write_pdu(&self, lcid: Lcid, sdu: Bytes) {
        self.emit(UpperLayerEvent::SrbSdu { lcid, sdu });
    }

    fn notify_integrity_failure(&self, lcid: Lcid) {
        self.emit(UpperLayerEvent::IntegrityFailure { lcid });
    }

    fn notify_max_count_reached(&self, lcid: Lcid) {
        self.emit(UpperLayerEvent::MaxCountReached { lcid });
    }
}

impl GwInterfacePdcp for ChannelUpperLayer {
    fn write_pdu(&self, lcid: Lcid, sdu: Bytes) {
        self.emit(UpperLayerEvent::DrbSdu { lcid, sdu });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_non_blocking_drops_on_full_queue() {
        let (tx, mut rx) = mpsc::channel(1);
        let rlc = ChannelRlc::new(tx, Duration::from_millis(10));

        rlc.write_sdu(Lcid(4), Bytes::from_static(b"a"), false).await.unwrap();
        rlc.write_sdu(Lcid(4), Bytes::from_static(b"b"), false).await.unwrap();
        assert_eq!(rlc.dropped(), 1);

        let first = rx.recv().await.unwrap();
        assert_eq!(first, LowerLayerMessage::Pdu { lcid: Lcid(4), pdu: Bytes::from_static(b"a") });
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocking_times_out_on_full_queue() {
        let (tx, _rx) = mpsc::channel(1);
        let rlc = ChannelRlc::new(tx, Duration::from_millis(50));

        rlc.write_sdu(Lcid(4), Bytes::from_static(b"a"), true).await.unwrap();
        let result = rlc.write_sdu(Lcid(4), Bytes::from_static(b"b"), true).await;
        assert!(matches!(result, Err(InterfaceError::Timeout(50))));
    }

    #[tokio::test]
    async fn test_closed_channel_reports_disconnect() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let rlc = ChannelRlc::new(tx, Duration::from_millis(10));

        let result = rlc.write_sdu(Lcid(1), Bytes::from_static(b"a"), false).await;
        assert!(matches!(result, Err(InterfaceError::Disconnected(_))));
    }

    #[tokio::test]
    async fn test_upper_layer_routes_by_bearer_kind() {
        let (upper, mut rx) = ChannelUpperLayer::new();

        RrcInterfacePdcp::write_pdu(&upper, Lcid(1), Bytes::from_static(b"rrc"));
        GwInterfacePdcp::write_pdu(&upper, Lcid(5), Bytes::from_static(b"ip"));
        upper.notify_integrity_failure(Lcid(5));

        assert!(matches!(rx.recv().await, Some(UpperLayerEvent::SrbSdu { lcid: Lcid(1), .. })));
        assert!(matches!(rx.recv().await, Some(UpperLayerEvent::DrbSdu { lcid: Lcid(5), .. })));
        assert_eq!(rx.recv().await, Some(UpperLayerEvent::IntegrityFailure { lcid: Lcid(5) }));
    }
}

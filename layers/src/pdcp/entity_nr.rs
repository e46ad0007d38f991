//! NR PDCP Entity
//!
//! One entity per radio bearer (TS 38.323 section 5). All state lives behind
//! a single async mutex; upper-layer delivery happens inside it so SDUs leave
//! in COUNT order, lower-layer submission happens outside it under a
//! separate TX ordering lock.

use super::header::{count_lt, derive_count, sn_of, PdcpHeader, PdcpPduType};
use super::reordering::{InsertOutcome, ReorderingBuffer};
use super::security::{NrSecurityContext, SecurityConfig, SecurityContext, SecurityState, MAC_SIZE};
use super::timers::PdcpTimers;
use super::{PdcpConfig, PdcpEntity, PdcpMetrics};
use crate::LayerError;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use common::types::{Lcid, SnLength};
use common::utils::bytes_to_hex;
use interfaces::{GwInterfacePdcp, RlcInterfacePdcp, RrcInterfacePdcp};
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

/// Last COUNT value; TX_NEXT never reaches it so no COUNT is reused
const MAX_COUNT: u32 = u32::MAX;

/// Receive state variables snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PdcpRxState {
    pub rx_next: u32,
    pub rx_deliv: u32,
    pub rx_reord: u32,
    pub buffered: usize,
}

struct Bearer {
    lcid: Lcid,
    config: PdcpConfig,
    sn_len: SnLength,
    rlc: Arc<dyn RlcInterfacePdcp>,
    rrc: Arc<dyn RrcInterfacePdcp>,
    gw: Arc<dyn GwInterfacePdcp>,
}

impl Bearer {
    fn deliver(&self, sdus: Vec<(u32, Bytes)>) {
        for (count, sdu) in sdus {
            trace!("LCID {}: delivering COUNT {} ({} bytes)", self.lcid, count, sdu.len());
            if self.lcid.is_srb() {
                self.rrc.write_pdu(self.lcid, sdu);
            } else {
                self.gw.write_pdu(self.lcid, sdu);
            }
        }
    }
}

struct EntityState {
    bearer: Option<Arc<Bearer>>,
    traffic_seen: bool,

    // State variables: TS 38.323 section 7.1
    tx_next: u32,
    rx_next: u32,
    rx_deliv: u32,
    rx_reord: u32,

    security: Option<Box<dyn SecurityContext>>,
    security_state: SecurityState,
    max_count_notified: bool,
    /// Bumped by init and reestablish, fences deferred TX work
    epoch: u64,

    reordering: ReorderingBuffer,
    timers: PdcpTimers,
    metrics: PdcpMetrics,
}

impl EntityState {
    fn new() -> Self {
        Self {
            bearer: None,
            traffic_seen: false,
            tx_next: 0,
            rx_next: 0,
            rx_deliv: 0,
            rx_reord: 0,
            security: None,
            security_state: SecurityState::None,
            max_count_notified: false,
            epoch: 0,
            reordering: ReorderingBuffer::new(1),
            timers: PdcpTimers::new(),
            metrics: PdcpMetrics::default(),
        }
    }

    fn bearer(&self) -> Result<Arc<Bearer>, LayerError> {
        self.bearer.clone().ok_or(LayerError::NotInitialized)
    }

    fn security(&self) -> Result<&dyn SecurityContext, LayerError> {
        self.security.as_deref().ok_or(LayerError::SecurityNotConfigured)
    }

    /// Back to ACTIVE with security NONE: counters, buffer, timers and keys
    fn reset_bearer_state(&mut self) {
        self.timers.stop_all();
        self.tx_next = 0;
        self.rx_next = 0;
        self.rx_deliv = 0;
        self.rx_reord = 0;
        self.max_count_notified = false;
        self.reordering.clear();
        self.security = None;
        self.security_state = SecurityState::None;
        self.epoch = self.epoch.wrapping_add(1);
    }
}

struct EntityInner {
    state: Mutex<EntityState>,
    /// Held across lower-layer submission so PDUs reach RLC in COUNT order
    tx_order: Mutex<()>,
    tx_next: AtomicU32,
    rx_next: AtomicU32,
}

/// NR PDCP entity
#[derive(Clone)]
pub struct PdcpEntityNr {
    inner: Arc<EntityInner>,
}

impl Default for PdcpEntityNr {
    fn default() -> Self {
        Self::new()
    }
}

impl PdcpEntityNr {
    /// Create an uninitialized entity
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EntityInner {
                state: Mutex::new(EntityState::new()),
                tx_order: Mutex::new(()),
                tx_next: AtomicU32::new(0),
                rx_next: AtomicU32::new(0),
            }),
        }
    }

    /// Bind collaborators and configuration. Allowed again only until the
    /// first SDU or PDU has been processed.
    pub async fn init(
        &self,
        rlc: Arc<dyn RlcInterfacePdcp>,
        rrc: Arc<dyn RrcInterfacePdcp>,
        gw: Arc<dyn GwInterfacePdcp>,
        lcid: Lcid,
        config: PdcpConfig,
    ) -> Result<(), LayerError> {
        let mut st = self.inner.state.lock().await;
        if st.traffic_seen {
            return Err(LayerError::InvalidState(format!(
                "LCID {} already carried traffic, init refused",
                lcid
            )));
        }

        let sn_len = config.validate(lcid)?;
        info!(
            "Initializing PDCP entity: lcid={}, sn_size={}, rlc_mode={:?}, window={}",
            lcid,
            sn_len.bits(),
            config.rlc_mode,
            sn_len.window_size()
        );
        debug!(
            "PDCP timers: discard={:?} ms, t_reordering={:?} ms",
            config.discard_timer, config.t_reordering
        );

        st.reset_bearer_state();
        st.reordering = ReorderingBuffer::new(sn_len.window_size() as usize);
        st.bearer = Some(Arc::new(Bearer {
            lcid,
            config,
            sn_len,
            rlc,
            rrc,
            gw,
        }));
        self.inner.publish_counts(&st);
        Ok(())
    }

    /// Install a custom security capability instead of the NR algorithms
    pub async fn config_security_context(
        &self,
        context: Box<dyn SecurityContext>,
    ) -> Result<(), LayerError> {
        let mut st = self.inner.state.lock().await;
        st.bearer()?;
        st.security = Some(context);
        Ok(())
    }

    /// Lower-layer confirmation that the PDUs with these SNs were delivered
    pub async fn notify_delivery(&self, sns: &[u32]) -> Result<(), LayerError> {
        let mut st = self.inner.state.lock().await;
        let bearer = st.bearer()?;
        let stopped = st
            .timers
            .stop_discard_where(|count| sns.contains(&sn_of(count, bearer.sn_len)));
        debug!("LCID {}: delivery of {} PDUs confirmed", bearer.lcid, stopped);
        Ok(())
    }

    /// Force delivery across a persisting gap, as on t-Reordering expiry
    pub async fn handle_reordering_timeout(&self) -> Result<(), LayerError> {
        self.inner.reordering_timer_expired(None).await
    }

    /// Snapshot of the metrics counters
    pub async fn get_metrics(&self) -> PdcpMetrics {
        self.inner.state.lock().await.metrics.clone()
    }

    /// Snapshot of the receive state variables
    pub async fn rx_state(&self) -> PdcpRxState {
        let st = self.inner.state.lock().await;
        PdcpRxState {
            rx_next: st.rx_next,
            rx_deliv: st.rx_deliv,
            rx_reord: st.rx_reord,
            buffered: st.reordering.len(),
        }
    }

    /// Current security sub-state
    pub async fn security_state(&self) -> SecurityState {
        self.inner.state.lock().await.security_state
    }
}

impl EntityInner {
    fn publish_counts(&self, st: &EntityState) {
        self.tx_next.store(st.tx_next, Ordering::Release);
        self.rx_next.store(st.rx_next, Ordering::Release);
    }

    async fn write_sdu(self: &Arc<Self>, sdu: Bytes, blocking: bool) -> Result<(), LayerError> {
        let _tx_order = self.tx_order.lock().await;

        let (bearer, pdu, count, epoch) = {
            let mut guard = self.state.lock().await;
            let st = &mut *guard;
            let bearer = st.bearer()?;
            st.traffic_seen = true;

            if st.tx_next == MAX_COUNT {
                if !st.max_count_notified {
                    warn!(
                        "LCID {}: TX COUNT exhausted, refusing SDUs until re-keying",
                        bearer.lcid
                    );
                    bearer.rrc.notify_max_count_reached(bearer.lcid);
                    st.max_count_notified = true;
                }
                return Err(LayerError::MaxCountReached);
            }

            let count = st.tx_next;
            let sn_len = bearer.sn_len;
            let bearer_id = bearer.lcid.bearer_id();
            let direction = bearer.config.tx_direction;

            let mut pdu = BytesMut::with_capacity(sn_len.header_len() + sdu.len() + MAC_SIZE);
            PdcpHeader::data(sn_of(count, sn_len)).write(sn_len, bearer.lcid.is_drb(), &mut pdu);
            pdu.extend_from_slice(&sdu);

            if st.security_state.integrity() {
                let mac = st.security()?.apply_integrity(direction, bearer_id, count, &pdu)?;
                pdu.extend_from_slice(&mac);
            }
            if st.security_state.ciphering() {
                st.security()?
                    .cipher(direction, bearer_id, count, &mut pdu[sn_len.header_len()..])?;
            }

            st.tx_next = count.wrapping_add(1);
            st.metrics.tx_pdus += 1;
            st.metrics.tx_bytes += pdu.len() as u64;
            trace!(
                "LCID {}: TX COUNT {} header [{}]",
                bearer.lcid,
                count,
                bytes_to_hex(&pdu[..sn_len.header_len()])
            );

            self.publish_counts(st);
            (bearer, pdu.freeze(), count, st.epoch)
        };

        bearer.rlc.write_sdu(bearer.lcid, pdu, blocking).await?;

        // Only PDUs RLC accepted can be discarded later
        if let Some(ms) = bearer.config.discard_timer {
            let mut st = self.state.lock().await;
            if st.epoch == epoch {
                let weak = Arc::downgrade(self);
                let duration = Duration::from_millis(u64::from(ms));
                st.timers.start_discard(count, duration, move |id| async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.discard_timer_expired(count, id).await;
                    }
                });
            }
        }
        Ok(())
    }

    async fn write_pdu(self: &Arc<Self>, pdu: Bytes) -> Result<(), LayerError> {
        let mut guard = self.state.lock().await;
        let st = &mut *guard;
        let bearer = st.bearer()?;
        st.traffic_seen = true;
        st.metrics.rx_pdus += 1;
        st.metrics.rx_bytes += pdu.len() as u64;

        let sn_len = bearer.sn_len;
        let header_len = sn_len.header_len();
        let header = PdcpHeader::parse(&pdu, sn_len, bearer.lcid.is_drb())?;
        if header.pdu_type == PdcpPduType::Control {
            st.metrics.rx_control_pdus += 1;
            debug!("LCID {}: control PDU ignored ({} bytes)", bearer.lcid, pdu.len());
            return Ok(());
        }

        let count = derive_count(header.sn, st.rx_deliv, sn_len);
        if count_lt(count, st.rx_deliv) || st.reordering.contains(count) {
            st.metrics.rx_duplicates += 1;
            debug!(
                "LCID {}: dropping duplicate or stale PDU SN={} COUNT={} (RX_DELIV={})",
                bearer.lcid, header.sn, count, st.rx_deliv
            );
            return Err(LayerError::DuplicateOrStalePdu { count });
        }

        let bearer_id = bearer.lcid.bearer_id();
        let direction = bearer.config.rx_direction;
        let mut body = BytesMut::from(&pdu[header_len..]);

        if st.security_state.ciphering() {
            st.security()?.cipher(direction, bearer_id, count, &mut body)?;
        }

        if st.security_state.integrity() {
            if body.len() < MAC_SIZE {
                return Err(LayerError::InvalidPdu(format!(
                    "{} byte PDU cannot hold a MAC-I",
                    pdu.len()
                )));
            }
            let mac = body.split_off(body.len() - MAC_SIZE);

            let mut message = BytesMut::with_capacity(header_len + body.len());
            message.extend_from_slice(&pdu[..header_len]);
            message.extend_from_slice(&body);

            if !st.security()?.verify_integrity(direction, bearer_id, count, &message, &mac)? {
                st.metrics.integrity_failures += 1;
                warn!("LCID {}: integrity check failed for COUNT {}", bearer.lcid, count);
                bearer.rrc.notify_integrity_failure(bearer.lcid);
                return Err(LayerError::IntegrityFailure { count });
            }
        }

        let outcome = st.reordering.insert(count, body.freeze(), st.rx_deliv)?;
        if let InsertOutcome::StoredEvicting(_) = outcome {
            st.metrics.buffer_overflows += 1;
        }

        if !count_lt(count, st.rx_next) {
            st.rx_next = count.wrapping_add(1);
        }

        let delivered = st.reordering.drain(st.rx_deliv);
        st.rx_deliv = st.rx_deliv.wrapping_add(delivered.len() as u32);
        st.metrics.rx_delivered_sdus += delivered.len() as u64;
        debug!(
            "LCID {}: RX COUNT {}, delivered {}, RX_DELIV={}, RX_NEXT={}",
            bearer.lcid,
            count,
            delivered.len(),
            st.rx_deliv,
            st.rx_next
        );
        bearer.deliver(delivered);

        self.update_reordering_timer(st, &bearer);
        self.publish_counts(st);
        Ok(())
    }

    /// t-Reordering start/stop after a reception (TS 38.323 section 5.2.2.2)
    fn update_reordering_timer(self: &Arc<Self>, st: &mut EntityState, bearer: &Bearer) {
        if st.timers.reordering_running() && !count_lt(st.rx_deliv, st.rx_reord) {
            st.timers.stop_reordering();
        }

        if !st.timers.reordering_running() && count_lt(st.rx_deliv, st.rx_next) {
            st.rx_reord = st.rx_next;
            self.start_reordering_timer(st, bearer);
        }
    }

    fn start_reordering_timer(self: &Arc<Self>, st: &mut EntityState, bearer: &Bearer) {
        let Some(ms) = bearer.config.t_reordering else {
            return;
        };

        let weak = Arc::downgrade(self);
        st.timers
            .start_reordering(Duration::from_millis(u64::from(ms)), move |id| async move {
                if let Some(inner) = weak.upgrade() {
                    if let Err(e) = inner.reordering_timer_expired(Some(id)).await {
                        debug!("t-Reordering expiry ignored: {}", e);
                    }
                }
            });
    }

    /// t-Reordering expiry (TS 38.323 section 5.2.2.3). `None` forces the
    /// procedure without a running timer.
    async fn reordering_timer_expired(self: &Arc<Self>, id: Option<u64>) -> Result<(), LayerError> {
        let mut guard = self.state.lock().await;
        let st = &mut *guard;
        let bearer = st.bearer()?;

        match id {
            Some(id) if !st.timers.finish_reordering(id) => return Ok(()),
            Some(_) => {}
            None => st.timers.stop_reordering(),
        }
        st.metrics.reordering_timeouts += 1;

        let mut delivered = st.reordering.drain_before(st.rx_reord, st.rx_deliv);
        if count_lt(st.rx_deliv, st.rx_reord) {
            st.rx_deliv = st.rx_reord;
        }
        let run = st.reordering.drain(st.rx_deliv);
        st.rx_deliv = st.rx_deliv.wrapping_add(run.len() as u32);
        delivered.extend(run);

        info!(
            "LCID {}: t-Reordering expired, delivered {} SDUs, RX_DELIV={}",
            bearer.lcid,
            delivered.len(),
            st.rx_deliv
        );
        st.metrics.rx_delivered_sdus += delivered.len() as u64;
        bearer.deliver(delivered);

        if count_lt(st.rx_deliv, st.rx_next) {
            st.rx_reord = st.rx_next;
            self.start_reordering_timer(st, &bearer);
        }
        Ok(())
    }

    async fn discard_timer_expired(self: &Arc<Self>, count: u32, id: u64) {
        let mut st = self.state.lock().await;
        let Some(bearer) = st.bearer.clone() else {
            return;
        };
        if !st.timers.finish_discard(count, id) {
            return;
        }

        st.metrics.discarded_sdus += 1;
        let sn = sn_of(count, bearer.sn_len);
        debug!("LCID {}: discard timer expired for COUNT {} (SN {})", bearer.lcid, count, sn);
        bearer.rlc.discard_sdu(bearer.lcid, sn);
    }
}

#[async_trait]
impl PdcpEntity for PdcpEntityNr {
    async fn write_sdu(&self, sdu: Bytes, blocking: bool) -> Result<(), LayerError> {
        self.inner.write_sdu(sdu, blocking).await
    }

    async fn write_pdu(&self, pdu: Bytes) -> Result<(), LayerError> {
        self.inner.write_pdu(pdu).await
    }

    async fn config_security(&self, config: SecurityConfig) -> Result<(), LayerError> {
        let mut st = self.inner.state.lock().await;
        let bearer = st.bearer()?;
        let context = NrSecurityContext::for_bearer(&config, bearer.lcid)?;
        info!(
            "LCID {}: security configured, cipher={:?}, integrity={:?}",
            bearer.lcid, config.cipher_algo, config.integ_algo
        );
        st.security = Some(Box::new(context));
        Ok(())
    }

    async fn enable_integrity(&self) -> Result<(), LayerError> {
        let mut st = self.inner.state.lock().await;
        st.security()?;
        st.security_state = st.security_state.with_integrity();
        debug!("Integrity protection enabled, state={:?}", st.security_state);
        Ok(())
    }

    async fn enable_encryption(&self) -> Result<(), LayerError> {
        let mut st = self.inner.state.lock().await;
        st.security()?;
        st.security_state = st.security_state.with_ciphering();
        debug!("Ciphering enabled, state={:?}", st.security_state);
        Ok(())
    }

    async fn reset(&self) {
        let mut st = self.inner.state.lock().await;
        st.timers.stop_all();
        debug!("PDCP timers stopped");
    }

    async fn reestablish(&self) {
        let mut st = self.inner.state.lock().await;
        if let Some(bearer) = &st.bearer {
            info!("Re-establishing PDCP entity on LCID {}", bearer.lcid);
        }

        st.reset_bearer_state();
        self.inner.publish_counts(&st);
    }

    fn get_ul_count(&self) -> u32 {
        self.inner.tx_next.load(Ordering::Acquire)
    }

    fn get_dl_count(&self) -> u32 {
        self.inner.rx_next.load(Ordering::Acquire)
    }
}

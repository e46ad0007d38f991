//! Packet Data Convergence Protocol (PDCP) Layer Implementation
//!
//! Implements the 5G NR PDCP layer according to 3GPP TS 38.323:
//! SN assignment and COUNT recovery, ciphering and integrity protection,
//! in-order delivery through a reordering window, discard and t-Reordering
//! timers.

pub mod entity_nr;
pub mod header;
pub mod reordering;
pub mod security;
pub mod timers;

pub use entity_nr::{PdcpEntityNr, PdcpRxState};
pub use header::{derive_count, PdcpHeader, PdcpPduType};
pub use reordering::{InsertOutcome, ReorderingBuffer};
pub use security::{NrSecurityContext, SecurityConfig, SecurityContext, SecurityKeys, SecurityState};

use crate::LayerError;
use async_trait::async_trait;
use bytes::Bytes;
use common::types::{Direction, Lcid, RlcMode, SnLength};
use serde::{Deserialize, Serialize};

/// PDCP layer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdcpConfig {
    /// SN size in bits (12 or 18)
    pub sn_size: u8,
    /// Mode of the RLC entity below
    #[serde(default = "default_rlc_mode")]
    pub rlc_mode: RlcMode,
    /// Discard timer in ms, absent means infinity
    #[serde(default)]
    pub discard_timer: Option<u32>,
    /// Reordering timer in ms, absent means no forced delivery
    #[serde(default)]
    pub t_reordering: Option<u32>,
    /// Direction used for transmitted PDUs
    #[serde(default = "default_tx_direction")]
    pub tx_direction: Direction,
    /// Direction used for received PDUs
    #[serde(default = "default_rx_direction")]
    pub rx_direction: Direction,
}

fn default_rlc_mode() -> RlcMode {
    RlcMode::Am
}

fn default_tx_direction() -> Direction {
    Direction::Uplink
}

fn default_rx_direction() -> Direction {
    Direction::Downlink
}

impl PdcpConfig {
    /// UE side bearer: transmits uplink, receives downlink
    pub fn ue(sn_size: u8) -> Self {
        Self {
            sn_size,
            rlc_mode: RlcMode::Am,
            discard_timer: None,
            t_reordering: None,
            tx_direction: Direction::Uplink,
            rx_direction: Direction::Downlink,
        }
    }

    /// Network side bearer: transmits downlink, receives uplink
    pub fn gnb(sn_size: u8) -> Self {
        Self {
            tx_direction: Direction::Downlink,
            rx_direction: Direction::Uplink,
            ..Self::ue(sn_size)
        }
    }

    /// Check the configuration for a bearer and return the SN length
    pub fn validate(&self, lcid: Lcid) -> Result<SnLength, LayerError> {
        let sn_len = SnLength::from_bits(self.sn_size).ok_or_else(|| {
            LayerError::ConfigError(format!(
                "Invalid SN size {}: must be 12 or 18 bits",
                self.sn_size
            ))
        })?;

        if lcid.value() == 0 || lcid.value() > Lcid::MAX {
            return Err(LayerError::ConfigError(format!(
                "LCID {} cannot carry a PDCP bearer",
                lcid
            )));
        }

        if self.rlc_mode == RlcMode::Tm {
            return Err(LayerError::ConfigError("PDCP is not used over RLC TM".to_string()));
        }

        if self.tx_direction == self.rx_direction {
            return Err(LayerError::ConfigError(format!(
                "TX and RX direction are both {:?}",
                self.tx_direction
            )));
        }

        Ok(sn_len)
    }
}

/// Per-entity counters for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PdcpMetrics {
    pub tx_pdus: u64,
    pub tx_bytes: u64,
    pub rx_pdus: u64,
    pub rx_bytes: u64,
    pub rx_delivered_sdus: u64,
    pub rx_duplicates: u64,
    pub rx_control_pdus: u64,
    pub integrity_failures: u64,
    pub buffer_overflows: u64,
    pub discarded_sdus: u64,
    pub reordering_timeouts: u64,
}

/// Behaviour shared by PDCP entity implementations.
///
/// One entity serves one radio bearer. `write_sdu` and `write_pdu` may be
/// called concurrently from the upper and lower layer.
#[async_trait]
pub trait PdcpEntity: Send + Sync {
    /// Transmit an SDU from the upper layer
    async fn write_sdu(&self, sdu: Bytes, blocking: bool) -> Result<(), LayerError>;

    /// Process a PDU received from the lower layer
    async fn write_pdu(&self, pdu: Bytes) -> Result<(), LayerError>;

    /// Install keys and algorithms, effective from the next PDU
    async fn config_security(&self, config: SecurityConfig) -> Result<(), LayerError>;

    /// Turn on integrity protection in both directions
    async fn enable_integrity(&self) -> Result<(), LayerError>;

    /// Turn on ciphering in both directions
    async fn enable_encryption(&self) -> Result<(), LayerError>;

    /// Stop pending timers, state variables are kept
    async fn reset(&self);

    /// Reset state variables, buffered SDUs and security
    async fn reestablish(&self);

    /// TX_NEXT snapshot
    fn get_ul_count(&self) -> u32;

    /// RX_NEXT snapshot
    fn get_dl_count(&self) -> u32;
}

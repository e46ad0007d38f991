//! Common Types for the NR Protocol Stack
//!
//! Defines fundamental types shared by the PDCP layer and its collaborators

use num_derive::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical Channel Identity of a radio bearer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Lcid(pub u8);

impl Lcid {
    /// Highest LCID usable by a radio bearer
    pub const MAX: u8 = 32;

    /// Highest LCID mapped to a signalling radio bearer (SRB1..SRB3)
    pub const MAX_SRB: u8 = 3;

    /// Create a new LCID
    pub fn new(value: u8) -> Self {
        Self(value)
    }

    /// Get the LCID value
    pub fn value(&self) -> u8 {
        self.0
    }

    /// Signalling radio bearers carry RRC traffic
    pub fn is_srb(&self) -> bool {
        self.0 <= Self::MAX_SRB
    }

    /// Data radio bearers carry user-plane traffic
    pub fn is_drb(&self) -> bool {
        !self.is_srb()
    }

    /// 5-bit BEARER input of the security algorithms (radio bearer identity - 1)
    pub fn bearer_id(&self) -> u8 {
        self.0.saturating_sub(1) & 0x1F
    }
}

impl fmt::Display for Lcid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transmission direction as used by the security algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// UE to network
    Uplink = 0,
    /// Network to UE
    Downlink = 1,
}

impl Direction {
    /// 1-bit DIRECTION input of the security algorithms
    pub fn bit(&self) -> u8 {
        *self as u8
    }
}

/// PDCP SN field length
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum SnLength {
    /// 12-bit SN, 2-byte header
    Len12 = 12,
    /// 18-bit SN, 3-byte header
    Len18 = 18,
}

impl SnLength {
    /// Validate a configured SN size in bits
    pub fn from_bits(bits: u8) -> Option<Self> {
        num_traits::FromPrimitive::from_u8(bits)
    }

    /// Number of SN bits
    pub fn bits(&self) -> u32 {
        *self as u32
    }

    /// Mask selecting the SN part of a COUNT
    pub fn sn_mask(&self) -> u32 {
        (1u32 << self.bits()) - 1
    }

    /// Reordering window, half of the SN space
    pub fn window_size(&self) -> u32 {
        1u32 << (self.bits() - 1)
    }

    /// Length of the data PDU header in bytes
    pub fn header_len(&self) -> usize {
        match self {
            SnLength::Len12 => 2,
            SnLength::Len18 => 3,
        }
    }
}

/// RLC operating modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RlcMode {
    /// Transparent Mode
    Tm,
    /// Unacknowledged Mode
    Um,
    /// Acknowledged Mode
    Am,
}

/// NR ciphering algorithm identifiers (TS 33.501)
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive, Serialize, Deserialize)]
pub enum CipheringAlgorithm {
    /// Null ciphering
    Nea0 = 0,
    /// SNOW 3G based
    Nea1 = 1,
    /// AES-CTR based
    Nea2 = 2,
    /// ZUC based
    Nea3 = 3,
}

impl CipheringAlgorithm {
    /// Look up an algorithm by its 4-bit identifier
    pub fn from_id(id: u8) -> Option<Self> {
        num_traits::FromPrimitive::from_u8(id)
    }
}

/// NR integrity algorithm identifiers (TS 33.501)
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive, Serialize, Deserialize)]
pub enum IntegrityAlgorithm {
    /// Null integrity
    Nia0 = 0,
    /// SNOW 3G based
    Nia1 = 1,
    /// AES-CMAC based
    Nia2 = 2,
    /// ZUC based
    Nia3 = 3,
}

impl IntegrityAlgorithm {
    /// Look up an algorithm by its 4-bit identifier
    pub fn from_id(id: u8) -> Option<Self> {
        num_traits::FromPrimitive::from_u8(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lcid_bearer_class() {
        assert!(Lcid::new(1).is_srb());
        assert!(Lcid::new(3).is_srb());
        assert!(Lcid::new(4).is_drb());
        assert_eq!(Lcid::new(4).bearer_id(), 3);
        assert_eq!(Lcid::new(0).bearer_id(), 0);
    }

    #[test]
    fn test_sn_length_constants() {
        assert_eq!(SnLength::from_bits(12), Some(SnLength::Len12));
        assert_eq!(SnLength::from_bits(18), Some(SnLength::Len18));
        assert_eq!(SnLength::from_bits(16), None);

        assert_eq!(SnLength::Len12.window_size(), 2048);
        assert_eq!(SnLength::Len18.window_size(), 131_072);
        assert_eq!(SnLength::Len12.sn_mask(), 0x0FFF);
        assert_eq!(SnLength::Len18.sn_mask(), 0x3FFFF);
        assert_eq!(SnLength::Len18.header_len(), 3);
    }

    #[test]
    fn test_algorithm_lookup() {
        assert_eq!(CipheringAlgorithm::from_id(2), Some(CipheringAlgorithm::Nea2));
        assert_eq!(IntegrityAlgorithm::from_id(0), Some(IntegrityAlgorithm::Nia0));
        assert_eq!(CipheringAlgorithm::from_id(7), None);
        assert_eq!(IntegrityAlgorithm::from_id(4), None);
    }

    #[test]
    fn test_direction_bits() {
        assert_eq!(Direction::Uplink.bit(), 0);
        assert_eq!(Direction::Downlink.bit(), 1);
    }
}

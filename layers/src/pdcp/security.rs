//! PDCP Security Context
//!
//! Ciphering and integrity protection as consumed by the PDCP entity.
//! The entity only sees the [`SecurityContext`] capability; the NR
//! implementation provides NEA0/NEA2 and NIA0/NIA2 (3GPP TS 33.501 Annex D).

use crate::LayerError;
use aes::Aes128;
use cmac::{Cmac, Mac};
use common::types::{CipheringAlgorithm, Direction, IntegrityAlgorithm, Lcid};
use ctr::cipher::{KeyIvInit, StreamCipher};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// AES-128 key size in bytes
pub const KEY_SIZE: usize = 16;

/// MAC-I size in bytes
pub const MAC_SIZE: usize = 4;

/// 128-bit key
pub type Key = [u8; KEY_SIZE];

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// Ciphering and integrity capability keyed by COUNT
pub trait SecurityContext: Send + Sync {
    /// Compute the 32-bit MAC-I over `message`
    fn apply_integrity(
        &self,
        direction: Direction,
        bearer: u8,
        count: u32,
        message: &[u8],
    ) -> Result<[u8; MAC_SIZE], LayerError>;

    /// Check a received MAC-I
    fn verify_integrity(
        &self,
        direction: Direction,
        bearer: u8,
        count: u32,
        message: &[u8],
        mac: &[u8],
    ) -> Result<bool, LayerError> {
        let expected = self.apply_integrity(direction, bearer, count, message)?;
        let diff = mac
            .iter()
            .zip(expected.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));
        Ok(mac.len() == MAC_SIZE && diff == 0)
    }

    /// Cipher or decipher `data` in place (keystream XOR)
    fn cipher(
        &self,
        direction: Direction,
        bearer: u8,
        count: u32,
        data: &mut [u8],
    ) -> Result<(), LayerError>;
}

/// The four AS keys handed over by RRC. Zeroized on drop, never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecurityKeys {
    /// K_RRCenc
    pub k_rrc_enc: Key,
    /// K_RRCint
    pub k_rrc_int: Key,
    /// K_UPenc
    pub k_up_enc: Key,
    /// K_UPint
    pub k_up_int: Key,
}

impl fmt::Debug for SecurityKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecurityKeys { .. }")
    }
}

/// Security configuration installed by `config_security`
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// Key material
    pub keys: SecurityKeys,
    /// Ciphering algorithm
    pub cipher_algo: CipheringAlgorithm,
    /// Integrity algorithm
    pub integ_algo: IntegrityAlgorithm,
}

impl SecurityConfig {
    /// Build a configuration from raw 4-bit algorithm identifiers
    pub fn from_ids(keys: SecurityKeys, cipher_id: u8, integ_id: u8) -> Result<Self, LayerError> {
        let cipher_algo = CipheringAlgorithm::from_id(cipher_id)
            .ok_or_else(|| {
                LayerError::UnsupportedAlgorithm(format!("ciphering algorithm id {}", cipher_id))
            })?;
        let integ_algo = IntegrityAlgorithm::from_id(integ_id)
            .ok_or_else(|| {
                LayerError::UnsupportedAlgorithm(format!("integrity algorithm id {}", integ_id))
            })?;

        Ok(Self {
            keys,
            cipher_algo,
            integ_algo,
        })
    }
}

/// Security sub-state of an entity. Only moves forward until reestablishment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityState {
    #[default]
    None,
    IntegrityOnly,
    CipherOnly,
    Both,
}

impl SecurityState {
    /// Integrity protection active
    pub fn integrity(&self) -> bool {
        matches!(self, SecurityState::IntegrityOnly | SecurityState::Both)
    }

    /// Ciphering active
    pub fn ciphering(&self) -> bool {
        matches!(self, SecurityState::CipherOnly | SecurityState::Both)
    }

    pub fn with_integrity(self) -> Self {
        if self.ciphering() {
            SecurityState::Both
        } else {
            SecurityState::IntegrityOnly
        }
    }

    pub fn with_ciphering(self) -> Self {
        if self.integrity() {
            SecurityState::Both
        } else {
            SecurityState::CipherOnly
        }
    }
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct BearerKey(Key);

/// NR security context for one bearer
pub struct NrSecurityContext {
    cipher_algo: CipheringAlgorithm,
    integ_algo: IntegrityAlgorithm,
    k_enc: BearerKey,
    k_int: BearerKey,
}

impl fmt::Debug for NrSecurityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NrSecurityContext")
            .field("cipher_algo", &self.cipher_algo)
            .field("integ_algo", &self.integ_algo)
            .finish_non_exhaustive()
    }
}

impl NrSecurityContext {
    /// Create a context from one encryption and one integrity key
    pub fn new(
        cipher_algo: CipheringAlgorithm,
        integ_algo: IntegrityAlgorithm,
        k_enc: &Key,
        k_int: &Key,
    ) -> Result<Self, LayerError> {
        match cipher_algo {
            CipheringAlgorithm::Nea0 | CipheringAlgorithm::Nea2 => {}
            other => return Err(LayerError::UnsupportedAlgorithm(format!("{:?}", other))),
        }
        match integ_algo {
            IntegrityAlgorithm::Nia0 | IntegrityAlgorithm::Nia2 => {}
            other => return Err(LayerError::UnsupportedAlgorithm(format!("{:?}", other))),
        }

        Ok(Self {
            cipher_algo,
            integ_algo,
            k_enc: BearerKey(*k_enc),
            k_int: BearerKey(*k_int),
        })
    }

    /// Select the key pair for a bearer: RRC keys on SRBs, UP keys on DRBs
    pub fn for_bearer(config: &SecurityConfig, lcid: Lcid) -> Result<Self, LayerError> {
        let keys = &config.keys;
        if lcid.is_srb() {
            Self::new(config.cipher_algo, config.integ_algo, &keys.k_rrc_enc, &keys.k_rrc_int)
        } else {
            Self::new(config.cipher_algo, config.integ_algo, &keys.k_up_enc, &keys.k_up_int)
        }
    }
}

impl SecurityContext for NrSecurityContext {
    fn apply_integrity(
        &self,
        direction: Direction,
        bearer: u8,
        count: u32,
        message: &[u8],
    ) -> Result<[u8; MAC_SIZE], LayerError> {
        match self.integ_algo {
            IntegrityAlgorithm::Nia0 => Ok([0u8; MAC_SIZE]),
            IntegrityAlgorithm::Nia2 => {
                nia2_compute_mac(count, bearer, direction, &self.k_int.0, message)
            }
            other => Err(LayerError::UnsupportedAlgorithm(format!("{:?}", other))),
        }
    }

    fn cipher(
        &self,
        direction: Direction,
        bearer: u8,
        count: u32,
        data: &mut [u8],
    ) -> Result<(), LayerError> {
        match self.cipher_algo {
            CipheringAlgorithm::Nea0 => Ok(()),
            CipheringAlgorithm::Nea2 => {
                nea2_apply(count, bearer, direction, &self.k_enc.0, data);
                Ok(())
            }
            other => Err(LayerError::UnsupportedAlgorithm(format!("{:?}", other))),
        }
    }
}

/// First 64 bits shared by the NEA2 IV and the NIA2 input:
/// `| COUNT (32) | BEARER (5) | DIRECTION (1) | 0 (26) |`
fn count_bearer_direction(count: u32, bearer: u8, direction: Direction) -> [u8; 8] {
    let mut block = [0u8; 8];
    block[..4].copy_from_slice(&count.to_be_bytes());
    block[4] = ((bearer & 0x1F) << 3) | ((direction.bit() & 0x01) << 2);
    block
}

/// NEA2: AES-128 in CTR mode, IV = COUNT | BEARER | DIRECTION | 0...0
fn nea2_apply(count: u32, bearer: u8, direction: Direction, key: &Key, data: &mut [u8]) {
    let mut iv = [0u8; 16];
    iv[..8].copy_from_slice(&count_bearer_direction(count, bearer, direction));

    let mut cipher = Aes128Ctr::new(key.into(), &iv.into());
    cipher.apply_keystream(data);
}

/// NIA2: AES-128-CMAC over COUNT | BEARER | DIRECTION | 0...0 | MESSAGE, truncated to 32 bits
fn nia2_compute_mac(
    count: u32,
    bearer: u8,
    direction: Direction,
    key: &Key,
    message: &[u8],
) -> Result<[u8; MAC_SIZE], LayerError> {
    let mut mac = <Cmac<Aes128> as Mac>::new_from_slice(key)
        .map_err(|_| LayerError::ConfigError("invalid integrity key length".to_string()))?;
    mac.update(&count_bearer_direction(count, bearer, direction));
    mac.update(message);
    let tag = mac.finalize().into_bytes();

    let mut out = [0u8; MAC_SIZE];
    out.copy_from_slice(&tag[..MAC_SIZE]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_keys() -> SecurityKeys {
        SecurityKeys {
            k_rrc_enc: [0x11; KEY_SIZE],
            k_rrc_int: [0x22; KEY_SIZE],
            k_up_enc: [0x33; KEY_SIZE],
            k_up_int: [0x44; KEY_SIZE],
        }
    }

    fn nea2_nia2() -> NrSecurityContext {
        NrSecurityContext::new(
            CipheringAlgorithm::Nea2,
            IntegrityAlgorithm::Nia2,
            &[0x2b; 16],
            &[0x7e; 16],
        )
        .unwrap()
    }

    #[test]
    fn test_count_bearer_direction_layout() {
        let block = count_bearer_direction(0x12345678, 0x0A, Direction::Downlink);
        // BEARER 0x0A << 3 | DIRECTION 1 << 2 = 0x54
        assert_eq!(block, [0x12, 0x34, 0x56, 0x78, 0x54, 0, 0, 0]);
    }

    #[test]
    fn test_nea2_roundtrip() {
        let ctx = nea2_nia2();
        let original = b"Hello, NEA2 AES-CTR! Test message.".to_vec();
        let mut data = original.clone();

        ctx.cipher(Direction::Uplink, 3, 0x398A59B4, &mut data).unwrap();
        assert_ne!(data, original);

        ctx.cipher(Direction::Uplink, 3, 0x398A59B4, &mut data).unwrap();
        assert_eq!(data, original);
    }

    #[test]
    fn test_nea2_keystream_depends_on_count_and_direction() {
        let ctx = nea2_nia2();
        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        let mut c = [0u8; 16];

        ctx.cipher(Direction::Uplink, 0, 0, &mut a).unwrap();
        ctx.cipher(Direction::Uplink, 0, 1, &mut b).unwrap();
        ctx.cipher(Direction::Downlink, 0, 0, &mut c).unwrap();

        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_nea0_is_identity() {
        let (nea0, nia0) = (CipheringAlgorithm::Nea0, IntegrityAlgorithm::Nia0);
        let ctx = NrSecurityContext::new(nea0, nia0, &[0; 16], &[0; 16]).unwrap();
        let mut data = b"plain".to_vec();
        ctx.cipher(Direction::Uplink, 0, 7, &mut data).unwrap();
        assert_eq!(data, b"plain");
        let mac = ctx.apply_integrity(Direction::Uplink, 0, 7, b"plain").unwrap();
        assert_eq!(mac, [0u8; MAC_SIZE]);
    }

    #[test]
    fn test_nia2_verify() {
        let ctx = nea2_nia2();
        let message = b"integrity protected";
        let mac = ctx.apply_integrity(Direction::Downlink, 4, 1000, message).unwrap();

        assert!(ctx.verify_integrity(Direction::Downlink, 4, 1000, message, &mac).unwrap());
        assert!(!ctx.verify_integrity(Direction::Downlink, 4, 1001, message, &mac).unwrap());
        assert!(!ctx.verify_integrity(Direction::Uplink, 4, 1000, message, &mac).unwrap());
        assert!(!ctx
            .verify_integrity(Direction::Downlink, 4, 1000, b"integrity protectee", &mac)
            .unwrap());
        assert!(!ctx.verify_integrity(Direction::Downlink, 4, 1000, message, &mac[..2]).unwrap());
    }

    #[test]
    fn test_unsupported_algorithms() {
        let keys = test_keys();
        assert!(matches!(
            SecurityConfig::from_ids(keys.clone(), 9, 2),
            Err(LayerError::UnsupportedAlgorithm(_))
        ));

        let config = SecurityConfig::from_ids(keys, 1, 2).unwrap();
        assert!(matches!(
            NrSecurityContext::for_bearer(&config, Lcid(1)),
            Err(LayerError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_key_selection_by_bearer() {
        let config = SecurityConfig::from_ids(test_keys(), 2, 2).unwrap();
        let srb = NrSecurityContext::for_bearer(&config, Lcid(1)).unwrap();
        let drb = NrSecurityContext::for_bearer(&config, Lcid(4)).unwrap();

        let mac_srb = srb.apply_integrity(Direction::Uplink, 0, 0, b"m").unwrap();
        let mac_drb = drb.apply_integrity(Direction::Uplink, 0, 0, b"m").unwrap();
        assert_ne!(mac_srb, mac_drb);
    }

    #[test]
    fn test_security_state_is_forward_only() {
        let state = SecurityState::None.with_integrity();
        assert_eq!(state, SecurityState::IntegrityOnly);
        assert_eq!(state.with_integrity(), SecurityState::IntegrityOnly);
        assert_eq!(state.with_ciphering(), SecurityState::Both);
        assert_eq!(SecurityState::None.with_ciphering().with_integrity(), SecurityState::Both);
    }

    #[test]
    fn test_keys_are_not_printed() {
        let printed = format!("{:?}", SecurityConfig::from_ids(test_keys(), 2, 2).unwrap());
        assert!(!printed.contains("17"));
        assert!(printed.contains("SecurityKeys { .. }"));
        assert!(!format!("{:?}", nea2_nia2()).contains("k_enc"));
    }
}

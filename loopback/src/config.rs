//! TOML Configuration for the PDCP loopback
//!
//! Every section has defaults, so an empty file (or no file) gives a
//! working unprotected 12-bit DRB.

use anyhow::{Context, Result};
use common::types::Lcid;
use common::utils::hex_to_array;
use layers::pdcp::security::KEY_SIZE;
use layers::pdcp::{PdcpConfig, SecurityConfig, SecurityKeys};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoopbackConfig {
    #[serde(default)]
    pub bearer: BearerConfig,
    #[serde(default)]
    pub security: SecuritySection,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub traffic: TrafficConfig,
}

/// Radio bearer shared by both peers
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BearerConfig {
    /// Logical channel ID, 1..=3 are SRBs
    #[serde(default = "default_lcid")]
    pub lcid: u8,
    /// PDCP parameters of the UE side, the gNB side mirrors directions
    #[serde(default = "default_pdcp")]
    pub pdcp: PdcpConfig,
}

fn default_lcid() -> u8 {
    4
}

fn default_pdcp() -> PdcpConfig {
    PdcpConfig::ue(12)
}

impl Default for BearerConfig {
    fn default() -> Self {
        Self {
            lcid: default_lcid(),
            pdcp: default_pdcp(),
        }
    }
}

impl BearerConfig {
    pub fn lcid(&self) -> Lcid {
        Lcid(self.lcid)
    }

    /// Configuration of the peer: same parameters, directions swapped
    pub fn peer_pdcp(&self) -> PdcpConfig {
        PdcpConfig {
            tx_direction: self.pdcp.rx_direction,
            rx_direction: self.pdcp.tx_direction,
            ..self.pdcp.clone()
        }
    }
}

/// Keys and algorithms, hex encoded
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecuritySection {
    /// NEA algorithm ID
    #[serde(default = "default_algo")]
    pub cipher_algo: u8,
    /// NIA algorithm ID
    #[serde(default = "default_algo")]
    pub integ_algo: u8,
    #[serde(default = "default_k_rrc_enc")]
    pub k_rrc_enc: String,
    #[serde(default = "default_k_rrc_int")]
    pub k_rrc_int: String,
    #[serde(default = "default_k_up_enc")]
    pub k_up_enc: String,
    #[serde(default = "default_k_up_int")]
    pub k_up_int: String,
    #[serde(default)]
    pub enable_integrity: bool,
    #[serde(default)]
    pub enable_ciphering: bool,
}

fn default_algo() -> u8 {
    2
}

fn default_k_rrc_enc() -> String {
    "4a1b2c3d4e5f60718293a4b5c6d7e8f9".to_string()
}

fn default_k_rrc_int() -> String {
    "0f1e2d3c4b5a69788796a5b4c3d2e1f0".to_string()
}

fn default_k_up_enc() -> String {
    "d3c8f57a1e92604bb7150e6a2f4c9d81".to_string()
}

fn default_k_up_int() -> String {
    "6b2e90a4c17d35f8e04a9b1c72d5f368".to_string()
}

impl Default for SecuritySection {
    fn default() -> Self {
        Self {
            cipher_algo: default_algo(),
            integ_algo: default_algo(),
            k_rrc_enc: default_k_rrc_enc(),
            k_rrc_int: default_k_rrc_int(),
            k_up_enc: default_k_up_enc(),
            k_up_int: default_k_up_int(),
            enable_integrity: false,
            enable_ciphering: false,
        }
    }
}

impl SecuritySection {
    /// Whether security has to be configured at all
    pub fn active(&self) -> bool {
        self.enable_integrity || self.enable_ciphering
    }

    /// Decode keys and algorithm IDs
    pub fn to_security_config(&self) -> Result<SecurityConfig> {
        let keys = SecurityKeys {
            k_rrc_enc: parse_key("k_rrc_enc", &self.k_rrc_enc)?,
            k_rrc_int: parse_key("k_rrc_int", &self.k_rrc_int)?,
            k_up_enc: parse_key("k_up_enc", &self.k_up_enc)?,
            k_up_int: parse_key("k_up_int", &self.k_up_int)?,
        };
        Ok(SecurityConfig::from_ids(keys, self.cipher_algo, self.integ_algo)?)
    }
}

fn parse_key(name: &str, text: &str) -> Result<[u8; KEY_SIZE]> {
    hex_to_array::<KEY_SIZE>(text).with_context(|| format!("Invalid {}", name))
}

/// Impairments applied by the in-memory link
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LinkConfig {
    /// Bounded queue between PDCP and the link task
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// PDUs held back and released in random order, 1 keeps order
    #[serde(default = "default_reorder_depth")]
    pub reorder_depth: usize,
    /// Probability that a PDU is delivered twice
    #[serde(default)]
    pub duplicate_probability: f64,
    /// Idle time after which held PDUs are flushed
    #[serde(default = "default_flush_ms")]
    pub flush_ms: u64,
    /// RNG seed, runs are reproducible
    #[serde(default)]
    pub seed: u64,
}

fn default_queue_capacity() -> usize {
    256
}

fn default_reorder_depth() -> usize {
    4
}

fn default_flush_ms() -> u64 {
    20
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            reorder_depth: default_reorder_depth(),
            duplicate_probability: 0.0,
            flush_ms: default_flush_ms(),
            seed: 0,
        }
    }
}

/// Generated traffic per direction
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrafficConfig {
    #[serde(default = "default_sdus")]
    pub sdus: usize,
    #[serde(default = "default_sdu_size")]
    pub sdu_size: usize,
    /// Time to wait for the last delivery
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_sdus() -> usize {
    100
}

fn default_sdu_size() -> usize {
    64
}

fn default_timeout_ms() -> u64 {
    2000
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            sdus: default_sdus(),
            sdu_size: default_sdu_size(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl LoopbackConfig {
    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load from file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.bearer.pdcp.validate(self.bearer.lcid())?;
        if !(0.0..=1.0).contains(&self.link.duplicate_probability) {
            anyhow::bail!(
                "duplicate_probability {} outside [0, 1]",
                self.link.duplicate_probability
            );
        }
        if self.link.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be positive");
        }
        if self.traffic.sdu_size < 4 {
            anyhow::bail!("sdu_size must hold the 4 byte sequence tag");
        }
        if self.security.active() {
            self.security.to_security_config()?;
        }
        Ok(())
    }
}

//! In-memory Link between two PDCP peers
//!
//! Plays the RLC of one side and the lower layer of the other: PDUs taken
//! from the sender's queue are held back, shuffled and optionally
//! duplicated before being handed to the receiving entity.

use crate::config::LinkConfig;
use bytes::Bytes;
use interfaces::LowerLayerMessage;
use layers::pdcp::{PdcpEntity, PdcpEntityNr};
use layers::LayerError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Link counters snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub forwarded: u64,
    pub duplicated: u64,
    pub rejected: u64,
    pub discard_requests: u64,
}

#[derive(Default)]
pub struct LinkCounters {
    forwarded: AtomicU64,
    duplicated: AtomicU64,
    rejected: AtomicU64,
    discard_requests: AtomicU64,
}

impl LinkCounters {
    pub fn snapshot(&self) -> LinkStats {
        LinkStats {
            forwarded: self.forwarded.load(Ordering::Relaxed),
            duplicated: self.duplicated.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            discard_requests: self.discard_requests.load(Ordering::Relaxed),
        }
    }
}

pub struct Link {
    name: &'static str,
    config: LinkConfig,
    rng: StdRng,
    held: Vec<Bytes>,
    peer: PdcpEntityNr,
    counters: Arc<LinkCounters>,
}

impl Link {
    /// `seed_offset` keeps the two directions from sharing one random sequence
    pub fn new(
        name: &'static str,
        config: LinkConfig,
        seed_offset: u64,
        peer: PdcpEntityNr,
    ) -> Self {
        let rng = StdRng::seed_from_u64(config.seed.wrapping_add(seed_offset));
        Self {
            name,
            config,
            rng,
            held: Vec::new(),
            peer,
            counters: Arc::new(LinkCounters::default()),
        }
    }

    pub fn counters(&self) -> Arc<LinkCounters> {
        self.counters.clone()
    }

    /// Run until the sending side drops its queue
    pub async fn run(mut self, mut rx: mpsc::Receiver<LowerLayerMessage>) -> LinkStats {
        let idle = Duration::from_millis(self.config.flush_ms);
        loop {
            match tokio::time::timeout(idle, rx.recv()).await {
                Ok(Some(LowerLayerMessage::Pdu { pdu, .. })) => {
                    self.held.push(pdu);
                    while self.held.len() >= self.config.reorder_depth.max(1) {
                        let index = self.rng.gen_range(0..self.held.len());
                        let pdu = self.held.swap_remove(index);
                        self.forward(pdu).await;
                    }
                }
                Ok(Some(LowerLayerMessage::Discard { lcid, sn })) => {
                    debug!("{}: discard request for LCID {} SN {}", self.name, lcid, sn);
                    self.counters.discard_requests.fetch_add(1, Ordering::Relaxed);
                }
                Ok(None) => break,
                Err(_) => self.flush().await,
            }
        }
        self.flush().await;
        self.counters.snapshot()
    }

    async fn flush(&mut self) {
        while !self.held.is_empty() {
            let index = self.rng.gen_range(0..self.held.len());
            let pdu = self.held.swap_remove(index);
            self.forward(pdu).await;
        }
    }

    async fn forward(&mut self, pdu: Bytes) {
        let copies = if self.rng.gen_bool(self.config.duplicate_probability) {
            self.counters.duplicated.fetch_add(1, Ordering::Relaxed);
            2
        } else {
            1
        };

        for _ in 0..copies {
            self.counters.forwarded.fetch_add(1, Ordering::Relaxed);
            match self.peer.write_pdu(pdu.clone()).await {
                Ok(()) => {}
                Err(LayerError::DuplicateOrStalePdu { count }) => {
                    debug!("{}: peer dropped duplicate COUNT {}", self.name, count);
                    self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!("{}: peer rejected PDU: {}", self.name, e);
                    self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}

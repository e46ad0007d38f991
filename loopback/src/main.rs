//! PDCP Loopback Application
//!
//! Runs a UE and a gNB PDCP entity for one bearer against each other over
//! an impaired in-memory link and checks in-order delivery both ways.

mod config;
mod link;

use anyhow::{Context, Result};
use bytes::{BufMut, Bytes, BytesMut};
use clap::Parser;
use config::LoopbackConfig;
use interfaces::message_types::UpperLayerEventKind;
use interfaces::{ChannelRlc, ChannelUpperLayer, LowerLayerMessage, UpperLayerEvent};
use layers::pdcp::{PdcpConfig, PdcpEntity, PdcpEntityNr, PdcpMetrics};
use link::{Link, LinkStats};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// PDCP loopback between a UE and a gNB entity
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// SDUs per direction, overrides the configuration
    #[arg(long)]
    sdus: Option<usize>,

    /// SDU size in bytes, overrides the configuration
    #[arg(long)]
    sdu_size: Option<usize>,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

/// One side of the loopback
struct Peer {
    entity: PdcpEntityNr,
    events: mpsc::UnboundedReceiver<UpperLayerEvent>,
    rlc: Arc<ChannelRlc>,
}

impl Peer {
    async fn new(
        config: &LoopbackConfig,
        pdcp: PdcpConfig,
    ) -> Result<(Self, mpsc::Receiver<LowerLayerMessage>)> {
        let (tx, rx) = mpsc::channel(config.link.queue_capacity);
        let rlc = Arc::new(ChannelRlc::new(tx, Duration::from_millis(config.traffic.timeout_ms)));
        let (upper, events) = ChannelUpperLayer::new();
        let upper = Arc::new(upper);

        let entity = PdcpEntityNr::new();
        entity
            .init(rlc.clone(), upper.clone(), upper, config.bearer.lcid(), pdcp)
            .await?;

        if config.security.active() {
            entity.config_security(config.security.to_security_config()?).await?;
            if config.security.enable_integrity {
                entity.enable_integrity().await?;
            }
            if config.security.enable_ciphering {
                entity.enable_encryption().await?;
            }
        }

        Ok((Self { entity, events, rlc }, rx))
    }
}

/// Per-direction result
#[derive(Debug, Default, Serialize)]
struct DirectionReport {
    sent: usize,
    delivered: usize,
    in_order: bool,
    rlc_drops: u64,
    link: LinkStats,
    events: HashMap<UpperLayerEventKind, u64>,
}

#[derive(Debug, Serialize)]
struct Summary {
    lcid: u8,
    sn_size: u8,
    uplink: DirectionReport,
    downlink: DirectionReport,
    ue: PdcpMetrics,
    gnb: PdcpMetrics,
    ul_count: u32,
    dl_count: u32,
}

fn make_sdu(index: u32, size: usize) -> Bytes {
    let mut sdu = BytesMut::with_capacity(size);
    sdu.put_u32(index);
    sdu.resize(size, (index & 0xFF) as u8);
    sdu.freeze()
}

/// Collect `expected` SDUs or give up after `timeout`
async fn collect(
    events: &mut mpsc::UnboundedReceiver<UpperLayerEvent>,
    expected: usize,
    timeout: Duration,
    report: &mut DirectionReport,
) {
    let mut next = 0u32;
    report.in_order = true;

    while report.delivered < expected {
        let event = match tokio::time::timeout(timeout, events.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(_) => {
                warn!("Timed out with {} of {} SDUs delivered", report.delivered, expected);
                break;
            }
        };

        *report.events.entry(event.kind()).or_default() += 1;
        if let Some(sdu) = event.sdu() {
            let index = u32::from_be_bytes([sdu[0], sdu[1], sdu[2], sdu[3]]);
            if index != next {
                error!("Out of order delivery: got {}, expected {}", index, next);
                report.in_order = false;
            }
            next = index.wrapping_add(1);
            report.delivered += 1;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Starting PDCP loopback");
    info!("Configuration file: {}", args.config.display());

    let mut config = LoopbackConfig::load(&args.config)
        .with_context(|| format!("Loading {}", args.config.display()))?;
    if let Some(sdus) = args.sdus {
        config.traffic.sdus = sdus;
    }
    if let Some(size) = args.sdu_size {
        config.traffic.sdu_size = size;
    }
    config.validate()?;

    info!("Bearer configuration:");
    info!("  LCID: {}", config.bearer.lcid);
    info!("  SN size: {} bits", config.bearer.pdcp.sn_size);
    info!("  t-Reordering: {:?} ms", config.bearer.pdcp.t_reordering);
    info!(
        "  Security: integrity={}, ciphering={}",
        config.security.enable_integrity, config.security.enable_ciphering
    );
    info!(
        "Link: reorder_depth={}, duplicate_probability={}, seed={}",
        config.link.reorder_depth, config.link.duplicate_probability, config.link.seed
    );

    let (mut ue, ul_rx) = Peer::new(&config, config.bearer.pdcp.clone()).await?;
    let (mut gnb, dl_rx) = Peer::new(&config, config.bearer.peer_pdcp()).await?;

    let ul_link = Link::new("UL", config.link.clone(), 0, gnb.entity.clone());
    let dl_link = Link::new("DL", config.link.clone(), 1, ue.entity.clone());
    let ul_counters = ul_link.counters();
    let dl_counters = dl_link.counters();
    let ul_handle = tokio::spawn(ul_link.run(ul_rx));
    let dl_handle = tokio::spawn(dl_link.run(dl_rx));

    let sdus = config.traffic.sdus;
    let size = config.traffic.sdu_size;
    let traffic = {
        let ue = ue.entity.clone();
        let gnb = gnb.entity.clone();
        tokio::spawn(async move {
            for i in 0..sdus as u32 {
                ue.write_sdu(make_sdu(i, size), true).await?;
                gnb.write_sdu(make_sdu(i, size), true).await?;
            }
            Ok::<_, layers::LayerError>(())
        })
    };

    let timeout = Duration::from_millis(config.traffic.timeout_ms);
    let mut uplink = DirectionReport {
        sent: sdus,
        ..Default::default()
    };
    let mut downlink = DirectionReport {
        sent: sdus,
        ..Default::default()
    };
    tokio::join!(
        collect(&mut gnb.events, sdus, timeout, &mut uplink),
        collect(&mut ue.events, sdus, timeout, &mut downlink),
    );

    if let Err(e) = traffic.await? {
        error!("Traffic generation failed: {}", e);
    }

    ul_handle.abort();
    dl_handle.abort();
    uplink.link = ul_counters.snapshot();
    downlink.link = dl_counters.snapshot();
    uplink.rlc_drops = ue.rlc.dropped();
    downlink.rlc_drops = gnb.rlc.dropped();

    let summary = Summary {
        lcid: config.bearer.lcid,
        sn_size: config.bearer.pdcp.sn_size,
        uplink,
        downlink,
        ue: ue.entity.get_metrics().await,
        gnb: gnb.entity.get_metrics().await,
        ul_count: ue.entity.get_ul_count(),
        dl_count: ue.entity.get_dl_count(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!("Loopback finished:");
        for (name, report) in [("Uplink", &summary.uplink), ("Downlink", &summary.downlink)] {
            info!(
                "  {}: {}/{} delivered, in order: {}, forwarded {} (dup {}, rejected {})",
                name,
                report.delivered,
                report.sent,
                report.in_order,
                report.link.forwarded,
                report.link.duplicated,
                report.link.rejected
            );
        }
        info!("  UE TX_NEXT={}, RX_NEXT={}", summary.ul_count, summary.dl_count);
    }

    for report in [&summary.uplink, &summary.downlink] {
        if report.delivered != report.sent || !report.in_order {
            anyhow::bail!("Loopback verification failed");
        }
    }

    info!("PDCP loopback completed successfully");
    Ok(())
}

//! Basic example: Discover all nearby Yinmik wands
//!
//! Run with: cargo run --example scan_wands

use std::sync::Arc;
use std::time::Duration;
use yinmik_ble::{BtleplugTransport, Result, SessionConfig, WandSession};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("yinmik_ble=debug".parse().unwrap()),
        )
        .init();

    println!("Scanning for Yinmik wands...");
    println!("Make sure your wand is switched on!\n");

    let transport = BtleplugTransport::new().await?;
    let config = SessionConfig::new().with_scan_duration(Duration::from_secs(10));
    let session = WandSession::with_config(Arc::new(transport), config)?;

    let wands = session.scan().await?;

    if wands.is_empty() {
        println!("No wands found.");
        return Ok(());
    }

    println!("Found {} wand(s):", wands.len());
    for wand in &wands {
        match wand.rssi {
            Some(rssi) => println!("  {} ({}) {} dBm", wand.name, wand.device_id, rssi),
            None => println!("  {} ({})", wand.name, wand.device_id),
        }
    }

    Ok(())
}

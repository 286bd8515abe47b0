//! Example: Connect to the nearest wand and take a few readings
//!
//! Run with: cargo run --example read_wand

use std::sync::Arc;
use std::time::Duration;
use yinmik_ble::{validate_reading, BtleplugTransport, Error, Result, WandSession};

const READINGS: usize = 3;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("yinmik_ble=info".parse().unwrap()),
        )
        .init();

    let transport = BtleplugTransport::new().await?;
    let session = WandSession::new(Arc::new(transport));

    let _status = session.on_status_change(|status| println!("[status] {}", status));

    let wands = session.scan().await?;
    let Some(wand) = wands.first() else {
        println!("No wand found. Is it switched on?");
        return Ok(());
    };

    println!("Connecting to {} ({})...", wand.name, wand.device_id);
    session.connect(&wand.device_id).await?;

    if let Some(info) = session.device_info() {
        println!("Firmware {}", info.firmware_version());
        if let Some(battery) = info.battery_percent {
            println!("Battery {}%", battery);
        }
    }

    for n in 1..=READINGS {
        match session.read_water().await {
            Ok(reading) => {
                println!("#{}: {}", n, reading);
                let check = validate_reading(&reading);
                for flag in &check.flags {
                    println!("    implausible: {}", flag);
                }
            }
            Err(Error::Timeout) => println!("#{}: wand did not answer in time", n),
            Err(e) => {
                println!("#{}: {}", n, e);
                break;
            }
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
    }

    session.disconnect().await?;
    println!("Disconnected.");

    Ok(())
}

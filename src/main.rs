//! Motion Sensor Driver CLI
//!
//! Runs the driver on the simulated GPIO backend: a timer stands in for
//! the PIR sensor's rising edges, and the daemon plays the role the
//! user-space consumer would, announcing itself through the device's write
//! path and draining events through poll + read.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use motion_driver::{chrdev_table, Driver, DriverConfig, SimGpio, EVENT_MSG_LEN};

// CLI definitions
mod cli;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let directive = if cli.verbose {
        "motion_driver=debug"
    } else {
        "motion_driver=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(directive.parse().unwrap()),
        )
        .init();

    match cli.command {
        None => {
            run(None, None, 2000, None).await?;
        }
        Some(Commands::Run {
            config,
            run_dir,
            sim_interval_ms,
            edges,
        }) => {
            run(config, run_dir, sim_interval_ms, edges).await?;
        }
        Some(Commands::Config { config }) => {
            let config = load_config(config)?;
            println!("{config:#?}");
        }
    }

    Ok(())
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<DriverConfig> {
    Ok(match path {
        Some(path) => DriverConfig::load(&path)?,
        None => DriverConfig::default(),
    })
}

async fn run(
    config_path: Option<PathBuf>,
    run_dir: Option<PathBuf>,
    sim_interval_ms: u64,
    edges: Option<u32>,
) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(dir) = run_dir {
        config.run_dir = dir;
    }
    let sensor = config.sensor();

    let gpio = SimGpio::new();
    let driver = Driver::init(config, gpio.clone(), chrdev_table())?;
    info!(node = %driver.node_path().display(), "device node ready");

    let device = driver.device();
    device.open();
    // Announce the consumer, the way the user-space program does on start.
    device.write(&1i32.to_ne_bytes())?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        })?;
    }

    // Simulated motion source.
    let edge_task = {
        let gpio = Arc::clone(&gpio);
        tokio::spawn(async move {
            let mut fired = 0u32;
            loop {
                tokio::time::sleep(Duration::from_millis(sim_interval_ms)).await;
                gpio.raise_edge(sensor);
                fired += 1;
                if edges.is_some_and(|max| fired >= max) {
                    break;
                }
            }
        })
    };

    info!("Ready. Ctrl+C to stop.");
    let mut delivered = 0u32;
    while running.load(Ordering::SeqCst) {
        // Bounded wait is the consumer's job; the driver imposes none.
        let ready =
            tokio::time::timeout(Duration::from_millis(500), device.wait_readable()).await;
        if ready.is_err() {
            continue;
        }

        let mut buf = [0u8; EVENT_MSG_LEN];
        let n = device.read(&mut buf)?;
        if &buf[..n] == b"1\n" {
            delivered += 1;
            info!(delivered, "motion event delivered");
        }
        if edges.is_some_and(|max| delivered >= max) {
            break;
        }
    }

    edge_task.abort();
    // Withdraw the consumer before unloading, as the user program does on
    // exit.
    device.write(&0i32.to_ne_bytes())?;
    device.release();
    driver.shutdown();
    Ok(())
}

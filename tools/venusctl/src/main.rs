//! venusctl: command-line companion for Marstek Venus batteries.
//!
//! Speaks the local JSON-over-UDP API directly: broadcast discovery,
//! one-shot queries, continuous polling, and operating-mode changes.

use std::net::IpAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

use venuslink::{
    discovery, ClientConfig, CommandStats, DiscoveryConfig, StateSnapshot, TransportPool,
    VenusDevice,
};
use venuslink_wire::{Method, ModeConfig, DEFAULT_PORT};

/// venusctl: talk to Marstek Venus batteries over the local UDP API.
#[derive(Parser, Debug)]
#[command(name = "venusctl")]
#[command(about = "Discover, query and control Marstek Venus batteries on the local network")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Device UDP port.
    #[arg(long, global = true, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Local UDP port to bind. Venus firmware replies to this port.
    #[arg(long, global = true, default_value_t = DEFAULT_PORT)]
    local_port: u16,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Broadcast a probe and list every device that answers
    Discover {
        /// Collection window in seconds
        #[arg(short, long, default_value = "9")]
        window_secs: u64,

        /// Broadcast destination address
        #[arg(short, long, default_value = "255.255.255.255")]
        broadcast: IpAddr,
    },

    /// Send a single request and print the JSON reply
    Query {
        /// Device address (IP or hostname)
        host: String,

        /// Method name, e.g. "Bat.GetStatus"
        method: String,

        /// Request params as JSON. Known query methods get their standard
        /// params when omitted.
        #[arg(short, long)]
        params: Option<String>,
    },

    /// Poll the device continuously and print each state change
    Watch {
        /// Device address (IP or hostname)
        host: String,

        /// Seconds between poll scheduler ticks
        #[arg(short, long, default_value = "30")]
        tick_secs: u64,
    },

    /// Switch the operating mode
    SetMode {
        /// Device address (IP or hostname)
        host: String,

        /// One of: auto, ai, manual, passive
        mode: String,

        /// Target power in watts, used by manual and passive modes
        #[arg(short = 'w', long, default_value = "0", allow_negative_numbers = true)]
        power: i32,

        /// Passive-mode countdown in seconds
        #[arg(short, long, default_value = "3600")]
        duration: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let port = cli.port;
    let local_port = cli.local_port;
    let pool = TransportPool::new();

    match cli.command {
        Command::Discover {
            window_secs,
            broadcast,
        } => {
            let config = DiscoveryConfig {
                broadcast_addr: broadcast,
                port,
                local_port,
                window_secs,
            };
            discover(&pool, &config).await
        }
        Command::Query {
            host,
            method,
            params,
        } => {
            let config = client_config(host, port, local_port);
            query(&pool, config, &method, params.as_deref()).await
        }
        Command::Watch { host, tick_secs } => {
            let mut config = client_config(host, port, local_port);
            config.poll.tick_interval_ms = tick_secs.max(1) * 1000;
            watch(&pool, config).await
        }
        Command::SetMode {
            host,
            mode,
            power,
            duration,
        } => {
            let config = client_config(host, port, local_port);
            set_mode(&pool, config, &mode, power, duration).await
        }
    }
}

fn client_config(host: String, port: u16, local_port: u16) -> ClientConfig {
    let mut config = ClientConfig::new(host);
    config.port = port;
    config.local_port = local_port;
    config
}

async fn discover(pool: &TransportPool, config: &DiscoveryConfig) -> Result<()> {
    eprintln!(
        "Probing {} for {}s...",
        config.broadcast_target(),
        config.window_secs
    );

    let mut stream = discovery::stream(pool, config)
        .await
        .context("Failed to send the discovery probe")?;

    println!("{:<18} {:<22} {:<10} VERSION", "MAC", "ADDRESS", "MODEL");
    let mut found = 0usize;
    while let Some(device) = stream.next().await {
        found += 1;
        let version = match &device.ver {
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
            None => "-".to_string(),
        };
        println!(
            "{:<18} {:<22} {:<10} {}",
            device.mac,
            device.addr.to_string(),
            device.device.as_deref().unwrap_or("-"),
            version
        );
    }

    if found == 0 {
        eprintln!("No devices answered.");
    } else {
        eprintln!("{found} device(s) answered.");
    }
    Ok(())
}

async fn query(
    pool: &TransportPool,
    config: ClientConfig,
    method: &str,
    params: Option<&str>,
) -> Result<()> {
    let instance_id = config.instance_id;
    let device = VenusDevice::connect(pool, config).await?;

    let params = match params {
        Some(text) => Some(serde_json::from_str(text).context("--params is not valid JSON")?),
        None => method
            .parse::<Method>()
            .ok()
            .and_then(|known| known.query_params(instance_id)),
    };

    let result = device.query_raw(method, params).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn watch(pool: &TransportPool, config: ClientConfig) -> Result<()> {
    let mut device = VenusDevice::connect(pool, config).await?;
    device.start_polling();
    let mut updates = device.updates().context("Poll scheduler failed to start")?;

    eprintln!("Watching {}. Ctrl-C to stop.", device.peer());
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                // Let the remaining poll outcomes of this tick land,
                // then print the batch once.
                tokio::time::sleep(Duration::from_millis(500)).await;
                updates.borrow_and_update();
                print_snapshot(&device.snapshot().await);
            }
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                break;
            }
        }
    }

    eprintln!();
    print_stats(&device.stats());
    device.stop_polling().await;
    Ok(())
}

async fn set_mode(
    pool: &TransportPool,
    config: ClientConfig,
    mode: &str,
    power: i32,
    duration: u32,
) -> Result<()> {
    let mode_config = match mode.to_ascii_lowercase().as_str() {
        "auto" => ModeConfig::auto(),
        "ai" => ModeConfig::ai(),
        "manual" => ModeConfig::manual_all_day(power),
        "passive" => ModeConfig::passive(power, duration),
        other => bail!("Unknown mode {other:?}, expected auto, ai, manual or passive"),
    };

    let device = VenusDevice::connect(pool, config).await?;
    let result = device.set_mode(mode_config).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// One line per update, most interesting fields first.
fn print_snapshot(snapshot: &StateSnapshot) {
    if snapshot.is_empty() {
        println!("(no data yet)");
        return;
    }

    let mut parts = Vec::new();
    if let Some(soc) = snapshot.battery_soc() {
        parts.push(format!("soc {soc:.0}%"));
    }
    if let Some(temp) = snapshot.battery_temperature() {
        parts.push(format!("bat_temp {temp:.1}C"));
    }
    if let Some(power) = snapshot.number("es.bat_power") {
        parts.push(format!("bat_power {power:.0}W"));
    }
    if let Some(power) = snapshot.number("es.pv_power") {
        parts.push(format!("pv {power:.0}W"));
    }
    if let Some(power) = snapshot.number("es.ongrid_power") {
        parts.push(format!("grid {power:.0}W"));
    }
    if let Some(mode) = snapshot.operating_mode() {
        parts.push(format!("mode {mode}"));
    }
    if parts.is_empty() {
        // Nothing from the headline categories yet, show what we have.
        let mut keys: Vec<_> = snapshot.keys().collect();
        keys.sort_unstable();
        println!("{} field(s) cached: {}", keys.len(), keys.join(", "));
        return;
    }
    println!("{}", parts.join("  "));
}

fn print_stats(stats: &CommandStats) {
    let mut methods: Vec<_> = stats.all().into_iter().collect();
    if methods.is_empty() {
        return;
    }
    methods.sort_by(|a, b| a.0.cmp(&b.0));

    eprintln!(
        "{:<18} {:>8} {:>8} {:>8}  SUPPORT",
        "METHOD", "ATTEMPTS", "OK", "TIMEOUT"
    );
    for (name, counters) in methods {
        eprintln!(
            "{:<18} {:>8} {:>8} {:>8}  {:?}",
            name, counters.attempts, counters.successes, counters.timeouts, counters.support
        );
    }
}

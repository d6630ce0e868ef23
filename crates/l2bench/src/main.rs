//! l2bench
//!
//! Raw Ethernet round-trip benchmark and port-pair forwarder.
//!
//! # Usage
//!
//! ```bash
//! # responder on the far host
//! l2bench --iface enp1s0f0 pingpong -s
//! # initiator, sweeping 8..8192 bytes, 100 round trips per size
//! l2bench --iface enp1s0f0 pingpong -c 0C:42:A1:00:00:01 -m 8 -n 8192 -i 100
//! # forward between two ports until Ctrl-C
//! l2bench --iface enp3s0f0 --iface enp3s0f1 forward --pin-cores
//! # everything in memory
//! l2bench --sim pingpong -n 65536
//! ```
//!
//! Result records go to stdout, logs to stderr (`RUST_LOG`, default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod output;

#[derive(Parser)]
#[command(name = "l2bench")]
#[command(version)]
#[command(about = "Raw Ethernet latency benchmark and port-pair forwarder", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true, env = "L2BENCH_CONFIG")]
    config: Option<PathBuf>,

    /// Network interface backing each port, in port order
    #[arg(long = "iface", global = true)]
    interfaces: Vec<String>,

    /// Use an in-memory network instead of network interfaces
    #[arg(long, global = true)]
    sim: bool,

    /// Output format
    #[arg(long, short, global = true, default_value = "text")]
    format: output::OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure minimum round-trip time over a sweep of message sizes
    Pingpong(commands::pingpong::PingpongArgs),
    /// Relay frames between paired ports until stopped
    Forward(commands::forward::ForwardArgs),
}

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result = config::FileConfig::load_optional(cli.config.as_deref()).and_then(|file| {
        let ctx = commands::Context::new(file, cli.interfaces, cli.sim, cli.format);
        match cli.command {
            Commands::Pingpong(args) => commands::pingpong::handle(args, &ctx),
            Commands::Forward(args) => commands::forward::handle(args, &ctx),
        }
    });

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

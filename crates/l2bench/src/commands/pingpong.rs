//! Ping-pong latency sweep

use super::Context;
use anyhow::{anyhow, Context as _};
use clap::{Args, ValueEnum};
use l2bench_dataplane::{
    platform_clock, pool_size_for, run_initiator, run_responder, BenchConfig, FragmentMode,
    FramePool, IntegrityPolicy, MacAddr, PacketIo, PingPongEngine, PortId, Role, SimNetwork,
    DEFAULT_RING_SIZE,
};
use std::sync::Arc;
use std::thread;

#[derive(Args, Debug, Default)]
pub struct PingpongArgs {
    /// Port to run on
    #[arg(short = 'p', long)]
    port: Option<PortId>,

    /// Minimum message size in bytes
    #[arg(short = 'm', long = "min")]
    min_bytes: Option<usize>,

    /// Maximum message size in bytes
    #[arg(short = 'n', long = "max")]
    max_bytes: Option<usize>,

    /// Round trips per message size
    #[arg(short = 'i', long)]
    iterations: Option<u64>,

    /// MAC address of the responder
    #[arg(short = 'c', long, env = "L2BENCH_PEER")]
    peer: Option<MacAddr>,

    /// Run as responder
    #[arg(short = 's', long)]
    server: bool,

    /// Payload bytes per frame
    #[arg(long)]
    mtu: Option<usize>,

    /// Frames per receive burst
    #[arg(long)]
    burst: Option<usize>,

    /// What to do with frames not addressed to this port
    #[arg(long, value_enum)]
    integrity: Option<Integrity>,

    /// Send a full-size last fragment when the message size is a multiple of the MTU
    #[arg(long)]
    full_last_fragment: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Integrity {
    /// Abort the run
    Fatal,
    /// Log and discard the frame
    Drop,
}

impl From<Integrity> for IntegrityPolicy {
    fn from(value: Integrity) -> Self {
        match value {
            Integrity::Fatal => IntegrityPolicy::Fatal,
            Integrity::Drop => IntegrityPolicy::Drop,
        }
    }
}

impl PingpongArgs {
    fn apply(&self, config: &mut BenchConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(min) = self.min_bytes {
            config.min_bytes = min;
        }
        if let Some(max) = self.max_bytes {
            config.max_bytes = max;
        }
        if let Some(iterations) = self.iterations {
            config.iterations = iterations;
        }
        if self.peer.is_some() {
            config.peer = self.peer;
        }
        if self.server {
            config.role = Role::Responder;
        }
        if let Some(mtu) = self.mtu {
            config.mtu = mtu;
        }
        if let Some(burst) = self.burst {
            config.burst_size = burst;
        }
        if let Some(integrity) = self.integrity {
            config.integrity = integrity.into();
        }
        if self.full_last_fragment {
            config.fragment_mode = FragmentMode::FullLastFragment;
        }
    }
}

pub fn handle(args: PingpongArgs, ctx: &Context) -> anyhow::Result<()> {
    let mut config = ctx.file.pingpong.clone();
    args.apply(&mut config);

    if ctx.sim {
        run_simulated(config, ctx)?;
    } else {
        run_on_interfaces(config, ctx)?;
    }

    tracing::info!("Bye.");
    Ok(())
}

fn frame_pool(ports: usize, config: &BenchConfig) -> FramePool {
    let size = pool_size_for(ports, DEFAULT_RING_SIZE, DEFAULT_RING_SIZE, config.burst_size);
    FramePool::with_buffer_size(size, config.buffer_size)
}

fn run_on_interfaces(config: BenchConfig, ctx: &Context) -> anyhow::Result<()> {
    config.validate()?;

    let pool = frame_pool(ctx.interfaces.len(), &config);
    let io = super::open_interfaces(&ctx.interfaces, config.ether_type, false, pool.clone())?;
    let role = config.role;
    let mut engine = PingPongEngine::new(io, pool, platform_clock(), config)?;

    match role {
        Role::Initiator => {
            run_initiator(&mut engine, |record| ctx.format.print_record(record))?;
        }
        Role::Responder => {
            run_responder(&mut engine)?;
        }
    }
    Ok(())
}

/// Initiator on port 0 and responder on port 1 of an in-memory cable
fn run_simulated(mut config: BenchConfig, ctx: &Context) -> anyhow::Result<()> {
    if config.role == Role::Responder {
        tracing::warn!("--sim runs both sides; the responder runs on its own thread");
    }

    let net = Arc::new(SimNetwork::back_to_back(DEFAULT_RING_SIZE));
    let pool = frame_pool(2, &config);
    let clock = platform_clock();

    config.role = Role::Initiator;
    config.port = 0;
    config.peer = Some(net.local_address(1)?);
    let responder_config = BenchConfig {
        role: Role::Responder,
        port: 1,
        peer: None,
        ..config.clone()
    };

    let responder = PingPongEngine::new(net.clone(), pool.clone(), clock.clone(), responder_config)?;
    let pong = thread::Builder::new()
        .name("pong".into())
        .spawn(move || {
            let mut responder = responder;
            run_responder(&mut responder)
        })
        .context("spawning responder")?;

    let mut engine = PingPongEngine::new(net, pool, clock, config)?;
    run_initiator(&mut engine, |record| ctx.format.print_record(record))?;

    pong.join()
        .map_err(|_| anyhow!("responder thread panicked"))??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: PingpongArgs,
    }

    fn parse(argv: &[&str]) -> PingpongArgs {
        Harness::try_parse_from(std::iter::once("pingpong").chain(argv.iter().copied()))
            .unwrap()
            .args
    }

    #[test]
    fn test_short_flags() {
        let args = parse(&["-p", "1", "-m", "64", "-n", "4096", "-i", "10", "-c", "0C:42:A1:00:00:01"]);
        let mut config = BenchConfig::default();
        args.apply(&mut config);

        assert_eq!(config.port, 1);
        assert_eq!(config.min_bytes, 64);
        assert_eq!(config.max_bytes, 4096);
        assert_eq!(config.iterations, 10);
        assert_eq!(config.peer, Some("0C:42:A1:00:00:01".parse().unwrap()));
        assert_eq!(config.role, Role::Initiator);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_server_flag_and_overrides() {
        let args = parse(&["-s", "--integrity", "drop", "--full-last-fragment", "--mtu", "1000"]);
        let mut config = BenchConfig {
            iterations: 7,
            ..Default::default()
        };
        args.apply(&mut config);

        assert_eq!(config.role, Role::Responder);
        assert_eq!(config.integrity, IntegrityPolicy::Drop);
        assert_eq!(config.fragment_mode, FragmentMode::FullLastFragment);
        assert_eq!(config.mtu, 1000);
        // Values not given on the command line keep the file's setting.
        assert_eq!(config.iterations, 7);
    }

    #[test]
    fn test_bad_peer_rejected() {
        let argv = ["pingpong", "-c", "not-a-mac"];
        assert!(Harness::try_parse_from(argv).is_err());
    }
}

//! Port-pair forwarder

use super::Context;
use anyhow::Context as _;
use clap::Args;
use l2bench_dataplane::ether::{ETHER_TYPE_ALL, ETHER_TYPE_IPV4};
use l2bench_dataplane::{
    pool_size_for, Forwarder, ForwarderConfig, FramePool, MacAddr, PacketIo, PortId,
    ShutdownSignal, SimNetwork,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Args, Debug, Default)]
pub struct ForwardArgs {
    /// Ports to service, comma separated (default: every port)
    #[arg(long, value_delimiter = ',')]
    ports: Vec<PortId>,

    /// Frames per burst
    #[arg(long)]
    burst: Option<usize>,

    /// Pin each worker to its own core
    #[arg(long)]
    pin_cores: bool,

    /// First core used when pinning
    #[arg(long)]
    first_core: Option<usize>,

    /// Only receive frames addressed to the port
    #[arg(long)]
    no_promiscuous: bool,

    /// Stop after this many seconds instead of waiting for a signal
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Ports of the in-memory network
    #[arg(long, default_value_t = 2)]
    sim_ports: u16,
}

impl ForwardArgs {
    fn apply(&self, config: &mut ForwarderConfig) {
        if !self.ports.is_empty() {
            config.ports = self.ports.clone();
        }
        if let Some(burst) = self.burst {
            config.burst_size = burst;
        }
        if self.pin_cores {
            config.pin_cores = true;
        }
        if let Some(core) = self.first_core {
            config.first_core = core;
        }
        if self.no_promiscuous {
            config.promiscuous = false;
        }
    }
}

pub fn handle(args: ForwardArgs, ctx: &Context) -> anyhow::Result<()> {
    let mut config = ctx.file.forward.clone();
    args.apply(&mut config);
    config.validate()?;

    let shutdown = ShutdownSignal::new();
    let on_signal = shutdown.clone();
    // SIGINT, SIGTERM and SIGHUP all end the run with a report.
    ctrlc::set_handler(move || {
        tracing::info!("signal received, preparing to exit");
        on_signal.trigger();
    })
    .context("installing signal handler")?;

    let (io, traffic) = if ctx.sim {
        let ports = args.sim_ports.max(1);
        let net = Arc::new(
            (0..ports).fold(SimNetwork::new(ports, config.rx_ring_size), |net, port| {
                net.with_tx_capacity(port, config.tx_ring_size)
            }),
        );
        let pool = frame_pool(ports as usize, &config);
        let traffic = spawn_traffic(net.clone(), pool, config.burst_size, shutdown.clone())?;
        (net as Arc<dyn PacketIo>, Some(traffic))
    } else {
        let pool = frame_pool(ctx.interfaces.len(), &config);
        let io = super::open_interfaces(
            &ctx.interfaces,
            ETHER_TYPE_ALL,
            config.promiscuous,
            pool,
        )?;
        (io, None)
    };

    let mut forwarder = Forwarder::with_shutdown(config, shutdown.clone());
    forwarder.start(io)?;

    let deadline = args
        .duration_secs
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    while !shutdown.is_triggered() {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            shutdown.trigger();
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }

    let totals = forwarder.join();
    if let Some(traffic) = traffic {
        if traffic.join().is_err() {
            tracing::error!("traffic generator panicked");
        }
    }

    ctx.format.print_totals(&totals);
    tracing::info!("Bye.");
    Ok(())
}

fn frame_pool(ports: usize, config: &ForwarderConfig) -> FramePool {
    FramePool::new(pool_size_for(
        ports,
        config.rx_ring_size,
        config.tx_ring_size,
        config.burst_size,
    ))
}

/// Feed every simulated port with frames for its pair and swallow whatever is forwarded
fn spawn_traffic(
    net: Arc<SimNetwork>,
    pool: FramePool,
    burst: usize,
    shutdown: ShutdownSignal,
) -> anyhow::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("sim-traffic".into())
        .spawn(move || {
            let ports = net.ports();
            let mut injected = 0u64;
            let mut delivered = 0u64;

            while !shutdown.is_triggered() {
                for &port in &ports {
                    for _ in 0..burst {
                        let Ok(mut frame) = pool.alloc() else {
                            break;
                        };
                        if frame.set_len(64).is_err() {
                            break;
                        }
                        frame.write_eth_header(
                            MacAddr::local(port ^ 1),
                            MacAddr::local(port),
                            ETHER_TYPE_IPV4,
                        );
                        if net.inject(port, frame).is_err() {
                            break;
                        }
                        injected += 1;
                    }
                    delivered += net.take_transmitted(port).len() as u64;
                }
                thread::yield_now();
            }

            tracing::info!(injected, delivered, "traffic generator stopped");
        })
        .context("spawning traffic generator")
}

//! CLI Commands

pub mod forward;
pub mod pingpong;

use crate::config::FileConfig;
use crate::output::OutputFormat;
use l2bench_dataplane::{FramePool, PacketIo};
use std::sync::Arc;

/// Settings shared by every command
pub struct Context {
    pub file: FileConfig,
    pub interfaces: Vec<String>,
    pub sim: bool,
    pub format: OutputFormat,
}

impl Context {
    /// Interfaces from the command line win over the config file
    pub fn new(file: FileConfig, interfaces: Vec<String>, sim: bool, format: OutputFormat) -> Self {
        let interfaces = if interfaces.is_empty() {
            file.interfaces.clone()
        } else {
            interfaces
        };
        Self {
            file,
            interfaces,
            sim,
            format,
        }
    }
}

/// Open one packet socket per configured interface
#[cfg(target_os = "linux")]
pub fn open_interfaces(
    interfaces: &[String],
    ether_type: u16,
    promiscuous: bool,
    pool: FramePool,
) -> anyhow::Result<Arc<dyn PacketIo>> {
    use anyhow::Context as _;

    if interfaces.is_empty() {
        anyhow::bail!("no interfaces given; pass --iface or use --sim");
    }
    let io = l2bench_dataplane::PacketSocketIo::open(interfaces, ether_type, promiscuous, pool)
        .with_context(|| format!("opening {}", interfaces.join(", ")))?;
    tracing::info!(ports = interfaces.len(), "ports available");
    Ok(Arc::new(io))
}

#[cfg(not(target_os = "linux"))]
pub fn open_interfaces(
    _interfaces: &[String],
    _ether_type: u16,
    _promiscuous: bool,
    _pool: FramePool,
) -> anyhow::Result<Arc<dyn PacketIo>> {
    anyhow::bail!("raw packet sockets are only supported on Linux; use --sim")
}

//! Run configuration
//!
//! Defaults: 8..=8192 byte messages, 100 iterations,
//! bursts of 32 and 1024-descriptor rings.

use crate::buffer::BUFFER_SIZE;
use crate::error::{DataplaneError, Result};
use crate::ether::{MacAddr, ETHER_HDR_LEN, ETHER_MTU, ETHER_TYPE_IPV4};
use crate::fragment::FragmentMode;
use crate::sweep::SizeSweep;
use crate::transport::{PortId, QueueId};
use serde::{Deserialize, Serialize};

/// Maximum frames per burst
pub const BURST_SIZE: usize = 32;

/// Default descriptors per RX/TX ring
pub const DEFAULT_RING_SIZE: usize = 1024;

/// Side of the ping-pong exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Sends messages and times the round trip
    #[default]
    Initiator,
    /// Bounces every message back
    Responder,
}

/// What to do with a frame that is not addressed to us
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityPolicy {
    /// Abort the run; the measurement can no longer be trusted
    #[default]
    Fatal,
    /// Log, free the frame and keep waiting
    Drop,
}

/// Ping-pong benchmark configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Initiator or responder
    pub role: Role,
    /// Port to run on
    pub port: PortId,
    /// Queue to run on
    pub queue: QueueId,
    /// Smallest message size in bytes
    pub min_bytes: usize,
    /// Largest message size in bytes (inclusive)
    pub max_bytes: usize,
    /// Round trips per message size
    pub iterations: u64,
    /// Responder address, initiator only
    pub peer: Option<MacAddr>,
    /// Payload bytes per frame
    pub mtu: usize,
    /// Frames per receive burst
    pub burst_size: usize,
    /// EtherType stamped on every frame
    pub ether_type: u16,
    /// Handling of frames not addressed to us
    pub integrity: IntegrityPolicy,
    /// Sizing of the last fragment
    pub fragment_mode: FragmentMode,
    /// Frame buffer capacity
    pub buffer_size: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            role: Role::Initiator,
            port: 0,
            queue: 0,
            min_bytes: 8,
            max_bytes: 8192,
            iterations: 100,
            peer: None,
            mtu: ETHER_MTU,
            burst_size: BURST_SIZE,
            ether_type: ETHER_TYPE_IPV4,
            integrity: IntegrityPolicy::Fatal,
            fragment_mode: FragmentMode::Reference,
            buffer_size: BUFFER_SIZE,
        }
    }
}

impl BenchConfig {
    /// Check the configuration can drive a run
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(invalid("iterations must be at least 1"));
        }
        if self.min_bytes == 0 {
            return Err(invalid("minimum message size must be at least 1 byte"));
        }
        if self.min_bytes > self.max_bytes {
            return Err(invalid(format!(
                "minimum message size {} exceeds maximum {}",
                self.min_bytes, self.max_bytes
            )));
        }
        if self.burst_size == 0 {
            return Err(invalid("burst size must be at least 1"));
        }
        if self.mtu == 0 {
            return Err(invalid("mtu must be at least 1 byte"));
        }
        if ETHER_HDR_LEN + self.mtu > self.buffer_size {
            return Err(invalid(format!(
                "mtu {} does not fit a {} byte frame buffer",
                self.mtu, self.buffer_size
            )));
        }
        if self.role == Role::Initiator && self.peer.is_none() {
            return Err(invalid("initiator needs a peer address"));
        }
        Ok(())
    }

    /// Message sizes this run will cover
    pub fn sizes(&self) -> SizeSweep {
        SizeSweep::new(self.min_bytes, self.max_bytes)
    }
}

/// Forwarder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    /// Ports to service; empty means every port of the transport
    pub ports: Vec<PortId>,
    /// Frames per burst
    pub burst_size: usize,
    /// Pin worker `n` to core `first_core + n`
    pub pin_cores: bool,
    /// First core used when pinning
    pub first_core: usize,
    /// RX descriptors per port
    pub rx_ring_size: usize,
    /// TX descriptors per port
    pub tx_ring_size: usize,
    /// Receive frames not addressed to the port
    pub promiscuous: bool,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            ports: Vec::new(),
            burst_size: BURST_SIZE,
            pin_cores: false,
            first_core: 0,
            rx_ring_size: DEFAULT_RING_SIZE,
            tx_ring_size: DEFAULT_RING_SIZE,
            promiscuous: true,
        }
    }
}

impl ForwarderConfig {
    /// Check the configuration can drive a run
    pub fn validate(&self) -> Result<()> {
        if self.burst_size == 0 {
            return Err(invalid("burst size must be at least 1"));
        }
        if self.rx_ring_size == 0 || self.tx_ring_size == 0 {
            return Err(invalid("ring sizes must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> DataplaneError {
    DataplaneError::InvalidConfig(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn initiator() -> BenchConfig {
        BenchConfig {
            peer: Some(MacAddr::local(1)),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = BenchConfig::default();
        assert_eq!(config.min_bytes, 8);
        assert_eq!(config.max_bytes, 8192);
        assert_eq!(config.iterations, 100);
        assert_eq!(config.mtu, 1500);
        assert_eq!(config.burst_size, 32);
        assert_eq!(config.integrity, IntegrityPolicy::Fatal);
        assert!(initiator().validate().is_ok());
    }

    #[test]
    fn test_initiator_requires_peer() {
        assert!(BenchConfig::default().validate().is_err());

        let responder = BenchConfig {
            role: Role::Responder,
            ..Default::default()
        };
        assert!(responder.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_ranges() {
        let cases = [
            BenchConfig { iterations: 0, ..initiator() },
            BenchConfig { min_bytes: 0, ..initiator() },
            BenchConfig { min_bytes: 64, max_bytes: 32, ..initiator() },
            BenchConfig { burst_size: 0, ..initiator() },
            BenchConfig { mtu: 0, ..initiator() },
            BenchConfig { mtu: 2040, ..initiator() },
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(DataplaneError::InvalidConfig(_))),
                "{config:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: BenchConfig =
            serde_json::from_str(r#"{"role": "responder", "max_bytes": 64}"#).unwrap();
        assert_eq!(config.role, Role::Responder);
        assert_eq!(config.max_bytes, 64);
        assert_eq!(config.min_bytes, 8);

        let config: BenchConfig = serde_json::from_str(
            r#"{"peer": "0c:42:a1:00:00:01", "integrity": "drop", "fragment_mode": "full_last_fragment"}"#,
        )
        .unwrap();
        assert_eq!(config.peer, Some("0C:42:A1:00:00:01".parse().unwrap()));
        assert_eq!(config.integrity, IntegrityPolicy::Drop);
        assert_eq!(config.fragment_mode, FragmentMode::FullLastFragment);
    }

    #[test]
    fn test_forwarder_defaults() {
        let config = ForwarderConfig::default();
        assert!(config.ports.is_empty());
        assert_eq!(config.rx_ring_size, 1024);
        assert!(config.validate().is_ok());
        assert!(ForwarderConfig { burst_size: 0, ..Default::default() }.validate().is_err());
    }
}

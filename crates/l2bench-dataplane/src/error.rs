//! Error types for the dataplane

use crate::ether::MacAddr;
use crate::transport::PortId;
use thiserror::Error;

/// Dataplane error type
#[derive(Error, Debug)]
pub enum DataplaneError {
    /// Frame pool exhausted
    #[error("frame pool exhausted")]
    OutOfBuffers,

    /// Received frame was not addressed to this endpoint
    #[error("protocol integrity violation: frame addressed to {found}, expected {expected}")]
    ProtocolIntegrity {
        /// Local identity the frame should have been addressed to
        expected: MacAddr,
        /// Destination actually found in the frame
        found: MacAddr,
    },

    /// Frame length exceeds buffer capacity
    #[error("frame of {len} bytes exceeds buffer capacity of {capacity} bytes")]
    FrameTooLarge {
        /// Requested length
        len: usize,
        /// Buffer capacity
        capacity: usize,
    },

    /// Port not known to the transport
    #[error("invalid port {0}")]
    InvalidPort(PortId),

    /// Hardware address could not be parsed
    #[error("invalid hardware address: {0}")]
    InvalidMacAddr(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    InvalidConfig(String),

    /// Worker thread could not be spawned
    #[error("failed to spawn worker: {0}")]
    SpawnFailed(String),

    /// Forwarder already started
    #[error("forwarder already running")]
    AlreadyRunning,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for the dataplane
pub type Result<T> = std::result::Result<T, DataplaneError>;

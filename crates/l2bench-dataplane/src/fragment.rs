//! Message fragmentation
//!
//! A benchmark message is never materialized; it only exists as the ordered list of payload
//! sizes of the frames that carry it.

use serde::{Deserialize, Serialize};

/// How the last fragment of a message is sized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentMode {
    /// Last fragment carries `size % mtu` bytes, so an exact multiple of the MTU ends with
    /// an empty fragment. Matches historical benchmark results.
    #[default]
    Reference,
    /// Last fragment carries the remainder, or a full MTU when the size divides evenly.
    FullLastFragment,
}

/// Number of frames needed for a message of `size` bytes. Never zero.
///
/// # Panics
///
/// Panics if `mtu` is zero. [`BenchConfig::validate`](crate::BenchConfig::validate) rejects
/// such configurations before any engine runs.
#[inline]
pub fn fragment_count(size: usize, mtu: usize) -> usize {
    assert!(mtu > 0, "mtu must be positive");
    size.div_ceil(mtu).max(1)
}

/// Payload size of every frame carrying a message of `size` bytes, in send order.
///
/// All fragments but the last carry exactly `mtu` bytes. An empty message yields a single
/// empty fragment.
///
/// # Panics
///
/// Panics if `mtu` is zero.
pub fn fragment_sizes(size: usize, mtu: usize, mode: FragmentMode) -> Vec<usize> {
    let count = fragment_count(size, mtu);
    let remainder = size % mtu;
    let last = match mode {
        FragmentMode::Reference => remainder,
        FragmentMode::FullLastFragment if remainder == 0 && size > 0 => mtu,
        FragmentMode::FullLastFragment => remainder,
    };

    let mut sizes = vec![mtu; count];
    sizes[count - 1] = last;
    sizes
}

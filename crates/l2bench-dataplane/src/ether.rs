//! Ethernet addressing
//!
//! Hardware addresses, the 14-byte Ethernet header, and the address role swap that turns a
//! received frame into its own reply.

use crate::buffer::Frame;
use crate::error::{DataplaneError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ethernet header length (dst + src + EtherType)
pub const ETHER_HDR_LEN: usize = 14;

/// Standard Ethernet MTU
pub const ETHER_MTU: usize = 1500;

/// IPv4 EtherType, stamped on benchmark frames
pub const ETHER_TYPE_IPV4: u16 = 0x0800;

/// Packet socket protocol matching every EtherType (`ETH_P_ALL`)
pub const ETHER_TYPE_ALL: u16 = 0x0003;

const DST_OFFSET: usize = 0;
const SRC_OFFSET: usize = 6;
const TYPE_OFFSET: usize = 12;

/// 6-byte hardware (MAC) address
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// Broadcast address
    pub const BROADCAST: MacAddr = MacAddr([0xFF; 6]);

    /// Create from raw bytes
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Raw bytes
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Locally administered unicast address `02:00:00:00:hi:lo`, handy for simulated ports
    pub const fn local(id: u16) -> Self {
        let [hi, lo] = id.to_be_bytes();
        Self([0x02, 0x00, 0x00, 0x00, hi, lo])
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for MacAddr {
    type Err = DataplaneError;

    /// Parses `AA:BB:CC:DD:EE:FF` (case-insensitive, `-` also accepted as separator)
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || DataplaneError::InvalidMacAddr(s.to_string());
        let mut bytes = [0u8; 6];
        let mut parts = s.trim().split(|c| c == ':' || c == '-');

        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.is_empty() || part.len() > 2 {
                return Err(invalid());
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for MacAddr {
    type Error = DataplaneError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<MacAddr> for String {
    fn from(mac: MacAddr) -> Self {
        mac.to_string()
    }
}

// Header accessors work on the raw storage so a frame can be stamped before its length is
// set. Buffers are always larger than the header.
impl Frame {
    /// Destination address
    #[inline(always)]
    pub fn dst_addr(&self) -> MacAddr {
        self.read_addr(DST_OFFSET)
    }

    /// Source address
    #[inline(always)]
    pub fn src_addr(&self) -> MacAddr {
        self.read_addr(SRC_OFFSET)
    }

    /// EtherType (payload-type tag)
    #[inline(always)]
    pub fn ether_type(&self) -> u16 {
        let raw = self.header();
        u16::from_be_bytes([raw[TYPE_OFFSET], raw[TYPE_OFFSET + 1]])
    }

    /// Set destination address
    #[inline(always)]
    pub fn set_dst_addr(&mut self, addr: MacAddr) {
        self.header_mut()[DST_OFFSET..DST_OFFSET + 6].copy_from_slice(&addr.0);
    }

    /// Set source address
    #[inline(always)]
    pub fn set_src_addr(&mut self, addr: MacAddr) {
        self.header_mut()[SRC_OFFSET..SRC_OFFSET + 6].copy_from_slice(&addr.0);
    }

    /// Set EtherType
    #[inline(always)]
    pub fn set_ether_type(&mut self, ether_type: u16) {
        self.header_mut()[TYPE_OFFSET..TYPE_OFFSET + 2].copy_from_slice(&ether_type.to_be_bytes());
    }

    /// Write a full Ethernet header
    pub fn write_eth_header(&mut self, dst: MacAddr, src: MacAddr, ether_type: u16) {
        self.set_dst_addr(dst);
        self.set_src_addr(src);
        self.set_ether_type(ether_type);
    }

    #[inline(always)]
    fn read_addr(&self, offset: usize) -> MacAddr {
        let mut addr = [0u8; 6];
        addr.copy_from_slice(&self.header()[offset..offset + 6]);
        MacAddr(addr)
    }

    #[inline(always)]
    fn header(&self) -> &[u8] {
        &self.storage()[..ETHER_HDR_LEN]
    }

    #[inline(always)]
    fn header_mut(&mut self) -> &mut [u8] {
        &mut self.storage_mut()[..ETHER_HDR_LEN]
    }
}

/// Turn a received frame into its reply, in place.
///
/// The frame must be addressed to `local`. Its previous source becomes the destination and
/// `local` becomes the source; the payload is untouched. Returns
/// [`DataplaneError::ProtocolIntegrity`] without modifying the frame when the destination
/// does not match.
#[inline]
pub fn swap_roles(frame: &mut Frame, local: MacAddr) -> Result<()> {
    let dst = frame.dst_addr();
    if dst != local {
        return Err(DataplaneError::ProtocolIntegrity {
            expected: local,
            found: dst,
        });
    }
    let src = frame.src_addr();
    frame.set_dst_addr(src);
    frame.set_src_addr(local);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::FramePool;
    use proptest::prelude::*;

    const A: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x0A]);
    const B: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x0B]);

    fn frame_to(pool: &FramePool, dst: MacAddr, src: MacAddr) -> Frame {
        let mut frame = pool.alloc().unwrap();
        frame.set_len(ETHER_HDR_LEN + 64).unwrap();
        frame.write_eth_header(dst, src, ETHER_TYPE_IPV4);
        frame
    }

    #[test]
    fn test_mac_parse_display() {
        let mac: MacAddr = "0c:42:A1:00:ff:7".parse().unwrap();
        assert_eq!(mac.octets(), [0x0C, 0x42, 0xA1, 0x00, 0xFF, 0x07]);
        assert_eq!(mac.to_string(), "0C:42:A1:00:FF:07");
        assert_eq!("0C-42-A1-00-FF-07".parse::<MacAddr>().unwrap(), mac);
    }

    #[test]
    fn test_mac_parse_rejects_garbage() {
        for bad in ["", "00:11:22:33:44", "00:11:22:33:44:55:66", "00:11:22:33:44:zz", "001:1:2:3:4:5"] {
            assert!(bad.parse::<MacAddr>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_mac_serde_as_string() {
        let json = serde_json::to_string(&A).unwrap();
        assert_eq!(json, "\"02:00:00:00:00:0A\"");
        let back: MacAddr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, A);
    }

    #[test]
    fn test_header_fields() {
        let pool = FramePool::new(4);
        let frame = frame_to(&pool, A, B);
        assert_eq!(frame.dst_addr(), A);
        assert_eq!(frame.src_addr(), B);
        assert_eq!(frame.ether_type(), ETHER_TYPE_IPV4);
        assert_eq!(&frame.data()[12..14], &[0x08, 0x00]);
    }

    #[test]
    fn test_swap_roles() {
        let pool = FramePool::new(4);
        let mut frame = frame_to(&pool, A, B);
        frame.data_mut()[ETHER_HDR_LEN] = 0x5A;

        swap_roles(&mut frame, A).unwrap();

        assert_eq!(frame.dst_addr(), B);
        assert_eq!(frame.src_addr(), A);
        assert_eq!(frame.data()[ETHER_HDR_LEN], 0x5A);
        assert_eq!(frame.len(), ETHER_HDR_LEN + 64);
    }

    #[test]
    fn test_swap_rejects_foreign_frame() {
        let pool = FramePool::new(4);
        let mut frame = frame_to(&pool, B, A);

        let err = swap_roles(&mut frame, A).unwrap_err();
        assert!(matches!(
            err,
            DataplaneError::ProtocolIntegrity { expected, found } if expected == A && found == B
        ));
        // Untouched on failure
        assert_eq!(frame.dst_addr(), B);
        assert_eq!(frame.src_addr(), A);
    }

    proptest! {
        #[test]
        fn prop_swap_is_involution(dst in any::<[u8; 6]>(), src in any::<[u8; 6]>()) {
            let pool = FramePool::new(1);
            let (dst, src) = (MacAddr(dst), MacAddr(src));
            let mut frame = frame_to(&pool, dst, src);

            swap_roles(&mut frame, dst).unwrap();
            swap_roles(&mut frame, src).unwrap();

            prop_assert_eq!(frame.dst_addr(), dst);
            prop_assert_eq!(frame.src_addr(), src);
        }
    }
}

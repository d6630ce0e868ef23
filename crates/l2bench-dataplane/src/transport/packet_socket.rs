//! AF_PACKET transport (Linux)
//!
//! One raw, non-blocking packet socket per interface, bound to a single EtherType. Port ids
//! are positions in the interface list given to [`PacketSocketIo::open`].
//!
//! The kernel loops our own transmissions back to packet sockets; those are filtered out on
//! receive so the engines only ever see frames that arrived from the wire.

use super::{BurstBatch, PacketIo, PortId, QueueId};
use crate::buffer::{Frame, FramePool};
use crate::error::{DataplaneError, Result};
use crate::ether::MacAddr;
use std::ffi::CString;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

/// `struct packet_mreq` from `<linux/if_packet.h>`
#[repr(C)]
struct PacketMreq {
    mr_ifindex: libc::c_int,
    mr_type: libc::c_ushort,
    mr_alen: libc::c_ushort,
    mr_address: [libc::c_uchar; 8],
}

struct PacketPort {
    name: String,
    fd: OwnedFd,
    mac: MacAddr,
}

/// Raw Ethernet I/O over `AF_PACKET` sockets
pub struct PacketSocketIo {
    ports: Vec<PacketPort>,
    pool: FramePool,
}

impl PacketSocketIo {
    /// Open one socket per interface, bound to `ether_type`. Received frames are allocated
    /// from `pool`.
    pub fn open(
        interfaces: &[String],
        ether_type: u16,
        promiscuous: bool,
        pool: FramePool,
    ) -> Result<Self> {
        if interfaces.is_empty() {
            return Err(DataplaneError::InvalidConfig(
                "at least one interface is required".into(),
            ));
        }

        let mut ports = Vec::with_capacity(interfaces.len());
        for name in interfaces {
            let port = open_port(name, ether_type, promiscuous)?;
            tracing::debug!(
                interface = %port.name,
                mac = %port.mac,
                port = ports.len(),
                "packet socket ready"
            );
            ports.push(port);
        }

        Ok(Self { ports, pool })
    }

    /// Interface name of `port`
    pub fn interface(&self, port: PortId) -> Option<&str> {
        self.ports.get(port as usize).map(|p| p.name.as_str())
    }
}

fn open_port(name: &str, ether_type: u16, promiscuous: bool) -> Result<PacketPort> {
    let c_name = CString::new(name)
        .map_err(|_| DataplaneError::InvalidConfig(format!("bad interface name {name:?}")))?;

    // SAFETY: c_name is a valid NUL-terminated string.
    let ifindex = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
    if ifindex == 0 {
        return Err(io::Error::last_os_error().into());
    }

    let protocol = ether_type.to_be();
    // SAFETY: plain socket(2) call; the descriptor is owned immediately below.
    let raw = unsafe {
        libc::socket(
            libc::AF_PACKET,
            libc::SOCK_RAW | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
            protocol as libc::c_int,
        )
    };
    if raw < 0 {
        return Err(io::Error::last_os_error().into());
    }
    // SAFETY: raw is a freshly created descriptor nobody else owns.
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };

    // SAFETY: zeroed sockaddr_ll is valid; the fields bind(2) reads are set below.
    let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
    addr.sll_family = libc::AF_PACKET as libc::c_ushort;
    addr.sll_protocol = protocol;
    addr.sll_ifindex = ifindex as libc::c_int;

    // SAFETY: addr is a fully initialized sockaddr_ll of the advertised length.
    let ret = unsafe {
        libc::bind(
            fd.as_raw_fd(),
            &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
            mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error().into());
    }

    if promiscuous {
        let mreq = PacketMreq {
            mr_ifindex: ifindex as libc::c_int,
            mr_type: libc::PACKET_MR_PROMISC as libc::c_ushort,
            mr_alen: 0,
            mr_address: [0; 8],
        };
        // SAFETY: mreq matches the kernel's packet_mreq layout and outlives the call.
        let ret = unsafe {
            libc::setsockopt(
                fd.as_raw_fd(),
                libc::SOL_PACKET,
                libc::PACKET_ADD_MEMBERSHIP,
                &mreq as *const PacketMreq as *const libc::c_void,
                mem::size_of::<PacketMreq>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error().into());
        }
    }

    let mac = read_hw_address(name)?;
    Ok(PacketPort {
        name: name.to_string(),
        fd,
        mac,
    })
}

fn recv_one(fd: libc::c_int, frame: &mut Frame) -> io::Result<Option<usize>> {
    let buf = frame.storage_mut();
    // SAFETY: zeroed sockaddr_ll is a valid value for recvfrom to overwrite.
    let mut from: libc::sockaddr_ll = unsafe { mem::zeroed() };
    let mut from_len = mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t;

    // SAFETY: buf is valid for buf.len() bytes and from/from_len describe a live
    // sockaddr_ll.
    let n = unsafe {
        libc::recvfrom(
            fd,
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
            libc::MSG_DONTWAIT,
            &mut from as *mut libc::sockaddr_ll as *mut libc::sockaddr,
            &mut from_len,
        )
    };
    if n < 0 {
        let err = io::Error::last_os_error();
        return match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Ok(None),
            _ => Err(err),
        };
    }
    if from.sll_pkttype == libc::PACKET_OUTGOING as libc::c_uchar {
        return Ok(Some(0));
    }
    Ok(Some(n as usize))
}

fn read_hw_address(name: &str) -> Result<MacAddr> {
    let path = format!("/sys/class/net/{name}/address");
    std::fs::read_to_string(path)?.trim().parse()
}

impl PacketIo for PacketSocketIo {
    fn submit(&self, port: PortId, queue: QueueId, frames: &mut Vec<Frame>) -> usize {
        let Some(p) = self.ports.get(port as usize) else {
            return 0;
        };
        if queue != 0 {
            return 0;
        }

        let mut accepted = 0;
        for frame in frames.iter() {
            let data = frame.data();
            // SAFETY: data is valid for data.len() bytes for the duration of the call.
            let n = unsafe {
                libc::send(
                    p.fd.as_raw_fd(),
                    data.as_ptr() as *const libc::c_void,
                    data.len(),
                    libc::MSG_DONTWAIT,
                )
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                let backpressure = err.kind() == io::ErrorKind::WouldBlock
                    || err.raw_os_error() == Some(libc::ENOBUFS);
                if !backpressure {
                    tracing::warn!(interface = %p.name, error = %err, "transmit failed");
                }
                break;
            }
            accepted += 1;
        }

        // Transmitted frames are released, as a NIC does once the descriptor completes.
        frames.drain(..accepted);
        accepted
    }

    fn receive(&self, port: PortId, queue: QueueId, burst: &mut BurstBatch) -> usize {
        let Some(p) = self.ports.get(port as usize) else {
            return 0;
        };
        if queue != 0 {
            return 0;
        }

        let fd = p.fd.as_raw_fd();
        let mut received = 0;
        while !burst.is_full() {
            let Ok(mut frame) = self.pool.alloc() else {
                // Pool exhausted: leave the rest in the socket for the next poll.
                break;
            };
            match recv_one(fd, &mut frame) {
                Ok(Some(0)) => continue,
                Ok(Some(len)) => {
                    if frame.set_len(len.min(frame.capacity())).is_err() {
                        continue;
                    }
                    if burst.push(frame).is_err() {
                        break;
                    }
                    received += 1;
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(interface = %p.name, error = %err, "receive failed");
                    break;
                }
            }
        }
        received
    }

    fn local_address(&self, port: PortId) -> Result<MacAddr> {
        self.ports
            .get(port as usize)
            .map(|p| p.mac)
            .ok_or(DataplaneError::InvalidPort(port))
    }

    fn ports(&self) -> Vec<PortId> {
        (0..self.ports.len() as PortId).collect()
    }
}

//! Shared types between the XDP probe (kernel) and userspace
//!
//! This crate defines the record emitted on `traffic_map` and the header
//! classifier that fills it in. Everything here must be:
//! - `no_std` compatible for eBPF
//! - free of allocation, loops and recursion on the probe path
//! - layout-stable (`#[repr(C)]`) where it crosses the kernel boundary

#![cfg_attr(not(feature = "userspace"), no_std)]

pub mod classify;
pub mod headers;

pub use classify::{inspect, summarize, EventSink, PacketBounds, TruncatedHeader, Verdict};

/// Name of the XDP program inside the probe object.
pub const PROGRAM_NAME: &str = "monitor_traffic";

/// Name of the perf event array the probe writes `TrafficEvent`s to.
pub const MAP_NAME: &str = "traffic_map";

/// Per-packet summary written to `traffic_map`
///
/// Layout (20 bytes, 4-byte aligned):
/// - offset 0: src_ip, raw IPv4 source address (network order)
/// - offset 4: dst_ip, raw IPv4 destination address (network order)
/// - offset 8: src_port, copied verbatim from the transport header (network order)
/// - offset 10: dst_port, copied verbatim from the transport header (network order)
/// - offset 12: bytes, captured frame length (host order)
///
/// Ports are zero for ICMP and for any protocol other than TCP/UDP.
#[repr(C, packed(4))]
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "userspace", derive(PartialEq, Eq))]
pub struct TrafficEvent {
    pub src_ip: [u8; 4],
    pub dst_ip: [u8; 4],
    pub src_port: u16,
    pub dst_port: u16,
    pub bytes: u64,
}

impl TrafficEvent {
    /// Size of one record on the wire.
    pub const SIZE: usize = core::mem::size_of::<TrafficEvent>();
}

/// IP protocol constants
pub mod protocol {
    pub const ICMP: u8 = 1;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
}

const _: () = {
    assert!(
        core::mem::size_of::<TrafficEvent>() == 20,
        "TrafficEvent must be exactly 20 bytes"
    );
    assert!(
        core::mem::align_of::<TrafficEvent>() == 4,
        "TrafficEvent must be 4-byte aligned"
    );
    assert!(core::mem::offset_of!(TrafficEvent, src_ip) == 0);
    assert!(core::mem::offset_of!(TrafficEvent, dst_ip) == 4);
    assert!(core::mem::offset_of!(TrafficEvent, src_port) == 8);
    assert!(core::mem::offset_of!(TrafficEvent, dst_port) == 10);
    assert!(core::mem::offset_of!(TrafficEvent, bytes) == 12);
};

#[cfg(feature = "userspace")]
mod userspace {
    use super::TrafficEvent;
    use std::fmt;
    use std::net::Ipv4Addr;

    impl TrafficEvent {
        pub fn src_addr(&self) -> Ipv4Addr {
            Ipv4Addr::from(self.src_ip)
        }

        pub fn dst_addr(&self) -> Ipv4Addr {
            Ipv4Addr::from(self.dst_ip)
        }

        /// Source port converted to host byte order.
        pub fn src_port_host(&self) -> u16 {
            let port = self.src_port;
            u16::from_be(port)
        }

        /// Destination port converted to host byte order.
        pub fn dst_port_host(&self) -> u16 {
            let port = self.dst_port;
            u16::from_be(port)
        }

        /// The record exactly as the probe lays it out in a perf sample.
        pub fn as_bytes(&self) -> [u8; TrafficEvent::SIZE] {
            let (src_port, dst_port, bytes) = (self.src_port, self.dst_port, self.bytes);

            let mut out = [0u8; TrafficEvent::SIZE];
            out[0..4].copy_from_slice(&self.src_ip);
            out[4..8].copy_from_slice(&self.dst_ip);
            out[8..10].copy_from_slice(&src_port.to_ne_bytes());
            out[10..12].copy_from_slice(&dst_port.to_ne_bytes());
            out[12..20].copy_from_slice(&bytes.to_ne_bytes());
            out
        }

        /// Decode a record from a perf sample. Returns `None` when the sample
        /// is too short to hold one; trailing bytes are ignored.
        pub fn from_bytes(buf: &[u8]) -> Option<Self> {
            let buf = buf.get(..TrafficEvent::SIZE)?;

            let mut src_ip = [0u8; 4];
            let mut dst_ip = [0u8; 4];
            let mut bytes = [0u8; 8];
            src_ip.copy_from_slice(&buf[0..4]);
            dst_ip.copy_from_slice(&buf[4..8]);
            bytes.copy_from_slice(&buf[12..20]);

            Some(Self {
                src_ip,
                dst_ip,
                src_port: u16::from_ne_bytes([buf[8], buf[9]]),
                dst_port: u16::from_ne_bytes([buf[10], buf[11]]),
                bytes: u64::from_ne_bytes(bytes),
            })
        }
    }

    impl fmt::Display for TrafficEvent {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let bytes = self.bytes;
            write!(
                f,
                "{}:{} -> {}:{} bytes={}",
                self.src_addr(),
                self.src_port_host(),
                self.dst_addr(),
                self.dst_port_host(),
                bytes
            )
        }
    }
}

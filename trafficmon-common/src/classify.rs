//! Packet classifier shared by the XDP probe and host-side tests
//!
//! Parses Ethernet, IPv4 and one transport header out of a packet view and
//! produces at most one `TrafficEvent`. Every header read is preceded by an
//! explicit `start + offset + len > end` check so the kernel verifier can
//! follow it; a header that does not fit aborts parsing and suppresses the
//! record. The verdict is always `Verdict::Pass`.

use core::{fmt, mem, ptr};

use thiserror::Error;

use crate::headers::{EthHdr, IcmpHdr, Ipv4Hdr, TcpHdr, UdpHdr, TRANSPORT_OFFSET};
use crate::{protocol, TrafficEvent};

/// A read-only view of one received packet: the byte range `[start, end)`.
///
/// # Safety
///
/// Implementors guarantee that every address in `[start, end)` is readable
/// for as long as the borrow of `self` lives.
pub unsafe trait PacketBounds {
    fn start(&self) -> usize;
    fn end(&self) -> usize;
}

unsafe impl PacketBounds for [u8] {
    #[inline(always)]
    fn start(&self) -> usize {
        self.as_ptr() as usize
    }

    #[inline(always)]
    fn end(&self) -> usize {
        self.as_ptr() as usize + self.len()
    }
}

/// Destination for summary records.
pub trait EventSink {
    fn emit(&mut self, event: &TrafficEvent);

    /// Called instead of `emit` when a packet's record was suppressed.
    #[inline(always)]
    fn suppressed(&mut self, _reason: TruncatedHeader) {}
}

#[cfg(feature = "userspace")]
impl EventSink for Vec<TrafficEvent> {
    fn emit(&mut self, event: &TrafficEvent) {
        self.push(*event);
    }
}

/// What the hook should do with the packet. Observation only, so there is
/// a single variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
}

/// Header that was being read when the packet ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Ethernet,
    Ipv4,
    Tcp,
    Udp,
    Icmp,
}

impl Layer {
    pub const fn as_str(self) -> &'static str {
        match self {
            Layer::Ethernet => "ethernet",
            Layer::Ipv4 => "ipv4",
            Layer::Tcp => "tcp",
            Layer::Udp => "udp",
            Layer::Icmp => "icmp",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A required header does not fit in the remaining packet bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("truncated {layer} header")]
pub struct TruncatedHeader {
    pub layer: Layer,
}

/// Transport selected by the IPv4 protocol byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Udp,
    Icmp,
    Other(u8),
}

impl From<u8> for Transport {
    #[inline(always)]
    fn from(proto: u8) -> Self {
        match proto {
            protocol::TCP => Transport::Tcp,
            protocol::UDP => Transport::Udp,
            protocol::ICMP => Transport::Icmp,
            other => Transport::Other(other),
        }
    }
}

/// Pointer to a `T` at `offset`, if the whole header lies inside the packet.
#[inline(always)]
fn header_at<P, T>(pkt: &P, offset: usize, layer: Layer) -> Result<*const T, TruncatedHeader>
where
    P: PacketBounds + ?Sized,
{
    let start = pkt.start();
    let end = pkt.end();

    if start + offset + mem::size_of::<T>() > end {
        return Err(TruncatedHeader { layer });
    }

    Ok((start + offset) as *const T)
}

/// Build the summary record for one packet.
///
/// Fails with `TruncatedHeader` if the Ethernet, IPv4 or recognised transport
/// header does not fit. A truncated transport header suppresses the whole
/// record, while an unrecognised protocol still yields one with zero ports.
#[inline(always)]
pub fn summarize<P>(pkt: &P) -> Result<TrafficEvent, TruncatedHeader>
where
    P: PacketBounds + ?Sized,
{
    let _eth: *const EthHdr = header_at(pkt, 0, Layer::Ethernet)?;
    let bytes = (pkt.end() - pkt.start()) as u64;

    // EtherType is not consulted; every frame is read as IPv4.
    let ip: *const Ipv4Hdr = header_at(pkt, EthHdr::LEN, Layer::Ipv4)?;

    // SAFETY: `ip` is in bounds. Fields are read unaligned, and `proto` as its
    // raw byte rather than as an `IpProto`.
    let (src_ip, dst_ip, proto) = unsafe {
        (
            ptr::addr_of!((*ip).src_addr).read_unaligned(),
            ptr::addr_of!((*ip).dst_addr).read_unaligned(),
            ptr::addr_of!((*ip).proto).cast::<u8>().read(),
        )
    };

    let mut event = TrafficEvent {
        bytes,
        src_ip,
        dst_ip,
        ..TrafficEvent::default()
    };

    // `src_port()`/`dst_port()` are host order; `to_be` restores the wire bytes.
    match Transport::from(proto) {
        Transport::Tcp => {
            let tcp: *const TcpHdr = header_at(pkt, TRANSPORT_OFFSET, Layer::Tcp)?;
            // SAFETY: in bounds, and every bit pattern is a valid `TcpHdr`.
            let tcp = unsafe { tcp.read_unaligned() };
            event.src_port = tcp.src_port().to_be();
            event.dst_port = tcp.dst_port().to_be();
        }
        Transport::Udp => {
            let udp: *const UdpHdr = header_at(pkt, TRANSPORT_OFFSET, Layer::Udp)?;
            // SAFETY: in bounds, and every bit pattern is a valid `UdpHdr`.
            let udp = unsafe { udp.read_unaligned() };
            event.src_port = udp.src_port().to_be();
            event.dst_port = udp.dst_port().to_be();
        }
        Transport::Icmp => {
            let _icmp: *const IcmpHdr = header_at(pkt, TRANSPORT_OFFSET, Layer::Icmp)?;
        }
        Transport::Other(_) => {}
    }

    Ok(event)
}

/// Classify one packet, hand the record (if any) to `sink` and return the
/// verdict.
#[inline(always)]
pub fn inspect<P, S>(pkt: &P, sink: &mut S) -> Verdict
where
    P: PacketBounds + ?Sized,
    S: EventSink + ?Sized,
{
    match summarize(pkt) {
        Ok(event) => sink.emit(&event),
        Err(reason) => sink.suppressed(reason),
    }

    Verdict::Pass
}

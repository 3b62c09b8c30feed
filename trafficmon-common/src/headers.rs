//! Headers the classifier reads, as laid out by `network-types`.
//!
//! Multi-byte fields stay in network byte order. The classifier only looks at
//! addresses, the protocol byte and the first two transport words.

pub use network_types::eth::EthHdr;
pub use network_types::icmp::IcmpHdr;
pub use network_types::ip::Ipv4Hdr;
pub use network_types::tcp::TcpHdr;
pub use network_types::udp::UdpHdr;

/// Offset of the transport header. IPv4 options are not honoured.
pub const TRANSPORT_OFFSET: usize = EthHdr::LEN + Ipv4Hdr::LEN;

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::{offset_of, size_of};

    #[test]
    fn test_header_lengths() {
        assert_eq!(EthHdr::LEN, 6 + 6 + 2);
        assert_eq!(Ipv4Hdr::LEN, 20);
        assert_eq!(TcpHdr::LEN, 20);
        assert_eq!(UdpHdr::LEN, 8);
        assert_eq!(IcmpHdr::LEN, 8);
        assert_eq!(size_of::<Ipv4Hdr>(), Ipv4Hdr::LEN);
    }

    #[test]
    fn test_ipv4_field_offsets() {
        assert_eq!(offset_of!(Ipv4Hdr, proto), 9);
        assert_eq!(offset_of!(Ipv4Hdr, src_addr), 12);
        assert_eq!(offset_of!(Ipv4Hdr, dst_addr), 16);
    }

    #[test]
    fn test_transport_offset() {
        assert_eq!(TRANSPORT_OFFSET, 34);
    }
}

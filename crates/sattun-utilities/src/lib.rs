//! Utility functions for the sattun bridge.
//!
//! ## Endpoint Utilities
//! - `ADDRESS:PORT` parsing for the UDP tunnel endpoints
//!
//! ## Header Diagnostics
//! Stateless extraction of the fields logged for each bridged packet:
//! - Ethernet source, destination and 802.1Q priority (PCP)
//! - IPv4 source, destination and DSCP
//!
//! None of this affects bridging; malformed packets are simply not described.

use std::{
    fmt, io,
    net::{Ipv4Addr, SocketAddrV4},
};

use byteorder::{BigEndian, ByteOrder};

/// Smallest frame the Ethernet parser looks at (two addresses and a tag or type).
pub const MIN_ETHERNET_FRAME_SIZE: usize = 16;
/// Smallest IPv4 header.
pub const MIN_IPV4_HEADER_SIZE: usize = 20;

const ETHER_TYPE_IPV4: u16 = 0x0800;
const ETHER_TYPE_VLAN: u16 = 0x8100;
const ETHER_TYPE_QINQ: u16 = 0x88A8;
const ETHER_TYPE_QINQ_LEGACY: u16 = 0x9100;
const ETHERNET_HEADER_SIZE: usize = 14;
const VLAN_TAG_SIZE: usize = 4;

/// Parses an `ADDRESS:PORT` endpoint. The address must be IPv4 and the port nonzero.
///
/// # Examples
/// ```
/// use sattun_utilities::parse_endpoint;
///
/// let addr = parse_endpoint("192.168.1.10:5000").unwrap();
/// assert_eq!(addr.port(), 5000);
/// assert_eq!(addr.ip().to_string(), "192.168.1.10");
///
/// assert!(parse_endpoint("192.168.1.10").is_err());
/// assert!(parse_endpoint("192.168.1.10:0").is_err());
/// ```
pub fn parse_endpoint(value: &str) -> io::Result<SocketAddrV4> {
    let invalid = |reason: &str| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Invalid endpoint \"{}\" (expected \"ADDRESS:PORT\"): {}", value, reason),
        )
    };

    let (address, port) = value.split_once(':').ok_or_else(|| invalid("missing port"))?;
    let address: Ipv4Addr = address.parse().map_err(|_| invalid("not an IPv4 address"))?;
    let port: u16 = port.parse().map_err(|_| invalid("invalid port"))?;
    if port == 0 {
        return Err(invalid("port must be nonzero"));
    }
    Ok(SocketAddrV4::new(address, port))
}

/// Formats a MAC address as colon-separated lowercase hex.
///
/// # Examples
/// ```
/// use sattun_utilities::format_mac;
///
/// assert_eq!(format_mac(&[0x02, 0, 0x5e, 0x10, 0xab, 0xff]), "02:00:5e:10:ab:ff");
/// ```
pub fn format_mac(addr: &[u8; 6]) -> String {
    addr.iter().map(|byte| format!("{:02x}", byte)).collect::<Vec<_>>().join(":")
}

/// Fields of an Ethernet header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EthernetHeader {
    /// Destination MAC address.
    pub destination: [u8; 6],
    /// Source MAC address.
    pub source: [u8; 6],
    /// Priority code point of the outer 802.1Q/802.1ad tag, 0 when untagged.
    pub pcp: u8,
    /// Type of the payload, after any VLAN tags.
    pub ether_type: u16,
    /// Offset of the payload in the frame.
    pub payload_offset: usize,
}

/// Parses the Ethernet header of `frame`.
pub fn parse_ethernet_header(frame: &[u8]) -> io::Result<EthernetHeader> {
    if frame.len() < MIN_ETHERNET_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "The packet ({} bytes) is smaller than the Ethernet minimal length ({} bytes)",
                frame.len(),
                MIN_ETHERNET_FRAME_SIZE
            ),
        ));
    }

    let mut destination = [0u8; 6];
    let mut source = [0u8; 6];
    destination.copy_from_slice(&frame[0..6]);
    source.copy_from_slice(&frame[6..12]);

    let mut ether_type = BigEndian::read_u16(&frame[12..14]);
    let mut payload_offset = ETHERNET_HEADER_SIZE;
    let mut pcp = 0;
    if matches!(ether_type, ETHER_TYPE_VLAN | ETHER_TYPE_QINQ | ETHER_TYPE_QINQ_LEGACY) {
        pcp = frame[14] >> 5;
    }
    // Skip stacked tags as long as the frame holds them.
    while matches!(ether_type, ETHER_TYPE_VLAN | ETHER_TYPE_QINQ | ETHER_TYPE_QINQ_LEGACY)
        && frame.len() >= payload_offset + VLAN_TAG_SIZE
    {
        ether_type = BigEndian::read_u16(&frame[payload_offset + 2..payload_offset + 4]);
        payload_offset += VLAN_TAG_SIZE;
    }

    Ok(EthernetHeader { destination, source, pcp, ether_type, payload_offset })
}

/// Fields of an IPv4 header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ipv4Header {
    /// Source address.
    pub source: Ipv4Addr,
    /// Destination address.
    pub destination: Ipv4Addr,
    /// Differentiated services code point.
    pub dscp: u8,
}

/// Parses the IPv4 header at the start of `packet`.
pub fn parse_ipv4_header(packet: &[u8]) -> io::Result<Ipv4Header> {
    let version = packet.first().map_or(0, |byte| byte >> 4);
    if version != 4 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("The packet is not an IPv4 packet (version {})", version),
        ));
    }
    if packet.len() < MIN_IPV4_HEADER_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "The packet ({} bytes) is smaller than the IPv4 minimal length ({} bytes)",
                packet.len(),
                MIN_IPV4_HEADER_SIZE
            ),
        ));
    }

    Ok(Ipv4Header {
        source: Ipv4Addr::from(BigEndian::read_u32(&packet[12..16])),
        destination: Ipv4Addr::from(BigEndian::read_u32(&packet[16..20])),
        dscp: packet[1] >> 2,
    })
}

/// One-line description of an Ethernet frame, for logs.
///
/// # Examples
/// ```
/// use sattun_utilities::FrameSummary;
///
/// let summary = FrameSummary::new(&[0u8; 4]);
/// assert_eq!(summary.to_string(), "4 bytes");
/// ```
#[derive(Clone, Copy, Debug)]
pub struct FrameSummary {
    length: usize,
    ethernet: Option<EthernetHeader>,
    ipv4: Option<Ipv4Header>,
}

impl FrameSummary {
    /// Extracts whatever headers `frame` holds.
    pub fn new(frame: &[u8]) -> Self {
        let ethernet = parse_ethernet_header(frame).ok();
        let ipv4 = ethernet
            .filter(|header| header.ether_type == ETHER_TYPE_IPV4)
            .and_then(|header| parse_ipv4_header(&frame[header.payload_offset..]).ok());
        Self { length: frame.len(), ethernet, ipv4 }
    }
}

impl fmt::Display for FrameSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes", self.length)?;
        if let Some(ethernet) = &self.ethernet {
            write!(
                f,
                ", {} -> {} (pcp {})",
                format_mac(&ethernet.source),
                format_mac(&ethernet.destination),
                ethernet.pcp
            )?;
        }
        if let Some(ipv4) = &self.ipv4 {
            write!(f, ", {} -> {} (dscp {})", ipv4.source, ipv4.destination, ipv4.dscp)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ethernet_ipv4_frame(tagged: bool) -> Vec<u8> {
        let mut frame = vec![0x02, 0, 0, 0, 0, 0x02, 0x02, 0, 0, 0, 0, 0x01];
        if tagged {
            frame.extend_from_slice(&[0x81, 0x00, 0xA0, 0x0A]);
        }
        frame.extend_from_slice(&[0x08, 0x00]);
        let mut ip = vec![0u8; 20];
        ip[0] = 0x45;
        ip[1] = 46 << 2;
        ip[12..16].copy_from_slice(&[10, 0, 0, 1]);
        ip[16..20].copy_from_slice(&[10, 0, 0, 2]);
        frame.extend_from_slice(&ip);
        frame
    }

    #[test]
    fn test_parse_endpoint() {
        let addr = parse_endpoint("127.0.0.1:5000").unwrap();
        assert_eq!(addr, SocketAddrV4::new(Ipv4Addr::LOCALHOST, 5000));
    }

    #[test]
    fn test_parse_endpoint_rejections() {
        let rejected = [
            "",
            ":5000",
            "127.0.0.1:",
            "127.0.0.1:70000",
            "127.0.0.1:5000:1",
            "::1:5000",
            "host:5000",
        ];
        for value in rejected {
            let err = parse_endpoint(value).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput, "{}", value);
        }
    }

    #[test]
    fn test_untagged_ethernet_header() {
        let frame = ethernet_ipv4_frame(false);
        let header = parse_ethernet_header(&frame).unwrap();
        assert_eq!(header.source, [0x02, 0, 0, 0, 0, 0x01]);
        assert_eq!(header.destination, [0x02, 0, 0, 0, 0, 0x02]);
        assert_eq!(header.pcp, 0);
        assert_eq!(header.ether_type, 0x0800);
        assert_eq!(header.payload_offset, 14);
    }

    #[test]
    fn test_tagged_ethernet_header() {
        let frame = ethernet_ipv4_frame(true);
        let header = parse_ethernet_header(&frame).unwrap();
        assert_eq!(header.pcp, 5);
        assert_eq!(header.ether_type, 0x0800);
        assert_eq!(header.payload_offset, 18);
    }

    #[test]
    fn test_short_frames_are_rejected() {
        assert!(parse_ethernet_header(&[0u8; 15]).is_err());
        assert!(parse_ipv4_header(&[0x45; 19]).is_err());
        assert!(parse_ipv4_header(&[0x60; 40]).is_err());
        assert!(parse_ipv4_header(&[]).is_err());
    }

    #[test]
    fn test_ipv4_header() {
        let frame = ethernet_ipv4_frame(false);
        let header = parse_ipv4_header(&frame[14..]).unwrap();
        assert_eq!(header.source, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(header.destination, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(header.dscp, 46);
    }

    #[test]
    fn test_frame_summary() {
        let summary = FrameSummary::new(&ethernet_ipv4_frame(true));
        assert_eq!(
            summary.to_string(),
            "38 bytes, 02:00:00:00:00:01 -> 02:00:00:00:00:02 (pcp 5), 10.0.0.1 -> 10.0.0.2 (dscp 46)"
        );
    }
}

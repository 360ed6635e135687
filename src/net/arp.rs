use std::net::Ipv4Addr;

use pnet::datalink::MacAddr;
use pnet::packet::arp::{ArpHardwareTypes, ArpOperation, ArpOperations, ArpPacket, MutableArpPacket};
use pnet::packet::ethernet::{EtherType, EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet::packet::{MutablePacket, Packet};

use crate::error::AddressFormatError;

const ARP_PACKET_SIZE: usize = 28;
const ETHERNET_HEADER_SIZE: usize = 14;
const MAC_HEX_DIGITS: usize = 12;
const BROADCAST: MacAddr = MacAddr(0xff, 0xff, 0xff, 0xff, 0xff, 0xff);

/// Total size of an ARP-over-Ethernet frame. No padding, no trailer.
pub const FRAME_SIZE: usize = ETHERNET_HEADER_SIZE + ARP_PACKET_SIZE;

pub type Frame = [u8; FRAME_SIZE];

/// Decoded view of an Ethernet+ARP frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpFrame {
    pub destination_mac: MacAddr,
    pub source_mac: MacAddr,
    pub ethertype: EtherType,
    pub hardware_type: u16,
    pub protocol_type: u16,
    pub hw_addr_len: u8,
    pub proto_addr_len: u8,
    pub operation: ArpOperation,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

/// Build the unsolicited broadcast ARP reply from address text.
///
/// Announces "`source_ip` is at `source_mac`" to the whole segment, with the
/// subnet broadcast address as ARP target.
pub fn build_garp_broadcast_frame(
    source_mac: &str,
    source_ip: &str,
    target_broadcast_ip: &str,
) -> Result<Frame, AddressFormatError> {
    let mac = parse_mac(source_mac)?;
    let ip = parse_ipv4(source_ip)?;
    let broadcast = parse_ipv4(target_broadcast_ip)?;
    Ok(garp_broadcast_frame(mac, ip, broadcast))
}

/// Build the classic gratuitous ARP request from address text.
pub fn build_garp_request_frame(source_mac: &str, source_ip: &str) -> Result<Frame, AddressFormatError> {
    let mac = parse_mac(source_mac)?;
    let ip = parse_ipv4(source_ip)?;
    Ok(garp_request_frame(mac, ip))
}

/// Broadcast ARP reply: operation 2, target IP = `broadcast_ip`.
pub fn garp_broadcast_frame(source_mac: MacAddr, source_ip: Ipv4Addr, broadcast_ip: Ipv4Addr) -> Frame {
    let mut frame = [0u8; FRAME_SIZE];
    build_frame(&mut frame, ArpOperations::Reply, source_mac, source_ip, broadcast_ip);
    frame
}

/// Gratuitous ARP request: operation 1, target IP = `source_ip`.
pub fn garp_request_frame(source_mac: MacAddr, source_ip: Ipv4Addr) -> Frame {
    let mut frame = [0u8; FRAME_SIZE];
    build_frame(&mut frame, ArpOperations::Request, source_mac, source_ip, source_ip);
    frame
}

/// Parse a MAC address: 12 hex digits, any case, colons ignored.
pub fn parse_mac(text: &str) -> Result<MacAddr, AddressFormatError> {
    let invalid = || AddressFormatError::InvalidMac(text.to_string());

    let digits: Vec<u8> = text.bytes().filter(|b| *b != b':').collect();
    if digits.len() != MAC_HEX_DIGITS || !digits.iter().all(u8::is_ascii_hexdigit) {
        return Err(invalid());
    }

    let mut octets = [0u8; 6];
    for (octet, pair) in octets.iter_mut().zip(digits.chunks_exact(2)) {
        let pair = std::str::from_utf8(pair).map_err(|_| invalid())?;
        *octet = u8::from_str_radix(pair, 16).map_err(|_| invalid())?;
    }
    let [a, b, c, d, e, f] = octets;
    Ok(MacAddr::new(a, b, c, d, e, f))
}

/// Parse a dotted-quad IPv4 address.
pub fn parse_ipv4(text: &str) -> Result<Ipv4Addr, AddressFormatError> {
    text.parse()
        .map_err(|_| AddressFormatError::InvalidIpv4(text.to_string()))
}

/// Decode an Ethernet frame carrying ARP. Returns `None` for anything else.
pub fn decode_frame(frame: &[u8]) -> Option<ArpFrame> {
    let eth = EthernetPacket::new(frame)?;
    if eth.get_ethertype() != EtherTypes::Arp {
        return None;
    }
    let arp = ArpPacket::new(eth.payload())?;
    Some(ArpFrame {
        destination_mac: eth.get_destination(),
        source_mac: eth.get_source(),
        ethertype: eth.get_ethertype(),
        hardware_type: arp.get_hardware_type().0,
        protocol_type: arp.get_protocol_type().0,
        hw_addr_len: arp.get_hw_addr_len(),
        proto_addr_len: arp.get_proto_addr_len(),
        operation: arp.get_operation(),
        sender_mac: arp.get_sender_hw_addr(),
        sender_ip: arp.get_sender_proto_addr(),
        target_mac: arp.get_target_hw_addr(),
        target_ip: arp.get_target_proto_addr(),
    })
}

fn build_frame(
    buffer: &mut [u8],
    operation: ArpOperation,
    sender_mac: MacAddr,
    sender_ip: Ipv4Addr,
    target_ip: Ipv4Addr,
) {
    let mut eth = MutableEthernetPacket::new(buffer).expect("buffer too small for Ethernet header");
    eth.set_destination(BROADCAST);
    eth.set_source(sender_mac);
    eth.set_ethertype(EtherTypes::Arp);

    let mut arp = MutableArpPacket::new(eth.payload_mut()).expect("buffer too small for ARP packet");
    arp.set_hardware_type(ArpHardwareTypes::Ethernet);
    arp.set_protocol_type(EtherTypes::Ipv4);
    arp.set_hw_addr_len(6);
    arp.set_proto_addr_len(4);
    arp.set_operation(operation);
    arp.set_sender_hw_addr(sender_mac);
    arp.set_sender_proto_addr(sender_ip);
    arp.set_target_hw_addr(BROADCAST);
    arp.set_target_proto_addr(target_ip);
}

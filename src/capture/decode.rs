//! Frame decoding into the layered [`Packet`] model.
//!
//! The link layer is determined by the capture handle's datalink type, the
//! layers above it are sliced with `etherparse`. Anything that cannot be
//! decoded is simply absent from the resulting packet.

use etherparse::{InternetSlice, SlicedPacket, TransportSlice};
use std::net::IpAddr;

use crate::capture::packet::{LayerType, Metadata, NetworkLayer, Packet, TransportLayer};

const DLT_NULL: i32 = 0;
const DLT_EN10MB: i32 = 1;
const DLT_RAW: i32 = 12;
const DLT_RAW_OPENBSD: i32 = 14;
const LINKTYPE_RAW: i32 = 101;
const DLT_LOOP: i32 = 108;
const DLT_LINUX_SLL: i32 = 113;
const DLT_LINUX_SLL2: i32 = 276;

const ETHERNET_HEADER_LEN: usize = 14;
const SLL_HEADER_LEN: usize = 16;
const SLL2_HEADER_LEN: usize = 20;
const NULL_HEADER_LEN: usize = 4;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86DD;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Ethernet,
    LinuxSll,
    LinuxSll2,
    Loopback,
    RawIp,
    Unsupported(i32),
}

impl LinkKind {
    pub fn from_datalink(datalink: i32) -> Self {
        match datalink {
            DLT_EN10MB => LinkKind::Ethernet,
            DLT_LINUX_SLL => LinkKind::LinuxSll,
            DLT_LINUX_SLL2 => LinkKind::LinuxSll2,
            DLT_NULL | DLT_LOOP => LinkKind::Loopback,
            DLT_RAW | DLT_RAW_OPENBSD | LINKTYPE_RAW => LinkKind::RawIp,
            other => LinkKind::Unsupported(other),
        }
    }
}

pub fn decode(link: LinkKind, frame: &[u8], metadata: Metadata) -> Packet {
    let mut packet = Packet::undecoded(metadata);

    let sliced = match link {
        LinkKind::Ethernet if frame.len() >= ETHERNET_HEADER_LEN => {
            packet = packet.with_link(LayerType::Ethernet);
            SlicedPacket::from_ethernet(frame).ok()
        }
        LinkKind::LinuxSll if frame.len() >= SLL_HEADER_LEN => {
            packet = packet.with_link(LayerType::LinuxSll);
            let protocol = u16::from_be_bytes([frame[14], frame[15]]);
            slice_ip(protocol, &frame[SLL_HEADER_LEN..])
        }
        LinkKind::LinuxSll2 if frame.len() >= SLL2_HEADER_LEN => {
            packet = packet.with_link(LayerType::LinuxSll);
            let protocol = u16::from_be_bytes([frame[0], frame[1]]);
            slice_ip(protocol, &frame[SLL2_HEADER_LEN..])
        }
        LinkKind::Loopback if frame.len() >= NULL_HEADER_LEN => {
            packet = packet.with_link(LayerType::Loopback);
            SlicedPacket::from_ip(&frame[NULL_HEADER_LEN..]).ok()
        }
        LinkKind::RawIp => SlicedPacket::from_ip(frame).ok(),
        _ => None,
    };

    match sliced {
        Some(sliced) => apply_layers(packet, &sliced),
        None => packet,
    }
}

fn slice_ip(protocol: u16, data: &[u8]) -> Option<SlicedPacket<'_>> {
    match protocol {
        ETHERTYPE_IPV4 | ETHERTYPE_IPV6 => SlicedPacket::from_ip(data).ok(),
        _ => None,
    }
}

fn apply_layers(mut packet: Packet, sliced: &SlicedPacket<'_>) -> Packet {
    match &sliced.ip {
        Some(InternetSlice::Ipv4(header, _)) => {
            packet = packet.with_network(NetworkLayer {
                layer_type: LayerType::Ipv4,
                src: IpAddr::V4(header.source_addr()),
                dst: IpAddr::V4(header.destination_addr()),
            });
        }
        Some(InternetSlice::Ipv6(header, _)) => {
            packet = packet.with_network(NetworkLayer {
                layer_type: LayerType::Ipv6,
                src: IpAddr::V6(header.source_addr()),
                dst: IpAddr::V6(header.destination_addr()),
            });
        }
        None => return packet,
    }

    let transport = match &sliced.transport {
        Some(TransportSlice::Tcp(tcp)) => TransportLayer {
            layer_type: LayerType::Tcp,
            ports: Some((tcp.source_port(), tcp.destination_port())),
        },
        Some(TransportSlice::Udp(udp)) => TransportLayer {
            layer_type: LayerType::Udp,
            ports: Some((udp.source_port(), udp.destination_port())),
        },
        Some(TransportSlice::Icmpv4(_)) => TransportLayer {
            layer_type: LayerType::Icmpv4,
            ports: None,
        },
        Some(TransportSlice::Icmpv6(_)) => TransportLayer {
            layer_type: LayerType::Icmpv6,
            ports: None,
        },
        _ => return packet,
    };

    let application = transport
        .ports
        .and_then(|ports| classify_application(transport.layer_type, ports, sliced.payload));

    packet = packet.with_transport(transport);
    match application {
        Some(application) => packet.with_application(application),
        None => packet,
    }
}

/// Well-known port classification of the transport payload.
fn classify_application(transport: LayerType, ports: (u16, u16), payload: &[u8]) -> Option<LayerType> {
    if payload.is_empty() {
        return None;
    }

    let by_port = |port: u16| match (transport, port) {
        (LayerType::Tcp | LayerType::Udp, 53) => Some(LayerType::Dns),
        (LayerType::Tcp | LayerType::Udp, 5060) => Some(LayerType::Sip),
        (LayerType::Tcp, 443) => Some(LayerType::Tls),
        (LayerType::Udp, 123) => Some(LayerType::Ntp),
        (LayerType::Udp, 67 | 68) => Some(LayerType::Dhcpv4),
        _ => None,
    };

    let (src, dst) = ports;
    by_port(dst).or_else(|| by_port(src)).or(Some(LayerType::Payload))
}

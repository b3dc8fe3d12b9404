use std::net::IpAddr;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerType {
    Ethernet,
    LinuxSll,
    Loopback,
    Ipv4,
    Ipv6,
    Tcp,
    Udp,
    Icmpv4,
    Icmpv6,
    Dns,
    Tls,
    Ntp,
    Dhcpv4,
    Sip,
    Payload,
}

impl LayerType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            LayerType::Ethernet => "Ethernet",
            LayerType::LinuxSll => "Linux SLL",
            LayerType::Loopback => "Loopback",
            LayerType::Ipv4 => "IPv4",
            LayerType::Ipv6 => "IPv6",
            LayerType::Tcp => "TCP",
            LayerType::Udp => "UDP",
            LayerType::Icmpv4 => "ICMPv4",
            LayerType::Icmpv6 => "ICMPv6",
            LayerType::Dns => "DNS",
            LayerType::Tls => "TLS",
            LayerType::Ntp => "NTP",
            LayerType::Dhcpv4 => "DHCPv4",
            LayerType::Sip => "SIP",
            LayerType::Payload => "Payload",
        }
    }
}

impl std::fmt::Display for LayerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkLayer {
    pub layer_type: LayerType,
    pub src: IpAddr,
    pub dst: IpAddr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportLayer {
    pub layer_type: LayerType,
    /// Source and destination port. `None` for port-less protocols such as ICMP.
    pub ports: Option<(u16, u16)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub capture_length: usize,
    pub length: usize,
    pub timestamp: SystemTime,
}

impl Metadata {
    pub fn new(capture_length: usize) -> Self {
        Self {
            capture_length,
            length: capture_length,
            timestamp: SystemTime::now(),
        }
    }
}

/// A decoded frame. Immutable once produced by the capture side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    link: Option<LayerType>,
    network: Option<NetworkLayer>,
    transport: Option<TransportLayer>,
    application: Option<LayerType>,
    metadata: Metadata,
}

impl Packet {
    /// A packet nothing could be decoded from.
    pub fn undecoded(metadata: Metadata) -> Self {
        Self {
            link: None,
            network: None,
            transport: None,
            application: None,
            metadata,
        }
    }

    pub fn with_link(mut self, link: LayerType) -> Self {
        self.link = Some(link);
        self
    }

    pub fn with_network(mut self, network: NetworkLayer) -> Self {
        self.network = Some(network);
        self
    }

    pub fn with_transport(mut self, transport: TransportLayer) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_application(mut self, application: LayerType) -> Self {
        self.application = Some(application);
        self
    }

    pub fn link_layer(&self) -> Option<LayerType> {
        self.link
    }

    pub fn network_layer(&self) -> Option<&NetworkLayer> {
        self.network.as_ref()
    }

    pub fn transport_layer(&self) -> Option<&TransportLayer> {
        self.transport.as_ref()
    }

    pub fn application_layer(&self) -> Option<LayerType> {
        self.application
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn has_layers(&self) -> bool {
        self.link.is_some()
            || self.network.is_some()
            || self.transport.is_some()
            || self.application.is_some()
    }
}

//! Per-packet label extraction and metric emission.

use crate::capture::Packet;
use crate::dns::DnsCache;
use crate::labels::{Label, LabelSet, LabelValues, UNKNOWN_IP, UNKNOWN_PORT};
use crate::metrics::MetricsSink;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

/// Shared by every worker. Holds only read-only configuration and shared handles.
pub struct PacketAnalyser {
    labels: LabelSet,
    dns: Option<Arc<DnsCache>>,
    metrics: Arc<dyn MetricsSink>,
}

impl PacketAnalyser {
    pub fn new(labels: LabelSet, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            labels,
            dns: None,
            metrics,
        }
    }

    /// Enables reverse DNS for address labels.
    pub fn with_dns(mut self, cache: Arc<DnsCache>) -> Self {
        self.dns = Some(cache);
        self
    }

    pub fn analyse(&self, queue_depth: usize, packet: &Packet) {
        self.metrics.set_queue_depth(queue_depth);
        self.metrics.inc_packets();

        if !packet.has_layers() {
            return;
        }

        let values = self.extract_labels(packet);
        let bytes = packet.metadata().capture_length as u64;
        self.metrics.add_bytes(&values, bytes);
    }

    pub fn extract_labels(&self, packet: &Packet) -> LabelValues {
        let network = packet.network_layer();
        let ports = packet.transport_layer().and_then(|t| t.ports);

        self.labels
            .iter()
            .map(|label| {
                let value = match label {
                    Label::SourceAddress => self.print_host(network.map(|n| n.src)),
                    Label::DestinationAddress => self.print_host(network.map(|n| n.dst)),
                    Label::SourcePort => print_port(ports.map(|(src, _)| src)),
                    Label::DestinationPort => print_port(ports.map(|(_, dst)| dst)),
                    Label::LinkProtocol => protocol_name(packet.link_layer()),
                    Label::NetworkProtocol => {
                        protocol_name(network.map(|n| n.layer_type))
                    }
                    Label::TransportProtocol => {
                        protocol_name(packet.transport_layer().map(|t| t.layer_type))
                    }
                    Label::ApplicationProtocol => protocol_name(packet.application_layer()),
                };
                (label, value)
            })
            .collect()
    }

    fn print_host(&self, addr: Option<IpAddr>) -> String {
        let Some(addr) = addr else {
            return UNKNOWN_IP.to_string();
        };
        let ip = addr.to_string();

        let Some(cache) = &self.dns else {
            return ip;
        };

        match cache.reverse_lookup(&ip) {
            Ok(resolved) => {
                if !resolved.duration.is_zero() {
                    self.metrics
                        .set_dns_query_duration(resolved.duration.as_secs_f64());
                }
                resolved.hostname
            }
            Err(e) => {
                debug!("{}", e);
                ip
            }
        }
    }
}

fn print_port(port: Option<u16>) -> String {
    match port {
        Some(port) => port.to_string(),
        None => UNKNOWN_PORT.to_string(),
    }
}

fn protocol_name(layer: Option<impl std::fmt::Display>) -> String {
    layer.map(|l| l.to_string()).unwrap_or_default()
}

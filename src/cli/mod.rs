pub mod commands;

use crate::labels::LabelSet;
use crate::options::{
    default_workers, Options, DEFAULT_DEVICE, DEFAULT_QUEUE_CAPACITY, DEFAULT_SNAPLEN,
};
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

const AFTER_HELP: &str = "Notes:
- If SourceAddress or DestinationAddress is used but no address can be determined, '-1.-1.-1.-1' is set as the label value.
- If SourcePort or DestinationPort is used but no port can be determined, '-1' is set as the label value.
- If any protocol is used but no protocol can be determined, '' is set as the label value.
- ICMPv4 and ICMPv6 are reported as TransportProtocol. They carry no ports, so port labels are '-1'.
- Labels: SourceAddress (sa), SourcePort (sp), DestinationAddress (da), DestinationPort (dp),
  LinkProtocol (lp), NetworkProtocol (np), TransportProtocol (tp), ApplicationProtocol (ap).";

#[derive(Parser, Debug)]
#[command(name = "pcap_exporter")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Prometheus exporter for per-flow traffic volume observed with pcap", long_about = None)]
#[command(after_help = AFTER_HELP)]
pub struct Cli {
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(
        short,
        long,
        default_value = DEFAULT_DEVICE,
        help = "Interface name to listen to. 'any' listens to all"
    )]
    pub interface: String,

    #[arg(
        short,
        long,
        default_value = "",
        help = "A pcap filter string. See pcap-filter(7) for usage"
    )]
    pub filter: String,

    #[arg(short, long, default_value_t = DEFAULT_SNAPLEN, help = "Number of bytes max to read per packet")]
    pub snaplen: i32,

    #[arg(short, long, help = "Use promiscuous mode")]
    pub promiscuous: bool,

    #[arg(short, long, help = "Resolve ip addresses with their DNS names")]
    pub resolve: bool,

    #[arg(
        short = 'l',
        long = "label",
        value_name = "NAME",
        value_delimiter = ',',
        default_values = ["SourceAddress", "DestinationAddress"],
        help = "Label to add to the bytes counter, by name or short code"
    )]
    pub labels: Vec<String>,

    #[arg(long, default_value = "0.0.0.0:9999", help = "Listen address with the port for the exporter")]
    pub listen_address: SocketAddr,

    #[arg(short, long, help = "Number of packet analysis workers [default: logical CPU count]")]
    pub workers: Option<usize>,

    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY, help = "Capacity of the packet queue between capture and workers")]
    pub queue_capacity: usize,

    #[arg(
        long,
        default_value_t = 600,
        value_name = "SECS",
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Interval between full flushes of the DNS cache"
    )]
    pub dns_flush_interval: u64,

    #[arg(long, help = "Prints available interfaces and quits")]
    pub list_interfaces: bool,
}

impl Cli {
    pub fn options(&self) -> Options {
        Options {
            labels: LabelSet::from_names(&self.labels),
            resolve_dns: self.resolve,
            device: self.interface.clone(),
            filter: self.filter.clone(),
            snaplen: self.snaplen,
            promiscuous: self.promiscuous,
            workers: self.workers.unwrap_or_else(default_workers),
            queue_capacity: self.queue_capacity,
            dns_flush_interval: Duration::from_secs(self.dns_flush_interval),
        }
    }
}

use crate::labels::{LabelSet, LabelValues};
use crate::Result;
use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tracing::error;

pub const NAMESPACE: &str = "pcap";

/// Destination of everything the packet workers observe.
///
/// Implementations are shared by all workers and must synchronize internally.
pub trait MetricsSink: Send + Sync {
    fn set_queue_depth(&self, depth: usize);

    fn inc_packets(&self);

    fn add_bytes(&self, labels: &LabelValues, bytes: u64);

    fn set_dns_query_duration(&self, seconds: f64);
}

#[derive(Clone)]
pub struct PacketMetrics {
    registry: Registry,
    bytes_transferred: IntCounterVec,
    buffer_len: IntGauge,
    packets: IntCounter,
    dns_query_duration: Gauge,
}

impl PacketMetrics {
    /// Registers the exporter's metrics. The bytes counter is labelled with `labels`.
    pub fn new(labels: &LabelSet) -> Result<Self> {
        let registry = Registry::new();

        let bytes_transferred = IntCounterVec::new(
            Opts::new("bytes_transferred", "Amount of bytes transferred").namespace(NAMESPACE),
            &labels.names(),
        )?;
        let buffer_len = IntGauge::with_opts(
            Opts::new("buffer_len", "Fill state of the internal buffer").namespace(NAMESPACE),
        )?;
        let packets = IntCounter::with_opts(
            Opts::new("packets", "Amount of packets seen").namespace(NAMESPACE),
        )?;
        let dns_query_duration = Gauge::with_opts(
            Opts::new("dns_query_duration", "Duration in seconds per DNS query")
                .namespace(NAMESPACE),
        )?;

        registry.register(Box::new(bytes_transferred.clone()))?;
        registry.register(Box::new(buffer_len.clone()))?;
        registry.register(Box::new(packets.clone()))?;
        registry.register(Box::new(dns_query_duration.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            registry,
            bytes_transferred,
            buffer_len,
            packets,
            dns_query_duration,
        })
    }

    pub fn packets_total(&self) -> u64 {
        self.packets.get()
    }

    /// Renders every registered metric in the Prometheus text format.
    pub fn gather_text(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl MetricsSink for PacketMetrics {
    fn set_queue_depth(&self, depth: usize) {
        self.buffer_len.set(i64::try_from(depth).unwrap_or(i64::MAX));
    }

    fn inc_packets(&self) {
        self.packets.inc();
    }

    fn add_bytes(&self, labels: &LabelValues, bytes: u64) {
        let values: Vec<&str> = labels.iter().map(|(_, value)| value.as_str()).collect();
        match self.bytes_transferred.get_metric_with_label_values(&values) {
            Ok(counter) => counter.inc_by(bytes),
            Err(e) => error!("unable to add bytes_transferred sample: {}", e),
        }
    }

    fn set_dns_query_duration(&self, seconds: f64) {
        self.dns_query_duration.set(seconds);
    }
}

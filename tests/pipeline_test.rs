use pcap_exporter::capture::{
    LayerType, Metadata, NetworkLayer, Packet, PacketSource, TransportLayer,
};
use pcap_exporter::labels::{Label, LabelSet, LabelValues};
use pcap_exporter::metrics::MetricsSink;
use pcap_exporter::pipeline::{PacketAnalyser, Pipeline, PipelineConfig};
use pcap_exporter::{ExporterError, Result};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Yields `total` packets, then either reports exhaustion or idles.
struct MemorySource {
    remaining: u64,
    produced: Arc<AtomicU64>,
    exhaust: bool,
}

impl PacketSource for MemorySource {
    fn next_packet(&mut self) -> Result<Option<Packet>> {
        if self.remaining == 0 {
            if self.exhaust {
                return Err(ExporterError::CaptureExhausted);
            }
            thread::sleep(Duration::from_millis(5));
            return Ok(None);
        }

        self.remaining -= 1;
        self.produced.fetch_add(1, Ordering::SeqCst);
        Ok(Some(udp_packet()))
    }
}

#[derive(Default)]
struct CountingSink {
    packets: AtomicU64,
    bytes: AtomicU64,
    max_depth: AtomicUsize,
    delay: Duration,
}

impl MetricsSink for CountingSink {
    fn set_queue_depth(&self, depth: usize) {
        self.max_depth.fetch_max(depth, Ordering::SeqCst);
    }

    fn inc_packets(&self) {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.packets.fetch_add(1, Ordering::SeqCst);
    }

    fn add_bytes(&self, _labels: &LabelValues, bytes: u64) {
        self.bytes.fetch_add(bytes, Ordering::SeqCst);
    }

    fn set_dns_query_duration(&self, _seconds: f64) {}
}

fn udp_packet() -> Packet {
    Packet::undecoded(Metadata::new(100))
        .with_link(LayerType::Ethernet)
        .with_network(NetworkLayer {
            layer_type: LayerType::Ipv4,
            src: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            dst: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
        })
        .with_transport(TransportLayer {
            layer_type: LayerType::Udp,
            ports: Some((40000, 53)),
        })
}

fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn analyser(sink: Arc<CountingSink>) -> Arc<PacketAnalyser> {
    let labels = LabelSet::new([Label::SourceAddress, Label::DestinationPort]);
    Arc::new(PacketAnalyser::new(labels, sink))
}

#[test]
fn test_every_packet_is_counted_once() {
    let total = 500;
    let produced = Arc::new(AtomicU64::new(0));
    let source = MemorySource {
        remaining: total,
        produced: Arc::clone(&produced),
        exhaust: true,
    };
    let sink = Arc::new(CountingSink::default());
    let config = PipelineConfig {
        workers: 4,
        queue_capacity: 8,
    };

    let pipeline = Pipeline::start(source, config, analyser(Arc::clone(&sink))).unwrap();
    assert!(wait_until(Duration::from_secs(10), || {
        sink.packets.load(Ordering::SeqCst) == total
    }));
    pipeline.stop();

    assert_eq!(produced.load(Ordering::SeqCst), total);
    assert_eq!(sink.packets.load(Ordering::SeqCst), total);
    assert_eq!(sink.bytes.load(Ordering::SeqCst), total * 100);
    assert!(sink.max_depth.load(Ordering::SeqCst) <= config.queue_capacity);
}

#[test]
fn test_stop_drains_queued_packets() {
    let produced = Arc::new(AtomicU64::new(0));
    let source = MemorySource {
        remaining: 200,
        produced: Arc::clone(&produced),
        exhaust: false,
    };
    let sink = Arc::new(CountingSink {
        delay: Duration::from_millis(2),
        ..CountingSink::default()
    });
    let config = PipelineConfig {
        workers: 1,
        queue_capacity: 16,
    };

    let pipeline = Pipeline::start(source, config, analyser(Arc::clone(&sink))).unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        produced.load(Ordering::SeqCst) > config.queue_capacity as u64
    }));
    pipeline.stop();

    // at most the packet held by the blocked send is dropped
    let produced = produced.load(Ordering::SeqCst);
    let counted = sink.packets.load(Ordering::SeqCst);
    assert!(counted <= produced);
    assert!(counted + 1 >= produced);
    assert!(sink.max_depth.load(Ordering::SeqCst) <= config.queue_capacity);
}

#[test]
fn test_idle_source_stops_promptly() {
    let source = MemorySource {
        remaining: 0,
        produced: Arc::new(AtomicU64::new(0)),
        exhaust: false,
    };
    let sink = Arc::new(CountingSink::default());
    let config = PipelineConfig {
        workers: 2,
        queue_capacity: 4,
    };

    let pipeline = Pipeline::start(source, config, analyser(Arc::clone(&sink))).unwrap();
    let started = Instant::now();
    pipeline.stop();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(sink.packets.load(Ordering::SeqCst), 0);
}

struct BrokenSource {
    reads: Arc<AtomicU64>,
}

impl PacketSource for BrokenSource {
    fn next_packet(&mut self) -> Result<Option<Packet>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Err(ExporterError::Capture(pcap::Error::PcapError(
            "read error".to_string(),
        )))
    }
}

#[test]
fn test_failing_source_backs_off() {
    let reads = Arc::new(AtomicU64::new(0));
    let source = BrokenSource {
        reads: Arc::clone(&reads),
    };
    let sink = Arc::new(CountingSink::default());
    let config = PipelineConfig {
        workers: 1,
        queue_capacity: 4,
    };

    let pipeline = Pipeline::start(source, config, analyser(Arc::clone(&sink))).unwrap();
    thread::sleep(Duration::from_millis(200));

    let started = Instant::now();
    pipeline.stop();

    assert!(started.elapsed() < Duration::from_secs(5));
    let reads = reads.load(Ordering::SeqCst);
    assert!(reads >= 1);
    assert!(reads <= 10, "{} reads in 200ms", reads);
    assert_eq!(sink.packets.load(Ordering::SeqCst), 0);
}

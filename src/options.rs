use crate::capture::{CaptureOptions, ANY_DEVICE};
use crate::labels::LabelSet;
use serde::Serialize;
use std::time::Duration;

pub const DEFAULT_DEVICE: &str = ANY_DEVICE;
pub const DEFAULT_SNAPLEN: i32 = 65536;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Runtime configuration, fixed for the lifetime of the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct Options {
    pub labels: LabelSet,
    pub resolve_dns: bool,
    pub device: String,
    pub filter: String,
    pub snaplen: i32,
    pub promiscuous: bool,
    pub workers: usize,
    pub queue_capacity: usize,
    #[serde(with = "duration_secs")]
    pub dns_flush_interval: Duration,
}

impl Options {
    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            device: self.device.clone(),
            snaplen: self.snaplen,
            promiscuous: self.promiscuous,
            filter: self.filter.clone(),
        }
    }

    pub fn to_html(&self) -> String {
        format!("<html><body><pre>\n{}\n</pre></body></html>", self)
    }
}

/// Logical CPU count, the default worker pool size.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Default for Options {
    fn default() -> Self {
        Self {
            labels: LabelSet::default(),
            resolve_dns: false,
            device: DEFAULT_DEVICE.to_string(),
            filter: String::new(),
            snaplen: DEFAULT_SNAPLEN,
            promiscuous: false,
            workers: default_workers(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            dns_flush_interval: crate::dns::DEFAULT_FLUSH_INTERVAL,
        }
    }
}

impl std::fmt::Display for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Labels: {}", self.labels.names().join(","))?;
        writeln!(f, "ResolveDNS: {}", self.resolve_dns)?;
        writeln!(f, "Device: {}", self.device)?;
        writeln!(f, "Filter: {}", self.filter)?;
        writeln!(f, "Snaplen: {}", self.snaplen)?;
        writeln!(f, "Promiscuous: {}", self.promiscuous)?;
        writeln!(f, "Workers: {}", self.workers)?;
        writeln!(f, "QueueCapacity: {}", self.queue_capacity)?;
        write!(f, "DNSFlushInterval: {}s", self.dns_flush_interval.as_secs())
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }
}

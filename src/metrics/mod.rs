pub mod collector;
pub mod exporter;

pub use collector::{MetricsSink, PacketMetrics};
pub use exporter::PrometheusExporter;

//! Capture ingestion, bounded queue fan-out and the packet analysis worker pool.

pub mod analyser;
pub mod ingest;
pub mod worker;

pub use analyser::PacketAnalyser;
pub use worker::WorkerPool;

use crate::capture::PacketSource;
use crate::options::{default_workers, Options, DEFAULT_QUEUE_CAPACITY};
use crate::shutdown::StopHandle;
use crate::Result;
use crossbeam_channel::bounded;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl PipelineConfig {
    pub fn from_options(options: &Options) -> Self {
        Self {
            workers: options.workers.max(1),
            queue_capacity: options.queue_capacity.max(1),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

pub struct Pipeline {
    ingestion: StopHandle,
    workers: WorkerPool,
}

impl Pipeline {
    pub fn start<S: PacketSource>(
        source: S,
        config: PipelineConfig,
        analyser: Arc<PacketAnalyser>,
    ) -> Result<Self> {
        let (queue_tx, queue_rx) = bounded(config.queue_capacity);

        let workers = WorkerPool::start(config.workers, queue_rx, analyser)?;
        let ingestion = match ingest::start(source, queue_tx) {
            Ok(handle) => handle,
            Err(e) => {
                workers.stop();
                return Err(e.into());
            }
        };

        info!(
            "packet pipeline running with {} workers and queue capacity {}",
            workers.len(),
            config.queue_capacity
        );

        Ok(Self { ingestion, workers })
    }

    /// Stops ingestion first so nothing new is queued, then every worker.
    pub fn stop(self) {
        let Self { ingestion, workers } = self;

        ingestion.stop();
        let total = workers.len();
        let stopped = workers.stop();
        info!("stopped {} of {} packet analysis workers", stopped, total);
    }
}

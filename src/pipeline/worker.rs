use crate::capture::Packet;
use crate::pipeline::analyser::PacketAnalyser;
use crate::shutdown::{self, StopHandle, StopSignal, StopTimeouts};
use crossbeam_channel::{select, Receiver};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const WORKER_STOP_TIMEOUTS: StopTimeouts =
    StopTimeouts::new(Duration::from_secs(20), Duration::from_secs(10));

/// Fixed set of consumers of the shared packet queue. Never resized.
pub struct WorkerPool {
    workers: Vec<StopHandle>,
}

impl WorkerPool {
    /// Starts `size` workers, numbered from 1.
    pub fn start(
        size: usize,
        queue: Receiver<Packet>,
        analyser: Arc<PacketAnalyser>,
    ) -> std::io::Result<Self> {
        let mut workers = Vec::with_capacity(size);

        for number in 1..=size {
            let queue = queue.clone();
            let analyser = Arc::clone(&analyser);
            let name = format!("packet analysis worker #{}", number);

            let handle = shutdown::spawn(name.clone(), WORKER_STOP_TIMEOUTS, move |signal| {
                run(signal, &queue, &analyser)
            })?;
            info!("started {}", name);
            workers.push(handle);
        }

        Ok(Self { workers })
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Stops every worker in turn. Returns how many acknowledged.
    pub fn stop(self) -> usize {
        self.workers
            .into_iter()
            .map(StopHandle::stop)
            .filter(|acknowledged| *acknowledged)
            .count()
    }
}

fn run(signal: StopSignal, queue: &Receiver<Packet>, analyser: &PacketAnalyser) {
    loop {
        select! {
            recv(signal.receiver()) -> _ => break,
            recv(queue) -> packet => match packet {
                Ok(packet) => analyser.analyse(queue.len(), &packet),
                Err(_) => {
                    // producer is gone and the queue is drained
                    signal.wait();
                    break;
                }
            },
        }
    }

    // packets queued before the stop still get counted
    while let Ok(packet) = queue.try_recv() {
        analyser.analyse(queue.len(), &packet);
    }
    signal.acknowledge();
}

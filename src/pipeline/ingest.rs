//! Ingestion loop: moves packets from the capture source into the shared queue.
//!
//! The loop polls its stop signal between reads (the live source returns on
//! its read timeout) and while blocked on a full queue, which is the only
//! backpressure in the system. The source is dropped, closing the capture
//! handle, before the stop is acknowledged.
//!
//! Read errors back off exponentially. A source that keeps failing for
//! [`ReadRetry::max_errors`] reads in a row is given up on: the queue is
//! closed and the loop waits for its stop like an exhausted source.

use crate::capture::{Packet, PacketSource};
use crate::shutdown::{self, StopHandle, StopSignal, StopTimeouts};
use crate::ExporterError;
use crossbeam_channel::{select, Sender};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const CAPTURE_STOP_TIMEOUTS: StopTimeouts =
    StopTimeouts::new(Duration::from_secs(20), Duration::from_secs(20));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRetry {
    /// Pause after the first failed read.
    pub initial: Duration,
    /// Upper bound of the doubling pause.
    pub max: Duration,
    /// Consecutive failed reads after which the source is abandoned.
    pub max_errors: u32,
}

pub const READ_RETRY: ReadRetry = ReadRetry {
    initial: Duration::from_millis(5),
    max: Duration::from_secs(1),
    max_errors: 60,
};

pub fn start<S: PacketSource>(source: S, queue: Sender<Packet>) -> std::io::Result<StopHandle> {
    start_with_retry(source, queue, READ_RETRY)
}

pub fn start_with_retry<S: PacketSource>(
    source: S,
    queue: Sender<Packet>,
    retry: ReadRetry,
) -> std::io::Result<StopHandle> {
    let handle = shutdown::spawn("packet capture", CAPTURE_STOP_TIMEOUTS, move |signal| {
        run(signal, source, queue, retry)
    })?;

    info!("started packet capture");
    Ok(handle)
}

enum Forward {
    Sent,
    Stopped,
    Closed,
}

/// Consecutive read failures and the pause before the next read.
struct ErrorStreak {
    retry: ReadRetry,
    count: u32,
    backoff: Duration,
}

impl ErrorStreak {
    fn new(retry: ReadRetry) -> Self {
        Self {
            retry,
            count: 0,
            backoff: retry.initial,
        }
    }

    fn reset(&mut self) {
        if self.count > 0 {
            info!("packet capture recovered after {} failed reads", self.count);
        }
        self.count = 0;
        self.backoff = self.retry.initial;
    }

    /// Records a failure and returns the pause to take before reading again.
    fn record(&mut self, e: &ExporterError) -> Duration {
        self.count += 1;
        let pause = self.backoff;

        // first failure and then at most once per capped pause
        if self.count == 1 || pause >= self.retry.max {
            warn!("Error reading packet ({} in a row): {}", self.count, e);
        } else {
            debug!("Error reading packet ({} in a row): {}", self.count, e);
        }

        self.backoff = (self.backoff * 2).min(self.retry.max);
        pause
    }

    fn exhausted(&self) -> bool {
        self.count >= self.retry.max_errors
    }
}

fn run<S: PacketSource>(signal: StopSignal, mut source: S, queue: Sender<Packet>, retry: ReadRetry) {
    let mut errors = ErrorStreak::new(retry);

    loop {
        if signal.is_requested() {
            break;
        }

        match source.next_packet() {
            Ok(Some(packet)) => {
                errors.reset();
                match forward(&signal, &queue, packet) {
                    Forward::Sent => {}
                    Forward::Stopped => break,
                    Forward::Closed => {
                        warn!("packet queue closed, no worker is draining it");
                        signal.wait();
                        break;
                    }
                }
            }
            Ok(None) => errors.reset(),
            Err(ExporterError::CaptureExhausted) => {
                info!("packet source exhausted");
                close_and_wait(signal, source, queue);
                return;
            }
            Err(e) => {
                let pause = errors.record(&e);
                if errors.exhausted() {
                    error!(
                        "giving up on packet capture after {} consecutive read errors",
                        errors.count
                    );
                    close_and_wait(signal, source, queue);
                    return;
                }
                if signal.wait_timeout(pause) {
                    break;
                }
            }
        }
    }

    drop(source);
    drop(queue);
    signal.acknowledge();
}

fn close_and_wait<S: PacketSource>(signal: StopSignal, source: S, queue: Sender<Packet>) {
    drop(source);
    drop(queue);
    signal.wait();
    signal.acknowledge();
}

fn forward(signal: &StopSignal, queue: &Sender<Packet>, packet: Packet) -> Forward {
    select! {
        send(queue, packet) -> sent => match sent {
            Ok(()) => Forward::Sent,
            Err(_) => Forward::Closed,
        },
        recv(signal.receiver()) -> _ => Forward::Stopped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Metadata;
    use crate::Result;
    use crossbeam_channel::{bounded, RecvTimeoutError};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    struct FailingSource {
        reads: Arc<AtomicU32>,
        recover_after: Option<u32>,
    }

    impl PacketSource for FailingSource {
        fn next_packet(&mut self) -> Result<Option<Packet>> {
            let reads = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
            match self.recover_after {
                Some(n) if reads > n => Ok(Some(Packet::undecoded(Metadata::new(60)))),
                _ => Err(ExporterError::Capture(pcap::Error::PcapError(
                    "read error".to_string(),
                ))),
            }
        }
    }

    fn failing(recover_after: Option<u32>) -> (FailingSource, Arc<AtomicU32>) {
        let reads = Arc::new(AtomicU32::new(0));
        let source = FailingSource {
            reads: Arc::clone(&reads),
            recover_after,
        };
        (source, reads)
    }

    #[test]
    fn test_read_errors_back_off() {
        let (source, reads) = failing(None);
        let (queue_tx, _queue_rx) = bounded(4);

        let handle = start(source, queue_tx).unwrap();
        std::thread::sleep(Duration::from_millis(200));

        let started = Instant::now();
        assert!(handle.stop());
        assert!(started.elapsed() < Duration::from_secs(2));

        // 5 + 10 + 20 + 40 + 80 ms of pauses fit in the window
        let reads = reads.load(Ordering::SeqCst);
        assert!(reads >= 1);
        assert!(reads <= 10, "{} reads in 200ms", reads);
    }

    #[test]
    fn test_persistent_errors_close_the_queue() {
        let (source, reads) = failing(None);
        let (queue_tx, queue_rx) = bounded::<Packet>(4);
        let retry = ReadRetry {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(2),
            max_errors: 5,
        };

        let handle = start_with_retry(source, queue_tx, retry).unwrap();

        assert_eq!(
            queue_rx.recv_timeout(Duration::from_secs(5)),
            Err(RecvTimeoutError::Disconnected)
        );
        assert_eq!(reads.load(Ordering::SeqCst), 5);
        assert!(handle.stop());
    }

    #[test]
    fn test_recovered_source_resets_the_streak() {
        let (source, _reads) = failing(Some(3));
        let (queue_tx, queue_rx) = bounded::<Packet>(4);
        let retry = ReadRetry {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(2),
            max_errors: 5,
        };

        let handle = start_with_retry(source, queue_tx, retry).unwrap();

        assert!(queue_rx.recv_timeout(Duration::from_secs(5)).is_ok());
        assert!(handle.stop());
    }
}

//! Two-phase stop/acknowledge handshake for long-running loops.
//!
//! Every loop (ingestion, each worker, DNS cache eviction) runs on its own
//! named thread and owns a [`StopSignal`]. The spawner holds the matching
//! [`StopHandle`]. Stopping first delivers the signal over a rendezvous
//! channel, then waits for the loop to acknowledge. Each phase has its own
//! timeout; a loop that misses either is detached and left behind.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopTimeouts {
    /// How long to wait for the loop to take the stop signal.
    pub signal: Duration,
    /// How long to wait for the acknowledgment once the signal was taken.
    pub ack: Duration,
}

impl StopTimeouts {
    pub const fn new(signal: Duration, ack: Duration) -> Self {
        Self { signal, ack }
    }
}

/// Loop-side half of the handshake.
pub struct StopSignal {
    stop_rx: Receiver<()>,
    ack_tx: Sender<()>,
}

impl StopSignal {
    /// Channel to `select!` on alongside the loop's own work.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.stop_rx
    }

    /// Non-blocking check, for loops that poll between blocking reads.
    pub fn is_requested(&self) -> bool {
        self.stop_rx.try_recv().is_ok()
    }

    /// Blocks until stop is requested or the handle is gone.
    pub fn wait(&self) {
        let _ = self.stop_rx.recv();
    }

    /// Sleeps up to `timeout`, returning early with `true` if stop was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        !matches!(
            self.stop_rx.recv_timeout(timeout),
            Err(RecvTimeoutError::Timeout)
        )
    }

    pub fn acknowledge(self) {
        // The ack slot is buffered, so this never blocks even if the stopper gave up.
        let _ = self.ack_tx.try_send(());
    }
}

/// Spawner-side half of the handshake.
pub struct StopHandle {
    name: String,
    timeouts: StopTimeouts,
    stop_tx: Sender<()>,
    ack_rx: Receiver<()>,
    thread: JoinHandle<()>,
}

/// Spawns `body` on a named thread and returns the handle that stops it.
///
/// `body` must acknowledge through its [`StopSignal`] once it has stopped.
pub fn spawn<F>(name: impl Into<String>, timeouts: StopTimeouts, body: F) -> std::io::Result<StopHandle>
where
    F: FnOnce(StopSignal) + Send + 'static,
{
    let name = name.into();
    let (stop_tx, stop_rx) = bounded(0);
    let (ack_tx, ack_rx) = bounded(1);
    let signal = StopSignal { stop_rx, ack_tx };

    let thread = thread::Builder::new()
        .name(name.clone())
        .spawn(move || body(signal))?;

    Ok(StopHandle {
        name,
        timeouts,
        stop_tx,
        ack_rx,
        thread,
    })
}

impl StopHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Requests the loop to stop. Returns `true` if it acknowledged in time.
    ///
    /// Never blocks longer than the sum of both timeouts. On failure the
    /// thread is detached instead of joined.
    pub fn stop(self) -> bool {
        match self.stop_tx.send_timeout((), self.timeouts.signal) {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(())) => {
                warn!("killing {}, due to not stopping on time", self.name);
                return false;
            }
            Err(SendTimeoutError::Disconnected(())) => {
                warn!("{} already exited before stop was requested", self.name);
                return false;
            }
        }

        match self.ack_rx.recv_timeout(self.timeouts.ack) {
            Ok(()) => {
                if self.thread.join().is_err() {
                    warn!("{} panicked while stopping", self.name);
                }
                info!("stopped {}", self.name);
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("killing {}, due to not acknowledging stop", self.name);
                false
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!("{} exited without acknowledging stop", self.name);
                false
            }
        }
    }
}

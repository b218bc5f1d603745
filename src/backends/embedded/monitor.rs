// SPDX-License-Identifier: GPL-3.0-only
//! Pipeline bus monitoring thread

use super::pipeline::{BusMessage, PipelineBus};
use crate::constants::timing;
use crate::errors::{BackendError, BackendResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Polls a pipeline bus until stopped or a fatal error arrives
///
/// End-of-stream is forwarded on `eos_tx`; the first error goes to the fatal
/// handler, after which the thread exits.
pub struct BusMonitor {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    done_rx: Receiver<()>,
}

impl BusMonitor {
    pub fn spawn<F>(
        bus: Box<dyn PipelineBus>,
        poll_interval: Duration,
        eos_tx: Sender<()>,
        on_fatal: F,
    ) -> BackendResult<Self>
    where
        F: FnOnce(BackendError) + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop_signal);
        let (done_tx, done_rx) = mpsc::channel();

        let thread_handle = thread::Builder::new()
            .name("bus-monitor".to_string())
            .spawn(move || {
                debug!("Bus monitor started");
                let mut on_fatal = Some(on_fatal);

                while !thread_stop.load(Ordering::SeqCst) {
                    match bus.next_message(poll_interval) {
                        Some(BusMessage::Error { message, debug }) => {
                            error!(error = %message, debug = ?debug, "Pipeline error");
                            if let Some(handler) = on_fatal.take() {
                                handler(BackendError::PipelineFatal(message));
                            }
                            break;
                        }
                        Some(BusMessage::Warning { message, debug }) => {
                            warn!(warning = %message, debug = ?debug, "Pipeline warning");
                        }
                        Some(BusMessage::Eos) => {
                            info!("Pipeline reached end of stream");
                            let _ = eos_tx.send(());
                        }
                        Some(BusMessage::Other) | None => {}
                    }
                }

                debug!("Bus monitor exiting");
                let _ = done_tx.send(());
            })
            .map_err(|e| BackendError::Other(format!("Failed to spawn bus monitor: {}", e)))?;

        Ok(Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            done_rx,
        })
    }

    /// Stop and wait a bounded time; a thread that does not exit is detached
    pub fn stop(&mut self) {
        let Some(handle) = self.thread_handle.take() else {
            return;
        };
        self.stop_signal.store(true, Ordering::SeqCst);

        match self.done_rx.recv_timeout(timing::MONITOR_STOP_TIMEOUT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    warn!("Bus monitor thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("Bus monitor did not stop in time, detaching");
            }
        }
    }
}

impl Drop for BusMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

// SPDX-License-Identifier: GPL-3.0-only
//! Capture thread lifecycle
//!
//! A [`CaptureWorker`] owns one open capture device on a dedicated thread and
//! publishes what it reads through a [`SessionEvents`]. The device is opened on
//! that thread; the outcome is handed back through a ready channel so the
//! caller learns about open failures synchronously.

use super::capture::{CaptureApi, CaptureHints, DeviceOpener, open_with_fallback};
use crate::backends::events::SessionEvents;
use crate::constants::timing;
use crate::errors::{BackendError, BackendResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Controller for a capture thread
pub struct CaptureWorker {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    /// Receives once when the thread has released the device
    done_rx: Receiver<()>,
    api: CaptureApi,
    name: String,
}

impl CaptureWorker {
    /// Spawn a capture thread for device `index`
    ///
    /// Blocks until the device is open (or the start timeout passes). On
    /// failure the thread has already emitted the error and `finished` on
    /// `events` and exited.
    pub fn spawn(
        opener: Arc<dyn DeviceOpener>,
        index: u32,
        hints: CaptureHints,
        events: Arc<SessionEvents>,
    ) -> BackendResult<Self> {
        Self::spawn_with_timeout(opener, index, hints, events, timing::WORKER_START_TIMEOUT)
    }

    pub(crate) fn spawn_with_timeout(
        opener: Arc<dyn DeviceOpener>,
        index: u32,
        hints: CaptureHints,
        events: Arc<SessionEvents>,
        start_timeout: Duration,
    ) -> BackendResult<Self> {
        let name = format!("capture-{}", index);
        let stop_signal = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop_signal);
        let (ready_tx, ready_rx) = mpsc::sync_channel::<BackendResult<CaptureApi>>(1);
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let thread_name = name.clone();

        info!(name = %name, "Starting capture worker");

        let thread_handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                debug!(name = %thread_name, "Capture thread started, opening device...");

                let mut source = match open_with_fallback(opener.as_ref(), index, &hints) {
                    Ok(source) => {
                        let _ = ready_tx.send(Ok(source.api()));
                        source
                    }
                    Err(e) => {
                        error!(name = %thread_name, error = %e, "Could not open capture device");
                        let _ = ready_tx.send(Err(e.clone()));
                        events.errors.emit(&e);
                        events.finished.emit(&());
                        let _ = done_tx.send(());
                        return;
                    }
                };

                let mut frames: u64 = 0;
                loop {
                    if thread_stop.load(Ordering::SeqCst) {
                        debug!(name = %thread_name, "Stop signal received");
                        break;
                    }

                    let result = source.read_frame();

                    // A stop requested during the read wins over its result
                    if thread_stop.load(Ordering::SeqCst) {
                        debug!(name = %thread_name, "Stop signal received after read");
                        break;
                    }

                    match result {
                        Ok(frame) => {
                            frames += 1;
                            if frames % timing::FRAME_LOG_INTERVAL == 0 {
                                debug!(name = %thread_name, frames, "Capture progress");
                            }
                            events.frames.emit(&frame);
                        }
                        Err(e) => {
                            let e = match e {
                                BackendError::FrameRead(_) => e,
                                other => BackendError::FrameRead(other.to_string()),
                            };
                            error!(name = %thread_name, error = %e, "Failed to read frame");
                            events.errors.emit(&e);
                            break;
                        }
                    }
                }

                // Release the device before announcing the end
                drop(source);
                info!(name = %thread_name, frames, "Capture thread exiting");
                events.finished.emit(&());
                let _ = done_tx.send(());
            })
            .map_err(|e| BackendError::Other(format!("Failed to spawn capture thread: {}", e)))?;

        let mut worker = Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            done_rx,
            api: CaptureApi::V4l2,
            name,
        };

        match ready_rx.recv_timeout(start_timeout) {
            Ok(Ok(api)) => {
                worker.api = api;
                Ok(worker)
            }
            Ok(Err(e)) => {
                worker.join();
                Err(e)
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(name = %worker.name, "Capture device did not open in time");
                worker.request_stop();
                worker.detach();
                Err(BackendError::DeviceOpen(format!(
                    "camera {} did not open within {:?}",
                    index, start_timeout
                )))
            }
            Err(RecvTimeoutError::Disconnected) => {
                worker.join();
                Err(BackendError::DeviceOpen(format!(
                    "camera {}: capture thread exited during open",
                    index
                )))
            }
        }
    }

    /// API the device was opened with
    pub fn api(&self) -> CaptureApi {
        self.api
    }

    /// Check if the thread is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop to stop (non-blocking)
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting capture worker stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop the loop, waiting a bounded time for the thread to finish
    ///
    /// Returns `false` when the thread was still blocked in a read after the
    /// wait; it is then detached and exits on its own.
    pub fn stop(&mut self) -> bool {
        self.stop_with_timeout(timing::WORKER_STOP_TIMEOUT)
    }

    pub(crate) fn stop_with_timeout(&mut self, timeout: Duration) -> bool {
        if self.thread_handle.is_none() {
            return true;
        }
        self.request_stop();

        match self.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                self.join();
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(name = %self.name, ?timeout, "Capture worker did not stop in time, detaching");
                self.detach();
                false
            }
        }
    }

    fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            debug!(name = %self.name, "Waiting for capture thread to finish");
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Capture thread panicked: {:?}", e);
            }
        }
    }

    fn detach(&mut self) {
        self.thread_handle.take();
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "CaptureWorker dropped, stopping loop");
            self.stop();
        }
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! In-process fakes for backend integration tests

#![allow(dead_code)]

use camrec::backends::Frame;
use camrec::backends::dev::capture::{CaptureApi, CaptureHints, DeviceOpener, FrameSource};
use camrec::backends::dev::encoder::{EncoderCandidate, EncoderFactory, FrameWriter};
use camrec::backends::embedded::pipeline::{
    BusMessage, ManagedPipeline, PipelineBus, PipelineLauncher,
};
use camrec::errors::{BackendError, BackendResult};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Poll `cond` until it holds or `timeout` passes
pub fn wait_until<F: Fn() -> bool>(timeout: Duration, cond: F) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

// ---------------------------------------------------------------------------
// Capture

#[derive(Default)]
pub struct CameraStats {
    pub opens: AtomicUsize,
    pub reads: AtomicUsize,
    pub released: AtomicUsize,
    pub apis: Mutex<Vec<CaptureApi>>,
}

/// Camera producing solid frames every few milliseconds
pub struct FakeCamera {
    pub width: u32,
    pub height: u32,
    pub frame_interval: Duration,
    /// APIs that refuse to open the device
    pub failing_apis: Vec<CaptureApi>,
    /// Read failure after this many frames
    pub fail_after: Option<usize>,
    pub stats: Arc<CameraStats>,
}

impl FakeCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame_interval: Duration::from_millis(5),
            failing_apis: Vec::new(),
            fail_after: None,
            stats: Arc::new(CameraStats::default()),
        }
    }
}

struct FakeSource {
    api: CaptureApi,
    width: u32,
    height: u32,
    interval: Duration,
    remaining: Option<usize>,
    stats: Arc<CameraStats>,
}

impl FrameSource for FakeSource {
    fn read_frame(&mut self) -> BackendResult<Frame> {
        thread::sleep(self.interval);
        self.stats.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Err(BackendError::FrameRead("device unplugged".to_string()));
            }
            *remaining -= 1;
        }
        Ok(Frame::solid(self.width, self.height, [10, 20, 30]))
    }

    fn api(&self) -> CaptureApi {
        self.api
    }
}

impl Drop for FakeSource {
    fn drop(&mut self) {
        self.stats.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl DeviceOpener for FakeCamera {
    fn open(
        &self,
        api: CaptureApi,
        index: u32,
        _hints: &CaptureHints,
    ) -> BackendResult<Box<dyn FrameSource>> {
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        self.stats.apis.lock().unwrap().push(api);
        if self.failing_apis.contains(&api) {
            return Err(BackendError::DeviceOpen(format!(
                "{} cannot open camera {}",
                api, index
            )));
        }
        Ok(Box::new(FakeSource {
            api,
            width: self.width,
            height: self.height,
            interval: self.frame_interval,
            remaining: self.fail_after,
            stats: Arc::clone(&self.stats),
        }))
    }
}

// ---------------------------------------------------------------------------
// Encoders

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedEncoder {
    pub candidate: &'static str,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

#[derive(Default)]
pub struct EncoderStats {
    pub attempts: Mutex<Vec<&'static str>>,
    pub opened: Mutex<Vec<OpenedEncoder>>,
    pub frames_written: AtomicUsize,
    pub write_errors: AtomicUsize,
    pub closed: AtomicUsize,
}

/// Encoder factory where chosen candidates always fail
#[derive(Default)]
pub struct FakeEncoders {
    pub failing: Vec<&'static str>,
    /// Opened writers reject every frame
    pub fail_writes: bool,
    /// Opened writers fail to finalize
    pub fail_close: bool,
    pub stats: Arc<EncoderStats>,
}

impl FakeEncoders {
    pub fn failing(names: &[&'static str]) -> Self {
        Self {
            failing: names.to_vec(),
            ..Self::default()
        }
    }
}

struct FakeWriter {
    fail_writes: bool,
    fail_close: bool,
    stats: Arc<EncoderStats>,
}

impl FrameWriter for FakeWriter {
    fn write(&mut self, _frame: &Frame) -> BackendResult<()> {
        if self.fail_writes {
            self.stats.write_errors.fetch_add(1, Ordering::SeqCst);
            return Err(BackendError::Other("push refused".to_string()));
        }
        self.stats.frames_written.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(self: Box<Self>) -> BackendResult<()> {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(BackendError::Other("muxer failed to finalize".to_string()));
        }
        Ok(())
    }
}

impl EncoderFactory for FakeEncoders {
    fn open(
        &self,
        candidate: &EncoderCandidate,
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
    ) -> BackendResult<Box<dyn FrameWriter>> {
        self.stats.attempts.lock().unwrap().push(candidate.name);
        if self.failing.contains(&candidate.name) {
            return Err(BackendError::Other(format!("{} unavailable", candidate.name)));
        }
        self.stats.opened.lock().unwrap().push(OpenedEncoder {
            candidate: candidate.name,
            path: path.to_path_buf(),
            width,
            height,
            fps,
        });
        Ok(Box::new(FakeWriter {
            fail_writes: self.fail_writes,
            fail_close: self.fail_close,
            stats: Arc::clone(&self.stats),
        }))
    }
}

// ---------------------------------------------------------------------------
// Pipelines

/// What the fake framework does with launched pipelines
#[derive(Default)]
pub struct PipelineScript {
    /// Launch lines that fail to parse when they contain this text
    pub parse_fails_on: Mutex<Option<String>>,
    /// Launch lines that fail to reach PLAYING when they contain this text
    pub play_fails_on: Mutex<Option<String>>,
    /// Whether pipelines answer end-of-stream on their bus
    pub ignore_eos: AtomicBool,
    pub launched: Mutex<Vec<String>>,
    pub shutdowns: AtomicUsize,
    pub eos_sent: AtomicUsize,
    /// Bus of the most recently launched pipeline
    pub current_bus: Mutex<Option<Arc<Mutex<VecDeque<BusMessage>>>>>,
}

impl PipelineScript {
    /// Inject a bus message into the running pipeline
    pub fn post(&self, message: BusMessage) {
        if let Some(bus) = self.current_bus.lock().unwrap().as_ref() {
            bus.lock().unwrap().push_back(message);
        }
    }

    pub fn launched(&self) -> Vec<String> {
        self.launched.lock().unwrap().clone()
    }

    pub fn last_launched(&self) -> Option<String> {
        self.launched.lock().unwrap().last().cloned()
    }
}

pub struct FakeLauncher {
    pub script: Arc<PipelineScript>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self {
            script: Arc::new(PipelineScript::default()),
        }
    }
}

struct FakePipeline {
    description: String,
    script: Arc<PipelineScript>,
    bus: Arc<Mutex<VecDeque<BusMessage>>>,
}

struct FakeBus {
    queue: Arc<Mutex<VecDeque<BusMessage>>>,
}

impl PipelineBus for FakeBus {
    fn next_message(&self, timeout: Duration) -> Option<BusMessage> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(msg) = self.queue.lock().unwrap().pop_front() {
                return Some(msg);
            }
            if Instant::now() >= deadline {
                return None;
            }
            thread::sleep(Duration::from_millis(2));
        }
    }
}

impl ManagedPipeline for FakePipeline {
    fn play(&self) -> BackendResult<()> {
        let fails = self.script.play_fails_on.lock().unwrap().clone();
        match fails {
            Some(text) if self.description.contains(&text) => Err(BackendError::PipelineState(
                "element refused to start".to_string(),
            )),
            _ => Ok(()),
        }
    }

    fn send_eos(&self) -> bool {
        self.script.eos_sent.fetch_add(1, Ordering::SeqCst);
        if !self.script.ignore_eos.load(Ordering::SeqCst) {
            self.bus.lock().unwrap().push_back(BusMessage::Eos);
        }
        true
    }

    fn bus(&self) -> Option<Box<dyn PipelineBus>> {
        Some(Box::new(FakeBus {
            queue: Arc::clone(&self.bus),
        }))
    }

    fn shutdown(&self) {
        self.script.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

impl PipelineLauncher for FakeLauncher {
    fn launch(&self, description: &str) -> BackendResult<Box<dyn ManagedPipeline>> {
        let fails = self.script.parse_fails_on.lock().unwrap().clone();
        if let Some(text) = fails {
            if description.contains(&text) {
                return Err(BackendError::PipelineParse(format!(
                    "no element \"{}\"",
                    text
                )));
            }
        }

        self.script
            .launched
            .lock()
            .unwrap()
            .push(description.to_string());
        let bus = Arc::new(Mutex::new(VecDeque::new()));
        *self.script.current_bus.lock().unwrap() = Some(Arc::clone(&bus));
        Ok(Box::new(FakePipeline {
            description: description.to_string(),
            script: Arc::clone(&self.script),
            bus,
        }))
    }
}

/// Collects errors delivered through a callback
#[derive(Default, Clone)]
pub struct ErrorLog {
    pub errors: Arc<Mutex<Vec<BackendError>>>,
}

impl ErrorLog {
    pub fn callback(&self) -> camrec::backends::ErrorCallback {
        let errors = Arc::clone(&self.errors);
        Arc::new(move |err: &BackendError| errors.lock().unwrap().push(err.clone()))
    }

    pub fn snapshot(&self) -> Vec<BackendError> {
        self.errors.lock().unwrap().clone()
    }
}

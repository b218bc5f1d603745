// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline handles for the embedded backend
//!
//! The backend only needs a handful of pipeline operations: parse and start a
//! launch line, send end-of-stream, read the bus and shut down. They sit
//! behind small traits so the backend state machine runs the same against
//! GStreamer and against in-process fakes.

use crate::constants::timing;
use crate::errors::{BackendError, BackendResult};
use gstreamer as gst;
use gstreamer::prelude::*;
use std::time::Duration;
use tracing::{debug, warn};

/// Bus message as seen by the monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusMessage {
    Error {
        message: String,
        debug: Option<String>,
    },
    Warning {
        message: String,
        debug: Option<String>,
    },
    Eos,
    /// Anything the monitor does not act on
    Other,
}

/// Blocking bus reader
pub trait PipelineBus: Send {
    /// Next message, or `None` when `timeout` passes without one
    fn next_message(&self, timeout: Duration) -> Option<BusMessage>;
}

/// A parsed pipeline
pub trait ManagedPipeline: Send {
    /// Move to PLAYING, waiting for the state change to settle
    fn play(&self) -> BackendResult<()>;

    /// Send end-of-stream; `false` if the event was not handled
    fn send_eos(&self) -> bool;

    fn bus(&self) -> Option<Box<dyn PipelineBus>>;

    /// Move to NULL, releasing every resource
    fn shutdown(&self);
}

/// Creates pipelines from launch lines
pub trait PipelineLauncher: Send + Sync {
    fn launch(&self, description: &str) -> BackendResult<Box<dyn ManagedPipeline>>;
}

/// Launcher backed by `gst::parse::launch`
#[derive(Debug, Default, Clone, Copy)]
pub struct GstLauncher;

impl PipelineLauncher for GstLauncher {
    fn launch(&self, description: &str) -> BackendResult<Box<dyn ManagedPipeline>> {
        debug!(description = %description, "Parsing pipeline");
        let pipeline = gst::parse::launch(description)
            .map_err(|e| BackendError::PipelineParse(e.to_string()))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| BackendError::PipelineParse("Not a pipeline".to_string()))?;
        Ok(Box::new(GstPipeline { pipeline }))
    }
}

struct GstPipeline {
    pipeline: gst::Pipeline,
}

impl ManagedPipeline for GstPipeline {
    fn play(&self) -> BackendResult<()> {
        self.pipeline.set_state(gst::State::Playing)?;

        let (result, state, _) = self
            .pipeline
            .state(gst::ClockTime::from_seconds(timing::START_TIMEOUT_SECS));
        result.map_err(|_| {
            BackendError::PipelineState(format!("Pipeline did not reach PLAYING (at {:?})", state))
        })?;
        Ok(())
    }

    fn send_eos(&self) -> bool {
        self.pipeline.send_event(gst::event::Eos::new())
    }

    fn bus(&self) -> Option<Box<dyn PipelineBus>> {
        self.pipeline
            .bus()
            .map(|bus| Box::new(GstBus { bus }) as Box<dyn PipelineBus>)
    }

    fn shutdown(&self) {
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!(error = %e, "Failed to set pipeline to NULL");
        }
    }
}

impl Drop for GstPipeline {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

struct GstBus {
    bus: gst::Bus,
}

impl PipelineBus for GstBus {
    fn next_message(&self, timeout: Duration) -> Option<BusMessage> {
        let msg = self.bus.timed_pop_filtered(
            gst::ClockTime::from_mseconds(timeout.as_millis() as u64),
            &[
                gst::MessageType::Error,
                gst::MessageType::Warning,
                gst::MessageType::Eos,
            ],
        )?;

        Some(match msg.view() {
            gst::MessageView::Error(err) => BusMessage::Error {
                message: err.error().to_string(),
                debug: err.debug().map(|d| d.to_string()),
            },
            gst::MessageView::Warning(w) => BusMessage::Warning {
                message: w.error().to_string(),
                debug: w.debug().map(|d| d.to_string()),
            },
            gst::MessageView::Eos(_) => BusMessage::Eos,
            _ => BusMessage::Other,
        })
    }
}

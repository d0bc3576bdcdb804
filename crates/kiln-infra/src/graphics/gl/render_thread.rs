// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A dedicated thread owning the backend.
//!
//! Worker threads record; only the render thread touches the device, the
//! state tracker and the pools. Frames are flushed in submission order and
//! each frame's buffers in the order given.

use super::api::GlApi;
use super::backend::GlBackend;
use crossbeam_channel::{Receiver, Sender};
use kiln_core::renderer::command::CommandValidator;
use kiln_core::renderer::{FrameStats, RenderBackend, RenderError, ScopedCommandBuffer};
use std::thread;

enum Request {
    Frame(Vec<ScopedCommandBuffer>),
    Shutdown,
}

/// Handle to the render thread.
pub struct RenderThread<A: GlApi + Send + 'static> {
    requests: Sender<Request>,
    reports: Receiver<FrameStats>,
    handle: Option<thread::JoinHandle<GlBackend<A>>>,
}

impl<A: GlApi + Send + 'static> std::fmt::Debug for RenderThread<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderThread")
            .field("running", &self.handle.is_some())
            .field("pending_frames", &self.requests.len())
            .finish()
    }
}

impl<A: GlApi + Send + 'static> RenderThread<A> {
    /// Moves `backend` onto a new render thread.
    ///
    /// # Errors
    ///
    /// Fails if the operating system cannot spawn the thread.
    pub fn spawn(backend: GlBackend<A>) -> std::io::Result<Self> {
        let (requests, request_rx) = crossbeam_channel::unbounded();
        let (report_tx, reports) = crossbeam_channel::unbounded();
        let handle = thread::Builder::new()
            .name("kiln-render".into())
            .spawn(move || run(backend, request_rx, report_tx))?;
        Ok(Self {
            requests,
            reports,
            handle: Some(handle),
        })
    }

    /// Queues one frame. Buffers are flushed in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::RenderThreadDisconnected`] if the thread has exited.
    pub fn submit_frame(&self, buffers: Vec<ScopedCommandBuffer>) -> Result<(), RenderError> {
        self.requests
            .send(Request::Frame(buffers))
            .map_err(|_| RenderError::RenderThreadDisconnected)
    }

    /// Blocks until the oldest submitted frame has been flushed.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::RenderThreadDisconnected`] if the thread has exited,
    /// for example after a failed assertion while flushing.
    pub fn wait_frame(&self) -> Result<FrameStats, RenderError> {
        self.reports
            .recv()
            .map_err(|_| RenderError::RenderThreadDisconnected)
    }

    /// Stops the thread after the queued frames and hands the backend back.
    ///
    /// A panic on the render thread resumes on the caller.
    pub fn shutdown(mut self) -> GlBackend<A> {
        let _ = self.requests.send(Request::Shutdown);
        let Some(handle) = self.handle.take() else {
            unreachable!("the join handle is only taken here and in drop");
        };
        match handle.join() {
            Ok(backend) => backend,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }
}

impl<A: GlApi + Send + 'static> Drop for RenderThread<A> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.requests.send(Request::Shutdown);
            if handle.join().is_err() {
                log::error!("render thread panicked");
            }
        }
    }
}

fn run<A: GlApi>(
    mut backend: GlBackend<A>,
    requests: Receiver<Request>,
    reports: Sender<FrameStats>,
) -> GlBackend<A> {
    log::debug!("render thread started");
    for request in requests.iter() {
        let buffers = match request {
            Request::Frame(buffers) => buffers,
            Request::Shutdown => break,
        };

        backend.begin_frame();
        let mut validator = backend
            .settings()
            .validate_command_buffers
            .then(CommandValidator::new);
        for (index, mut buffer) in buffers.into_iter().enumerate() {
            if backend.settings().batch_command_buffers {
                let report = buffer.batch();
                backend.record_batch(report);
            }
            if let Some(validator) = validator.as_mut() {
                if let Err(err) = validator.check(buffer.iter()) {
                    panic!("invalid command buffer {index}: {err}");
                }
            }
            backend.flush_command_buffer(&buffer);
        }
        if let Some(Err(err)) = validator.as_ref().map(CommandValidator::finish) {
            panic!("invalid frame: {err}");
        }
        let stats = backend.end_frame();
        if reports.send(stats).is_err() {
            log::debug!("frame report dropped: no receiver");
        }
    }
    backend.shutdown();
    log::debug!("render thread stopped");
    backend
}

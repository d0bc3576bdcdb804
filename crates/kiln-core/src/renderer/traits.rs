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

//! Contracts between the execution core and its collaborators.

use super::command::{CommandBuffer, TextElementBatch};
use super::stats::FrameStats;

/// A backend that consumes recorded command buffers.
///
/// Buffers flushed between [`begin_frame`](Self::begin_frame) and
/// [`end_frame`](Self::end_frame) execute serially, in flush order, and each
/// buffer executes in its recorded order.
pub trait RenderBackend {
    /// Starts a frame. May block until the GPU retires the oldest frame in flight.
    fn begin_frame(&mut self);

    /// Executes every command of `buffer`.
    ///
    /// Commands whose resources are not ready are skipped and logged; broken
    /// command sequences panic.
    fn flush_command_buffer(&mut self, buffer: &CommandBuffer);

    /// Finishes the frame, reclaims expired resources and returns its statistics.
    fn end_frame(&mut self) -> FrameStats;

    /// Statistics of the frame being recorded.
    fn frame_stats(&self) -> &FrameStats;
}

/// Renders batches of text. Invoked for `DrawTextCommand`.
///
/// Implementations must leave backend binding state as they found it.
pub trait TextRenderer: Send {
    /// Draws `batch` into the bound render target.
    fn draw_text(&mut self, batch: &TextElementBatch);
}

/// Renders an immediate-mode UI context. Invoked for `DrawImguiCommand`.
///
/// Implementations must leave backend binding state as they found it.
pub trait ImguiRenderer: Send {
    /// Draws the context identified by `context_id`.
    fn render(&mut self, context_id: u64);
}

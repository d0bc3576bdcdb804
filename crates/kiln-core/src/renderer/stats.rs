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

//! Per-frame statistics reported by the backend.

/// The result of one GPU query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryResult {
    /// The tag of the `BeginGpuQuery` command, or `u32::MAX` for per-draw queries.
    pub tag: u32,
    /// The query kind, one bit of `QueryMask`.
    pub kind: u8,
    /// The value: samples, primitives or nanoseconds.
    pub value: u64,
}

/// Counters gathered while dispatching one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// The frame these counters belong to.
    pub frame_index: u64,
    /// Command buffers flushed.
    pub command_buffers: u32,
    /// Commands dispatched.
    pub commands_flushed: u32,
    /// Commands skipped by the fail-soft paths.
    pub commands_skipped: u32,
    /// Commands folded into a neighbour by batching.
    pub commands_merged: u32,
    /// No-op and redundant commands dropped by batching.
    pub commands_removed: u32,
    /// Draw calls issued to the backend.
    pub draw_calls: u32,
    /// Compute dispatches issued.
    pub compute_dispatches: u32,
    /// State changes issued by the state tracker.
    pub state_changes: u32,
    /// State changes the tracker elided as redundant.
    pub state_changes_elided: u32,
    /// Fences created for buffer locks.
    pub fences_created: u32,
    /// Blocking fence waits.
    pub fence_waits: u32,
    /// Texture views created or recycled.
    pub views_created: u32,
    /// Samplers, VAOs and texture handles evicted at frame end.
    pub residency_evictions: u32,
    /// Query results gathered this frame.
    pub query_results: Vec<QueryResult>,
}

impl FrameStats {
    /// Creates zeroed counters for `frame_index`.
    pub fn new(frame_index: u64) -> Self {
        Self {
            frame_index,
            ..Default::default()
        }
    }
}

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

//! Draw parameters carried by `DrawCommandsCommand`.

use super::handles::BufferId;
use super::state::PrimitiveTopology;
use bitflags::bitflags;

bitflags! {
    /// Per-draw submission options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RenderOptions: u8 {
        /// Submit the draw with the pipeline's fill mode.
        const RENDER_GEOMETRY = 1 << 0;
        /// Submit the draw a second time as wireframe.
        const RENDER_WIREFRAME = 1 << 1;
        /// Discard primitives before rasterization (transform feedback, queries).
        const NO_RASTERIZATION = 1 << 2;
        /// Count generated primitives with a GPU query around the draw.
        const QUERY_PRIMITIVE_COUNT = 1 << 3;
        /// Count passed samples with a GPU query around the draw.
        const QUERY_SAMPLE_COUNT = 1 << 4;
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::RENDER_GEOMETRY
    }
}

/// Draw parameters, laid out exactly like the backend's indirect command record.
///
/// For non-indexed geometry `first_index` is the first vertex and
/// `index_count` the vertex count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct IndirectDrawCommand {
    /// Number of indices (or vertices) per instance.
    pub index_count: u32,
    /// Number of instances.
    pub instance_count: u32,
    /// Offset of the first index.
    pub first_index: u32,
    /// Value added to each index before fetching vertices.
    pub base_vertex: i32,
    /// First instance ID.
    pub base_instance: u32,
}

impl Default for IndirectDrawCommand {
    fn default() -> Self {
        Self {
            index_count: 0,
            instance_count: 1,
            first_index: 0,
            base_vertex: 0,
            base_instance: 0,
        }
    }
}

impl IndirectDrawCommand {
    /// Size of one record in an indirect buffer.
    pub const STRIDE: usize = std::mem::size_of::<Self>();
}

/// One draw submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenericDrawCommand {
    /// Draw parameters. Shared by all `draw_count` draws of a multi-draw.
    pub cmd: IndirectDrawCommand,
    /// The geometry source. [`BufferId::NONE`] draws screen-space geometry.
    pub source_buffer: BufferId,
    /// Record offset into the source's indirect buffer, if it has one.
    pub command_offset: u32,
    /// Number of consecutive indirect records to submit.
    pub draw_count: u16,
    /// Primitive assembly for this draw.
    pub topology: PrimitiveTopology,
    /// Submission options.
    pub render_options: RenderOptions,
}

impl Default for GenericDrawCommand {
    fn default() -> Self {
        Self {
            cmd: IndirectDrawCommand::default(),
            source_buffer: BufferId::NONE,
            command_offset: 0,
            draw_count: 1,
            topology: PrimitiveTopology::Triangles,
            render_options: RenderOptions::RENDER_GEOMETRY,
        }
    }
}

impl GenericDrawCommand {
    /// A single indexed draw of `index_count` indices from `source`.
    pub fn indexed(source: BufferId, first_index: u32, index_count: u32) -> Self {
        Self {
            cmd: IndirectDrawCommand {
                index_count,
                first_index,
                ..Default::default()
            },
            source_buffer: source,
            ..Default::default()
        }
    }

    /// A fullscreen-style draw without geometry.
    pub fn screen_space(vertex_count: u32) -> Self {
        Self {
            cmd: IndirectDrawCommand {
                index_count: vertex_count,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Returns `true` if the draw renders more than one instance.
    pub fn is_instanced(&self) -> bool {
        self.cmd.instance_count > 1
    }

    /// Returns `true` if submitting this draw has no effect.
    pub fn is_noop(&self) -> bool {
        self.draw_count == 0
            || self.cmd.instance_count == 0
            || self.cmd.index_count == 0
            || !self
                .render_options
                .intersects(RenderOptions::RENDER_GEOMETRY | RenderOptions::RENDER_WIREFRAME)
    }

    /// Returns `true` if the draw combines multi-draw with instancing.
    pub fn is_invalid_multi_draw(&self) -> bool {
        self.draw_count > 1 && self.is_instanced()
    }

    fn shares_submission_state(&self, other: &Self) -> bool {
        let queried = RenderOptions::QUERY_PRIMITIVE_COUNT | RenderOptions::QUERY_SAMPLE_COUNT;
        // Each queried draw reports its own result.
        !self.render_options.intersects(queried)
            && self.source_buffer == other.source_buffer
            && self.topology == other.topology
            && self.render_options == other.render_options
            && self.draw_count == 1
            && other.draw_count == 1
    }

    /// Folds `other` into `self` if the two submit as one draw.
    ///
    /// Two draws merge when their index ranges are contiguous with identical
    /// instancing, or when they draw the same range for contiguous instance
    /// ranges. Returns `false`, leaving `self` untouched, otherwise.
    pub fn try_merge(&mut self, other: &Self) -> bool {
        if !self.shares_submission_state(other) {
            return false;
        }

        let (a, b) = (&mut self.cmd, &other.cmd);
        if a.base_vertex != b.base_vertex {
            return false;
        }

        let ranges_contiguous = a.instance_count == b.instance_count
            && a.base_instance == b.base_instance
            && a.first_index.checked_add(a.index_count) == Some(b.first_index);
        if ranges_contiguous {
            let Some(index_count) = a.index_count.checked_add(b.index_count) else {
                return false;
            };
            a.index_count = index_count;
            return true;
        }

        let instances_contiguous = a.first_index == b.first_index
            && a.index_count == b.index_count
            && a.base_instance.checked_add(a.instance_count) == Some(b.base_instance);
        if instances_contiguous {
            let Some(instance_count) = a.instance_count.checked_add(b.instance_count) else {
                return false;
            };
            a.instance_count = instance_count;
            return true;
        }

        false
    }
}

/// Merges adjacent draws of `draws` in place. Returns the number of merges.
pub fn compact_draws(draws: &mut Vec<GenericDrawCommand>) -> usize {
    let before = draws.len();
    draws.dedup_by(|next, prev| prev.try_merge(next));
    before - draws.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_index_ranges_merge() {
        let mut a = GenericDrawCommand::indexed(BufferId(4), 0, 100);
        let b = GenericDrawCommand::indexed(BufferId(4), 100, 50);
        assert!(a.try_merge(&b));
        assert_eq!(a.cmd.first_index, 0);
        assert_eq!(a.cmd.index_count, 150);
    }

    #[test]
    fn test_disjoint_ranges_do_not_merge() {
        let mut a = GenericDrawCommand::indexed(BufferId(4), 0, 100);
        let b = GenericDrawCommand::indexed(BufferId(4), 500, 50);
        assert!(!a.try_merge(&b));
        assert_eq!(a.cmd.index_count, 100);
    }

    #[test]
    fn test_instance_ranges_merge() {
        let mut a = GenericDrawCommand::indexed(BufferId(1), 0, 36);
        a.cmd.instance_count = 4;
        let mut b = a;
        b.cmd.base_instance = 4;
        b.cmd.instance_count = 2;
        assert!(a.try_merge(&b));
        assert_eq!(a.cmd.instance_count, 6);
        assert_eq!(a.cmd.index_count, 36);
    }

    #[test]
    fn test_different_sources_never_merge() {
        let mut a = GenericDrawCommand::indexed(BufferId(1), 0, 10);
        let b = GenericDrawCommand::indexed(BufferId(2), 10, 10);
        assert!(!a.try_merge(&b));
    }

    #[test]
    fn test_multi_draws_are_left_alone() {
        let mut a = GenericDrawCommand::indexed(BufferId(1), 0, 10);
        a.draw_count = 3;
        let b = GenericDrawCommand::indexed(BufferId(1), 10, 10);
        assert!(!a.try_merge(&b));
    }

    #[test]
    fn test_merge_refuses_to_overflow_counts() {
        let mut a = GenericDrawCommand::indexed(BufferId(1), 0, 1 << 31);
        let b = GenericDrawCommand::indexed(BufferId(1), 1 << 31, 1 << 31);
        assert!(!a.try_merge(&b));
        assert_eq!(a.cmd.index_count, 1 << 31);

        let mut a = GenericDrawCommand::indexed(BufferId(1), 0, 36);
        a.cmd.instance_count = u32::MAX;
        let mut b = a;
        b.cmd.base_instance = u32::MAX;
        b.cmd.instance_count = 2;
        assert!(!a.try_merge(&b));
        assert_eq!(a.cmd.instance_count, u32::MAX);
    }

    #[test]
    fn test_queried_draws_keep_their_own_query() {
        let options = RenderOptions::RENDER_GEOMETRY | RenderOptions::QUERY_SAMPLE_COUNT;
        let mut a = GenericDrawCommand::indexed(BufferId(1), 0, 10);
        a.render_options = options;
        let mut b = GenericDrawCommand::indexed(BufferId(1), 10, 10);
        b.render_options = options;
        assert!(!a.try_merge(&b));

        let mut draws = vec![a, b];
        assert_eq!(compact_draws(&mut draws), 0);
        assert_eq!(draws.len(), 2);
    }

    #[test]
    fn test_compact_draws_keeps_order() {
        let mut draws = vec![
            GenericDrawCommand::indexed(BufferId(1), 0, 10),
            GenericDrawCommand::indexed(BufferId(1), 10, 10),
            GenericDrawCommand::indexed(BufferId(1), 50, 10),
            GenericDrawCommand::indexed(BufferId(1), 60, 5),
        ];
        assert_eq!(compact_draws(&mut draws), 2);
        assert_eq!(draws.len(), 2);
        assert_eq!((draws[0].cmd.first_index, draws[0].cmd.index_count), (0, 20));
        assert_eq!((draws[1].cmd.first_index, draws[1].cmd.index_count), (50, 15));
    }

    #[test]
    fn test_noop_detection() {
        let mut draw = GenericDrawCommand::screen_space(3);
        assert!(!draw.is_noop());
        draw.cmd.instance_count = 0;
        assert!(draw.is_noop());
        let mut hidden = GenericDrawCommand::screen_space(3);
        hidden.render_options = RenderOptions::QUERY_SAMPLE_COUNT;
        assert!(hidden.is_noop());
    }
}

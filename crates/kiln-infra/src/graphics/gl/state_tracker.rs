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

//! Mirrors the device's binding and fixed-function state.
//!
//! Every bind the dispatcher performs goes through [`GlStateTracker`]. A call
//! that would not change the mirrored state returns
//! [`BindResult::AlreadyBound`] and issues no device call. Bypassing the
//! tracker desynchronizes the mirror for the rest of the frame.

use super::api::{Capability, FramebufferTarget, GlApi, ProgramStatus};
use ahash::AHashMap;
use kiln_core::math::Rect;
use kiln_core::renderer::command::{ClipPlaneState, ImageAccess};
use kiln_core::renderer::resources::{BufferRange, BufferTarget, TextureTarget};
use kiln_core::renderer::state::{BlendState, CullMode, PolygonMode, RenderStateBlock};
use kiln_core::renderer::{
    BufferId, DeviceLimits, FramebufferId, RenderTargetId, SamplerObject, ShaderPipelineId,
    ShaderProgramId, StateBlockHash, TextureId, VaoId,
};

/// Outcome of a tracked state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindResult {
    /// The state differed and the device call was issued.
    JustBound,
    /// The state already matched; nothing was issued.
    AlreadyBound,
    /// The change was refused (unknown state block, program not ready).
    Failed,
}

impl BindResult {
    /// Returns `true` unless the change failed.
    pub fn is_ok(self) -> bool {
        self != Self::Failed
    }
}

/// One texture unit binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureBinding {
    /// The texture target.
    pub target: TextureTarget,
    /// The texture name.
    pub texture: TextureId,
    /// The sampler object bound to the same unit.
    pub sampler: SamplerObject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ImageBinding {
    texture: TextureId,
    level: u16,
    layer: Option<u16>,
    access: ImageAccess,
}

/// Debug scope currently pushed on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugScope {
    /// Scope name.
    pub name: String,
    /// Scope id.
    pub id: u32,
}

/// The per-context state mirror.
#[derive(Debug)]
pub struct GlStateTracker {
    limits: DeviceLimits,
    gap_threshold: u32,

    vao: Option<VaoId>,
    buffers: AHashMap<BufferTarget, BufferId>,
    buffer_ranges: AHashMap<(BufferTarget, u32), (BufferId, BufferRange)>,
    read_framebuffer: Option<FramebufferId>,
    draw_framebuffer: Option<FramebufferId>,
    program: Option<ShaderProgramId>,
    pipeline: Option<ShaderPipelineId>,
    textures: Vec<Option<TextureBinding>>,
    images: Vec<Option<ImageBinding>>,

    state_blocks: AHashMap<StateBlockHash, RenderStateBlock>,
    active_state_block: Option<StateBlockHash>,
    applied_state: Option<RenderStateBlock>,
    requested_depth_write: bool,
    depth_writes_masked: bool,
    blending: Vec<Option<BlendState>>,
    viewport: Option<Rect>,
    scissor: Option<Rect>,
    primitive_restart: Option<bool>,
    rasterization: Option<bool>,
    depth_range: Option<(f32, f32)>,
    clip_planes: Option<ClipPlaneState>,

    debug_scopes: Vec<DebugScope>,
    active_render_target: Option<RenderTargetId>,

    issued: u32,
    elided: u32,
}

impl GlStateTracker {
    /// Creates a tracker with nothing known about the device state.
    ///
    /// `gap_threshold` is the number of unchanged units a multi-texture bind
    /// may span before falling back to per-unit binds.
    pub fn new(limits: DeviceLimits, gap_threshold: u32) -> Self {
        Self {
            limits,
            gap_threshold,
            vao: None,
            buffers: AHashMap::new(),
            buffer_ranges: AHashMap::new(),
            read_framebuffer: None,
            draw_framebuffer: None,
            program: None,
            pipeline: None,
            textures: vec![None; limits.max_texture_units as usize],
            images: vec![None; limits.max_image_units as usize],
            state_blocks: AHashMap::new(),
            active_state_block: None,
            applied_state: None,
            requested_depth_write: true,
            depth_writes_masked: false,
            blending: vec![None; limits.max_color_attachments as usize],
            viewport: None,
            scissor: None,
            primitive_restart: None,
            rasterization: None,
            depth_range: None,
            clip_planes: None,
            debug_scopes: Vec::new(),
            active_render_target: None,
            issued: 0,
            elided: 0,
        }
    }

    /// The limits the tracker asserts against.
    pub fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    fn tally(&mut self, changed: bool) -> BindResult {
        if changed {
            self.issued += 1;
            BindResult::JustBound
        } else {
            self.elided += 1;
            BindResult::AlreadyBound
        }
    }

    /// State changes issued and elided since the last [`take_counters`](Self::take_counters).
    pub fn counters(&self) -> (u32, u32) {
        (self.issued, self.elided)
    }

    /// Returns and resets the issued/elided counters.
    pub fn take_counters(&mut self) -> (u32, u32) {
        let counters = (self.issued, self.elided);
        self.issued = 0;
        self.elided = 0;
        counters
    }

    /// Puts the device into the default configuration and mirrors it.
    ///
    /// Called at the start of every frame and after a context switch.
    pub fn clear_states<A: GlApi>(&mut self, api: &mut A) {
        api.bind_vertex_array(VaoId(0));
        api.use_program(ShaderProgramId(0));
        api.bind_program_pipeline(ShaderPipelineId(0));
        api.bind_framebuffer(FramebufferTarget::Read, FramebufferId(0));
        api.bind_framebuffer(FramebufferTarget::Draw, FramebufferId(0));

        self.vao = Some(VaoId(0));
        self.program = Some(ShaderProgramId(0));
        self.pipeline = Some(ShaderPipelineId(0));
        self.read_framebuffer = Some(FramebufferId(0));
        self.draw_framebuffer = Some(FramebufferId(0));
        self.buffers.clear();
        self.buffer_ranges.clear();
        self.textures.iter_mut().for_each(|unit| *unit = None);
        self.images.iter_mut().for_each(|unit| *unit = None);

        self.active_state_block = None;
        self.applied_state = None;
        self.primitive_restart = None;
        self.rasterization = None;
        self.depth_writes_masked = false;
        self.apply_state_block(api, &RenderStateBlock::default());
        self.blending.iter_mut().for_each(|b| *b = None);
        for draw_buffer in 0..self.blending.len() as u32 {
            self.set_blending(api, draw_buffer, &BlendState::OPAQUE);
        }
        self.viewport = None;
        self.scissor = None;
        self.depth_range = None;
        self.set_depth_range(api, 0.0, 1.0);
        self.clip_planes = None;
        self.set_clipping_plane_state(api, &ClipPlaneState::default());

        while self.debug_scopes.pop().is_some() {
            api.pop_debug_group();
        }
        self.active_render_target = None;
    }

    // --- Object binds ---

    /// Binds a vertex array object.
    pub fn set_active_vao<A: GlApi>(&mut self, api: &mut A, vao: VaoId) -> BindResult {
        let changed = self.vao != Some(vao);
        if changed {
            api.bind_vertex_array(vao);
            self.vao = Some(vao);
            // The element array binding is VAO state.
            self.buffers.remove(&BufferTarget::Index);
        }
        self.tally(changed)
    }

    /// Binds a buffer to a non-indexed target.
    pub fn set_active_buffer<A: GlApi>(
        &mut self,
        api: &mut A,
        target: BufferTarget,
        buffer: BufferId,
    ) -> BindResult {
        let changed = self.buffers.get(&target) != Some(&buffer);
        if changed {
            api.bind_buffer(target, buffer);
            self.buffers.insert(target, buffer);
        }
        self.tally(changed)
    }

    /// Binds a range of a buffer to an indexed binding point.
    pub fn set_active_buffer_range<A: GlApi>(
        &mut self,
        api: &mut A,
        target: BufferTarget,
        index: u32,
        buffer: BufferId,
        range: BufferRange,
    ) -> BindResult {
        assert!(
            index < self.limits.max_buffer_bindings,
            "buffer binding {index} exceeds the device limit of {}",
            self.limits.max_buffer_bindings
        );
        let changed = self.buffer_ranges.get(&(target, index)) != Some(&(buffer, range));
        if changed {
            api.bind_buffer_range(target, index, buffer, range);
            self.buffer_ranges.insert((target, index), (buffer, range));
            // Indexed binds also replace the generic binding point.
            self.buffers.insert(target, buffer);
        }
        self.tally(changed)
    }

    /// Binds a framebuffer to the read or draw binding point.
    pub fn set_active_fb<A: GlApi>(
        &mut self,
        api: &mut A,
        target: FramebufferTarget,
        framebuffer: FramebufferId,
    ) -> BindResult {
        let slot = match target {
            FramebufferTarget::Read => &mut self.read_framebuffer,
            FramebufferTarget::Draw => &mut self.draw_framebuffer,
        };
        let changed = *slot != Some(framebuffer);
        if changed {
            api.bind_framebuffer(target, framebuffer);
            *slot = Some(framebuffer);
        }
        self.tally(changed)
    }

    /// Makes `program` current. Fails if the program is not linked yet or failed to build.
    pub fn set_active_program<A: GlApi>(
        &mut self,
        api: &mut A,
        program: ShaderProgramId,
    ) -> BindResult {
        if self.program == Some(program) {
            return self.tally(false);
        }
        if program.0 != 0 && api.program_status(program) != ProgramStatus::Ready {
            return BindResult::Failed;
        }
        api.use_program(program);
        self.program = Some(program);
        if program.0 != 0 {
            // A bound program takes precedence over any pipeline object.
            self.pipeline = None;
        }
        self.tally(true)
    }

    /// Binds a separable program pipeline.
    pub fn set_active_shader_pipeline<A: GlApi>(
        &mut self,
        api: &mut A,
        pipeline: ShaderPipelineId,
    ) -> BindResult {
        let changed = self.pipeline != Some(pipeline);
        if changed {
            api.bind_program_pipeline(pipeline);
            self.pipeline = Some(pipeline);
        }
        self.tally(changed)
    }

    /// The program currently in use.
    pub fn active_program(&self) -> Option<ShaderProgramId> {
        self.program.filter(|p| p.0 != 0)
    }

    // --- Textures and images ---

    fn assert_unit(&self, unit: u32) {
        assert!(
            unit < self.limits.max_texture_units,
            "texture unit {unit} exceeds the device limit of {}",
            self.limits.max_texture_units
        );
    }

    /// Binds a texture and its sampler to one unit.
    pub fn bind_texture<A: GlApi>(
        &mut self,
        api: &mut A,
        unit: u32,
        binding: TextureBinding,
    ) -> BindResult {
        self.assert_unit(unit);
        let previous = self.textures[unit as usize];
        let texture_changed =
            previous.map(|b| (b.target, b.texture)) != Some((binding.target, binding.texture));
        let sampler_changed = previous.map(|b| b.sampler) != Some(binding.sampler);
        if texture_changed {
            api.bind_texture_unit(unit, binding.target, binding.texture);
        }
        if sampler_changed {
            api.bind_sampler(unit, binding.sampler);
        }
        self.textures[unit as usize] = Some(binding);
        self.tally(texture_changed || sampler_changed)
    }

    /// Binds `bindings` to consecutive units starting at `first_unit`.
    ///
    /// Changed units close enough together are issued as one multi-bind
    /// call; if the unchanged units inside the changed span exceed the gap
    /// threshold, each changed unit is bound on its own.
    pub fn bind_textures<A: GlApi>(
        &mut self,
        api: &mut A,
        first_unit: u32,
        bindings: &[TextureBinding],
    ) -> BindResult {
        if bindings.is_empty() {
            return BindResult::AlreadyBound;
        }
        self.assert_unit(first_unit + bindings.len() as u32 - 1);

        let changed: Vec<usize> = bindings
            .iter()
            .enumerate()
            .filter(|(i, b)| self.textures[first_unit as usize + i] != Some(**b))
            .map(|(i, _)| i)
            .collect();
        let (Some(&lo), Some(&hi)) = (changed.first(), changed.last()) else {
            return self.tally(false);
        };

        let gaps = (hi - lo + 1 - changed.len()) as u32;
        if changed.len() > 1 && gaps <= self.gap_threshold {
            let span = &bindings[lo..=hi];
            let textures: Vec<TextureId> = span.iter().map(|b| b.texture).collect();
            let samplers: Vec<SamplerObject> = span.iter().map(|b| b.sampler).collect();
            api.bind_textures(first_unit + lo as u32, &textures);
            api.bind_samplers(first_unit + lo as u32, &samplers);
            for (i, binding) in span.iter().enumerate() {
                self.textures[first_unit as usize + lo + i] = Some(*binding);
            }
            self.issued += 1;
            self.elided += (bindings.len() - changed.len()) as u32;
            BindResult::JustBound
        } else {
            for i in changed {
                self.bind_texture(api, first_unit + i as u32, bindings[i]);
            }
            BindResult::JustBound
        }
    }

    /// The binding of a texture unit, if known.
    pub fn texture_binding(&self, unit: u32) -> Option<TextureBinding> {
        self.textures.get(unit as usize).copied().flatten()
    }

    /// Binds a texture level to an image unit.
    pub fn bind_image<A: GlApi>(
        &mut self,
        api: &mut A,
        unit: u32,
        texture: TextureId,
        level: u16,
        layer: Option<u16>,
        access: ImageAccess,
    ) -> BindResult {
        assert!(
            unit < self.limits.max_image_units,
            "image unit {unit} exceeds the device limit of {}",
            self.limits.max_image_units
        );
        let binding = ImageBinding {
            texture,
            level,
            layer,
            access,
        };
        let changed = self.images[unit as usize] != Some(binding);
        if changed {
            api.bind_image_texture(unit, texture, level, layer, access);
            self.images[unit as usize] = Some(binding);
        }
        self.tally(changed)
    }

    /// Drops every cached binding that refers to `texture`, e.g. before it is deleted.
    pub fn forget_texture(&mut self, texture: TextureId) {
        for unit in self.textures.iter_mut() {
            if unit.is_some_and(|b| b.texture == texture) {
                *unit = None;
            }
        }
        for unit in self.images.iter_mut() {
            if unit.is_some_and(|b| b.texture == texture) {
                *unit = None;
            }
        }
    }

    // --- Fixed function state ---

    /// Registers a state block so it can be applied by hash.
    pub fn register_state_block(&mut self, block: RenderStateBlock) -> StateBlockHash {
        let hash = block.hash_value();
        self.state_blocks.insert(hash, block);
        hash
    }

    /// Applies a registered state block. Fails if `hash` was never registered.
    pub fn set_state_block<A: GlApi>(&mut self, api: &mut A, hash: StateBlockHash) -> BindResult {
        if self.active_state_block == Some(hash) {
            return self.tally(false);
        }
        let Some(block) = self.state_blocks.get(&hash).copied() else {
            return BindResult::Failed;
        };
        self.apply_state_block(api, &block);
        self.active_state_block = Some(hash);
        self.tally(true)
    }

    /// The hash of the active state block.
    pub fn active_state_block(&self) -> Option<StateBlockHash> {
        self.active_state_block
    }

    fn apply_state_block<A: GlApi>(&mut self, api: &mut A, block: &RenderStateBlock) {
        let previous = self.applied_state;
        let previous = previous.as_ref();
        self.requested_depth_write = block.depth_write;
        let mut block = *block;
        block.depth_write &= !self.depth_writes_masked;
        let block = &block;

        if differs(previous, block, |b| b.cull_mode) {
            api.set_capability(Capability::CullFace, block.cull_mode != CullMode::None);
            api.cull_face(block.cull_mode);
        }
        if differs(previous, block, |b| b.front_face) {
            api.front_face(block.front_face);
        }
        if differs(previous, block, |b| b.polygon_mode) {
            api.polygon_mode(block.polygon_mode);
        }
        if differs(previous, block, |b| b.depth_test) {
            api.set_capability(Capability::DepthTest, block.depth_test);
        }
        if differs(previous, block, |b| b.depth_write) {
            api.depth_mask(block.depth_write);
        }
        if differs(previous, block, |b| b.depth_compare) {
            api.depth_func(block.depth_compare);
        }
        if differs(previous, block, |b| b.depth_bias) {
            api.set_capability(
                Capability::PolygonOffsetFill,
                !block.depth_bias.is_disabled(),
            );
            api.polygon_offset(block.depth_bias.slope_scale, block.depth_bias.constant);
        }
        if differs(previous, block, |b| b.scissor_test) {
            api.set_capability(Capability::ScissorTest, block.scissor_test);
        }
        if differs(previous, block, |b| b.stencil) {
            api.set_capability(Capability::StencilTest, block.stencil.enabled);
            api.stencil_state(&block.stencil);
        }
        if differs(previous, block, |b| b.color_writes) {
            for draw_buffer in 0..self.limits.max_color_attachments {
                api.color_mask(draw_buffer, block.color_writes);
            }
        }
        self.applied_state = Some(*block);
        self.toggle_primitive_restart(api, block.primitive_restart);
        self.toggle_rasterization(api, block.rasterization);
    }

    /// Forces depth writes off while `masked`, whatever the state blocks ask for.
    ///
    /// Unmasking restores the depth write of the last applied block.
    pub fn mask_depth_writes<A: GlApi>(&mut self, api: &mut A, masked: bool) -> BindResult {
        if self.depth_writes_masked == masked {
            return self.tally(false);
        }
        self.depth_writes_masked = masked;
        let write = self.requested_depth_write && !masked;
        let Some(state) = self.applied_state.as_mut() else {
            return self.tally(false);
        };
        if state.depth_write == write {
            return self.tally(false);
        }
        state.depth_write = write;
        api.depth_mask(write);
        self.tally(true)
    }

    /// Returns `true` while depth writes are forced off.
    pub fn depth_writes_masked(&self) -> bool {
        self.depth_writes_masked
    }

    /// Overrides the fill mode of the applied state block.
    ///
    /// The active block is forgotten, so the next [`set_state_block`](Self::set_state_block)
    /// re-applies the difference.
    pub fn set_polygon_mode<A: GlApi>(&mut self, api: &mut A, mode: PolygonMode) -> BindResult {
        let current = self.applied_state.map(|s| s.polygon_mode);
        if current == Some(mode) {
            return self.tally(false);
        }
        api.polygon_mode(mode);
        if let Some(state) = self.applied_state.as_mut() {
            state.polygon_mode = mode;
        }
        self.active_state_block = None;
        self.tally(true)
    }

    /// Sets blending for one draw buffer.
    pub fn set_blending<A: GlApi>(
        &mut self,
        api: &mut A,
        draw_buffer: u32,
        state: &BlendState,
    ) -> BindResult {
        assert!(
            draw_buffer < self.limits.max_color_attachments,
            "draw buffer {draw_buffer} exceeds the device limit of {}",
            self.limits.max_color_attachments
        );
        let slot = &mut self.blending[draw_buffer as usize];
        let previous = *slot;
        let changed = previous != Some(*state);
        if changed {
            if previous.map(|p| p.enabled) != Some(state.enabled) {
                api.set_capability_indexed(Capability::Blend, draw_buffer, state.enabled);
            }
            if state.enabled {
                api.blend_state(draw_buffer, state);
            }
            *slot = Some(*state);
        }
        self.tally(changed)
    }

    /// Sets the viewport.
    pub fn set_viewport<A: GlApi>(&mut self, api: &mut A, viewport: Rect) -> BindResult {
        let changed = self.viewport != Some(viewport);
        if changed {
            api.viewport(viewport);
            self.viewport = Some(viewport);
        }
        self.tally(changed)
    }

    /// The current viewport, if known.
    pub fn viewport(&self) -> Option<Rect> {
        self.viewport
    }

    /// Sets the scissor box.
    pub fn set_scissor<A: GlApi>(&mut self, api: &mut A, scissor: Rect) -> BindResult {
        let changed = self.scissor != Some(scissor);
        if changed {
            api.scissor(scissor);
            self.scissor = Some(scissor);
        }
        self.tally(changed)
    }

    /// Enables or disables primitive restart.
    pub fn toggle_primitive_restart<A: GlApi>(&mut self, api: &mut A, enabled: bool) -> BindResult {
        let changed = self.primitive_restart != Some(enabled);
        if changed {
            api.set_capability(Capability::PrimitiveRestart, enabled);
            self.primitive_restart = Some(enabled);
        }
        self.tally(changed)
    }

    /// Enables or disables rasterization.
    pub fn toggle_rasterization<A: GlApi>(&mut self, api: &mut A, enabled: bool) -> BindResult {
        let changed = self.rasterization != Some(enabled);
        if changed {
            api.set_capability(Capability::RasterizerDiscard, !enabled);
            self.rasterization = Some(enabled);
        }
        self.tally(changed)
    }

    /// Sets the depth range.
    pub fn set_depth_range<A: GlApi>(&mut self, api: &mut A, near: f32, far: f32) -> BindResult {
        let changed = self.depth_range != Some((near, far));
        if changed {
            api.depth_range(near, far);
            self.depth_range = Some((near, far));
        }
        self.tally(changed)
    }

    /// Enables user clip planes and uploads the equations of the enabled ones.
    pub fn set_clipping_plane_state<A: GlApi>(
        &mut self,
        api: &mut A,
        planes: &ClipPlaneState,
    ) -> BindResult {
        let previous = self.clip_planes;
        if previous == Some(*planes) {
            return self.tally(false);
        }
        let count = (self.limits.max_clip_planes as usize).min(planes.equations.len());
        for index in 0..count {
            let enabled = planes.enabled & (1 << index) != 0;
            let was = previous.map(|p| p.enabled & (1 << index) != 0);
            if was != Some(enabled) {
                api.set_capability_indexed(Capability::ClipDistance, index as u32, enabled);
            }
            let equation = planes.equations[index];
            if enabled && previous.map(|p| p.equations[index]) != Some(equation) {
                api.clip_plane(index as u32, equation);
            }
        }
        self.clip_planes = Some(*planes);
        self.tally(true)
    }

    // --- Debug scopes and render targets ---

    /// Pushes a debug group.
    pub fn push_debug_scope<A: GlApi>(&mut self, api: &mut A, name: &str, id: u32) {
        api.push_debug_group(id, name);
        self.debug_scopes.push(DebugScope {
            name: name.to_string(),
            id,
        });
    }

    /// Pops the innermost debug group. Returns `false` if none was open.
    pub fn pop_debug_scope<A: GlApi>(&mut self, api: &mut A) -> bool {
        match self.debug_scopes.pop() {
            Some(_) => {
                api.pop_debug_group();
                true
            }
            None => false,
        }
    }

    /// The open debug scopes, outermost first.
    pub fn debug_scopes(&self) -> &[DebugScope] {
        &self.debug_scopes
    }

    /// The render target of the active render pass.
    pub fn active_render_target(&self) -> Option<RenderTargetId> {
        self.active_render_target
    }

    /// Records the render target of the render pass being begun or ended.
    pub fn set_active_render_target(&mut self, target: Option<RenderTargetId>) {
        self.active_render_target = target;
    }
}

fn differs<T: PartialEq>(
    previous: Option<&RenderStateBlock>,
    block: &RenderStateBlock,
    field: impl Fn(&RenderStateBlock) -> T,
) -> bool {
    previous.map_or(true, |p| field(p) != field(block))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::gl::headless::{GlCall, HeadlessGl};

    fn tracker() -> (GlStateTracker, HeadlessGl) {
        let gl = HeadlessGl::new();
        (GlStateTracker::new(gl.limits, 2), gl)
    }

    fn binding(texture: u32) -> TextureBinding {
        TextureBinding {
            target: TextureTarget::Texture2D,
            texture: TextureId(texture),
            sampler: SamplerObject(1),
        }
    }

    #[test]
    fn test_redundant_vao_binds_issue_one_call() {
        let (mut tracker, mut gl) = tracker();
        assert_eq!(tracker.set_active_vao(&mut gl, VaoId(5)), BindResult::JustBound);
        for _ in 0..9 {
            assert_eq!(tracker.set_active_vao(&mut gl, VaoId(5)), BindResult::AlreadyBound);
        }
        assert_eq!(gl.count(|c| matches!(c, GlCall::BindVertexArray(_))), 1);
        assert_eq!(tracker.counters(), (1, 9));
    }

    #[test]
    fn test_program_not_ready_fails_without_binding() {
        let (mut tracker, mut gl) = tracker();
        let program = gl.create_program(ProgramStatus::Compiling);
        assert_eq!(tracker.set_active_program(&mut gl, program), BindResult::Failed);
        assert_eq!(gl.count(|c| matches!(c, GlCall::UseProgram(_))), 0);

        gl.set_program_status(program, ProgramStatus::Ready);
        assert_eq!(tracker.set_active_program(&mut gl, program), BindResult::JustBound);
        assert_eq!(tracker.active_program(), Some(program));
    }

    #[test]
    fn test_bind_textures_batches_contiguous_units() {
        let (mut tracker, mut gl) = tracker();
        let result = tracker.bind_textures(&mut gl, 0, &[binding(1), binding(2), binding(3)]);
        assert_eq!(result, BindResult::JustBound);
        assert_eq!(gl.count(|c| matches!(c, GlCall::BindTextures { .. })), 1);
        assert_eq!(gl.count(|c| matches!(c, GlCall::BindTextureUnit(..))), 0);

        gl.clear_calls();
        let result = tracker.bind_textures(&mut gl, 0, &[binding(1), binding(2), binding(3)]);
        assert_eq!(result, BindResult::AlreadyBound);
        assert!(gl.calls().is_empty());
    }

    #[test]
    fn test_bind_textures_falls_back_past_gap_threshold() {
        let (mut tracker, mut gl) = tracker();
        let initial: Vec<_> = (1..=6).map(binding).collect();
        tracker.bind_textures(&mut gl, 0, &initial);
        gl.clear_calls();

        // Units 0 and 5 change, four unchanged units in between.
        let mut next = initial.clone();
        next[0] = binding(10);
        next[5] = binding(11);
        tracker.bind_textures(&mut gl, 0, &next);
        assert_eq!(gl.count(|c| matches!(c, GlCall::BindTextures { .. })), 0);
        assert_eq!(gl.count(|c| matches!(c, GlCall::BindTextureUnit(..))), 2);
        assert_eq!(tracker.texture_binding(5), Some(binding(11)));
    }

    #[test]
    fn test_state_block_applies_only_differences() {
        let (mut tracker, mut gl) = tracker();
        let opaque = tracker.register_state_block(RenderStateBlock::default());
        let no_cull = tracker.register_state_block(RenderStateBlock {
            cull_mode: CullMode::None,
            ..Default::default()
        });

        assert_eq!(tracker.set_state_block(&mut gl, opaque), BindResult::JustBound);
        assert_eq!(tracker.set_state_block(&mut gl, opaque), BindResult::AlreadyBound);
        gl.clear_calls();

        assert_eq!(tracker.set_state_block(&mut gl, no_cull), BindResult::JustBound);
        assert_eq!(gl.count(|c| matches!(c, GlCall::CullFace(_))), 1);
        assert_eq!(gl.count(|c| matches!(c, GlCall::DepthFunc(_))), 0);

        assert_eq!(
            tracker.set_state_block(&mut gl, StateBlockHash(42)),
            BindResult::Failed
        );
    }

    #[test]
    fn test_masked_depth_writes_survive_state_block_changes() {
        let (mut tracker, mut gl) = tracker();
        let opaque = tracker.register_state_block(RenderStateBlock::default());
        let no_cull = tracker.register_state_block(RenderStateBlock {
            cull_mode: CullMode::None,
            ..Default::default()
        });
        tracker.set_state_block(&mut gl, opaque);
        gl.clear_calls();

        assert_eq!(tracker.mask_depth_writes(&mut gl, true), BindResult::JustBound);
        tracker.set_state_block(&mut gl, no_cull);
        assert!(tracker.depth_writes_masked());
        assert_eq!(
            gl.calls()
                .iter()
                .filter(|c| matches!(c, GlCall::DepthMask(_)))
                .collect::<Vec<_>>(),
            vec![&GlCall::DepthMask(false)]
        );

        assert_eq!(tracker.mask_depth_writes(&mut gl, false), BindResult::JustBound);
        assert_eq!(gl.calls().last(), Some(&GlCall::DepthMask(true)));
        assert_eq!(tracker.mask_depth_writes(&mut gl, false), BindResult::AlreadyBound);
    }

    #[test]
    fn test_blending_is_tracked_per_draw_buffer() {
        let (mut tracker, mut gl) = tracker();
        tracker.set_blending(&mut gl, 0, &BlendState::ALPHA_BLENDING);
        assert_eq!(
            tracker.set_blending(&mut gl, 0, &BlendState::ALPHA_BLENDING),
            BindResult::AlreadyBound
        );
        assert_eq!(
            tracker.set_blending(&mut gl, 1, &BlendState::ALPHA_BLENDING),
            BindResult::JustBound
        );
    }

    #[test]
    fn test_viewport_and_scissor_elide_identical_rects() {
        let (mut tracker, mut gl) = tracker();
        let rect = Rect::from_size(640, 480);
        tracker.set_viewport(&mut gl, rect);
        tracker.set_viewport(&mut gl, rect);
        tracker.set_scissor(&mut gl, rect);
        tracker.set_scissor(&mut gl, rect);
        assert_eq!(gl.count(|c| matches!(c, GlCall::Viewport(_))), 1);
        assert_eq!(gl.count(|c| matches!(c, GlCall::Scissor(_))), 1);
    }

    #[test]
    fn test_clear_states_forgets_bindings() {
        let (mut tracker, mut gl) = tracker();
        tracker.set_active_vao(&mut gl, VaoId(5));
        tracker.push_debug_scope(&mut gl, "frame", 1);
        tracker.set_active_render_target(Some(RenderTargetId(3)));
        tracker.clear_states(&mut gl);

        assert!(tracker.debug_scopes().is_empty());
        assert_eq!(tracker.active_render_target(), None);
        assert_eq!(tracker.set_active_vao(&mut gl, VaoId(5)), BindResult::JustBound);
        assert_eq!(tracker.set_active_vao(&mut gl, VaoId(0)), BindResult::JustBound);
    }

    #[test]
    #[should_panic(expected = "texture unit 40 exceeds the device limit")]
    fn test_texture_unit_past_limit_panics() {
        let (mut tracker, mut gl) = tracker();
        tracker.bind_texture(&mut gl, 40, binding(1));
    }
}

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

//! A headless [`GlApi`] that records every call instead of talking to a GPU.
//!
//! Used for tests, tooling and the sandbox. Object names are handed out from
//! a counter, buffer contents live in host memory, and fences signal either
//! on the first blocking wait (`auto_signal`) or when
//! [`HeadlessGl::signal_all_fences`] is called.

use super::api::{Capability, FramebufferTarget, GlApi, ProgramStatus, QueryTarget, WaitResult};
use ahash::AHashMap;
use kiln_core::math::{LinearRgba, Rect};
use kiln_core::renderer::command::{AttachmentSlot, ImageAccess, MemoryBarrierMask, UniformValue};
use kiln_core::renderer::resources::{
    BufferRange, BufferTarget, IndexFormat, SamplerDescriptor, TextureDescriptor, TextureTarget,
    TextureViewDescriptor, VertexLayout,
};
use kiln_core::renderer::state::{
    BlendState, ColorWrites, CompareFunction, CullMode, FrontFace, PolygonMode, PrimitiveTopology,
    StencilState,
};
use kiln_core::renderer::{
    BufferId, DeviceLimits, FramebufferId, QueryId, SamplerObject, ShaderPipelineId,
    ShaderProgramId, SyncHandle, TextureId, VaoId,
};

/// One recorded call.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum GlCall {
    BindVertexArray(VaoId),
    BindBuffer(BufferTarget, BufferId),
    BindBufferRange(BufferTarget, u32, BufferId, BufferRange),
    BindFramebuffer(FramebufferTarget, FramebufferId),
    UseProgram(ShaderProgramId),
    BindProgramPipeline(ShaderPipelineId),
    BindTextureUnit(u32, TextureId),
    BindTextures { first: u32, textures: Vec<TextureId> },
    BindSampler(u32, SamplerObject),
    BindSamplers { first: u32, samplers: Vec<SamplerObject> },
    BindImageTexture(u32, TextureId, u16),
    SetCapability(Capability, bool),
    SetCapabilityIndexed(Capability, u32, bool),
    BlendState(u32, BlendState),
    BlendColor(LinearRgba),
    ColorMask(u32, ColorWrites),
    Viewport(Rect),
    Scissor(Rect),
    DepthRange(f32, f32),
    CullFace(CullMode),
    FrontFace(FrontFace),
    PolygonMode(PolygonMode),
    PolygonOffset(f32, f32),
    DepthFunc(CompareFunction),
    DepthMask(bool),
    StencilState(StencilState),
    ClipPlane(u32, [f32; 4]),
    CreateFramebuffer(FramebufferId),
    DeleteFramebuffer(FramebufferId),
    FramebufferAttachment(FramebufferId, AttachmentSlot, TextureId, u16, Option<u16>),
    DrawBuffers(FramebufferId, Vec<Option<u8>>),
    ClearColor(FramebufferId, u32, LinearRgba),
    ClearDepthStencil(FramebufferId, Option<f32>, Option<u32>),
    BlitFramebuffer {
        source: FramebufferId,
        destination: FramebufferId,
        color: bool,
        depth: bool,
    },
    ReadBuffer(FramebufferId, u8),
    SetUniform(ShaderProgramId, String, UniformValue),
    SetUniformHandle(ShaderProgramId, u32, u64),
    UploadPushBlock(usize),
    DrawArrays { first: u32, count: u32, instances: u32 },
    DrawElements {
        count: u32,
        first_index: u32,
        instances: u32,
        base_vertex: i32,
        base_instance: u32,
    },
    MultiDrawArraysIndirect { offset: usize, draw_count: u32 },
    MultiDrawElementsIndirect { offset: usize, draw_count: u32 },
    DispatchCompute([u32; 3]),
    MemoryBarrier(MemoryBarrierMask),
    FenceSync(SyncHandle),
    ClientWaitSync(SyncHandle, u64),
    DeleteSync(SyncHandle),
    CreateBuffer(BufferId, usize),
    DeleteBuffer(BufferId),
    WriteBuffer(BufferId, usize, usize),
    ReadBufferData(BufferId, BufferRange),
    ClearBufferData(BufferId, BufferRange, u32),
    CreateTexture(TextureId),
    CreateTextureView(TextureId, TextureViewDescriptor),
    DeleteTexture(TextureId),
    GenerateMipmap(TextureId),
    CopyImage(TextureId, TextureId),
    ClearTexture(TextureId, u16),
    MakeHandleResident(u64, bool),
    CreateSampler(SamplerObject),
    DeleteSampler(SamplerObject),
    CreateVertexArray(VaoId),
    DeleteVertexArray(VaoId),
    CreateQuery(QueryId),
    DeleteQuery(QueryId),
    BeginQuery(QueryTarget, QueryId),
    EndQuery(QueryTarget),
    PushDebugGroup(u32, String),
    PopDebugGroup,
    DebugMessage(u32, String),
}

#[derive(Debug)]
struct ActiveQuery {
    query: QueryId,
    draws_at_begin: u64,
    vertices_at_begin: u64,
}

#[derive(Debug, Default)]
struct ProgramInfo {
    status: Option<ProgramStatus>,
    uniforms: Option<Vec<String>>,
}

/// A recording, GPU-less device.
#[derive(Debug)]
pub struct HeadlessGl {
    /// Limits reported to the backend.
    pub limits: DeviceLimits,
    /// Signal a fence on the first wait with a non-zero timeout.
    pub auto_signal: bool,
    pub(crate) calls: Vec<GlCall>,
    pub(crate) next_name: u32,
    pub(crate) next_sync: u64,
    pub(crate) programs: AHashMap<ShaderProgramId, ProgramInfo>,
    pub(crate) buffers: AHashMap<BufferId, Vec<u8>>,
    pub(crate) textures: AHashMap<TextureId, TextureDescriptor>,
    pub(crate) fences: AHashMap<SyncHandle, bool>,
    pub(crate) active_queries: AHashMap<QueryTarget, ActiveQuery>,
    pub(crate) query_results: AHashMap<QueryId, u64>,
    pub(crate) draws: u64,
    pub(crate) vertices: u64,
}

impl Default for HeadlessGl {
    fn default() -> Self {
        Self {
            limits: DeviceLimits::default(),
            auto_signal: true,
            calls: Vec::new(),
            next_name: 1,
            next_sync: 1,
            programs: AHashMap::new(),
            buffers: AHashMap::new(),
            textures: AHashMap::new(),
            fences: AHashMap::new(),
            active_queries: AHashMap::new(),
            query_results: AHashMap::new(),
            draws: 0,
            vertices: 0,
        }
    }
}

impl HeadlessGl {
    /// Creates a device with default limits whose fences auto-signal.
    pub fn new() -> Self {
        Self::default()
    }

    fn name(&mut self) -> u32 {
        let name = self.next_name;
        self.next_name += 1;
        name
    }

    /// Creates a program name with the given build status.
    pub fn create_program(&mut self, status: ProgramStatus) -> ShaderProgramId {
        let program = ShaderProgramId(self.name());
        self.programs.insert(
            program,
            ProgramInfo {
                status: Some(status),
                uniforms: None,
            },
        );
        program
    }

    /// Changes a program's build status, e.g. when background compilation finishes.
    pub fn set_program_status(&mut self, program: ShaderProgramId, status: ProgramStatus) {
        self.programs.entry(program).or_default().status = Some(status);
    }

    /// Restricts the active uniforms of `program`. Without this every name is accepted.
    pub fn set_program_uniforms(&mut self, program: ShaderProgramId, names: &[&str]) {
        self.programs.entry(program).or_default().uniforms =
            Some(names.iter().map(|n| n.to_string()).collect());
    }

    /// Marks every outstanding fence as signalled.
    pub fn signal_all_fences(&mut self) {
        self.fences.values_mut().for_each(|signaled| *signaled = true);
    }

    /// Number of fences not yet deleted.
    pub fn live_fences(&self) -> usize {
        self.fences.len()
    }

    /// Host copy of a buffer's contents.
    pub fn buffer_contents(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(Vec::as_slice)
    }

    /// The descriptor a texture was created with.
    pub fn texture_descriptor(&self, texture: TextureId) -> Option<&TextureDescriptor> {
        self.textures.get(&texture)
    }

    /// Every call since the last [`clear_calls`](Self::clear_calls).
    pub fn calls(&self) -> &[GlCall] {
        &self.calls
    }

    /// Forgets the recorded calls.
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Counts recorded calls matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&GlCall) -> bool) -> usize {
        self.calls.iter().filter(|call| predicate(call)).count()
    }

    fn record(&mut self, call: GlCall) {
        log::trace!("gl: {call:?}");
        self.calls.push(call);
    }

    fn count_draw(&mut self, vertices: u64) {
        self.draws += 1;
        self.vertices += vertices;
    }
}

impl GlApi for HeadlessGl {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn bind_vertex_array(&mut self, vao: VaoId) {
        self.record(GlCall::BindVertexArray(vao));
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: BufferId) {
        self.record(GlCall::BindBuffer(target, buffer));
    }

    fn bind_buffer_range(
        &mut self,
        target: BufferTarget,
        index: u32,
        buffer: BufferId,
        range: BufferRange,
    ) {
        self.record(GlCall::BindBufferRange(target, index, buffer, range));
    }

    fn bind_framebuffer(&mut self, target: FramebufferTarget, framebuffer: FramebufferId) {
        self.record(GlCall::BindFramebuffer(target, framebuffer));
    }

    fn use_program(&mut self, program: ShaderProgramId) {
        self.record(GlCall::UseProgram(program));
    }

    fn bind_program_pipeline(&mut self, pipeline: ShaderPipelineId) {
        self.record(GlCall::BindProgramPipeline(pipeline));
    }

    fn bind_texture_unit(&mut self, unit: u32, _target: TextureTarget, texture: TextureId) {
        self.record(GlCall::BindTextureUnit(unit, texture));
    }

    fn bind_textures(&mut self, first: u32, textures: &[TextureId]) {
        self.record(GlCall::BindTextures {
            first,
            textures: textures.to_vec(),
        });
    }

    fn bind_sampler(&mut self, unit: u32, sampler: SamplerObject) {
        self.record(GlCall::BindSampler(unit, sampler));
    }

    fn bind_samplers(&mut self, first: u32, samplers: &[SamplerObject]) {
        self.record(GlCall::BindSamplers {
            first,
            samplers: samplers.to_vec(),
        });
    }

    fn bind_image_texture(
        &mut self,
        unit: u32,
        texture: TextureId,
        level: u16,
        _layer: Option<u16>,
        _access: ImageAccess,
    ) {
        self.record(GlCall::BindImageTexture(unit, texture, level));
    }

    fn set_capability(&mut self, capability: Capability, enabled: bool) {
        self.record(GlCall::SetCapability(capability, enabled));
    }

    fn set_capability_indexed(&mut self, capability: Capability, index: u32, enabled: bool) {
        self.record(GlCall::SetCapabilityIndexed(capability, index, enabled));
    }

    fn blend_state(&mut self, draw_buffer: u32, state: &BlendState) {
        self.record(GlCall::BlendState(draw_buffer, *state));
    }

    fn blend_color(&mut self, color: LinearRgba) {
        self.record(GlCall::BlendColor(color));
    }

    fn color_mask(&mut self, draw_buffer: u32, writes: ColorWrites) {
        self.record(GlCall::ColorMask(draw_buffer, writes));
    }

    fn viewport(&mut self, rect: Rect) {
        self.record(GlCall::Viewport(rect));
    }

    fn scissor(&mut self, rect: Rect) {
        self.record(GlCall::Scissor(rect));
    }

    fn depth_range(&mut self, near: f32, far: f32) {
        self.record(GlCall::DepthRange(near, far));
    }

    fn cull_face(&mut self, mode: CullMode) {
        self.record(GlCall::CullFace(mode));
    }

    fn front_face(&mut self, face: FrontFace) {
        self.record(GlCall::FrontFace(face));
    }

    fn polygon_mode(&mut self, mode: PolygonMode) {
        self.record(GlCall::PolygonMode(mode));
    }

    fn polygon_offset(&mut self, slope_scale: f32, constant: f32) {
        self.record(GlCall::PolygonOffset(slope_scale, constant));
    }

    fn depth_func(&mut self, compare: CompareFunction) {
        self.record(GlCall::DepthFunc(compare));
    }

    fn depth_mask(&mut self, write: bool) {
        self.record(GlCall::DepthMask(write));
    }

    fn stencil_state(&mut self, state: &StencilState) {
        self.record(GlCall::StencilState(*state));
    }

    fn clip_plane(&mut self, index: u32, equation: [f32; 4]) {
        self.record(GlCall::ClipPlane(index, equation));
    }

    fn create_framebuffer(&mut self) -> FramebufferId {
        let framebuffer = FramebufferId(self.name());
        self.record(GlCall::CreateFramebuffer(framebuffer));
        framebuffer
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.record(GlCall::DeleteFramebuffer(framebuffer));
    }

    fn framebuffer_attachment(
        &mut self,
        framebuffer: FramebufferId,
        slot: AttachmentSlot,
        texture: TextureId,
        mip: u16,
        layer: Option<u16>,
    ) {
        self.record(GlCall::FramebufferAttachment(
            framebuffer,
            slot,
            texture,
            mip,
            layer,
        ));
    }

    fn draw_buffers(&mut self, framebuffer: FramebufferId, buffers: &[Option<u8>]) {
        self.record(GlCall::DrawBuffers(framebuffer, buffers.to_vec()));
    }

    fn clear_color(&mut self, framebuffer: FramebufferId, draw_buffer: u32, color: LinearRgba) {
        self.record(GlCall::ClearColor(framebuffer, draw_buffer, color));
    }

    fn clear_depth_stencil(
        &mut self,
        framebuffer: FramebufferId,
        depth: Option<f32>,
        stencil: Option<u32>,
    ) {
        self.record(GlCall::ClearDepthStencil(framebuffer, depth, stencil));
    }

    fn blit_framebuffer(
        &mut self,
        source: FramebufferId,
        destination: FramebufferId,
        _source_rect: Rect,
        _destination_rect: Rect,
        color: bool,
        depth: bool,
    ) {
        self.record(GlCall::BlitFramebuffer {
            source,
            destination,
            color,
            depth,
        });
    }

    fn read_buffer(&mut self, framebuffer: FramebufferId, attachment: u8) {
        self.record(GlCall::ReadBuffer(framebuffer, attachment));
    }

    fn program_status(&self, program: ShaderProgramId) -> ProgramStatus {
        self.programs
            .get(&program)
            .and_then(|info| info.status.clone())
            .unwrap_or(ProgramStatus::Unknown)
    }

    fn set_uniform(&mut self, program: ShaderProgramId, name: &str, value: &UniformValue) -> bool {
        let active = match self.programs.get(&program).and_then(|p| p.uniforms.as_ref()) {
            Some(names) => names.iter().any(|n| n == name),
            None => true,
        };
        if active {
            self.record(GlCall::SetUniform(program, name.to_string(), *value));
        }
        active
    }

    fn set_uniform_handle(&mut self, program: ShaderProgramId, slot: u32, handle: u64) {
        self.record(GlCall::SetUniformHandle(program, slot, handle));
    }

    fn upload_push_block(&mut self, bytes: &[u8]) {
        self.record(GlCall::UploadPushBlock(bytes.len()));
    }

    fn draw_arrays(
        &mut self,
        _topology: PrimitiveTopology,
        first: u32,
        count: u32,
        instances: u32,
        _base_instance: u32,
    ) {
        self.count_draw(count as u64 * instances as u64);
        self.record(GlCall::DrawArrays {
            first,
            count,
            instances,
        });
    }

    #[allow(clippy::too_many_arguments)]

    #[allow(clippy::too_many_arguments)]
    fn draw_elements(
        &mut self,
        _topology: PrimitiveTopology,
        _format: IndexFormat,
        count: u32,
        first_index: u32,
        instances: u32,
        base_vertex: i32,
        base_instance: u32,
    ) {
        self.count_draw(count as u64 * instances as u64);
        self.record(GlCall::DrawElements {
            count,
            first_index,
            instances,
            base_vertex,
            base_instance,
        });
    }

    fn multi_draw_arrays_indirect(
        &mut self,
        _topology: PrimitiveTopology,
        offset: usize,
        draw_count: u32,
    ) {
        self.count_draw(0);
        self.record(GlCall::MultiDrawArraysIndirect { offset, draw_count });
    }

    fn multi_draw_elements_indirect(
        &mut self,
        _topology: PrimitiveTopology,
        _format: IndexFormat,
        offset: usize,
        draw_count: u32,
    ) {
        self.count_draw(0);
        self.record(GlCall::MultiDrawElementsIndirect { offset, draw_count });
    }

    fn dispatch_compute(&mut self, work_groups: [u32; 3]) {
        self.record(GlCall::DispatchCompute(work_groups));
    }

    fn memory_barrier(&mut self, mask: MemoryBarrierMask) {
        self.record(GlCall::MemoryBarrier(mask));
    }

    fn fence_sync(&mut self) -> SyncHandle {
        let sync = SyncHandle(self.next_sync);
        self.next_sync += 1;
        self.fences.insert(sync, false);
        self.record(GlCall::FenceSync(sync));
        sync
    }

    fn client_wait_sync(&mut self, sync: SyncHandle, timeout_ns: u64) -> WaitResult {
        self.record(GlCall::ClientWaitSync(sync, timeout_ns));
        let auto_signal = self.auto_signal;
        match self.fences.get_mut(&sync) {
            None => WaitResult::WaitFailed,
            Some(true) => WaitResult::AlreadySignaled,
            Some(signaled) if auto_signal && timeout_ns > 0 => {
                *signaled = true;
                WaitResult::ConditionSatisfied
            }
            Some(_) => WaitResult::TimeoutExpired,
        }
    }

    fn delete_sync(&mut self, sync: SyncHandle) {
        self.fences.remove(&sync);
        self.record(GlCall::DeleteSync(sync));
    }

    fn create_buffer(&mut self, size: usize, _persistent: bool) -> BufferId {
        let buffer = BufferId(self.name());
        self.buffers.insert(buffer, vec![0; size]);
        self.record(GlCall::CreateBuffer(buffer, size));
        buffer
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
        self.record(GlCall::DeleteBuffer(buffer));
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: usize, data: &[u8]) {
        if let Some(storage) = self.buffers.get_mut(&buffer) {
            let end = (offset + data.len()).min(storage.len());
            if offset < end {
                storage[offset..end].copy_from_slice(&data[..end - offset]);
            }
        }
        self.record(GlCall::WriteBuffer(buffer, offset, data.len()));
    }

    fn read_buffer_data(&mut self, buffer: BufferId, range: BufferRange) -> Vec<u8> {
        self.record(GlCall::ReadBufferData(buffer, range));
        self.buffers
            .get(&buffer)
            .and_then(|storage| storage.get(range.offset..range.end()))
            .map(<[u8]>::to_vec)
            .unwrap_or_default()
    }

    fn clear_buffer_data(&mut self, buffer: BufferId, range: BufferRange, value: u32) {
        if let Some(bytes) = self
            .buffers
            .get_mut(&buffer)
            .and_then(|storage| storage.get_mut(range.offset..range.end()))
        {
            let pattern = value.to_le_bytes();
            for (i, byte) in bytes.iter_mut().enumerate() {
                *byte = pattern[i % 4];
            }
        }
        self.record(GlCall::ClearBufferData(buffer, range, value));
    }

    fn create_texture(&mut self, descriptor: &TextureDescriptor) -> TextureId {
        let texture = TextureId(self.name());
        self.textures.insert(texture, descriptor.clone());
        self.record(GlCall::CreateTexture(texture));
        texture
    }

    fn create_texture_view(&mut self, descriptor: &TextureViewDescriptor) -> TextureId {
        let view = TextureId(self.name());
        if let Some(source) = self.textures.get(&descriptor.source).cloned() {
            self.textures.insert(
                view,
                TextureDescriptor {
                    name: format!("{} (view)", source.name),
                    target: descriptor.target,
                    format: descriptor.format,
                    layers: descriptor.range.layer_count,
                    mip_levels: descriptor.range.mip_count,
                    ..source
                },
            );
        }
        self.record(GlCall::CreateTextureView(view, *descriptor));
        view
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
        self.record(GlCall::DeleteTexture(texture));
    }

    fn generate_mipmap(&mut self, texture: TextureId) {
        self.record(GlCall::GenerateMipmap(texture));
    }

    #[allow(clippy::too_many_arguments)]

    #[allow(clippy::too_many_arguments)]
    fn copy_image(
        &mut self,
        source: TextureId,
        _source_mip: u16,
        _source_origin: [u32; 3],
        destination: TextureId,
        _destination_mip: u16,
        _destination_origin: [u32; 3],
        _extent: [u32; 3],
    ) {
        self.record(GlCall::CopyImage(source, destination));
    }

    fn clear_texture(
        &mut self,
        texture: TextureId,
        mip: u16,
        _layers: Option<(u16, u16)>,
        _color: LinearRgba,
    ) {
        self.record(GlCall::ClearTexture(texture, mip));
    }

    fn texture_handle(&mut self, texture: TextureId, sampler: SamplerObject) -> u64 {
        ((texture.0 as u64) << 32) | sampler.0 as u64
    }

    fn make_handle_resident(&mut self, handle: u64, resident: bool) {
        self.record(GlCall::MakeHandleResident(handle, resident));
    }

    fn create_sampler(&mut self, _descriptor: &SamplerDescriptor) -> SamplerObject {
        let sampler = SamplerObject(self.name());
        self.record(GlCall::CreateSampler(sampler));
        sampler
    }

    fn delete_sampler(&mut self, sampler: SamplerObject) {
        self.record(GlCall::DeleteSampler(sampler));
    }

    fn create_vertex_array(&mut self, _layout: &VertexLayout) -> VaoId {
        let vao = VaoId(self.name());
        self.record(GlCall::CreateVertexArray(vao));
        vao
    }

    fn delete_vertex_array(&mut self, vao: VaoId) {
        self.record(GlCall::DeleteVertexArray(vao));
    }

    fn create_query(&mut self) -> QueryId {
        let query = QueryId(self.name());
        self.record(GlCall::CreateQuery(query));
        query
    }

    fn delete_query(&mut self, query: QueryId) {
        self.query_results.remove(&query);
        self.record(GlCall::DeleteQuery(query));
    }

    fn begin_query(&mut self, target: QueryTarget, query: QueryId) {
        self.active_queries.insert(
            target,
            ActiveQuery {
                query,
                draws_at_begin: self.draws,
                vertices_at_begin: self.vertices,
            },
        );
        self.record(GlCall::BeginQuery(target, query));
    }

    fn end_query(&mut self, target: QueryTarget) {
        if let Some(active) = self.active_queries.remove(&target) {
            let draws = self.draws - active.draws_at_begin;
            let value = match target {
                QueryTarget::SamplesPassed => draws,
                QueryTarget::AnySamplesPassed => (draws > 0) as u64,
                QueryTarget::PrimitivesGenerated => (self.vertices - active.vertices_at_begin) / 3,
                QueryTarget::TimeElapsed => 0,
            };
            self.query_results.insert(active.query, value);
        }
        self.record(GlCall::EndQuery(target));
    }

    fn query_result(&mut self, query: QueryId, _wait: bool) -> Option<u64> {
        self.query_results.get(&query).copied()
    }

    fn push_debug_group(&mut self, id: u32, name: &str) {
        self.record(GlCall::PushDebugGroup(id, name.to_string()));
    }

    fn pop_debug_group(&mut self) {
        self.record(GlCall::PopDebugGroup);
    }

    fn debug_message(&mut self, id: u32, message: &str) {
        self.record(GlCall::DebugMessage(id, message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fences_signal_on_blocking_wait_only() {
        let mut gl = HeadlessGl::new();
        let fence = gl.fence_sync();
        assert_eq!(gl.client_wait_sync(fence, 0), WaitResult::TimeoutExpired);
        assert_eq!(gl.client_wait_sync(fence, 1000), WaitResult::ConditionSatisfied);
        assert_eq!(gl.client_wait_sync(fence, 0), WaitResult::AlreadySignaled);
        gl.delete_sync(fence);
        assert_eq!(gl.client_wait_sync(fence, 0), WaitResult::WaitFailed);
    }

    #[test]
    fn test_manual_fences_stay_unsignaled() {
        let mut gl = HeadlessGl {
            auto_signal: false,
            ..Default::default()
        };
        let fence = gl.fence_sync();
        assert_eq!(gl.client_wait_sync(fence, 1000), WaitResult::TimeoutExpired);
        gl.signal_all_fences();
        assert!(gl.client_wait_sync(fence, 1000).is_signaled());
    }

    #[test]
    fn test_buffer_contents_round_trip() {
        let mut gl = HeadlessGl::new();
        let buffer = gl.create_buffer(8, true);
        gl.write_buffer(buffer, 2, &[1, 2, 3]);
        assert_eq!(
            gl.read_buffer_data(buffer, BufferRange::new(0, 6)),
            vec![0, 0, 1, 2, 3, 0]
        );
        gl.clear_buffer_data(buffer, BufferRange::new(4, 4), 0xAABB_CCDD);
        assert_eq!(gl.buffer_contents(buffer).unwrap()[4..], [0xDD, 0xCC, 0xBB, 0xAA]);
    }

    #[test]
    fn test_uniform_filtering() {
        let mut gl = HeadlessGl::new();
        let program = gl.create_program(ProgramStatus::Ready);
        gl.set_program_uniforms(program, &["colour"]);
        assert!(gl.set_uniform(program, "colour", &UniformValue::Float(1.0)));
        assert!(!gl.set_uniform(program, "missing", &UniformValue::Float(1.0)));
        assert_eq!(gl.count(|c| matches!(c, GlCall::SetUniform(..))), 1);
    }

    #[test]
    fn test_sample_queries_count_draws() {
        let mut gl = HeadlessGl::new();
        let query = gl.create_query();
        gl.begin_query(QueryTarget::SamplesPassed, query);
        gl.draw_arrays(PrimitiveTopology::Triangles, 0, 3, 1, 0);
        gl.draw_arrays(PrimitiveTopology::Triangles, 0, 3, 1, 0);
        gl.end_query(QueryTarget::SamplesPassed);
        assert_eq!(gl.query_result(query, true), Some(2));
    }
}

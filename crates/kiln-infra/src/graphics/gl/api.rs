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

//! The low-level call surface of an OpenGL 4.6 style device.
//!
//! Only the state tracker and the dispatcher talk to a [`GlApi`]. Every call
//! here changes or queries device state directly and performs no caching.

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

/// Toggleable fixed-function capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Depth testing.
    DepthTest,
    /// Stencil testing.
    StencilTest,
    /// Face culling.
    CullFace,
    /// Scissor testing.
    ScissorTest,
    /// Polygon offset for filled polygons.
    PolygonOffsetFill,
    /// Primitive restart on the fixed index.
    PrimitiveRestart,
    /// Discard primitives before rasterization.
    RasterizerDiscard,
    /// Per draw buffer blending (indexed).
    Blend,
    /// User clip distance (indexed by plane).
    ClipDistance,
}

/// Framebuffer binding points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FramebufferTarget {
    /// Read operations.
    Read,
    /// Draw operations.
    Draw,
}

/// Result of waiting on a fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// The fence was signalled before the call.
    AlreadySignaled,
    /// The fence was signalled during the wait.
    ConditionSatisfied,
    /// The timeout elapsed first.
    TimeoutExpired,
    /// The wait itself failed.
    WaitFailed,
}

impl WaitResult {
    /// Returns `true` if the fence is known to be signalled.
    pub fn is_signaled(self) -> bool {
        matches!(self, Self::AlreadySignaled | Self::ConditionSatisfied)
    }
}

/// Build state of a shader program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramStatus {
    /// Linked and usable.
    Ready,
    /// Still compiling or linking in the background.
    Compiling,
    /// Failed, with the compiler or linker log.
    Failed(String),
    /// Not a program name.
    Unknown,
}

/// Query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryTarget {
    /// Samples passed.
    SamplesPassed,
    /// Any sample passed.
    AnySamplesPassed,
    /// Primitives generated.
    PrimitivesGenerated,
    /// Time elapsed in nanoseconds.
    TimeElapsed,
}

/// An OpenGL-style device.
pub trait GlApi {
    /// Limits reported by the device.
    fn limits(&self) -> DeviceLimits;

    // --- Object binding ---

    /// `glBindVertexArray`.
    fn bind_vertex_array(&mut self, vao: VaoId);
    /// `glBindBuffer`.
    fn bind_buffer(&mut self, target: BufferTarget, buffer: BufferId);
    /// `glBindBufferRange`.
    fn bind_buffer_range(
        &mut self,
        target: BufferTarget,
        index: u32,
        buffer: BufferId,
        range: BufferRange,
    );
    /// `glBindFramebuffer`.
    fn bind_framebuffer(&mut self, target: FramebufferTarget, framebuffer: FramebufferId);
    /// `glUseProgram`.
    fn use_program(&mut self, program: ShaderProgramId);
    /// `glBindProgramPipeline`.
    fn bind_program_pipeline(&mut self, pipeline: ShaderPipelineId);
    /// `glBindTextureUnit`.
    fn bind_texture_unit(&mut self, unit: u32, target: TextureTarget, texture: TextureId);
    /// `glBindTextures`: binds `textures` to consecutive units starting at `first`.
    fn bind_textures(&mut self, first: u32, textures: &[TextureId]);
    /// `glBindSampler`.
    fn bind_sampler(&mut self, unit: u32, sampler: SamplerObject);
    /// `glBindSamplers`.
    fn bind_samplers(&mut self, first: u32, samplers: &[SamplerObject]);
    /// `glBindImageTexture`.
    fn bind_image_texture(
        &mut self,
        unit: u32,
        texture: TextureId,
        level: u16,
        layer: Option<u16>,
        access: ImageAccess,
    );

    // --- Fixed function state ---

    /// `glEnable`/`glDisable`.
    fn set_capability(&mut self, capability: Capability, enabled: bool);
    /// `glEnablei`/`glDisablei`.
    fn set_capability_indexed(&mut self, capability: Capability, index: u32, enabled: bool);
    /// `glBlendFuncSeparatei` and `glBlendEquationSeparatei`.
    fn blend_state(&mut self, draw_buffer: u32, state: &BlendState);
    /// `glBlendColor`.
    fn blend_color(&mut self, color: LinearRgba);
    /// `glColorMaski`.
    fn color_mask(&mut self, draw_buffer: u32, writes: ColorWrites);
    /// `glViewport`.
    fn viewport(&mut self, rect: Rect);
    /// `glScissor`.
    fn scissor(&mut self, rect: Rect);
    /// `glDepthRange`.
    fn depth_range(&mut self, near: f32, far: f32);
    /// `glCullFace`.
    fn cull_face(&mut self, mode: CullMode);
    /// `glFrontFace`.
    fn front_face(&mut self, face: FrontFace);
    /// `glPolygonMode`.
    fn polygon_mode(&mut self, mode: PolygonMode);
    /// `glPolygonOffset`.
    fn polygon_offset(&mut self, slope_scale: f32, constant: f32);
    /// `glDepthFunc`.
    fn depth_func(&mut self, compare: CompareFunction);
    /// `glDepthMask`.
    fn depth_mask(&mut self, write: bool);
    /// `glStencilFunc`, `glStencilOp` and `glStencilMask`.
    fn stencil_state(&mut self, state: &StencilState);
    /// Uploads a user clip plane equation.
    fn clip_plane(&mut self, index: u32, equation: [f32; 4]);

    // --- Framebuffers ---

    /// `glCreateFramebuffers`.
    fn create_framebuffer(&mut self) -> FramebufferId;
    /// `glDeleteFramebuffers`.
    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);
    /// `glNamedFramebufferTextureLayer` (or `glNamedFramebufferTexture` for `layer == None`).
    fn framebuffer_attachment(
        &mut self,
        framebuffer: FramebufferId,
        slot: AttachmentSlot,
        texture: TextureId,
        mip: u16,
        layer: Option<u16>,
    );
    /// `glNamedFramebufferDrawBuffers`. `None` entries map to `GL_NONE`.
    fn draw_buffers(&mut self, framebuffer: FramebufferId, buffers: &[Option<u8>]);
    /// `glClearNamedFramebufferfv` on a color attachment.
    fn clear_color(&mut self, framebuffer: FramebufferId, draw_buffer: u32, color: LinearRgba);
    /// `glClearNamedFramebufferfi` and friends.
    fn clear_depth_stencil(
        &mut self,
        framebuffer: FramebufferId,
        depth: Option<f32>,
        stencil: Option<u32>,
    );
    /// `glBlitNamedFramebuffer`.
    fn blit_framebuffer(
        &mut self,
        source: FramebufferId,
        destination: FramebufferId,
        source_rect: Rect,
        destination_rect: Rect,
        color: bool,
        depth: bool,
    );
    /// `glNamedFramebufferReadBuffer`.
    fn read_buffer(&mut self, framebuffer: FramebufferId, attachment: u8);

    // --- Programs and uniforms ---

    /// Build state of `program`.
    fn program_status(&self, program: ShaderProgramId) -> ProgramStatus;
    /// `glProgramUniform*`. Returns `false` if the program has no active uniform `name`.
    fn set_uniform(&mut self, program: ShaderProgramId, name: &str, value: &UniformValue) -> bool;
    /// `glProgramUniformHandleui64ARB` at location `slot`.
    fn set_uniform_handle(&mut self, program: ShaderProgramId, slot: u32, handle: u64);
    /// Uploads the fast push-constant block.
    fn upload_push_block(&mut self, bytes: &[u8]);

    // --- Draws and dispatches ---

    /// `glDrawArraysInstancedBaseInstance`.
    fn draw_arrays(
        &mut self,
        topology: PrimitiveTopology,
        first: u32,
        count: u32,
        instances: u32,
        base_instance: u32,
    );
    /// `glDrawElementsInstancedBaseVertexBaseInstance`.
    #[allow(clippy::too_many_arguments)]
    fn draw_elements(
        &mut self,
        topology: PrimitiveTopology,
        format: IndexFormat,
        count: u32,
        first_index: u32,
        instances: u32,
        base_vertex: i32,
        base_instance: u32,
    );
    /// `glMultiDrawArraysIndirect` with the bound indirect buffer.
    fn multi_draw_arrays_indirect(
        &mut self,
        topology: PrimitiveTopology,
        offset: usize,
        draw_count: u32,
    );
    /// `glMultiDrawElementsIndirect` with the bound indirect buffer.
    fn multi_draw_elements_indirect(
        &mut self,
        topology: PrimitiveTopology,
        format: IndexFormat,
        offset: usize,
        draw_count: u32,
    );
    /// `glDispatchCompute`.
    fn dispatch_compute(&mut self, work_groups: [u32; 3]);
    /// `glMemoryBarrier`.
    fn memory_barrier(&mut self, mask: MemoryBarrierMask);

    // --- Synchronization ---

    /// `glFenceSync`.
    fn fence_sync(&mut self) -> SyncHandle;
    /// `glClientWaitSync` with flush.
    fn client_wait_sync(&mut self, sync: SyncHandle, timeout_ns: u64) -> WaitResult;
    /// `glDeleteSync`.
    fn delete_sync(&mut self, sync: SyncHandle);

    // --- Buffers ---

    /// Creates an immutable-storage buffer, persistently mapped if requested.
    fn create_buffer(&mut self, size: usize, persistent: bool) -> BufferId;
    /// `glDeleteBuffers`.
    fn delete_buffer(&mut self, buffer: BufferId);
    /// Writes through the persistent mapping or `glNamedBufferSubData`.
    fn write_buffer(&mut self, buffer: BufferId, offset: usize, data: &[u8]);
    /// `glGetNamedBufferSubData`.
    fn read_buffer_data(&mut self, buffer: BufferId, range: BufferRange) -> Vec<u8>;
    /// `glClearNamedBufferSubData` with a 32-bit pattern.
    fn clear_buffer_data(&mut self, buffer: BufferId, range: BufferRange, value: u32);

    // --- Textures, samplers, vertex arrays ---

    /// Allocates immutable texture storage.
    fn create_texture(&mut self, descriptor: &TextureDescriptor) -> TextureId;
    /// `glTextureView`.
    fn create_texture_view(&mut self, descriptor: &TextureViewDescriptor) -> TextureId;
    /// `glDeleteTextures`.
    fn delete_texture(&mut self, texture: TextureId);
    /// `glGenerateTextureMipmap`.
    fn generate_mipmap(&mut self, texture: TextureId);
    /// `glCopyImageSubData`.
    #[allow(clippy::too_many_arguments)]
    fn copy_image(
        &mut self,
        source: TextureId,
        source_mip: u16,
        source_origin: [u32; 3],
        destination: TextureId,
        destination_mip: u16,
        destination_origin: [u32; 3],
        extent: [u32; 3],
    );
    /// `glClearTexSubImage`.
    fn clear_texture(
        &mut self,
        texture: TextureId,
        mip: u16,
        layers: Option<(u16, u16)>,
        color: LinearRgba,
    );
    /// `glGetTextureSamplerHandleARB`.
    fn texture_handle(&mut self, texture: TextureId, sampler: SamplerObject) -> u64;
    /// `glMakeTextureHandleResidentARB` / `NonResident`.
    fn make_handle_resident(&mut self, handle: u64, resident: bool);
    /// Creates a sampler object.
    fn create_sampler(&mut self, descriptor: &SamplerDescriptor) -> SamplerObject;
    /// `glDeleteSamplers`.
    fn delete_sampler(&mut self, sampler: SamplerObject);
    /// Creates a vertex array with `layout` applied.
    fn create_vertex_array(&mut self, layout: &VertexLayout) -> VaoId;
    /// `glDeleteVertexArrays`.
    fn delete_vertex_array(&mut self, vao: VaoId);

    // --- Queries ---

    /// `glCreateQueries`.
    fn create_query(&mut self) -> QueryId;
    /// `glDeleteQueries`.
    fn delete_query(&mut self, query: QueryId);
    /// `glBeginQuery`.
    fn begin_query(&mut self, target: QueryTarget, query: QueryId);
    /// `glEndQuery`.
    fn end_query(&mut self, target: QueryTarget);
    /// `glGetQueryObjectui64v`. `None` if the result is not available yet and `wait` is `false`.
    fn query_result(&mut self, query: QueryId, wait: bool) -> Option<u64>;

    // --- Debug ---

    /// `glPushDebugGroup`.
    fn push_debug_group(&mut self, id: u32, name: &str);
    /// `glPopDebugGroup`.
    fn pop_debug_group(&mut self);
    /// `glDebugMessageInsert`.
    fn debug_message(&mut self, id: u32, message: &str);
}

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

//! The OpenGL-style implementation of [`RenderBackend`].

use super::api::GlApi;
use super::dispatch::{self, GlContext};
use super::persistent_buffer::PersistentBuffer;
use super::registry::{GeometryBinding, RegisteredPipeline};
use super::render_target::RenderTargetDescriptor;
use kiln_core::renderer::command::BatchReport;
use kiln_core::renderer::resources::{BufferRange, SamplerDescriptor, TextureDescriptor};
use kiln_core::renderer::state::PipelineDescriptor;
use kiln_core::renderer::{
    BufferId, CommandBuffer, FrameStats, ImguiRenderer, PipelineHash, RenderBackend,
    RenderSettings, RenderTargetId, ResourceError, SamplerHash, TextRenderer, TextureId,
};
use std::fmt;

/// A [`RenderBackend`] driving a [`GlApi`] device.
///
/// All tracker, pool and cache state lives in the owned [`GlContext`]; the
/// backend adds resource registration on top of it. Resources registered
/// here are referenced by hash or id from recorded commands.
pub struct GlBackend<A: GlApi> {
    api: A,
    context: GlContext,
    settings: RenderSettings,
    last_frame_stats: FrameStats,
}

impl<A: GlApi> fmt::Debug for GlBackend<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlBackend")
            .field("context", &self.context)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<A: GlApi> GlBackend<A> {
    /// Wraps `api`, whose default framebuffer is `width` x `height`.
    pub fn new(api: A, settings: RenderSettings, width: u32, height: u32) -> Self {
        let limits = api.limits();
        log::info!(
            "GL backend: {} frames in flight, {} texture units, {} color attachments",
            settings.frames_in_flight,
            limits.max_texture_units,
            limits.max_color_attachments
        );
        let context = GlContext::new(&settings, limits, width, height);
        Self {
            api,
            context,
            settings,
            last_frame_stats: FrameStats::default(),
        }
    }

    /// The device.
    pub fn api(&self) -> &A {
        &self.api
    }

    /// The device, mutably. Calls made here bypass the state tracker.
    pub fn api_mut(&mut self) -> &mut A {
        &mut self.api
    }

    /// The dispatch context.
    pub fn context(&self) -> &GlContext {
        &self.context
    }

    /// The settings the backend was created with.
    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Statistics of the last completed frame.
    pub fn last_frame_stats(&self) -> &FrameStats {
        &self.last_frame_stats
    }

    /// Adds batching results to the current frame's counters.
    pub fn record_batch(&mut self, report: BatchReport) {
        self.context.record_batch(report);
    }

    /// Registers a pipeline and its state block; returns the hash draw
    /// commands bind it by.
    pub fn register_pipeline(&mut self, descriptor: PipelineDescriptor) -> PipelineHash {
        let state_block = self
            .context
            .tracker
            .register_state_block(descriptor.state_block);
        let hash = self.context.registry.insert_pipeline(RegisteredPipeline {
            descriptor,
            state_block,
        });
        log::debug!("registered pipeline {hash:?}");
        hash
    }

    /// Registers a sampler; the sampler object is created on first use.
    pub fn register_sampler(&mut self, descriptor: SamplerDescriptor) -> SamplerHash {
        self.context.registry.insert_sampler(descriptor)
    }

    /// Creates a texture.
    pub fn create_texture(
        &mut self,
        descriptor: TextureDescriptor,
    ) -> Result<TextureId, ResourceError> {
        if descriptor.width == 0 || descriptor.height == 0 || descriptor.mip_levels == 0 {
            return Err(ResourceError::InvalidDescriptor {
                label: descriptor.name,
                reason: format!(
                    "{}x{} with {} mip levels",
                    descriptor.width, descriptor.height, descriptor.mip_levels
                ),
            });
        }
        let texture = self.api.create_texture(&descriptor);
        self.context.registry.insert_texture(texture, descriptor);
        Ok(texture)
    }

    /// Deletes a texture and every cached view, handle and binding of it.
    pub fn destroy_texture(&mut self, texture: TextureId) -> Result<(), ResourceError> {
        if self.context.registry.texture(texture).is_none() {
            return Err(ResourceError::UnknownTexture(texture));
        }
        self.context.forget_texture(&mut self.api, texture);
        self.api.delete_texture(texture);
        Ok(())
    }

    /// Creates a vertex buffer of `size` bytes.
    pub fn create_buffer(&mut self, size: usize) -> BufferId {
        self.api.create_buffer(size, false)
    }

    /// Declares how draws sourcing `vertex_buffer` fetch their geometry.
    pub fn register_geometry(&mut self, vertex_buffer: BufferId, geometry: GeometryBinding) {
        self.context
            .registry
            .insert_geometry(vertex_buffer, geometry);
    }

    /// Creates a persistently mapped ring with one section per frame in flight.
    pub fn create_persistent_buffer(
        &mut self,
        section_size: usize,
        label: &'static str,
    ) -> PersistentBuffer {
        PersistentBuffer::new(
            &mut self.api,
            section_size,
            self.settings.frames_in_flight.max(1),
            label,
        )
    }

    /// Writes into the ring's write section once the GPU released it.
    pub fn write_persistent(
        &mut self,
        buffer: &mut PersistentBuffer,
        offset: usize,
        data: &[u8],
    ) -> BufferRange {
        buffer.write_bytes(&mut self.api, &mut self.context.locks, offset, data)
    }

    /// Fences the ring's write section for the current frame and advances it.
    pub fn submit_persistent(&mut self, buffer: &mut PersistentBuffer) {
        let frame = self.context.frame_index();
        buffer.lock_write_section(&mut self.api, &mut self.context.locks, frame);
        buffer.advance();
    }

    /// Allocates an off-screen render target.
    pub fn create_render_target(&mut self, descriptor: RenderTargetDescriptor) -> RenderTargetId {
        let id = self
            .context
            .render_targets
            .allocate(&mut self.api, descriptor);
        if let Some(target) = self.context.render_targets.get(id) {
            log::debug!(
                "render target '{}' ({:?}) allocated",
                target.descriptor().name,
                id
            );
        }
        id
    }

    /// Schedules a render target for destruction once the GPU is done with it.
    pub fn destroy_render_target(&mut self, id: RenderTargetId) -> Result<(), ResourceError> {
        let frame = self.context.frame_index();
        if self.context.render_targets.deallocate(id, frame) {
            Ok(())
        } else {
            Err(ResourceError::UnknownRenderTarget(id))
        }
    }

    /// Resizes the default framebuffer.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.context.render_targets.resize_screen(width, height);
    }

    /// Installs the collaborator invoked for `DRAW_TEXT`.
    pub fn set_text_renderer(&mut self, renderer: Box<dyn TextRenderer>) {
        self.context.text_renderer = Some(renderer);
    }

    /// Installs the collaborator invoked for `DRAW_IMGUI`.
    pub fn set_imgui_renderer(&mut self, renderer: Box<dyn ImguiRenderer>) {
        self.context.imgui_renderer = Some(renderer);
    }

    /// Waits for the GPU and deletes every pooled and cached object.
    pub fn shutdown(&mut self) {
        let ctx = &mut self.context;
        ctx.frame_fences.wait_all(&mut self.api);
        ctx.locks.cleanup_expired(&mut self.api, Some(u64::MAX));
        ctx.queries.destroy_all(&mut self.api);
        ctx.views.destroy_all(&mut self.api);
        ctx.residency.destroy_all(&mut self.api);
        for texture in ctx.render_targets.destroy_all(&mut self.api) {
            ctx.tracker.forget_texture(texture);
        }
        log::debug!("GL backend shut down after {} frames", ctx.frame_index());
    }
}

impl<A: GlApi> RenderBackend for GlBackend<A> {
    fn begin_frame(&mut self) {
        self.context.begin_frame(&mut self.api);
    }

    fn flush_command_buffer(&mut self, buffer: &CommandBuffer) {
        dispatch::flush_command_buffer(&mut self.context, &mut self.api, buffer);
    }

    fn end_frame(&mut self) -> FrameStats {
        let stats = self.context.end_frame(&mut self.api);
        self.last_frame_stats = stats.clone();
        stats
    }

    fn frame_stats(&self) -> &FrameStats {
        self.context.stats()
    }
}

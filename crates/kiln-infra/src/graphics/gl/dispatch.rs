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

//! The command interpreter.
//!
//! [`flush_command`] turns one recorded command into device calls, routing
//! every state change through the context's [`GlStateTracker`]. Failures
//! follow two classes:
//!
//! * resource-not-ready conditions (a pipeline whose program is still
//!   compiling, push constants with no pipeline bound, a missing text
//!   renderer) skip the command and are logged once per distinct cause;
//! * broken command sequences, device limit violations and pools still
//!   exhausted after one reclaim pass panic.

use super::api::{FramebufferTarget, GlApi, ProgramStatus, QueryTarget};
use super::query_pool::QueryPool;
use super::registry::ResourceRegistry;
use super::render_target::{RenderTarget, RenderTargetInternal, RenderTargetPool};
use super::residency::ResidencyCaches;
use super::state_tracker::{BindResult, GlStateTracker, TextureBinding};
use super::sync::{FrameFences, LockManager};
use super::view_cache::TextureViewCache;
use ahash::AHashSet;
use kiln_core::math::Rect;
use kiln_core::renderer::command::*;
use kiln_core::renderer::resources::{
    BufferTarget, IndexFormat, SubresourceRange, TextureTarget, TextureViewDescriptor,
    VertexLayout,
};
use kiln_core::renderer::state::{BlendState, PolygonMode};
use kiln_core::renderer::{
    BufferId, DeviceLimits, FrameStats, FramebufferId, GenericDrawCommand, ImguiRenderer,
    IndirectDrawCommand, PipelineError, PipelineHash, QueryId, RenderOptions, RenderSettings,
    RenderTargetId, ResourceError, SamplerHash, SamplerObject, ShaderProgramId, StateBlockHash,
    TextRenderer, TextureId,
};
use thiserror::Error;

/// Why a command was skipped.
#[derive(Debug, Error)]
enum Skip {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error("{what} without a bound pipeline")]
    NoPipeline { what: &'static str },
    #[error("program {program:?} has no active uniform '{name}'")]
    UnknownUniform {
        program: ShaderProgramId,
        name: String,
    },
    #[error("unknown sampler {0:?}")]
    UnknownSampler(SamplerHash),
    #[error("DRAW_TEXT without a text renderer")]
    NoTextRenderer,
    #[error("DRAW_IMGUI without a UI renderer")]
    NoImguiRenderer,
}

/// Outcome of [`flush_command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flushed {
    /// The command executed.
    Executed,
    /// The command was skipped by a fail-soft path.
    Skipped,
}

#[derive(Debug, Clone, Copy)]
struct BoundPipeline {
    hash: PipelineHash,
    program: ShaderProgramId,
    state_block: StateBlockHash,
    rasterization: bool,
}

#[derive(Debug)]
struct ActivePass {
    target: RenderTargetId,
    name: String,
    debug_scope: bool,
    sub_pass: bool,
}

#[derive(Debug)]
struct QueryGroup {
    tag: u32,
    queries: Vec<(QueryTarget, QueryId)>,
}

#[derive(Debug, Clone, Copy)]
struct GeometrySource {
    index_format: Option<IndexFormat>,
    indirect: bool,
}

/// Everything one rendering context owns: the state mirror, resource
/// caches, synchronization state and the render-pass state machine.
pub struct GlContext {
    pub(crate) tracker: GlStateTracker,
    pub(crate) registry: ResourceRegistry,
    pub(crate) render_targets: RenderTargetPool,
    pub(crate) locks: LockManager,
    pub(crate) frame_fences: FrameFences,
    pub(crate) views: TextureViewCache,
    pub(crate) residency: ResidencyCaches,
    pub(crate) queries: QueryPool,
    pub(crate) text_renderer: Option<Box<dyn TextRenderer>>,
    pub(crate) imgui_renderer: Option<Box<dyn ImguiRenderer>>,
    stats: FrameStats,
    frame: u64,
    internal: RenderTargetInternal,
    pass: Option<ActivePass>,
    pipeline: Option<BoundPipeline>,
    viewport_stack: Vec<Rect>,
    query_groups: Vec<QueryGroup>,
    frame_views: Vec<TextureId>,
    reported: AHashSet<String>,
}

impl std::fmt::Debug for GlContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlContext")
            .field("frame", &self.frame)
            .field("pass", &self.pass)
            .field("tracker", &self.tracker)
            .field("text_renderer", &self.text_renderer.is_some())
            .field("imgui_renderer", &self.imgui_renderer.is_some())
            .finish_non_exhaustive()
    }
}

impl GlContext {
    /// Creates a context for a device with `limits` and a default
    /// framebuffer of `width` x `height`.
    pub fn new(settings: &RenderSettings, limits: DeviceLimits, width: u32, height: u32) -> Self {
        let frames_in_flight = settings.frames_in_flight.max(1);
        Self {
            tracker: GlStateTracker::new(limits, settings.texture_bind_gap_threshold),
            registry: ResourceRegistry::new(),
            render_targets: RenderTargetPool::new(width, height, frames_in_flight as u64),
            locks: LockManager::new(settings.fence_wait_timeout_ns),
            frame_fences: FrameFences::new(frames_in_flight, settings.fence_wait_timeout_ns),
            views: TextureViewCache::new(
                settings.view_cache_capacity,
                settings.view_recycle_delay_frames,
            ),
            residency: ResidencyCaches::new(settings.residency_reclaim_delay_frames),
            queries: QueryPool::new(settings.query_pool_capacity),
            text_renderer: None,
            imgui_renderer: None,
            stats: FrameStats::new(0),
            frame: 0,
            internal: RenderTargetInternal::new(),
            pass: None,
            pipeline: None,
            viewport_stack: Vec::new(),
            query_groups: Vec::new(),
            frame_views: Vec::new(),
            reported: AHashSet::new(),
        }
    }

    /// The state mirror.
    pub fn tracker(&self) -> &GlStateTracker {
        &self.tracker
    }

    /// Registered pipelines, samplers, textures and geometry.
    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// The render targets.
    pub fn render_targets(&self) -> &RenderTargetPool {
        &self.render_targets
    }

    /// Buffer range locks.
    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// Statistics of the frame being recorded.
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Index of the frame being recorded.
    pub fn frame_index(&self) -> u64 {
        self.frame
    }

    /// Returns `true` between `BEGIN_RENDER_PASS` and `END_RENDER_PASS`.
    pub fn in_render_pass(&self) -> bool {
        self.pass.is_some()
    }

    /// Adds the outcome of a batching pass to the frame counters.
    pub fn record_batch(&mut self, report: BatchReport) {
        self.stats.commands_merged += report.merged as u32;
        self.stats.commands_removed += report.removed as u32;
    }

    /// Starts a frame: waits for the oldest frame in flight and resets the device state.
    pub fn begin_frame<A: GlApi>(&mut self, api: &mut A) {
        self.stats = FrameStats::new(self.frame);
        if self.frame_fences.begin_frame(api, self.frame) {
            self.stats.fence_waits += 1;
        }
        self.tracker.clear_states(api);
        self.pipeline = None;
        self.viewport_stack.clear();
        log::trace!("frame {} begins", self.frame);
    }

    /// Finishes the frame and reclaims whatever the GPU no longer uses.
    ///
    /// # Panics
    ///
    /// Panics if a render pass or a GPU query group is still open.
    pub fn end_frame<A: GlApi>(&mut self, api: &mut A) -> FrameStats {
        if let Some(pass) = &self.pass {
            panic!("frame {} ended inside render pass '{}'", self.frame, pass.name);
        }
        assert!(
            self.query_groups.is_empty(),
            "frame {} ended with {} open GPU query group(s)",
            self.frame,
            self.query_groups.len()
        );

        for view in self.frame_views.drain(..) {
            self.views.release(view, self.frame);
        }
        self.queries.collect(api, false);
        self.frame_fences.end_frame(api, self.frame);
        self.locks
            .cleanup_expired(api, self.frame_fences.completed_frame());
        let evictions = self.residency.evict_unused(api, self.frame);
        for texture in self.render_targets.collect(api, self.frame) {
            self.forget_texture(api, texture);
        }

        let (issued, elided) = self.tracker.take_counters();
        let (fences_created, fence_waits) = self.locks.take_counters();
        let stats = &mut self.stats;
        stats.state_changes += issued;
        stats.state_changes_elided += elided;
        stats.fences_created += fences_created;
        stats.fence_waits += fence_waits;
        stats.views_created += self.views.take_views_created();
        stats.residency_evictions += evictions as u32;
        stats.query_results.extend(self.queries.take_results());

        log::trace!("frame {} ends: {:?}", self.frame, self.stats);
        self.frame += 1;
        std::mem::replace(&mut self.stats, FrameStats::new(self.frame))
    }

    /// Drops every cached reference to `texture` before it is deleted.
    pub(crate) fn forget_texture<A: GlApi>(&mut self, api: &mut A, texture: TextureId) {
        self.tracker.forget_texture(texture);
        self.residency.forget_texture(api, texture);
        self.views.forget_source(api, texture);
        self.registry.remove_texture(texture);
    }

    fn report(&mut self, skip: &Skip) {
        let message = skip.to_string();
        if self.reported.insert(message.clone()) {
            log::warn!("skipping command: {message}");
        } else {
            log::trace!("skipping command: {message}");
        }
    }

    fn require_pipeline(&self, what: &'static str) -> Result<BoundPipeline, Skip> {
        self.pipeline.ok_or(Skip::NoPipeline { what })
    }

    /// Takes a view from the cache, reclaiming once if the cache is full.
    fn acquire_view<A: GlApi>(
        &mut self,
        api: &mut A,
        descriptor: &TextureViewDescriptor,
    ) -> TextureId {
        match self.views.acquire(api, descriptor, self.frame) {
            Ok(view) => view,
            Err(first) => {
                log::warn!("{first}; waiting for frames in flight and reclaiming");
                self.frame_fences.wait_all(api);
                self.views.force_reclaim(api);
                match self.views.acquire(api, descriptor, self.frame) {
                    Ok(view) => view,
                    Err(err) => panic!("{err} after a reclaim pass: raise view_cache_capacity"),
                }
            }
        }
    }

    /// Takes a query object, reclaiming once if the pool is empty.
    fn acquire_query<A: GlApi>(&mut self, api: &mut A) -> QueryId {
        match self.queries.allocate(api) {
            Ok(query) => query,
            Err(first) => {
                log::warn!("{first}; waiting for pending query results");
                self.queries.collect(api, true);
                match self.queries.allocate(api) {
                    Ok(query) => query,
                    Err(err) => panic!("{err} after a reclaim pass: raise query_pool_capacity"),
                }
            }
        }
    }

    fn sampler_object<A: GlApi>(
        &mut self,
        api: &mut A,
        hash: SamplerHash,
    ) -> Result<SamplerObject, Skip> {
        let descriptor = self
            .registry
            .sampler(hash)
            .copied()
            .ok_or(Skip::UnknownSampler(hash))?;
        Ok(self.residency.sampler(api, &descriptor, self.frame))
    }
}

/// Executes every command of `buffer` in recorded order.
pub fn flush_command_buffer<A: GlApi>(ctx: &mut GlContext, api: &mut A, buffer: &CommandBuffer) {
    ctx.stats.command_buffers += 1;
    for command in buffer.iter() {
        flush_command(ctx, api, command);
    }
}

/// Executes one command.
///
/// # Panics
///
/// Panics on broken command sequences (nested or unmatched render passes,
/// sub-passes outside a pass, unbalanced debug scopes, viewport stack
/// underflow, instanced multi-draws), on device limit violations, and when
/// the view cache or query pool stays exhausted after a reclaim pass.
pub fn flush_command<A: GlApi>(
    ctx: &mut GlContext,
    api: &mut A,
    command: CommandRef<'_>,
) -> Flushed {
    log::trace!("flush {}", command.command_type().name());
    let result = match command {
        CommandRef::BeginRenderPass(c) => begin_render_pass(ctx, api, c),
        CommandRef::EndRenderPass(c) => end_render_pass(ctx, api, c),
        CommandRef::BeginRenderSubPass(c) => begin_render_sub_pass(ctx, api, c),
        CommandRef::EndRenderSubPass(_) => end_render_sub_pass(ctx),
        CommandRef::BindPipeline(c) => bind_pipeline(ctx, api, c),
        CommandRef::SetViewport(c) => {
            ctx.tracker.set_viewport(api, c.viewport);
            Ok(())
        }
        CommandRef::PushViewport(c) => {
            let current = ctx.tracker.viewport().unwrap_or_else(|| active_extent(ctx));
            ctx.viewport_stack.push(current);
            ctx.tracker.set_viewport(api, c.viewport);
            Ok(())
        }
        CommandRef::PopViewport(_) => {
            let Some(previous) = ctx.viewport_stack.pop() else {
                panic!("POP_VIEWPORT with an empty viewport stack");
            };
            ctx.tracker.set_viewport(api, previous);
            Ok(())
        }
        CommandRef::SetScissor(c) => {
            ctx.tracker.set_scissor(api, c.scissor);
            Ok(())
        }
        CommandRef::SetClipPlanes(c) => set_clip_planes(ctx, api, c),
        CommandRef::SendPushConstants(c) => send_push_constants(ctx, api, c),
        CommandRef::BindDescriptorSets(c) => bind_descriptor_sets(ctx, api, c),
        CommandRef::MemoryBarrier(c) => {
            if !c.mask.is_empty() {
                api.memory_barrier(c.mask);
            }
            ctx.locks.lock_ranges(api, &c.buffer_locks, ctx.frame);
            Ok(())
        }
        CommandRef::DrawCommands(c) => draw_commands(ctx, api, c),
        CommandRef::DispatchCompute(c) => dispatch_compute(ctx, api, c),
        CommandRef::ComputeMipMaps(c) => compute_mip_maps(ctx, api, c),
        CommandRef::CopyTexture(c) => {
            api.copy_image(
                c.source,
                c.source_mip,
                c.source_origin,
                c.destination,
                c.destination_mip,
                c.destination_origin,
                c.extent,
            );
            Ok(())
        }
        CommandRef::ClearTexture(c) => {
            api.clear_texture(c.texture, c.mip_level, c.layers, c.color);
            Ok(())
        }
        CommandRef::ReadBufferData(c) => {
            ctx.locks.wait_for_locked_range(api, c.buffer, c.range, true);
            let bytes = api.read_buffer_data(c.buffer, c.range);
            if let Some(reply) = &c.reply {
                if reply.send(bytes).is_err() {
                    log::debug!("READ_BUFFER_DATA reply dropped for {:?}", c.buffer);
                }
            }
            Ok(())
        }
        CommandRef::ClearBufferData(c) => {
            api.clear_buffer_data(c.buffer, c.range, c.value);
            Ok(())
        }
        CommandRef::BeginGpuQuery(c) => {
            let mut queries = Vec::new();
            for target in QueryTarget::from_mask(c.mask) {
                let query = ctx.acquire_query(api);
                api.begin_query(target, query);
                queries.push((target, query));
            }
            ctx.query_groups.push(QueryGroup {
                tag: c.tag,
                queries,
            });
            Ok(())
        }
        CommandRef::EndGpuQuery(c) => {
            let Some(group) = ctx.query_groups.pop() else {
                panic!("END_GPU_QUERY without a matching BEGIN_GPU_QUERY");
            };
            for (target, query) in group.queries {
                api.end_query(target);
                ctx.queries.submit(query, group.tag, target);
            }
            if c.wait_for_results {
                ctx.queries.collect(api, true);
            }
            Ok(())
        }
        CommandRef::BlitRenderTarget(c) => {
            let source = target_or_panic(&ctx.render_targets, c.source, "BLIT_RENDER_TARGET");
            let destination =
                target_or_panic(&ctx.render_targets, c.destination, "BLIT_RENDER_TARGET");
            source.blit_to(&ctx.internal, api, destination, &c.color_pairs, c.blit_depth);
            Ok(())
        }
        CommandRef::BeginDebugScope(c) => {
            ctx.tracker.push_debug_scope(api, &c.name, c.id);
            Ok(())
        }
        CommandRef::EndDebugScope(_) => {
            assert!(
                ctx.tracker.pop_debug_scope(api),
                "END_DEBUG_SCOPE without an open debug scope"
            );
            Ok(())
        }
        CommandRef::AddDebugMessage(c) => {
            api.debug_message(c.id, &c.message);
            Ok(())
        }
        CommandRef::DrawText(c) => match ctx.text_renderer.as_mut() {
            Some(renderer) => {
                renderer.draw_text(&c.batch);
                Ok(())
            }
            None => Err(Skip::NoTextRenderer),
        },
        CommandRef::DrawImgui(c) => match ctx.imgui_renderer.as_mut() {
            Some(renderer) => {
                renderer.render(c.context_id);
                Ok(())
            }
            None => Err(Skip::NoImguiRenderer),
        },
    };

    match result {
        Ok(()) => {
            ctx.stats.commands_flushed += 1;
            Flushed::Executed
        }
        Err(skip) => {
            ctx.report(&skip);
            ctx.stats.commands_skipped += 1;
            Flushed::Skipped
        }
    }
}

fn target_or_panic<'a>(
    pool: &'a RenderTargetPool,
    id: RenderTargetId,
    command: &str,
) -> &'a RenderTarget {
    match pool.get(id) {
        Some(target) => target,
        None => panic!("{command} names unknown render target {id:?}"),
    }
}

fn active_extent(ctx: &GlContext) -> Rect {
    let id = ctx
        .pass
        .as_ref()
        .map_or(RenderTargetId::SCREEN, |pass| pass.target);
    ctx.render_targets
        .get(id)
        .map(|target| target.extent_at(target.mip_level()))
        .unwrap_or_default()
}

// --- Render passes ---

fn begin_render_pass<A: GlApi>(
    ctx: &mut GlContext,
    api: &mut A,
    command: &BeginRenderPassCommand,
) -> Result<(), Skip> {
    if let Some(active) = &ctx.pass {
        panic!(
            "BEGIN_RENDER_PASS while a render pass is already active ('{}' on {:?})",
            active.name, active.target
        );
    }
    let Some(target) = ctx.render_targets.get_mut(command.target, ctx.frame) else {
        panic!(
            "BEGIN_RENDER_PASS '{}' names unknown render target {:?}",
            command.name, command.target
        );
    };

    let debug_scope = !command.name.is_empty();
    if debug_scope {
        ctx.tracker.push_debug_scope(api, &command.name, command.target.0);
    }
    target.begin(
        &ctx.internal,
        api,
        &mut ctx.tracker,
        &command.clear,
        command.draw_mask,
    );
    ctx.tracker.set_active_render_target(Some(command.target));
    ctx.pass = Some(ActivePass {
        target: command.target,
        name: command.name.to_string(),
        debug_scope,
        sub_pass: false,
    });
    Ok(())
}

fn end_render_pass<A: GlApi>(
    ctx: &mut GlContext,
    api: &mut A,
    command: &EndRenderPassCommand,
) -> Result<(), Skip> {
    let Some(pass) = ctx.pass.take() else {
        panic!("END_RENDER_PASS without an active render pass");
    };
    if let Some(target) = ctx.render_targets.get_mut(pass.target, ctx.frame) {
        target.end(&ctx.internal, api, &mut ctx.tracker);
    }
    if command.restore_default_target {
        ctx.tracker
            .set_active_fb(api, FramebufferTarget::Draw, FramebufferId(0));
        if let Some(screen) = ctx.render_targets.get(RenderTargetId::SCREEN) {
            ctx.tracker.set_viewport(api, screen.extent_at(0));
        }
    }
    if pass.debug_scope {
        ctx.tracker.pop_debug_scope(api);
    }
    ctx.tracker.set_active_render_target(None);
    Ok(())
}

fn begin_render_sub_pass<A: GlApi>(
    ctx: &mut GlContext,
    api: &mut A,
    command: &BeginRenderSubPassCommand,
) -> Result<(), Skip> {
    let Some(pass) = ctx.pass.as_mut() else {
        panic!("BEGIN_RENDER_SUB_PASS outside a render pass");
    };
    assert!(!pass.sub_pass, "BEGIN_RENDER_SUB_PASS while a sub-pass is already active");
    let Some(target) = ctx.render_targets.get_mut(pass.target, ctx.frame) else {
        panic!("render target {:?} vanished during its render pass", pass.target);
    };
    target.set_mip_level(&ctx.internal, api, &mut ctx.tracker, command.mip_level);
    for layer in &command.write_layers {
        target.draw_to_layer(&ctx.internal, api, layer.slot, layer.layer);
    }
    pass.sub_pass = true;
    Ok(())
}

fn end_render_sub_pass(ctx: &mut GlContext) -> Result<(), Skip> {
    let Some(pass) = ctx.pass.as_mut() else {
        panic!("END_RENDER_SUB_PASS outside a render pass");
    };
    assert!(pass.sub_pass, "END_RENDER_SUB_PASS without an active sub-pass");
    pass.sub_pass = false;
    Ok(())
}

// --- Pipeline state ---

fn bind_pipeline<A: GlApi>(
    ctx: &mut GlContext,
    api: &mut A,
    command: &BindPipelineCommand,
) -> Result<(), Skip> {
    if ctx.pipeline.is_some_and(|bound| {
        bound.hash == command.pipeline
            && (command.program.0 == 0 || bound.program == command.program)
    }) {
        return Ok(());
    }
    // Whatever happens next, draws must not run with the previous pipeline.
    ctx.pipeline = None;

    let registered = ctx
        .registry
        .pipeline(command.pipeline)
        .cloned()
        .ok_or(PipelineError::UnknownPipeline(command.pipeline))?;
    let program = if command.program.0 != 0 {
        command.program
    } else {
        registered.descriptor.program
    };
    match api.program_status(program) {
        ProgramStatus::Ready => {}
        ProgramStatus::Failed(log) => {
            return Err(PipelineError::ProgramFailed { program, log }.into())
        }
        ProgramStatus::Compiling | ProgramStatus::Unknown => {
            return Err(PipelineError::ProgramNotReady(program).into())
        }
    }

    let state_block = registered.state_block;
    let rasterization = registered.descriptor.state_block.rasterization;
    let attachments = ctx.tracker.limits().max_color_attachments as usize;
    let blending: Vec<_> = (0..attachments)
        .map(|i| {
            registered
                .descriptor
                .blend_states
                .get(i)
                .copied()
                .unwrap_or(BlendState::OPAQUE)
        })
        .collect();

    if ctx.tracker.set_state_block(api, state_block) == BindResult::Failed {
        ctx.tracker.register_state_block(registered.descriptor.state_block);
        ctx.tracker.set_state_block(api, state_block);
    }
    for (draw_buffer, state) in blending.iter().enumerate() {
        ctx.tracker.set_blending(api, draw_buffer as u32, state);
    }
    if ctx.tracker.set_active_program(api, program) == BindResult::Failed {
        return Err(PipelineError::ProgramNotReady(program).into());
    }

    ctx.pipeline = Some(BoundPipeline {
        hash: command.pipeline,
        program,
        state_block,
        rasterization,
    });
    Ok(())
}

fn set_clip_planes<A: GlApi>(
    ctx: &mut GlContext,
    api: &mut A,
    command: &SetClipPlanesCommand,
) -> Result<(), Skip> {
    let max = ctx.tracker.limits().max_clip_planes;
    if let Some(plane) = (0..8u32).find(|&i| command.planes.enabled & (1 << i) != 0 && i >= max) {
        panic!("clip plane {plane} exceeds the device limit of {max} planes");
    }
    ctx.tracker.set_clipping_plane_state(api, &command.planes);
    Ok(())
}

fn send_push_constants<A: GlApi>(
    ctx: &mut GlContext,
    api: &mut A,
    command: &SendPushConstantsCommand,
) -> Result<(), Skip> {
    let pipeline = ctx.require_pipeline("SEND_PUSH_CONSTANTS")?;
    for constant in &command.constants.named {
        if !api.set_uniform(pipeline.program, &constant.name, &constant.value) {
            ctx.report(&Skip::UnknownUniform {
                program: pipeline.program,
                name: constant.name.to_string(),
            });
        }
    }
    if let Some(fast) = &command.constants.fast {
        api.upload_push_block(bytemuck::bytes_of(fast));
    }
    Ok(())
}

fn bind_descriptor_sets<A: GlApi>(
    ctx: &mut GlContext,
    api: &mut A,
    command: &BindDescriptorSetsCommand,
) -> Result<(), Skip> {
    let mut textures: Vec<(u32, TextureBinding)> = Vec::new();
    for binding in &command.set.bindings {
        let slot = u32::from(binding.slot);
        let resolved = match binding.resource {
            DescriptorResource::Texture {
                texture,
                target,
                sampler,
            } => ctx.sampler_object(api, sampler).map(|sampler| {
                textures.push((
                    slot,
                    TextureBinding {
                        target,
                        texture,
                        sampler,
                    },
                ));
            }),
            DescriptorResource::TextureView {
                texture,
                target,
                range,
                sampler,
            } => bind_view(ctx, api, texture, target, range, sampler)
                .map(|binding| textures.push((slot, binding))),
            DescriptorResource::ResidentTexture { texture, sampler } => {
                ctx.require_pipeline("bindless texture").and_then(|pipeline| {
                    let sampler = ctx.sampler_object(api, sampler)?;
                    let handle = ctx.residency.make_resident(api, texture, sampler, ctx.frame);
                    api.set_uniform_handle(pipeline.program, slot, handle);
                    Ok(())
                })
            }
            DescriptorResource::Buffer {
                buffer,
                target,
                range,
            } => {
                ctx.tracker
                    .set_active_buffer_range(api, target, slot, buffer, range);
                Ok(())
            }
            DescriptorResource::Image {
                texture,
                level,
                layer,
                access,
            } => {
                ctx.tracker.bind_image(api, slot, texture, level, layer, access);
                Ok(())
            }
        };
        if let Err(skip) = resolved {
            ctx.report(&skip);
        }
    }

    textures.sort_by_key(|(slot, _)| *slot);
    let mut start = 0;
    while start < textures.len() {
        let mut end = start + 1;
        while end < textures.len() && textures[end].0 == textures[end - 1].0 + 1 {
            end += 1;
        }
        let run: Vec<TextureBinding> = textures[start..end].iter().map(|(_, b)| *b).collect();
        ctx.tracker.bind_textures(api, textures[start].0, &run);
        start = end;
    }
    Ok(())
}

fn bind_view<A: GlApi>(
    ctx: &mut GlContext,
    api: &mut A,
    texture: TextureId,
    target: TextureTarget,
    range: SubresourceRange,
    sampler: SamplerHash,
) -> Result<TextureBinding, Skip> {
    let format = ctx
        .registry
        .texture(texture)
        .map(|descriptor| descriptor.format)
        .ok_or(ResourceError::UnknownTexture(texture))?;
    let sampler = ctx.sampler_object(api, sampler)?;
    let view = ctx.acquire_view(
        api,
        &TextureViewDescriptor {
            source: texture,
            target,
            format,
            range,
        },
    );
    ctx.frame_views.push(view);
    Ok(TextureBinding {
        target,
        texture: view,
        sampler,
    })
}

// --- Draws and compute ---

fn draw_commands<A: GlApi>(
    ctx: &mut GlContext,
    api: &mut A,
    command: &DrawCommandsCommand,
) -> Result<(), Skip> {
    let pipeline = ctx.require_pipeline("DRAW_COMMANDS")?;
    for draw in command.draws.iter().filter(|draw| !draw.is_noop()) {
        assert!(
            !draw.is_invalid_multi_draw(),
            "DRAW_COMMANDS: a multi-draw of {} records cannot be instanced ({} instances)",
            draw.draw_count,
            draw.cmd.instance_count
        );
        match bind_geometry(ctx, api, draw.source_buffer) {
            Ok(source) => submit_draw(ctx, api, &pipeline, draw, source),
            Err(skip) => ctx.report(&skip),
        }
    }
    Ok(())
}

fn bind_geometry<A: GlApi>(
    ctx: &mut GlContext,
    api: &mut A,
    source: BufferId,
) -> Result<GeometrySource, Skip> {
    let GlContext {
        registry,
        residency,
        tracker,
        frame,
        ..
    } = ctx;

    if source.is_none() {
        let vao = residency.vao(api, &VertexLayout::default(), *frame);
        tracker.set_active_vao(api, vao);
        return Ok(GeometrySource {
            index_format: None,
            indirect: false,
        });
    }

    let geometry = registry
        .geometry(source)
        .ok_or(ResourceError::UnknownBuffer(source))?;
    let vao = residency.vao(api, &geometry.vertex_layout, *frame);
    tracker.set_active_vao(api, vao);
    tracker.set_active_buffer(api, BufferTarget::Vertex, source);
    if let Some((indices, _)) = geometry.index_buffer {
        tracker.set_active_buffer(api, BufferTarget::Index, indices);
    }
    if let Some(indirect) = geometry.indirect_buffer {
        tracker.set_active_buffer(api, BufferTarget::DrawIndirect, indirect);
    }
    Ok(GeometrySource {
        index_format: geometry.index_buffer.map(|(_, format)| format),
        indirect: geometry.indirect_buffer.is_some(),
    })
}

fn submit_draw<A: GlApi>(
    ctx: &mut GlContext,
    api: &mut A,
    pipeline: &BoundPipeline,
    draw: &GenericDrawCommand,
    source: GeometrySource,
) {
    let options = draw.render_options;
    let discard = options.contains(RenderOptions::NO_RASTERIZATION);
    if discard {
        ctx.tracker.toggle_rasterization(api, false);
    }

    let mut queries = Vec::new();
    for (flag, target) in [
        (RenderOptions::QUERY_PRIMITIVE_COUNT, QueryTarget::PrimitivesGenerated),
        (RenderOptions::QUERY_SAMPLE_COUNT, QueryTarget::SamplesPassed),
    ] {
        if options.contains(flag) {
            let query = ctx.acquire_query(api);
            api.begin_query(target, query);
            queries.push((target, query));
        }
    }

    if options.contains(RenderOptions::RENDER_GEOMETRY) {
        issue_draw(ctx, api, draw, source);
    }
    if options.contains(RenderOptions::RENDER_WIREFRAME) {
        ctx.tracker.set_polygon_mode(api, PolygonMode::Line);
        issue_draw(ctx, api, draw, source);
        ctx.tracker.set_state_block(api, pipeline.state_block);
    }

    for (target, query) in queries {
        api.end_query(target);
        ctx.queries.submit(query, u32::MAX, target);
    }
    if discard {
        ctx.tracker.toggle_rasterization(api, pipeline.rasterization);
    }
}

fn issue_draw<A: GlApi>(
    ctx: &mut GlContext,
    api: &mut A,
    draw: &GenericDrawCommand,
    source: GeometrySource,
) {
    let cmd = &draw.cmd;
    if source.indirect {
        let offset = draw.command_offset as usize * IndirectDrawCommand::STRIDE;
        let count = u32::from(draw.draw_count);
        match source.index_format {
            Some(format) => api.multi_draw_elements_indirect(draw.topology, format, offset, count),
            None => api.multi_draw_arrays_indirect(draw.topology, offset, count),
        }
    } else {
        assert!(
            draw.draw_count == 1,
            "DRAW_COMMANDS: {} records from {:?} need an indirect buffer",
            draw.draw_count,
            draw.source_buffer
        );
        match source.index_format {
            Some(format) => api.draw_elements(
                draw.topology,
                format,
                cmd.index_count,
                cmd.first_index,
                cmd.instance_count,
                cmd.base_vertex,
                cmd.base_instance,
            ),
            None => api.draw_arrays(
                draw.topology,
                cmd.first_index,
                cmd.index_count,
                cmd.instance_count,
                cmd.base_instance,
            ),
        }
    }
    ctx.stats.draw_calls += 1;
}

fn dispatch_compute<A: GlApi>(
    ctx: &mut GlContext,
    api: &mut A,
    command: &DispatchComputeCommand,
) -> Result<(), Skip> {
    ctx.require_pipeline("DISPATCH_COMPUTE")?;
    ctx.tracker
        .limits()
        .assert_compute_dispatch(command.work_groups, command.local_size);
    if command.work_groups.contains(&0) {
        return Ok(());
    }
    api.dispatch_compute(command.work_groups);
    ctx.stats.compute_dispatches += 1;
    Ok(())
}

fn compute_mip_maps<A: GlApi>(
    ctx: &mut GlContext,
    api: &mut A,
    command: &ComputeMipMapsCommand,
) -> Result<(), Skip> {
    let descriptor = ctx
        .registry
        .texture(command.texture)
        .ok_or(ResourceError::UnknownTexture(command.texture))?;
    if command.range.covers(descriptor) {
        api.generate_mipmap(command.texture);
        return Ok(());
    }

    let (mip_count, layer_count) = command.range.resolve(descriptor);
    let view_descriptor = TextureViewDescriptor {
        source: command.texture,
        target: descriptor.target,
        format: descriptor.format,
        range: SubresourceRange {
            mip_count,
            layer_count,
            ..command.range
        },
    };
    let view = ctx.acquire_view(api, &view_descriptor);
    api.generate_mipmap(view);
    ctx.views.release(view, ctx.frame);
    Ok(())
}

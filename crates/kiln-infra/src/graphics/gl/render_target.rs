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

//! Render targets and the pool that owns them.
//!
//! Pass-level operations on a target (begin, clear, layer and mip
//! redirection, end) take a [`RenderTargetInternal`] capability that only
//! this crate can construct, so they are reachable from the dispatcher
//! alone.

use super::api::{FramebufferTarget, GlApi};
use super::state_tracker::GlStateTracker;
use ahash::AHashMap;
use kiln_core::math::Rect;
use kiln_core::renderer::command::{AttachmentSlot, ClearDescriptor, DrawMask};
use kiln_core::renderer::resources::{TextureDescriptor, TextureFormat, TextureTarget};
use kiln_core::renderer::{FramebufferId, RenderTargetId, SamplerHash, TextureId};

/// Grants access to the pass-level operations of [`RenderTarget`].
#[derive(Debug)]
pub struct RenderTargetInternal {
    _private: (),
}

impl RenderTargetInternal {
    pub(crate) fn new() -> Self {
        Self { _private: () }
    }
}

/// Format and sampling of one attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentDescriptor {
    /// Texel format, fixed for the lifetime of the target.
    pub format: TextureFormat,
    /// The sampler used when the attachment is read as a texture.
    pub sampler: SamplerHash,
}

/// Describes a render target to allocate.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTargetDescriptor {
    /// Debug name.
    pub name: String,
    /// Width of mip 0.
    pub width: u32,
    /// Height of mip 0.
    pub height: u32,
    /// Texture target of every attachment.
    pub target: TextureTarget,
    /// Layers per attachment (cube faces count as layers).
    pub layers: u16,
    /// Mip levels per attachment.
    pub mip_levels: u16,
    /// Color attachments.
    pub colors: Vec<AttachmentDescriptor>,
    /// Depth (or depth-stencil) attachment.
    pub depth: Option<AttachmentDescriptor>,
}

impl Default for RenderTargetDescriptor {
    fn default() -> Self {
        Self {
            name: String::new(),
            width: 1,
            height: 1,
            target: TextureTarget::Texture2D,
            layers: 1,
            mip_levels: 1,
            colors: Vec::new(),
            depth: None,
        }
    }
}

/// An owned attachment texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attachment {
    /// The texture rendered into.
    pub texture: TextureId,
    /// Its format.
    pub format: TextureFormat,
    /// Its sampler.
    pub sampler: SamplerHash,
}

/// A framebuffer and the textures it renders into.
#[derive(Debug)]
pub struct RenderTarget {
    id: RenderTargetId,
    descriptor: RenderTargetDescriptor,
    framebuffer: FramebufferId,
    colors: Vec<Attachment>,
    depth: Option<Attachment>,
    mip_level: u16,
    redirected: bool,
    draw_mask: DrawMask,
    last_used: u64,
}

impl RenderTarget {
    /// The target's id.
    pub fn id(&self) -> RenderTargetId {
        self.id
    }

    /// The descriptor it was allocated from.
    pub fn descriptor(&self) -> &RenderTargetDescriptor {
        &self.descriptor
    }

    /// The framebuffer object.
    pub fn framebuffer(&self) -> FramebufferId {
        self.framebuffer
    }

    /// Color attachment `index`.
    pub fn color_attachment(&self, index: usize) -> Option<&Attachment> {
        self.colors.get(index)
    }

    /// The depth attachment.
    pub fn depth_attachment(&self) -> Option<&Attachment> {
        self.depth.as_ref()
    }

    /// The mip level currently written.
    pub fn mip_level(&self) -> u16 {
        self.mip_level
    }

    /// The attachments written by the current pass.
    pub fn draw_mask(&self) -> DrawMask {
        self.draw_mask
    }

    /// The full extent of `mip`.
    pub fn extent_at(&self, mip: u16) -> Rect {
        let shift = u32::from(mip).min(31);
        Rect::from_size(
            (self.descriptor.width >> shift).max(1),
            (self.descriptor.height >> shift).max(1),
        )
    }

    fn is_screen(&self) -> bool {
        self.id == RenderTargetId::SCREEN
    }

    fn attachment(&self, slot: AttachmentSlot) -> Option<&Attachment> {
        match slot {
            AttachmentSlot::Color(index) => self.colors.get(index as usize),
            AttachmentSlot::Depth => self.depth.as_ref(),
        }
    }

    fn attach_all<A: GlApi>(&self, api: &mut A, mip: u16) {
        for (index, color) in self.colors.iter().enumerate() {
            let slot = AttachmentSlot::Color(index as u8);
            api.framebuffer_attachment(self.framebuffer, slot, color.texture, mip, None);
        }
        if let Some(depth) = &self.depth {
            let slot = AttachmentSlot::Depth;
            api.framebuffer_attachment(self.framebuffer, slot, depth.texture, mip, None);
        }
    }

    fn apply_draw_mask<A: GlApi>(&mut self, api: &mut A, mask: DrawMask) {
        if self.is_screen() || mask == self.draw_mask {
            return;
        }
        let buffers: Vec<Option<u8>> = (0..self.colors.len() as u8)
            .map(|index| mask.writes_color(index).then_some(index))
            .collect();
        api.draw_buffers(self.framebuffer, &buffers);
        self.draw_mask = mask;
    }

    /// Binds the framebuffer, applies the draw mask and clears, and sets the viewport.
    ///
    /// A mask without depth keeps depth writes off until [`end`](Self::end).
    pub fn begin<A: GlApi>(
        &mut self,
        internal: &RenderTargetInternal,
        api: &mut A,
        tracker: &mut GlStateTracker,
        clear: &ClearDescriptor,
        mask: DrawMask,
    ) {
        tracker.set_active_fb(api, FramebufferTarget::Draw, self.framebuffer);
        self.apply_draw_mask(api, mask);
        tracker.mask_depth_writes(api, !mask.depth);
        self.clear(internal, api, clear);
        tracker.set_viewport(api, self.extent_at(self.mip_level));
    }

    /// Clears the attachments selected by `clear` and the current draw mask.
    pub fn clear<A: GlApi>(
        &mut self,
        _internal: &RenderTargetInternal,
        api: &mut A,
        clear: &ClearDescriptor,
    ) {
        for (index, color) in clear.colors.iter().enumerate() {
            let Some(color) = color else { continue };
            if self.draw_mask.writes_color(index as u8) {
                api.clear_color(self.framebuffer, index as u32, *color);
            }
        }
        let has_depth = self.depth.is_some() || self.is_screen();
        let depth = clear.depth.filter(|_| has_depth && self.draw_mask.depth);
        let stencil = clear.stencil.filter(|_| has_depth);
        if depth.is_some() || stencil.is_some() {
            api.clear_depth_stencil(self.framebuffer, depth, stencil);
        }
    }

    /// Redirects one attachment to a single layer of the current mip level.
    ///
    /// # Panics
    ///
    /// Panics if the attachment does not exist or `layer` is out of range.
    pub fn draw_to_layer<A: GlApi>(
        &mut self,
        _internal: &RenderTargetInternal,
        api: &mut A,
        slot: AttachmentSlot,
        layer: u16,
    ) {
        assert!(
            layer < self.descriptor.layers,
            "layer {layer} out of range for render target '{}' with {} layers",
            self.descriptor.name,
            self.descriptor.layers
        );
        let Some(attachment) = self.attachment(slot).copied() else {
            panic!(
                "render target '{}' has no {slot:?} attachment",
                self.descriptor.name
            );
        };
        api.framebuffer_attachment(
            self.framebuffer,
            slot,
            attachment.texture,
            self.mip_level,
            Some(layer),
        );
        self.redirected = true;
    }

    /// Makes every attachment write `mip` and resizes the viewport to match.
    pub fn set_mip_level<A: GlApi>(
        &mut self,
        _internal: &RenderTargetInternal,
        api: &mut A,
        tracker: &mut GlStateTracker,
        mip: u16,
    ) {
        assert!(
            mip < self.descriptor.mip_levels,
            "mip level {mip} out of range for render target '{}' with {} levels",
            self.descriptor.name,
            self.descriptor.mip_levels
        );
        if mip != self.mip_level || self.redirected {
            self.attach_all(api, mip);
            self.mip_level = mip;
            self.redirected = mip != 0;
        }
        tracker.set_viewport(api, self.extent_at(mip));
    }

    /// Copies color attachment pairs `(source, destination)`, and optionally
    /// depth, from this target into `destination`.
    ///
    /// Framebuffers are addressed by name, so no binding changes.
    pub fn blit_to<A: GlApi>(
        &self,
        _internal: &RenderTargetInternal,
        api: &mut A,
        destination: &RenderTarget,
        color_pairs: &[(u8, u8)],
        depth: bool,
    ) {
        let source_rect = self.extent_at(self.mip_level);
        let destination_rect = destination.extent_at(destination.mip_level);
        for &(read, draw) in color_pairs {
            api.read_buffer(self.framebuffer, read);
            if !destination.is_screen() {
                let buffers: Vec<Option<u8>> = (0..destination.colors.len() as u8)
                    .map(|index| (index == draw).then_some(index))
                    .collect();
                api.draw_buffers(destination.framebuffer, &buffers);
            }
            api.blit_framebuffer(
                self.framebuffer,
                destination.framebuffer,
                source_rect,
                destination_rect,
                true,
                false,
            );
        }
        if depth {
            api.blit_framebuffer(
                self.framebuffer,
                destination.framebuffer,
                source_rect,
                destination_rect,
                false,
                true,
            );
        }
        if !color_pairs.is_empty() && !destination.is_screen() {
            let buffers: Vec<Option<u8>> = (0..destination.colors.len() as u8)
                .map(|index| destination.draw_mask.writes_color(index).then_some(index))
                .collect();
            api.draw_buffers(destination.framebuffer, &buffers);
        }
    }

    /// Restores full, layered attachments at mip 0 if a sub-pass redirected them.
    pub fn end<A: GlApi>(
        &mut self,
        _internal: &RenderTargetInternal,
        api: &mut A,
        tracker: &mut GlStateTracker,
    ) {
        tracker.mask_depth_writes(api, false);
        if self.redirected {
            self.attach_all(api, 0);
            self.redirected = false;
        }
        self.mip_level = 0;
    }
}

/// Owns every render target of a context.
///
/// Deallocation is deferred: a target is destroyed only once
/// `frames_in_flight` frames have passed since it was last used.
#[derive(Debug)]
pub struct RenderTargetPool {
    targets: AHashMap<RenderTargetId, RenderTarget>,
    retired: Vec<(RenderTarget, u64)>,
    next_id: u32,
    frames_in_flight: u64,
}

impl RenderTargetPool {
    /// Creates a pool containing only the default framebuffer of `width` x `height`.
    pub fn new(width: u32, height: u32, frames_in_flight: u64) -> Self {
        let screen = RenderTarget {
            id: RenderTargetId::SCREEN,
            descriptor: RenderTargetDescriptor {
                name: "screen".into(),
                width,
                height,
                ..Default::default()
            },
            framebuffer: FramebufferId(0),
            colors: Vec::new(),
            depth: None,
            mip_level: 0,
            redirected: false,
            draw_mask: DrawMask::default(),
            last_used: 0,
        };
        let mut targets = AHashMap::new();
        targets.insert(RenderTargetId::SCREEN, screen);
        Self {
            targets,
            retired: Vec::new(),
            next_id: 1,
            frames_in_flight,
        }
    }

    /// Resizes the default framebuffer.
    pub fn resize_screen(&mut self, width: u32, height: u32) {
        if let Some(screen) = self.targets.get_mut(&RenderTargetId::SCREEN) {
            screen.descriptor.width = width;
            screen.descriptor.height = height;
        }
    }

    /// Creates the attachments and framebuffer described by `descriptor`.
    ///
    /// # Panics
    ///
    /// Panics if the descriptor asks for more color attachments than the device supports.
    pub fn allocate<A: GlApi>(
        &mut self,
        api: &mut A,
        descriptor: RenderTargetDescriptor,
    ) -> RenderTargetId {
        let max = api.limits().max_color_attachments as usize;
        assert!(
            descriptor.colors.len() <= max,
            "render target '{}' has {} color attachments; the device supports {max}",
            descriptor.name,
            descriptor.colors.len()
        );

        let mut create = |index: String, attachment: &AttachmentDescriptor| Attachment {
            texture: api.create_texture(&TextureDescriptor {
                name: format!("{} {index}", descriptor.name),
                target: descriptor.target,
                format: attachment.format,
                width: descriptor.width,
                height: descriptor.height,
                layers: descriptor.layers,
                mip_levels: descriptor.mip_levels,
                samples: 1,
            }),
            format: attachment.format,
            sampler: attachment.sampler,
        };
        let colors: Vec<Attachment> = descriptor
            .colors
            .iter()
            .enumerate()
            .map(|(i, a)| create(format!("color {i}"), a))
            .collect();
        let depth = descriptor.depth.as_ref().map(|a| create("depth".into(), a));

        let id = RenderTargetId(self.next_id);
        self.next_id += 1;
        let target = RenderTarget {
            id,
            framebuffer: api.create_framebuffer(),
            colors,
            depth,
            mip_level: 0,
            redirected: false,
            draw_mask: DrawMask::default(),
            last_used: 0,
            descriptor,
        };
        target.attach_all(api, 0);
        let buffers: Vec<Option<u8>> = (0..target.colors.len() as u8).map(Some).collect();
        api.draw_buffers(target.framebuffer, &buffers);

        log::debug!("allocated render target '{}' as {id:?}", target.descriptor.name);
        self.targets.insert(id, target);
        id
    }

    /// Retires a target. It is destroyed by [`collect`](Self::collect) once no
    /// frame in flight can still reference it. Returns `false` for unknown ids
    /// and for the default framebuffer.
    pub fn deallocate(&mut self, id: RenderTargetId, frame: u64) -> bool {
        if id == RenderTargetId::SCREEN {
            return false;
        }
        match self.targets.remove(&id) {
            Some(target) => {
                let retire_frame = frame.max(target.last_used);
                self.retired.push((target, retire_frame));
                true
            }
            None => false,
        }
    }

    /// Destroys retired targets that are old enough. Returns the destroyed textures.
    pub fn collect<A: GlApi>(&mut self, api: &mut A, frame: u64) -> Vec<TextureId> {
        let delay = self.frames_in_flight;
        let (expired, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.retired)
            .into_iter()
            .partition(|(_, retired)| frame >= retired + delay);
        self.retired = kept;
        expired
            .into_iter()
            .flat_map(|(target, _)| Self::destroy(api, target))
            .collect()
    }

    fn destroy<A: GlApi>(api: &mut A, target: RenderTarget) -> Vec<TextureId> {
        log::debug!("destroying render target '{}'", target.descriptor.name);
        api.delete_framebuffer(target.framebuffer);
        let textures: Vec<TextureId> = target
            .colors
            .iter()
            .chain(target.depth.iter())
            .map(|a| a.texture)
            .collect();
        for texture in &textures {
            api.delete_texture(*texture);
        }
        textures
    }

    /// Looks up a live target.
    pub fn get(&self, id: RenderTargetId) -> Option<&RenderTarget> {
        self.targets.get(&id)
    }

    /// Looks up a live target mutably and marks it used in `frame`.
    pub fn get_mut(&mut self, id: RenderTargetId, frame: u64) -> Option<&mut RenderTarget> {
        let target = self.targets.get_mut(&id)?;
        target.last_used = target.last_used.max(frame);
        Some(target)
    }

    /// Number of live targets, the default framebuffer included.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Always `false`: the default framebuffer is never removed.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Number of retired targets awaiting destruction.
    pub fn retired(&self) -> usize {
        self.retired.len()
    }

    /// Destroys every target immediately. The GPU must be idle.
    pub fn destroy_all<A: GlApi>(&mut self, api: &mut A) -> Vec<TextureId> {
        let mut textures = Vec::new();
        for (target, _) in std::mem::take(&mut self.retired) {
            textures.extend(Self::destroy(api, target));
        }
        let ids: Vec<RenderTargetId> = self
            .targets
            .keys()
            .filter(|id| **id != RenderTargetId::SCREEN)
            .copied()
            .collect();
        for id in ids {
            if let Some(target) = self.targets.remove(&id) {
                textures.extend(Self::destroy(api, target));
            }
        }
        textures
    }
}

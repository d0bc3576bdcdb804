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

//! Payload types of every command.
//!
//! Each payload carries only the data its operation needs and refers to
//! other objects by handle, never to another command.

use crate::math::{LinearRgba, Rect};
use crate::renderer::draw::GenericDrawCommand;
use crate::renderer::handles::{
    BufferId, PipelineHash, RenderTargetId, SamplerHash, ShaderProgramId, TextureId,
};
use crate::renderer::resources::{BufferRange, BufferTarget, SubresourceRange, TextureTarget};
use bitflags::bitflags;
use crossbeam_channel::Sender;
use std::borrow::Cow;

/// Maximum number of user clip planes.
pub const MAX_CLIP_PLANES: usize = 8;

/// An attachment of a render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentSlot {
    /// A color attachment by index.
    Color(u8),
    /// The depth (or depth-stencil) attachment.
    Depth,
}

/// Which attachments a pass writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawMask {
    /// Bit `i` enables color attachment `i`.
    pub colors: u8,
    /// Enables depth writes to the depth attachment.
    pub depth: bool,
}

impl Default for DrawMask {
    fn default() -> Self {
        Self {
            colors: u8::MAX,
            depth: true,
        }
    }
}

impl DrawMask {
    /// Returns `true` if color attachment `index` is written.
    pub fn writes_color(&self, index: u8) -> bool {
        index < 8 && self.colors & (1 << index) != 0
    }
}

/// Clear values applied when a render pass begins.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClearDescriptor {
    /// Clear color per color attachment. `None` leaves the attachment untouched.
    pub colors: Vec<Option<LinearRgba>>,
    /// Depth clear value.
    pub depth: Option<f32>,
    /// Stencil clear value.
    pub stencil: Option<u32>,
}

impl ClearDescriptor {
    /// Clears color attachment 0 to `color` and depth to 1.0.
    pub fn color_and_depth(color: LinearRgba) -> Self {
        Self {
            colors: vec![Some(color)],
            depth: Some(1.0),
            stencil: None,
        }
    }
}

/// Starts rendering into a render target.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BeginRenderPassCommand {
    /// The target to render into.
    pub target: RenderTargetId,
    /// Debug name of the pass.
    pub name: Cow<'static, str>,
    /// Clears applied right after binding.
    pub clear: ClearDescriptor,
    /// Attachments written by the pass.
    pub draw_mask: DrawMask,
}

/// Finishes the active render pass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EndRenderPassCommand {
    /// Rebind the default framebuffer once the pass ends.
    pub restore_default_target: bool,
}

/// Redirects attachments of the active pass to specific layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentLayer {
    /// The redirected attachment.
    pub slot: AttachmentSlot,
    /// The layer (or cube face) written.
    pub layer: u16,
}

/// Starts a sub-pass of the active render pass.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BeginRenderSubPassCommand {
    /// Mip level written by every attachment.
    pub mip_level: u16,
    /// Per attachment layer redirections.
    pub write_layers: Vec<AttachmentLayer>,
}

/// Ends the active sub-pass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EndRenderSubPassCommand;

/// Binds a pipeline and its program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BindPipelineCommand {
    /// The registered pipeline state.
    pub pipeline: PipelineHash,
    /// The program to bind with it.
    pub program: ShaderProgramId,
}

/// Replaces the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetViewportCommand {
    /// The new viewport.
    pub viewport: Rect,
}

/// Saves the current viewport and sets a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PushViewportCommand {
    /// The new viewport.
    pub viewport: Rect,
}

/// Restores the viewport saved by the matching `PushViewportCommand`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PopViewportCommand;

/// Replaces the scissor box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetScissorCommand {
    /// The new scissor rectangle.
    pub scissor: Rect,
}

/// User clip plane configuration.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClipPlaneState {
    /// Bit `i` enables plane `i`.
    pub enabled: u8,
    /// Plane equations `(a, b, c, d)`.
    pub equations: [[f32; 4]; MAX_CLIP_PLANES],
}

/// Enables and configures user clip planes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SetClipPlanesCommand {
    /// The new state.
    pub planes: ClipPlaneState,
}

/// A uniform value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    /// A signed integer.
    Int(i32),
    /// An unsigned integer.
    UInt(u32),
    /// A float.
    Float(f32),
    /// Two floats.
    Vec2([f32; 2]),
    /// Three floats.
    Vec3([f32; 3]),
    /// Four floats.
    Vec4([f32; 4]),
    /// A column-major 4x4 matrix.
    Mat4([f32; 16]),
    /// A color uploaded as four floats.
    Color(LinearRgba),
}

/// A named uniform set on the bound program.
#[derive(Debug, Clone, PartialEq)]
pub struct PushConstant {
    /// The uniform's name in the program.
    pub name: Cow<'static, str>,
    /// The value.
    pub value: UniformValue,
}

/// Block of per-draw data uploaded in one call.
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct FastConstants {
    /// Two column-major matrices, free for the shader to interpret.
    pub data: [[f32; 16]; 2],
}

impl Default for FastConstants {
    fn default() -> Self {
        bytemuck::Zeroable::zeroed()
    }
}

/// A set of push constants.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PushConstants {
    /// Named uniforms, unique by name.
    pub named: Vec<PushConstant>,
    /// Optional block uploaded as raw bytes.
    pub fast: Option<FastConstants>,
}

impl PushConstants {
    /// Sets `name` to `value`, replacing any earlier value of the same name.
    pub fn set(&mut self, name: impl Into<Cow<'static, str>>, value: UniformValue) {
        let name = name.into();
        match self.named.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.value = value,
            None => self.named.push(PushConstant { name, value }),
        }
    }

    /// Returns the value of `name`, if set.
    pub fn get(&self, name: &str) -> Option<&UniformValue> {
        self.named.iter().find(|c| c.name == name).map(|c| &c.value)
    }

    /// Returns `true` if nothing would be uploaded.
    pub fn is_empty(&self) -> bool {
        self.named.is_empty() && self.fast.is_none()
    }

    /// Folds `other` into `self`. Values in `other` win.
    pub fn merge(&mut self, other: &PushConstants) {
        for constant in &other.named {
            self.set(constant.name.clone(), constant.value);
        }
        if other.fast.is_some() {
            self.fast = other.fast;
        }
    }
}

/// Uploads push constants to the bound pipeline's program.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SendPushConstantsCommand {
    /// The constants.
    pub constants: PushConstants,
}

/// Access mode of an image binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageAccess {
    /// Read only.
    #[default]
    Read,
    /// Write only.
    Write,
    /// Read and write.
    ReadWrite,
}

/// A resource bound to a descriptor slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorResource {
    /// A texture and sampler on a texture unit.
    Texture {
        /// The texture.
        texture: TextureId,
        /// Its dimensionality.
        target: TextureTarget,
        /// The sampler to pair with it.
        sampler: SamplerHash,
    },
    /// A sub-range of a texture, bound through a cached view.
    TextureView {
        /// The viewed texture.
        texture: TextureId,
        /// The view's dimensionality.
        target: TextureTarget,
        /// Viewed levels and layers.
        range: SubresourceRange,
        /// The sampler to pair with it.
        sampler: SamplerHash,
    },
    /// A bindless texture handle made resident for the frame.
    ResidentTexture {
        /// The texture.
        texture: TextureId,
        /// The sampler baked into the handle.
        sampler: SamplerHash,
    },
    /// A range of a buffer on an indexed binding point.
    Buffer {
        /// The buffer.
        buffer: BufferId,
        /// The binding point kind.
        target: BufferTarget,
        /// The bound range.
        range: BufferRange,
    },
    /// A texture level bound for image load/store.
    Image {
        /// The texture.
        texture: TextureId,
        /// Mip level.
        level: u16,
        /// A single layer, or every layer if `None`.
        layer: Option<u16>,
        /// Access mode.
        access: ImageAccess,
    },
}

/// A resource bound to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorBinding {
    /// The slot (texture unit, buffer binding index or image unit).
    pub slot: u8,
    /// The resource.
    pub resource: DescriptorResource,
}

/// How often a descriptor set changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DescriptorSetUsage {
    /// Bound once per frame.
    PerFrame,
    /// Bound once per pass.
    PerPass,
    /// Bound once per batch of draws.
    PerBatch,
    /// Bound for each draw.
    #[default]
    PerDraw,
}

/// A group of bindings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DescriptorSet {
    /// Update frequency of the set.
    pub usage: DescriptorSetUsage,
    /// The bindings, unique by slot and kind.
    pub bindings: Vec<DescriptorBinding>,
    /// Set when merging replaced a binding with a different resource.
    pub partial: bool,
}

impl DescriptorSet {
    /// Adds `binding`, replacing a conflicting binding in the same slot.
    ///
    /// Returns `true` if an existing, different binding was replaced.
    pub fn bind(&mut self, binding: DescriptorBinding) -> bool {
        let conflict = self
            .bindings
            .iter_mut()
            .find(|b| b.slot == binding.slot && same_slot_space(&b.resource, &binding.resource));
        match conflict {
            Some(existing) if *existing == binding => false,
            Some(existing) => {
                *existing = binding;
                true
            }
            None => {
                self.bindings.push(binding);
                false
            }
        }
    }
}

/// Texture units, buffer binding points and image units are separate slot spaces.
fn same_slot_space(a: &DescriptorResource, b: &DescriptorResource) -> bool {
    use DescriptorResource::*;
    match (a, b) {
        (
            Texture { .. } | TextureView { .. } | ResidentTexture { .. },
            Texture { .. } | TextureView { .. } | ResidentTexture { .. },
        ) => true,
        (Buffer { target: ta, .. }, Buffer { target: tb, .. }) => ta == tb,
        (Image { .. }, Image { .. }) => true,
        _ => false,
    }
}

/// Binds a descriptor set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BindDescriptorSetsCommand {
    /// The set to bind.
    pub set: DescriptorSet,
}

bitflags! {
    /// Memory barrier bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MemoryBarrierMask: u32 {
        /// Vertex attribute fetches.
        const VERTEX_ATTRIB_ARRAY = 1 << 0;
        /// Index fetches.
        const ELEMENT_ARRAY = 1 << 1;
        /// Uniform block reads.
        const UNIFORM = 1 << 2;
        /// Texture fetches.
        const TEXTURE_FETCH = 1 << 3;
        /// Image load/store.
        const SHADER_IMAGE_ACCESS = 1 << 4;
        /// Indirect command reads.
        const COMMAND = 1 << 5;
        /// Buffer updates and reads.
        const BUFFER_UPDATE = 1 << 6;
        /// Texture updates.
        const TEXTURE_UPDATE = 1 << 7;
        /// Framebuffer reads and writes.
        const FRAMEBUFFER = 1 << 8;
        /// Shader storage accesses.
        const SHADER_STORAGE = 1 << 9;
        /// Client-mapped persistent buffer accesses.
        const CLIENT_MAPPED_BUFFER = 1 << 10;
        /// Query result buffer writes.
        const QUERY_BUFFER = 1 << 11;
        /// Every barrier bit.
        const ALL = u32::MAX;
    }
}

/// A byte range of a buffer guarded by a fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferLock {
    /// The buffer.
    pub buffer: BufferId,
    /// The guarded bytes.
    pub range: BufferRange,
}

/// Orders memory accesses and fences buffer ranges.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MemoryBarrierCommand {
    /// Barrier bits.
    pub mask: MemoryBarrierMask,
    /// Ranges fenced after the barrier. Each is guarded until the GPU passes the fence.
    pub buffer_locks: Vec<BufferLock>,
}

impl MemoryBarrierCommand {
    /// Returns `true` if the barrier does nothing.
    pub fn is_empty(&self) -> bool {
        self.mask.is_empty() && self.buffer_locks.is_empty()
    }
}

/// Submits a list of draws with the bound pipeline.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DrawCommandsCommand {
    /// The draws, in submission order.
    pub draws: Vec<GenericDrawCommand>,
}

/// Dispatches compute work groups with the bound pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchComputeCommand {
    /// Work group counts in X, Y and Z.
    pub work_groups: [u32; 3],
    /// Local work group size the program was compiled with.
    pub local_size: [u32; 3],
}

/// Generates the mip chain of a texture, or of a sub-range of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ComputeMipMapsCommand {
    /// The texture.
    pub texture: TextureId,
    /// Levels and layers to fill. Anything narrower than the whole texture goes through a view.
    pub range: SubresourceRange,
}

/// Copies a region between textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CopyTextureCommand {
    /// Source texture.
    pub source: TextureId,
    /// Destination texture.
    pub destination: TextureId,
    /// Source mip level.
    pub source_mip: u16,
    /// Destination mip level.
    pub destination_mip: u16,
    /// Source texel offset (x, y, layer).
    pub source_origin: [u32; 3],
    /// Destination texel offset (x, y, layer).
    pub destination_origin: [u32; 3],
    /// Extent (width, height, layers).
    pub extent: [u32; 3],
}

/// Clears a texture level to a constant color.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClearTextureCommand {
    /// The texture.
    pub texture: TextureId,
    /// The cleared mip level.
    pub mip_level: u16,
    /// Cleared layers as `(first, count)`, or every layer if `None`.
    pub layers: Option<(u16, u16)>,
    /// Clear value.
    pub color: LinearRgba,
}

/// Reads a buffer range back to the CPU once pending GPU writes complete.
#[derive(Debug, Clone, Default)]
pub struct ReadBufferDataCommand {
    /// The buffer.
    pub buffer: BufferId,
    /// The bytes to read.
    pub range: BufferRange,
    /// Receives the bytes.
    pub reply: Option<Sender<Vec<u8>>>,
}

/// Fills a buffer range with a repeated 32-bit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClearBufferDataCommand {
    /// The buffer.
    pub buffer: BufferId,
    /// The bytes to clear.
    pub range: BufferRange,
    /// The fill value.
    pub value: u32,
}

bitflags! {
    /// Kinds of GPU query.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct QueryMask: u8 {
        /// Number of samples that passed depth and stencil.
        const SAMPLES_PASSED = 1 << 0;
        /// Whether any sample passed.
        const ANY_SAMPLES_PASSED = 1 << 1;
        /// Number of primitives generated.
        const PRIMITIVES_GENERATED = 1 << 2;
        /// GPU time elapsed, in nanoseconds.
        const TIME_ELAPSED = 1 << 3;
    }
}

/// Starts a group of GPU queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BeginGpuQueryCommand {
    /// Tag reported alongside the results.
    pub tag: u32,
    /// Which queries to run.
    pub mask: QueryMask,
}

/// Ends the innermost group of GPU queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EndGpuQueryCommand {
    /// Wait for the results now instead of at the end of the frame.
    pub wait_for_results: bool,
}

/// Copies attachments between render targets.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlitRenderTargetCommand {
    /// Read target.
    pub source: RenderTargetId,
    /// Draw target.
    pub destination: RenderTargetId,
    /// `(source, destination)` color attachment pairs.
    pub color_pairs: Vec<(u8, u8)>,
    /// Also copy the depth attachment.
    pub blit_depth: bool,
}

/// Opens a named debug group.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BeginDebugScopeCommand {
    /// Group name shown by GPU debuggers.
    pub name: Cow<'static, str>,
    /// Group ID.
    pub id: u32,
}

/// Closes the innermost debug group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EndDebugScopeCommand;

/// Inserts a marker into the GPU command stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AddDebugMessageCommand {
    /// The message.
    pub message: Cow<'static, str>,
    /// Message ID.
    pub id: u32,
}

/// One run of text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextElement {
    /// The text.
    pub text: String,
    /// Position in pixels.
    pub position: [f32; 2],
    /// Text color.
    pub color: LinearRgba,
    /// Font size in points.
    pub font_size: f32,
}

/// A batch of text runs rendered together.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextElementBatch {
    /// The runs, in draw order.
    pub elements: Vec<TextElement>,
}

/// Draws text through the installed text renderer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DrawTextCommand {
    /// The text to draw.
    pub batch: TextElementBatch,
}

/// Draws an immediate-mode UI context through the installed UI renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawImguiCommand {
    /// The UI context to render.
    pub context_id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_constants_last_write_wins() {
        let mut first = PushConstants::default();
        first.set("colour", UniformValue::Color(LinearRgba::RED));
        first.set("scale", UniformValue::Float(1.0));
        let mut second = PushConstants::default();
        second.set("colour", UniformValue::Color(LinearRgba::BLUE));

        first.merge(&second);

        assert_eq!(first.named.len(), 2);
        assert_eq!(
            first.get("colour"),
            Some(&UniformValue::Color(LinearRgba::BLUE))
        );
        assert_eq!(first.get("scale"), Some(&UniformValue::Float(1.0)));
    }

    #[test]
    fn test_descriptor_slot_spaces_are_separate() {
        let mut set = DescriptorSet::default();
        let texture = DescriptorBinding {
            slot: 0,
            resource: DescriptorResource::Texture {
                texture: TextureId(1),
                target: TextureTarget::Texture2D,
                sampler: SamplerHash(9),
            },
        };
        let buffer = DescriptorBinding {
            slot: 0,
            resource: DescriptorResource::Buffer {
                buffer: BufferId(2),
                target: BufferTarget::Uniform,
                range: BufferRange::new(0, 256),
            },
        };
        assert!(!set.bind(texture));
        assert!(!set.bind(buffer));
        assert!(!set.bind(texture));
        assert_eq!(set.bindings.len(), 2);
    }

    #[test]
    fn test_draw_mask_bits() {
        let mask = DrawMask {
            colors: 0b101,
            depth: false,
        };
        assert!(mask.writes_color(0));
        assert!(!mask.writes_color(1));
        assert!(mask.writes_color(2));
        assert!(!mask.writes_color(9));
    }
}

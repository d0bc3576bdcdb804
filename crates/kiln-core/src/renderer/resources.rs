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

//! Descriptors for textures, samplers, buffers and vertex layouts.

use super::handles::{SamplerHash, TextureId};
use super::state::{stable_hash, CompareFunction};
use serde::{Deserialize, Serialize};

/// The dimensionality a texture is bound with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TextureTarget {
    /// A one-dimensional texture.
    Texture1D,
    /// A two-dimensional texture.
    #[default]
    Texture2D,
    /// An array of 2D layers.
    Texture2DArray,
    /// A multisampled 2D texture.
    Texture2DMultisample,
    /// A three-dimensional texture.
    Texture3D,
    /// Six 2D faces.
    Cube,
    /// An array of cubes, six layers per cube.
    CubeArray,
}

impl TextureTarget {
    /// Returns `true` for targets addressed by layer.
    pub fn is_layered(self) -> bool {
        matches!(
            self,
            Self::Texture2DArray | Self::Texture3D | Self::Cube | Self::CubeArray
        )
    }
}

/// Texel formats understood by the backend.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TextureFormat {
    R8Unorm,
    Rg8Unorm,
    #[default]
    Rgba8Unorm,
    Rgba8UnormSrgb,
    R16Float,
    Rgba16Float,
    R32Float,
    Rg32Float,
    Rgba32Float,
    R32Uint,
    Depth16,
    Depth24Stencil8,
    Depth32Float,
}

impl TextureFormat {
    /// Returns `true` for depth and depth-stencil formats.
    pub fn is_depth(self) -> bool {
        matches!(self, Self::Depth16 | Self::Depth24Stencil8 | Self::Depth32Float)
    }

    /// Returns `true` if the format carries a stencil aspect.
    pub fn has_stencil(self) -> bool {
        matches!(self, Self::Depth24Stencil8)
    }
}

/// Describes a texture allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    /// Debug name.
    pub name: String,
    /// Dimensionality.
    pub target: TextureTarget,
    /// Texel format.
    pub format: TextureFormat,
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Layers (or depth for 3D textures).
    pub layers: u16,
    /// Number of mip levels.
    pub mip_levels: u16,
    /// Sample count, 1 for single-sampled textures.
    pub samples: u8,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            name: String::new(),
            target: TextureTarget::Texture2D,
            format: TextureFormat::Rgba8Unorm,
            width: 1,
            height: 1,
            layers: 1,
            mip_levels: 1,
            samples: 1,
        }
    }
}

/// A range of mip levels and layers within a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubresourceRange {
    /// First mip level.
    pub base_mip: u16,
    /// Number of mip levels, [`SubresourceRange::REMAINING`] for all of them.
    pub mip_count: u16,
    /// First layer.
    pub base_layer: u16,
    /// Number of layers, [`SubresourceRange::REMAINING`] for all of them.
    pub layer_count: u16,
}

impl SubresourceRange {
    /// Count meaning "every level/layer from the base onward".
    pub const REMAINING: u16 = u16::MAX;

    /// The whole resource.
    pub const ALL: Self = Self {
        base_mip: 0,
        mip_count: Self::REMAINING,
        base_layer: 0,
        layer_count: Self::REMAINING,
    };

    /// Returns `true` if the range covers every mip and layer of `texture`.
    pub fn covers(&self, texture: &TextureDescriptor) -> bool {
        let (mips, layers) = self.resolve(texture);
        self.base_mip == 0
            && self.base_layer == 0
            && mips == texture.mip_levels
            && layers == texture.layers
    }

    /// Resolves `REMAINING` counts against `texture`, returning `(mip_count, layer_count)`.
    pub fn resolve(&self, texture: &TextureDescriptor) -> (u16, u16) {
        let mips = if self.mip_count == Self::REMAINING {
            texture.mip_levels.saturating_sub(self.base_mip)
        } else {
            self.mip_count
        };
        let layers = if self.layer_count == Self::REMAINING {
            texture.layers.saturating_sub(self.base_layer)
        } else {
            self.layer_count
        };
        (mips, layers)
    }
}

impl Default for SubresourceRange {
    fn default() -> Self {
        Self::ALL
    }
}

/// Identifies a view of a texture: the cache key of the texture-view cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureViewDescriptor {
    /// The viewed texture.
    pub source: TextureId,
    /// The view's dimensionality.
    pub target: TextureTarget,
    /// The view's format.
    pub format: TextureFormat,
    /// Resolved levels and layers. Counts are never `REMAINING`.
    pub range: SubresourceRange,
}

/// Texel filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FilterMode {
    /// Nearest texel.
    Nearest,
    /// Linear interpolation.
    #[default]
    Linear,
}

/// Behaviour for coordinates outside `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AddressMode {
    /// Clamp to the edge texel.
    #[default]
    ClampToEdge,
    /// Tile.
    Repeat,
    /// Tile, mirroring every other repetition.
    MirrorRepeat,
    /// Use the border color.
    ClampToBorder,
}

/// Describes a sampler. Registered with the backend under its [`SamplerHash`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SamplerDescriptor {
    /// Magnification filter.
    pub mag_filter: FilterMode,
    /// Minification filter.
    pub min_filter: FilterMode,
    /// Filter between mip levels. `None` disables mipmapping.
    pub mipmap_filter: Option<FilterMode>,
    /// Address modes for U, V and W.
    pub address_modes: [AddressMode; 3],
    /// Depth comparison for shadow samplers.
    pub compare: Option<CompareFunction>,
    /// Maximum anisotropy, 1 disables it.
    pub anisotropy: u8,
}

impl SamplerDescriptor {
    /// The stable hash this sampler is registered under.
    pub fn hash_value(&self) -> SamplerHash {
        SamplerHash(stable_hash(self))
    }
}

/// Buffer binding points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BufferTarget {
    /// Vertex attributes.
    Vertex,
    /// Element indices.
    Index,
    /// Uniform blocks.
    Uniform,
    /// Shader storage blocks.
    ShaderStorage,
    /// Indirect draw parameters.
    DrawIndirect,
    /// Indirect dispatch parameters.
    DispatchIndirect,
    /// Atomic counters.
    AtomicCounter,
}

impl BufferTarget {
    /// Returns `true` for targets with indexed binding points.
    pub fn is_indexed(self) -> bool {
        matches!(
            self,
            Self::Uniform | Self::ShaderStorage | Self::AtomicCounter
        )
    }
}

/// A byte range within a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BufferRange {
    /// Offset of the first byte.
    pub offset: usize,
    /// Length in bytes.
    pub length: usize,
}

impl BufferRange {
    /// Creates a new range.
    pub const fn new(offset: usize, length: usize) -> Self {
        Self { offset, length }
    }

    /// One past the last byte.
    pub const fn end(&self) -> usize {
        self.offset + self.length
    }

    /// Returns `true` if the two ranges share at least one byte.
    pub const fn overlaps(&self, other: &BufferRange) -> bool {
        self.length > 0
            && other.length > 0
            && self.offset < other.end()
            && other.offset < self.end()
    }

    /// Returns `true` if `other` directly follows or precedes this range, or overlaps it.
    pub const fn touches(&self, other: &BufferRange) -> bool {
        self.offset <= other.end() && other.offset <= self.end()
    }

    /// The smallest range covering both.
    pub fn union(&self, other: &BufferRange) -> BufferRange {
        let offset = self.offset.min(other.offset);
        BufferRange::new(offset, self.end().max(other.end()) - offset)
    }
}

/// Index element size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    /// 16-bit indices.
    U16,
    /// 32-bit indices.
    U32,
}

impl IndexFormat {
    /// Size of one index in bytes.
    pub const fn size(self) -> usize {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

/// Component layout of one vertex attribute.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    Unorm8x4,
    Uint32,
}

/// One vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Shader location.
    pub location: u32,
    /// Component layout.
    pub format: VertexFormat,
    /// Byte offset within the vertex.
    pub offset: u32,
}

/// The attribute layout of a vertex stream. Vertex array objects are cached by this layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VertexLayout {
    /// Bytes between consecutive vertices.
    pub stride: u32,
    /// Attributes, ordered by location.
    pub attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    /// The stable hash of this layout.
    pub fn hash_value(&self) -> u64 {
        stable_hash(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_range_overlap() {
        let a = BufferRange::new(0, 64);
        assert!(a.overlaps(&BufferRange::new(32, 64)));
        assert!(!a.overlaps(&BufferRange::new(64, 16)));
        assert!(a.touches(&BufferRange::new(64, 16)));
        assert!(!a.overlaps(&BufferRange::new(10, 0)));
        assert_eq!(a.union(&BufferRange::new(64, 16)), BufferRange::new(0, 80));
    }

    #[test]
    fn test_subresource_range_resolves_remaining() {
        let texture = TextureDescriptor {
            target: TextureTarget::Texture2DArray,
            layers: 4,
            mip_levels: 6,
            ..Default::default()
        };
        assert!(SubresourceRange::ALL.covers(&texture));
        let partial = SubresourceRange {
            base_mip: 2,
            mip_count: SubresourceRange::REMAINING,
            base_layer: 1,
            layer_count: 2,
        };
        assert_eq!(partial.resolve(&texture), (4, 2));
        assert!(!partial.covers(&texture));
    }
}

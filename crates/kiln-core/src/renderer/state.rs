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

//! Rasterizer, depth/stencil and blend state descriptors.
//!
//! A [`RenderStateBlock`] bundles every fixed-function setting a pipeline
//! needs apart from blending, which is configured per draw buffer through
//! [`BlendState`]. Both are registered once and referenced by hash from
//! command payloads.

use super::handles::{PipelineHash, ShaderProgramId, StateBlockHash};
use bitflags::bitflags;
use std::hash::{Hash, Hasher};

/// Hashes `value` with fixed seeds so descriptor hashes are stable across runs.
pub fn stable_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    ahash::RandomState::with_seeds(
        0x6b69_6c6e_5f73_7461,
        0x7465_5f62_6c6f_636b,
        0x9e37_79b9_7f4a_7c15,
        0xc2b2_ae3d_27d4_eb4f,
    )
    .hash_one(value)
}

/// The type of primitives assembled from vertices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    /// Each vertex is a point.
    Points,
    /// Each pair of vertices is a line.
    Lines,
    /// Consecutive vertices form a connected line strip.
    LineStrip,
    /// Each three vertices form a triangle.
    #[default]
    Triangles,
    /// Consecutive vertices form a triangle strip.
    TriangleStrip,
    /// Triangles fan out from the first vertex.
    TriangleFan,
    /// Patches consumed by tessellation stages.
    Patches,
}

/// Which face of a primitive is culled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    /// Nothing is culled.
    None,
    /// Front faces are culled.
    Front,
    /// Back faces are culled.
    #[default]
    Back,
    /// Both faces are culled. Only points and lines survive.
    FrontAndBack,
}

/// The winding order of front-facing triangles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    /// Counter-clockwise.
    #[default]
    Ccw,
    /// Clockwise.
    Cw,
}

/// How polygons are rasterized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PolygonMode {
    /// Polygons are filled.
    #[default]
    Fill,
    /// Polygon edges are drawn as lines.
    Line,
    /// Polygon vertices are drawn as points.
    Point,
}

/// A comparison used by depth and stencil tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunction {
    /// Never passes.
    Never,
    /// Passes if the new value is less than the existing one.
    Less,
    /// Passes if the values are equal.
    Equal,
    /// Passes if the new value is less than or equal to the existing one.
    LessEqual,
    /// Passes if the new value is greater than the existing one.
    Greater,
    /// Passes if the values differ.
    NotEqual,
    /// Passes if the new value is greater than or equal to the existing one.
    GreaterEqual,
    /// Always passes.
    #[default]
    Always,
}

/// The operation applied to a stencil value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilOperation {
    /// Keep the current value.
    #[default]
    Keep,
    /// Set to zero.
    Zero,
    /// Replace with the reference value.
    Replace,
    /// Bitwise invert.
    Invert,
    /// Increment, clamping at the maximum.
    IncrementClamp,
    /// Decrement, clamping at zero.
    DecrementClamp,
    /// Increment with wrap-around.
    IncrementWrap,
    /// Decrement with wrap-around.
    DecrementWrap,
}

/// A blend factor.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendFactor {
    Zero,
    #[default]
    One,
    Src,
    OneMinusSrc,
    SrcAlpha,
    OneMinusSrcAlpha,
    Dst,
    OneMinusDst,
    DstAlpha,
    OneMinusDstAlpha,
    SrcAlphaSaturated,
    Constant,
    OneMinusConstant,
}

/// A blend equation.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendOperation {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

bitflags! {
    /// Color channels written to a draw buffer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorWrites: u8 {
        /// Red channel.
        const R = 0b0001;
        /// Green channel.
        const G = 0b0010;
        /// Blue channel.
        const B = 0b0100;
        /// Alpha channel.
        const A = 0b1000;
        /// Every channel.
        const ALL = Self::R.bits() | Self::G.bits() | Self::B.bits() | Self::A.bits();
    }
}

impl Default for ColorWrites {
    fn default() -> Self {
        Self::ALL
    }
}

/// Blending for a single draw buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlendState {
    /// If `false`, the other fields are ignored and fragments overwrite the target.
    pub enabled: bool,
    /// Source factor for the color channels.
    pub src_color: BlendFactor,
    /// Destination factor for the color channels.
    pub dst_color: BlendFactor,
    /// Equation for the color channels.
    pub color_op: BlendOperation,
    /// Source factor for alpha.
    pub src_alpha: BlendFactor,
    /// Destination factor for alpha.
    pub dst_alpha: BlendFactor,
    /// Equation for alpha.
    pub alpha_op: BlendOperation,
}

impl BlendState {
    /// Blending disabled.
    pub const OPAQUE: Self = Self {
        enabled: false,
        src_color: BlendFactor::One,
        dst_color: BlendFactor::Zero,
        color_op: BlendOperation::Add,
        src_alpha: BlendFactor::One,
        dst_alpha: BlendFactor::Zero,
        alpha_op: BlendOperation::Add,
    };

    /// Classic straight-alpha blending.
    pub const ALPHA_BLENDING: Self = Self {
        enabled: true,
        src_color: BlendFactor::SrcAlpha,
        dst_color: BlendFactor::OneMinusSrcAlpha,
        color_op: BlendOperation::Add,
        src_alpha: BlendFactor::One,
        dst_alpha: BlendFactor::OneMinusSrcAlpha,
        alpha_op: BlendOperation::Add,
    };
}

/// Stencil test configuration, shared by front and back faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilState {
    /// Enables the stencil test.
    pub enabled: bool,
    /// The comparison against the stored value.
    pub compare: CompareFunction,
    /// The reference value.
    pub reference: u32,
    /// Mask applied to both values before comparing.
    pub read_mask: u32,
    /// Mask applied when writing.
    pub write_mask: u32,
    /// Operation when the stencil test fails.
    pub fail_op: StencilOperation,
    /// Operation when stencil passes but depth fails.
    pub depth_fail_op: StencilOperation,
    /// Operation when both pass.
    pub pass_op: StencilOperation,
}

impl Default for StencilState {
    fn default() -> Self {
        Self {
            enabled: false,
            compare: CompareFunction::Always,
            reference: 0,
            read_mask: !0,
            write_mask: !0,
            fail_op: StencilOperation::Keep,
            depth_fail_op: StencilOperation::Keep,
            pass_op: StencilOperation::Keep,
        }
    }
}

/// Polygon offset applied to depth values.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DepthBias {
    /// Scale applied to the polygon's depth slope.
    pub slope_scale: f32,
    /// Constant offset in depth units.
    pub constant: f32,
}

impl DepthBias {
    /// Returns `true` if no offset is applied.
    pub fn is_disabled(&self) -> bool {
        self.slope_scale == 0.0 && self.constant == 0.0
    }
}

impl Eq for DepthBias {}

impl Hash for DepthBias {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.slope_scale.to_bits().hash(state);
        self.constant.to_bits().hash(state);
    }
}

/// A full rasterizer / depth / stencil configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderStateBlock {
    /// Face culling.
    pub cull_mode: CullMode,
    /// Front face winding.
    pub front_face: FrontFace,
    /// Fill mode.
    pub polygon_mode: PolygonMode,
    /// Enables the depth test.
    pub depth_test: bool,
    /// Enables depth writes.
    pub depth_write: bool,
    /// The depth comparison.
    pub depth_compare: CompareFunction,
    /// Polygon offset.
    pub depth_bias: DepthBias,
    /// Enables the scissor test.
    pub scissor_test: bool,
    /// Stencil configuration.
    pub stencil: StencilState,
    /// Channels written to every draw buffer.
    pub color_writes: ColorWrites,
    /// Enables primitive restart on the fixed restart index.
    pub primitive_restart: bool,
    /// If `false`, primitives are discarded before rasterization.
    pub rasterization: bool,
}

impl Default for RenderStateBlock {
    fn default() -> Self {
        Self {
            cull_mode: CullMode::Back,
            front_face: FrontFace::Ccw,
            polygon_mode: PolygonMode::Fill,
            depth_test: true,
            depth_write: true,
            depth_compare: CompareFunction::Less,
            depth_bias: DepthBias::default(),
            scissor_test: false,
            stencil: StencilState::default(),
            color_writes: ColorWrites::ALL,
            primitive_restart: false,
            rasterization: true,
        }
    }
}

impl RenderStateBlock {
    /// The stable hash this block is registered under.
    pub fn hash_value(&self) -> StateBlockHash {
        StateBlockHash(stable_hash(self))
    }
}

/// Everything the backend needs to bind a graphics or compute pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineDescriptor {
    /// Debug name.
    pub name: String,
    /// The program the pipeline was authored against.
    pub program: ShaderProgramId,
    /// Fixed-function state.
    pub state_block: RenderStateBlock,
    /// Per draw buffer blending. Draw buffers past the end use [`BlendState::OPAQUE`].
    pub blend_states: Vec<BlendState>,
    /// Primitive assembly.
    pub topology: PrimitiveTopology,
}

impl PipelineDescriptor {
    /// The stable hash this pipeline is registered under.
    pub fn hash_value(&self) -> PipelineHash {
        PipelineHash(stable_hash(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_block_hash_is_stable_and_discriminating() {
        let a = RenderStateBlock::default();
        let b = RenderStateBlock {
            cull_mode: CullMode::None,
            ..a
        };
        assert_eq!(a.hash_value(), RenderStateBlock::default().hash_value());
        assert_ne!(a.hash_value(), b.hash_value());
    }

    #[test]
    fn test_depth_bias_hash_uses_bits() {
        let a = RenderStateBlock {
            depth_bias: DepthBias {
                slope_scale: 1.0,
                constant: 2.0,
            },
            ..Default::default()
        };
        let b = RenderStateBlock {
            depth_bias: DepthBias {
                slope_scale: 1.0,
                constant: 2.5,
            },
            ..Default::default()
        };
        assert_ne!(a.hash_value(), b.hash_value());
        assert!(RenderStateBlock::default().depth_bias.is_disabled());
    }

    #[test]
    fn test_pipeline_hash_includes_blending() {
        let base = PipelineDescriptor {
            name: "opaque".into(),
            program: ShaderProgramId(3),
            state_block: RenderStateBlock::default(),
            blend_states: vec![BlendState::OPAQUE],
            topology: PrimitiveTopology::Triangles,
        };
        let blended = PipelineDescriptor {
            blend_states: vec![BlendState::ALPHA_BLENDING],
            ..base.clone()
        };
        assert_ne!(base.hash_value(), blended.hash_value());
    }
}

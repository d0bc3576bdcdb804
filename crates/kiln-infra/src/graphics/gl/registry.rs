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

//! Descriptors the dispatcher resolves handles against.

use ahash::AHashMap;
use kiln_core::renderer::resources::{
    IndexFormat, SamplerDescriptor, TextureDescriptor, VertexLayout,
};
use kiln_core::renderer::state::PipelineDescriptor;
use kiln_core::renderer::{BufferId, PipelineHash, SamplerHash, StateBlockHash, TextureId};

/// Where a draw's geometry comes from.
///
/// Registered under the vertex buffer id that draw commands name as their
/// `source_buffer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeometryBinding {
    /// Layout of the vertex buffer.
    pub vertex_layout: VertexLayout,
    /// The index buffer and its format, for indexed geometry.
    pub index_buffer: Option<(BufferId, IndexFormat)>,
    /// A buffer of `IndirectDrawCommand` records. Draws from geometry with
    /// an indirect buffer are submitted indirectly.
    pub indirect_buffer: Option<BufferId>,
}

/// A registered pipeline with its state block hash.
#[derive(Debug, Clone)]
pub struct RegisteredPipeline {
    /// The descriptor.
    pub descriptor: PipelineDescriptor,
    /// Hash of `descriptor.state_block` as registered with the state tracker.
    pub state_block: StateBlockHash,
}

/// Pipelines, samplers, textures and geometry known to a context.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    pipelines: AHashMap<PipelineHash, RegisteredPipeline>,
    samplers: AHashMap<SamplerHash, SamplerDescriptor>,
    textures: AHashMap<TextureId, TextureDescriptor>,
    geometry: AHashMap<BufferId, GeometryBinding>,
}

impl ResourceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pipeline under its hash.
    pub fn insert_pipeline(&mut self, pipeline: RegisteredPipeline) -> PipelineHash {
        let hash = pipeline.descriptor.hash_value();
        self.pipelines.insert(hash, pipeline);
        hash
    }

    /// Looks up a pipeline.
    pub fn pipeline(&self, hash: PipelineHash) -> Option<&RegisteredPipeline> {
        self.pipelines.get(&hash)
    }

    /// Registers a sampler descriptor under its hash.
    pub fn insert_sampler(&mut self, descriptor: SamplerDescriptor) -> SamplerHash {
        let hash = descriptor.hash_value();
        self.samplers.insert(hash, descriptor);
        hash
    }

    /// Looks up a sampler descriptor.
    pub fn sampler(&self, hash: SamplerHash) -> Option<&SamplerDescriptor> {
        self.samplers.get(&hash)
    }

    /// Records the descriptor of a created texture.
    pub fn insert_texture(&mut self, texture: TextureId, descriptor: TextureDescriptor) {
        self.textures.insert(texture, descriptor);
    }

    /// Looks up a texture descriptor.
    pub fn texture(&self, texture: TextureId) -> Option<&TextureDescriptor> {
        self.textures.get(&texture)
    }

    /// Forgets a texture.
    pub fn remove_texture(&mut self, texture: TextureId) -> Option<TextureDescriptor> {
        self.textures.remove(&texture)
    }

    /// Registers geometry under its vertex buffer.
    pub fn insert_geometry(&mut self, vertex_buffer: BufferId, geometry: GeometryBinding) {
        self.geometry.insert(vertex_buffer, geometry);
    }

    /// Looks up geometry by vertex buffer.
    pub fn geometry(&self, vertex_buffer: BufferId) -> Option<&GeometryBinding> {
        self.geometry.get(&vertex_buffer)
    }
}

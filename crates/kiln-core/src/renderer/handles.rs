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

//! Opaque handles naming backend objects.
//!
//! Object names (`*Id`) are the integer names handed out by the backend.
//! Hashes (`*Hash`) identify a descriptor that the backend resolves through
//! one of its caches. A value of zero always means "no object".

use serde::{Deserialize, Serialize};

/// A backend buffer object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BufferId(pub u32);

impl BufferId {
    /// No buffer. As a draw's source buffer it means screen-space geometry.
    pub const NONE: Self = Self(0);

    /// Returns `true` if this is [`BufferId::NONE`].
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// A texture object or texture view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TextureId(pub u32);

impl TextureId {
    /// No texture bound.
    pub const NONE: Self = Self(0);
}

/// Hash of a `SamplerDescriptor`, resolved to a sampler object on use.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct SamplerHash(pub u64);

/// A sampler object created from a [`SamplerHash`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SamplerObject(pub u32);

/// A linked shader program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ShaderProgramId(pub u32);

/// A separable program pipeline object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ShaderPipelineId(pub u32);

/// Hash of a registered `PipelineDescriptor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PipelineHash(pub u64);

/// Hash of a registered `RenderStateBlock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StateBlockHash(pub u64);

/// A render target owned by the backend's render-target pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RenderTargetId(pub u32);

impl RenderTargetId {
    /// The default (screen) framebuffer.
    pub const SCREEN: Self = Self(0);
}

/// A vertex array object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VaoId(pub u32);

/// A framebuffer object. `FramebufferId(0)` is the default framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FramebufferId(pub u32);

/// A GPU query object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct QueryId(pub u32);

/// A fence sync object inserted into the GPU command stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SyncHandle(pub u64);

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

//! An OpenGL-style backend for recorded command buffers.
//!
//! The device is abstracted by [`GlApi`]; [`HeadlessGl`] records calls
//! instead of issuing them. Every state change goes through the
//! [`GlStateTracker`], which elides redundant binds.

mod api;
mod backend;
mod dispatch;
mod headless;
mod persistent_buffer;
mod query_pool;
mod registry;
mod render_target;
mod render_thread;
mod residency;
mod state_tracker;
mod sync;
mod view_cache;

pub use self::api::*;
pub use self::backend::GlBackend;
pub use self::dispatch::{flush_command, flush_command_buffer, Flushed, GlContext};
pub use self::headless::{GlCall, HeadlessGl};
pub use self::persistent_buffer::PersistentBuffer;
pub use self::query_pool::QueryPool;
pub use self::registry::{GeometryBinding, RegisteredPipeline, ResourceRegistry};
pub use self::render_target::{
    Attachment, AttachmentDescriptor, RenderTarget, RenderTargetDescriptor, RenderTargetInternal,
    RenderTargetPool,
};
pub use self::render_thread::RenderThread;
pub use self::residency::{ResidencyCache, ResidencyCaches};
pub use self::state_tracker::{BindResult, DebugScope, GlStateTracker, TextureBinding};
pub use self::sync::{FrameFences, LockManager};
pub use self::view_cache::TextureViewCache;

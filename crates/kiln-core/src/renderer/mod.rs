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

//! Backend-agnostic rendering contracts and the command-buffer abstraction.

pub mod command;
pub mod draw;
pub mod error;
pub mod handles;
pub mod limits;
pub mod resources;
pub mod settings;
pub mod state;
pub mod stats;
pub mod traits;

pub use self::command::{CommandBuffer, CommandBufferPool, CommandType, ScopedCommandBuffer};
pub use self::draw::{GenericDrawCommand, IndirectDrawCommand, RenderOptions};
pub use self::error::{PipelineError, RenderError, ResourceError};
pub use self::handles::*;
pub use self::limits::DeviceLimits;
pub use self::settings::{RenderSettings, SettingsError};
pub use self::stats::{FrameStats, QueryResult};
pub use self::traits::{ImguiRenderer, RenderBackend, TextRenderer};

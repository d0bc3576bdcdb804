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

//! The closed set of commands and their type-segregated storage.
//!
//! Every command type is declared once in the `define_commands!` invocation
//! below, which generates:
//!
//! * [`CommandType`], the explicit discriminant enum;
//! * [`CommandStorage`], one packed `Vec` of payloads per type;
//! * an implementation of [`Command`] for every payload type;
//! * [`CommandRef`], a borrowed view used by exhaustive visitors.

mod buffer;
mod merge;
mod pool;
mod types;
mod validate;

pub use self::buffer::*;
pub use self::pool::*;
pub use self::types::*;
pub use self::merge::BatchReport;
pub use self::validate::{CommandBufferError, CommandValidator};

macro_rules! define_commands {
    ($( $(#[$doc:meta])* $variant:ident($payload:ty) => $field:ident, )*) => {
        /// The discriminant of every command.
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum CommandType {
            $( $(#[$doc])* $variant, )*
        }

        impl CommandType {
            /// Every command type, ordered by discriminant.
            pub const ALL: &'static [CommandType] = &[$(CommandType::$variant,)*];
            /// The number of command types.
            pub const COUNT: usize = Self::ALL.len();

            /// Looks up a type by discriminant.
            pub fn from_index(index: u8) -> Option<Self> {
                Self::ALL.get(index as usize).copied()
            }

            /// The type's name, for logs.
            pub fn name(self) -> &'static str {
                match self {
                    $( CommandType::$variant => stringify!($variant), )*
                }
            }
        }

        /// Packed per-type payload storage of a command buffer.
        #[derive(Debug, Default, Clone)]
        pub struct CommandStorage {
            $( $field: Vec<$payload>, )*
        }

        impl CommandStorage {
            pub(crate) fn len_of(&self, ty: CommandType) -> usize {
                match ty {
                    $( CommandType::$variant => self.$field.len(), )*
                }
            }

            pub(crate) fn clear(&mut self, release_memory: bool) {
                $(
                    self.$field.clear();
                    if release_memory {
                        self.$field.shrink_to_fit();
                    }
                )*
            }

            pub(crate) fn resolve(&self, ty: CommandType, index: usize) -> CommandRef<'_> {
                match ty {
                    $( CommandType::$variant => CommandRef::$variant(&self.$field[index]), )*
                }
            }

            /// Copies one payload into `dst`, returning its index there.
            pub(crate) fn copy_into(
                &self,
                ty: CommandType,
                index: usize,
                dst: &mut CommandStorage,
            ) -> usize {
                match ty {
                    $(
                        CommandType::$variant => {
                            dst.$field.push(self.$field[index].clone());
                            dst.$field.len() - 1
                        }
                    )*
                }
            }
        }

        $(
            impl Command for $payload {
                const TYPE: CommandType = CommandType::$variant;

                fn storage(storage: &CommandStorage) -> &Vec<Self> {
                    &storage.$field
                }

                fn storage_mut(storage: &mut CommandStorage) -> &mut Vec<Self> {
                    &mut storage.$field
                }
            }
        )*

        /// A borrowed command payload tagged with its type.
        #[derive(Debug, Clone, Copy)]
        pub enum CommandRef<'a> {
            $( $(#[$doc])* $variant(&'a $payload), )*
        }

        impl CommandRef<'_> {
            /// The type of the referenced command.
            pub fn command_type(&self) -> CommandType {
                match self {
                    $( CommandRef::$variant(_) => CommandType::$variant, )*
                }
            }
        }
    };
}

/// A command payload stored in a [`CommandBuffer`].
pub trait Command: Clone + Default + Send + 'static {
    /// The type tag of this payload.
    const TYPE: CommandType;

    #[doc(hidden)]
    fn storage(storage: &CommandStorage) -> &Vec<Self>;

    #[doc(hidden)]
    fn storage_mut(storage: &mut CommandStorage) -> &mut Vec<Self>;
}

define_commands! {
    /// Starts a render pass.
    BeginRenderPass(BeginRenderPassCommand) => begin_render_pass,
    /// Ends the active render pass.
    EndRenderPass(EndRenderPassCommand) => end_render_pass,
    /// Starts a layered or mip-targeted sub-pass.
    BeginRenderSubPass(BeginRenderSubPassCommand) => begin_render_sub_pass,
    /// Ends the active sub-pass.
    EndRenderSubPass(EndRenderSubPassCommand) => end_render_sub_pass,
    /// Binds a pipeline.
    BindPipeline(BindPipelineCommand) => bind_pipeline,
    /// Sets the viewport.
    SetViewport(SetViewportCommand) => set_viewport,
    /// Pushes a viewport.
    PushViewport(PushViewportCommand) => push_viewport,
    /// Pops a viewport.
    PopViewport(PopViewportCommand) => pop_viewport,
    /// Sets the scissor box.
    SetScissor(SetScissorCommand) => set_scissor,
    /// Sets user clip planes.
    SetClipPlanes(SetClipPlanesCommand) => set_clip_planes,
    /// Uploads push constants.
    SendPushConstants(SendPushConstantsCommand) => send_push_constants,
    /// Binds descriptor sets.
    BindDescriptorSets(BindDescriptorSetsCommand) => bind_descriptor_sets,
    /// Inserts a memory barrier.
    MemoryBarrier(MemoryBarrierCommand) => memory_barrier,
    /// Submits draws.
    DrawCommands(DrawCommandsCommand) => draw_commands,
    /// Dispatches compute work.
    DispatchCompute(DispatchComputeCommand) => dispatch_compute,
    /// Generates mip levels.
    ComputeMipMaps(ComputeMipMapsCommand) => compute_mip_maps,
    /// Copies between textures.
    CopyTexture(CopyTextureCommand) => copy_texture,
    /// Clears a texture.
    ClearTexture(ClearTextureCommand) => clear_texture,
    /// Reads a buffer back.
    ReadBufferData(ReadBufferDataCommand) => read_buffer_data,
    /// Clears a buffer range.
    ClearBufferData(ClearBufferDataCommand) => clear_buffer_data,
    /// Starts GPU queries.
    BeginGpuQuery(BeginGpuQueryCommand) => begin_gpu_query,
    /// Ends GPU queries.
    EndGpuQuery(EndGpuQueryCommand) => end_gpu_query,
    /// Blits between render targets.
    BlitRenderTarget(BlitRenderTargetCommand) => blit_render_target,
    /// Opens a debug group.
    BeginDebugScope(BeginDebugScopeCommand) => begin_debug_scope,
    /// Closes a debug group.
    EndDebugScope(EndDebugScopeCommand) => end_debug_scope,
    /// Inserts a debug marker.
    AddDebugMessage(AddDebugMessageCommand) => add_debug_message,
    /// Draws text.
    DrawText(DrawTextCommand) => draw_text,
    /// Draws an immediate-mode UI.
    DrawImgui(DrawImguiCommand) => draw_imgui,
}

impl CommandType {
    /// Returns `true` for types the batching pass may merge.
    pub fn is_mergeable(self) -> bool {
        matches!(
            self,
            CommandType::DrawCommands
                | CommandType::MemoryBarrier
                | CommandType::BindDescriptorSets
                | CommandType::SendPushConstants
                | CommandType::DrawText
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_type_indices_round_trip() {
        for (i, ty) in CommandType::ALL.iter().enumerate() {
            assert_eq!(*ty as usize, i);
            assert_eq!(CommandType::from_index(i as u8), Some(*ty));
        }
        assert_eq!(CommandType::from_index(CommandType::COUNT as u8), None);
    }

    #[test]
    fn test_mergeable_types() {
        assert!(CommandType::DrawCommands.is_mergeable());
        assert!(CommandType::DrawText.is_mergeable());
        assert!(!CommandType::BindPipeline.is_mergeable());
        assert_eq!(CommandType::BindPipeline.name(), "BindPipeline");
    }
}

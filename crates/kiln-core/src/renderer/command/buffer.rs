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

//! The ordered, type-segregated command container.

use super::merge::{merge_entries, BatchReport};
use super::validate::{validate_commands, CommandBufferError};
use super::{Command, CommandRef, CommandStorage, CommandType};

/// A compact `(type, index)` handle into a [`CommandBuffer`].
///
/// The type occupies the top 8 bits and the element index the low 24.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandEntry(u32);

impl CommandEntry {
    /// The largest element index an entry can hold.
    pub const MAX_INDEX: usize = (1 << 24) - 1;

    /// Packs a type and an element index.
    ///
    /// # Panics
    ///
    /// Panics if `index` does not fit in 24 bits.
    pub fn new(ty: CommandType, index: usize) -> Self {
        assert!(
            index <= Self::MAX_INDEX,
            "command element index {index} exceeds the 24-bit entry limit"
        );
        Self(((ty as u32) << 24) | index as u32)
    }

    /// The command type.
    pub fn command_type(self) -> CommandType {
        // Entries are only built by `new`, so the discriminant is always valid.
        CommandType::ALL[(self.0 >> 24) as usize]
    }

    /// The element index within the type's storage.
    pub fn index(self) -> usize {
        (self.0 & 0x00FF_FFFF) as usize
    }
}

/// An ordered list of commands recorded by one render pass.
///
/// Payloads live in per-type storage; the entry list is the execution order.
/// Batching may leave payloads that no entry refers to any more. They are
/// still counted by [`count`](CommandBuffer::count) until the next
/// [`clear`](CommandBuffer::clear).
///
/// # Example
///
/// ```
/// use kiln_core::renderer::command::*;
/// use kiln_core::renderer::{BufferId, GenericDrawCommand};
///
/// let mut buffer = CommandBuffer::default();
/// buffer.add(BeginRenderPassCommand::default());
/// buffer
///     .add_default::<DrawCommandsCommand>()
///     .draws
///     .push(GenericDrawCommand::indexed(BufferId(1), 0, 36));
/// buffer.add(EndRenderPassCommand::default());
/// assert_eq!(buffer.len(), 3);
/// ```
#[derive(Debug, Default, Clone)]
pub struct CommandBuffer {
    entries: Vec<CommandEntry>,
    storage: CommandStorage,
}

impl CommandBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `command` and returns its payload for further editing.
    pub fn add<T: Command>(&mut self, command: T) -> &mut T {
        let index = T::storage(&self.storage).len();
        self.entries.push(CommandEntry::new(T::TYPE, index));
        let store = T::storage_mut(&mut self.storage);
        store.push(command);
        &mut store[index]
    }

    /// Appends a default-initialized command and returns it.
    pub fn add_default<T: Command>(&mut self) -> &mut T {
        self.add(T::default())
    }

    fn check_entry<T: Command>(&self, entry: CommandEntry) -> usize {
        assert_eq!(
            entry.command_type(),
            T::TYPE,
            "command entry of type {} resolved as {}",
            entry.command_type().name(),
            T::TYPE.name()
        );
        let index = entry.index();
        let count = T::storage(&self.storage).len();
        assert!(
            index < count,
            "stale command entry: {} index {index} but only {count} recorded",
            T::TYPE.name()
        );
        index
    }

    /// Returns the payload referenced by `entry`.
    ///
    /// # Panics
    ///
    /// Panics if `entry` is of another type or indexes past the recorded payloads.
    pub fn get<T: Command>(&self, entry: CommandEntry) -> &T {
        let index = self.check_entry::<T>(entry);
        &T::storage(&self.storage)[index]
    }

    /// Mutable version of [`get`](Self::get).
    pub fn get_mut<T: Command>(&mut self, entry: CommandEntry) -> &mut T {
        let index = self.check_entry::<T>(entry);
        &mut T::storage_mut(&mut self.storage)[index]
    }

    /// Resolves any entry to a borrowed, typed payload.
    pub fn resolve(&self, entry: CommandEntry) -> CommandRef<'_> {
        let ty = entry.command_type();
        assert!(
            entry.index() < self.storage.len_of(ty),
            "stale command entry: {} index {}",
            ty.name(),
            entry.index()
        );
        self.storage.resolve(ty, entry.index())
    }

    /// Number of stored payloads of type `T`.
    pub fn count<T: Command>(&self) -> usize {
        T::storage(&self.storage).len()
    }

    /// Number of stored payloads of type `ty`.
    pub fn count_of(&self, ty: CommandType) -> usize {
        self.storage.len_of(ty)
    }

    /// Allocated payload capacity for type `T`.
    pub fn capacity<T: Command>(&self) -> usize {
        T::storage(&self.storage).capacity()
    }

    /// The execution order.
    pub fn entries(&self) -> &[CommandEntry] {
        &self.entries
    }

    /// Number of commands in the execution order.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates the commands in execution order.
    pub fn iter(&self) -> impl Iterator<Item = CommandRef<'_>> + '_ {
        self.entries
            .iter()
            .map(move |entry| self.storage.resolve(entry.command_type(), entry.index()))
    }

    /// Forgets every command.
    ///
    /// With `release_memory == false` the storage keeps its capacity so the
    /// next frame records without allocating.
    pub fn clear(&mut self, release_memory: bool) {
        self.entries.clear();
        self.storage.clear(release_memory);
        if release_memory {
            self.entries.shrink_to_fit();
        }
    }

    /// Appends a copy of every command of `other`, in order.
    pub fn append(&mut self, other: &CommandBuffer) {
        self.entries.reserve(other.entries.len());
        for entry in &other.entries {
            let ty = entry.command_type();
            let index = other.storage.copy_into(ty, entry.index(), &mut self.storage);
            self.entries.push(CommandEntry::new(ty, index));
        }
    }

    /// Merges adjacent compatible commands, then drops no-op and redundant ones.
    ///
    /// The result replays identically to the input. Merge failures are silent.
    pub fn batch(&mut self) -> BatchReport {
        let mut report = merge_entries(&mut self.entries, &mut self.storage);
        report.removed += self.clean();
        if report.merged > 0 || report.removed > 0 {
            log::trace!(
                "Batched command buffer: {} merged, {} removed, {} left",
                report.merged,
                report.removed,
                self.entries.len()
            );
        }
        report
    }

    /// Drops commands without effect. Returns the number removed.
    ///
    /// Removed are empty draw lists, barriers, descriptor sets, push
    /// constants and text batches, and a pipeline bind, viewport or scissor
    /// identical to the previous one with no render pass, sub-pass or blit
    /// between.
    pub fn clean(&mut self) -> usize {
        let before = self.entries.len();
        let storage = &self.storage;
        let mut redundant = RedundancyFilter::default();
        self.entries.retain(|entry| {
            !redundant.is_redundant(storage.resolve(entry.command_type(), entry.index()))
        });
        before - self.entries.len()
    }

    /// Checks the recorded sequence against the render pass state machine.
    pub fn validate(&self) -> Result<(), CommandBufferError> {
        validate_commands(self.iter())
    }
}

#[derive(Default)]
struct RedundancyFilter {
    pipeline: Option<super::BindPipelineCommand>,
    viewport: Option<crate::math::Rect>,
    scissor: Option<crate::math::Rect>,
}

impl RedundancyFilter {
    fn is_redundant(&mut self, command: CommandRef<'_>) -> bool {
        match command {
            CommandRef::DrawCommands(c) => c.draws.iter().all(|d| d.is_noop()),
            CommandRef::MemoryBarrier(c) => c.is_empty(),
            CommandRef::BindDescriptorSets(c) => c.set.bindings.is_empty(),
            CommandRef::SendPushConstants(c) => c.constants.is_empty(),
            CommandRef::DrawText(c) if c.batch.elements.is_empty() => true,
            CommandRef::BindPipeline(c) => {
                let same = self.pipeline.as_ref() == Some(c);
                self.pipeline = Some(*c);
                same
            }
            CommandRef::SetViewport(c) => {
                let same = self.viewport == Some(c.viewport);
                self.viewport = Some(c.viewport);
                same
            }
            CommandRef::SetScissor(c) => {
                let same = self.scissor == Some(c.scissor);
                self.scissor = Some(c.scissor);
                same
            }
            CommandRef::BeginRenderPass(_)
            | CommandRef::EndRenderPass(_)
            | CommandRef::BeginRenderSubPass(_)
            | CommandRef::EndRenderSubPass(_)
            | CommandRef::BlitRenderTarget(_)
            | CommandRef::DrawText(_)
            | CommandRef::DrawImgui(_) => {
                *self = Self::default();
                false
            }
            CommandRef::PushViewport(_) | CommandRef::PopViewport(_) => {
                self.viewport = None;
                false
            }
            _ => false,
        }
    }
}

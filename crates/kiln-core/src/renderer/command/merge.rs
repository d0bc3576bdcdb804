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

//! Type-specific merge rules used by the batching pass.

use super::{
    BindDescriptorSetsCommand, Command, CommandEntry, CommandStorage, CommandType,
    DrawCommandsCommand, DrawTextCommand, MemoryBarrierCommand, SendPushConstantsCommand,
};
use crate::renderer::draw::compact_draws;

/// Outcome of [`CommandBuffer::batch`](super::CommandBuffer::batch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchReport {
    /// Commands folded into their predecessor, plus draws folded within a draw list.
    pub merged: usize,
    /// Commands dropped as no-ops or redundant.
    pub removed: usize,
}

/// A payload that can absorb the payload recorded right after it.
trait Merge: Command {
    /// Folds `next` into `self`. Returns `false`, leaving `self` unchanged, if incompatible.
    fn merge(&mut self, next: &Self) -> bool;
}

impl Merge for DrawCommandsCommand {
    fn merge(&mut self, next: &Self) -> bool {
        self.draws.extend_from_slice(&next.draws);
        true
    }
}

impl Merge for MemoryBarrierCommand {
    fn merge(&mut self, next: &Self) -> bool {
        self.mask |= next.mask;
        for lock in &next.buffer_locks {
            if !self.buffer_locks.contains(lock) {
                self.buffer_locks.push(*lock);
            }
        }
        true
    }
}

impl Merge for BindDescriptorSetsCommand {
    fn merge(&mut self, next: &Self) -> bool {
        if self.set.usage != next.set.usage {
            return false;
        }
        for binding in &next.set.bindings {
            if self.set.bind(*binding) {
                self.set.partial = true;
            }
        }
        self.set.partial |= next.set.partial;
        true
    }
}

impl Merge for SendPushConstantsCommand {
    fn merge(&mut self, next: &Self) -> bool {
        self.constants.merge(&next.constants);
        true
    }
}

impl Merge for DrawTextCommand {
    fn merge(&mut self, next: &Self) -> bool {
        self.batch
            .elements
            .extend(next.batch.elements.iter().cloned());
        true
    }
}

fn merge_pair<T: Merge>(storage: &mut CommandStorage, target: usize, next: usize) -> bool {
    // Payload indices grow in recording order, so the earlier command sits lower.
    debug_assert!(target < next);
    let (head, tail) = T::storage_mut(storage).split_at_mut(next);
    head[target].merge(&tail[0])
}

fn try_merge(storage: &mut CommandStorage, ty: CommandType, target: usize, next: usize) -> bool {
    match ty {
        CommandType::DrawCommands => merge_pair::<DrawCommandsCommand>(storage, target, next),
        CommandType::MemoryBarrier => merge_pair::<MemoryBarrierCommand>(storage, target, next),
        CommandType::BindDescriptorSets => {
            merge_pair::<BindDescriptorSetsCommand>(storage, target, next)
        }
        CommandType::SendPushConstants => {
            merge_pair::<SendPushConstantsCommand>(storage, target, next)
        }
        CommandType::DrawText => merge_pair::<DrawTextCommand>(storage, target, next),
        _ => false,
    }
}

/// Folds runs of adjacent, mergeable entries and compacts the draw lists.
pub(super) fn merge_entries(
    entries: &mut Vec<CommandEntry>,
    storage: &mut CommandStorage,
) -> BatchReport {
    let mut report = BatchReport::default();
    let mut kept: Vec<CommandEntry> = Vec::with_capacity(entries.len());

    for entry in entries.drain(..) {
        let ty = entry.command_type();
        if let Some(previous) = kept.last() {
            if previous.command_type() == ty
                && ty.is_mergeable()
                && try_merge(storage, ty, previous.index(), entry.index())
            {
                report.merged += 1;
                continue;
            }
        }
        kept.push(entry);
    }

    for entry in &kept {
        if entry.command_type() == CommandType::DrawCommands {
            let draws = &mut DrawCommandsCommand::storage_mut(storage)[entry.index()].draws;
            report.merged += compact_draws(draws);
        }
    }

    *entries = kept;
    report
}

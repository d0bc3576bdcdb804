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

//! Persistently mapped ring buffer with separate read and write sections.
//!
//! The buffer is split into one section per frame in flight. The CPU writes
//! into the write section while the GPU reads from the read section, which
//! is the previous frame's write section:
//!
//! ```text
//! Frame N:     [Section 0: GPU reads] [Section 1: CPU writes]
//! Frame N+1:   [Section 1: GPU reads] [Section 2: CPU writes]
//! Frame N+2:   [Section 2: GPU reads] [Section 0: CPU writes] <- waits on section 0's lock
//! ```
//!
//! Every write first waits on the [`LockManager`] for the destination
//! range, so a section still being read by in-flight GPU work is never
//! overwritten.

use super::api::GlApi;
use super::sync::LockManager;
use kiln_core::renderer::command::BufferLock;
use kiln_core::renderer::resources::BufferRange;
use kiln_core::renderer::{BufferId, SyncHandle};

/// A ring of equally sized sections inside one persistent buffer.
#[derive(Debug)]
pub struct PersistentBuffer {
    buffer: BufferId,
    section_size: usize,
    sections: usize,
    write_index: usize,
    read_index: usize,
    label: &'static str,
}

impl PersistentBuffer {
    /// Allocates `sections * section_size` bytes of persistently mapped storage.
    ///
    /// # Panics
    ///
    /// Panics if `sections` or `section_size` is zero.
    pub fn new<A: GlApi>(
        api: &mut A,
        section_size: usize,
        sections: usize,
        label: &'static str,
    ) -> Self {
        assert!(
            sections > 0 && section_size > 0,
            "PersistentBuffer({label}) needs at least one non-empty section"
        );
        let buffer = api.create_buffer(section_size * sections, true);
        log::debug!("PersistentBuffer({label}): {sections} x {section_size} bytes as {buffer:?}");
        Self {
            buffer,
            section_size,
            sections,
            write_index: 0,
            read_index: 0,
            label,
        }
    }

    /// Moves the write section forward. The section just written becomes the read section.
    pub fn advance(&mut self) {
        self.read_index = self.write_index;
        self.write_index = (self.write_index + 1) % self.sections;
    }

    /// Writes `data` at `offset` inside the write section, waiting for any
    /// lock on the destination bytes first.
    ///
    /// Returns the absolute range written.
    pub fn write_bytes<A: GlApi>(
        &mut self,
        api: &mut A,
        locks: &mut LockManager,
        offset: usize,
        data: &[u8],
    ) -> BufferRange {
        assert!(
            offset + data.len() <= self.section_size,
            "PersistentBuffer({}) write of {} bytes at {offset} overflows a {}-byte section",
            self.label,
            data.len(),
            self.section_size
        );
        let range = BufferRange::new(self.section_offset(self.write_index) + offset, data.len());
        locks.wait_for_locked_range(api, self.buffer, range, true);
        api.write_buffer(self.buffer, range.offset, data);
        range
    }

    /// Fences the write section so the next write into it waits for the GPU.
    pub fn lock_write_section<A: GlApi>(
        &self,
        api: &mut A,
        locks: &mut LockManager,
        frame: u64,
    ) -> Option<SyncHandle> {
        locks.lock_ranges(api, &[self.write_lock()], frame)
    }

    /// A lock covering the write section, for attaching to a `MemoryBarrier` command.
    pub fn write_lock(&self) -> BufferLock {
        BufferLock {
            buffer: self.buffer,
            range: self.write_range(),
        }
    }

    fn section_offset(&self, index: usize) -> usize {
        index * self.section_size
    }

    /// The section the CPU writes this frame.
    pub fn write_range(&self) -> BufferRange {
        BufferRange::new(self.section_offset(self.write_index), self.section_size)
    }

    /// The section the GPU reads this frame.
    pub fn read_range(&self) -> BufferRange {
        BufferRange::new(self.section_offset(self.read_index), self.section_size)
    }

    /// The underlying buffer.
    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    /// Returns the number of sections.
    pub fn section_count(&self) -> usize {
        self.sections
    }

    /// Releases the storage. Outstanding locks must have been released first.
    pub fn destroy<A: GlApi>(self, api: &mut A) {
        api.delete_buffer(self.buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::gl::headless::{GlCall, HeadlessGl};

    #[test]
    fn test_sections_cycle() {
        let mut gl = HeadlessGl::new();
        let mut ring = PersistentBuffer::new(&mut gl, 256, 3, "test");
        assert_eq!(ring.write_range(), BufferRange::new(0, 256));
        ring.advance();
        assert_eq!(ring.write_range(), BufferRange::new(256, 256));
        assert_eq!(ring.read_range(), BufferRange::new(0, 256));
        ring.advance();
        ring.advance();
        assert_eq!(ring.write_range(), BufferRange::new(0, 256));
    }

    #[test]
    fn test_write_waits_on_locked_section() {
        let mut gl = HeadlessGl::new();
        let mut locks = LockManager::new(1000);
        let mut ring = PersistentBuffer::new(&mut gl, 16, 2, "test");

        ring.lock_write_section(&mut gl, &mut locks, 0);
        ring.advance();
        ring.advance();
        gl.clear_calls();

        ring.write_bytes(&mut gl, &mut locks, 4, &[7, 7]);
        let wait = gl
            .calls()
            .iter()
            .position(|c| matches!(c, GlCall::ClientWaitSync(..)));
        let write = gl
            .calls()
            .iter()
            .position(|c| matches!(c, GlCall::WriteBuffer(..)));
        assert!(wait.unwrap() < write.unwrap());
        assert_eq!(locks.lock_count(), 0);
        assert_eq!(gl.buffer_contents(ring.buffer()).unwrap()[4..6], [7, 7]);

        // The fence is gone: the next write does not wait.
        gl.clear_calls();
        ring.write_bytes(&mut gl, &mut locks, 0, &[1]);
        assert_eq!(gl.count(|c| matches!(c, GlCall::ClientWaitSync(..))), 0);
    }

    #[test]
    #[should_panic(expected = "overflows a 16-byte section")]
    fn test_write_past_section_panics() {
        let mut gl = HeadlessGl::new();
        let mut locks = LockManager::new(1000);
        let mut ring = PersistentBuffer::new(&mut gl, 16, 2, "test");
        ring.write_bytes(&mut gl, &mut locks, 10, &[0; 8]);
    }
}

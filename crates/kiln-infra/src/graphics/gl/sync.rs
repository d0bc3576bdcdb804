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

//! CPU/GPU synchronization: byte-range locks and the frames-in-flight ring.
//!
//! A `MemoryBarrier` carrying buffer locks creates one fence covering every
//! locked range. Before the CPU writes into a range it must wait for every
//! fence still referencing it ([`LockManager::wait_for_locked_range`]).
//! [`FrameFences`] bounds how far the CPU can run ahead of the GPU.

use super::api::{GlApi, WaitResult};
use ahash::AHashMap;
use kiln_core::renderer::command::BufferLock;
use kiln_core::renderer::resources::BufferRange;
use kiln_core::renderer::{BufferId, SyncHandle};

#[derive(Debug, Clone, Copy)]
struct RangeLock {
    buffer: BufferId,
    range: BufferRange,
    fence: SyncHandle,
    frame: u64,
}

/// Tracks which buffer ranges the GPU may still be accessing.
#[derive(Debug)]
pub struct LockManager {
    timeout_ns: u64,
    locks: Vec<RangeLock>,
    /// Live fences and the number of locks referencing each.
    fences: AHashMap<SyncHandle, u32>,
    fences_created: u32,
    fence_waits: u32,
}

impl LockManager {
    /// Creates a manager whose blocking waits poll the device every `timeout_ns`.
    pub fn new(timeout_ns: u64) -> Self {
        Self {
            timeout_ns: timeout_ns.max(1),
            locks: Vec::new(),
            fences: AHashMap::new(),
            fences_created: 0,
            fence_waits: 0,
        }
    }

    /// Locks every range in `locks` behind one new fence.
    ///
    /// Returns the fence, or `None` if there was nothing to lock.
    pub fn lock_ranges<A: GlApi>(
        &mut self,
        api: &mut A,
        locks: &[BufferLock],
        frame: u64,
    ) -> Option<SyncHandle> {
        let live: Vec<&BufferLock> = locks
            .iter()
            .filter(|lock| !lock.buffer.is_none() && lock.range.length > 0)
            .collect();
        if live.is_empty() {
            return None;
        }
        let fence = api.fence_sync();
        self.fences_created += 1;
        self.fences.insert(fence, live.len() as u32);
        self.locks.extend(live.into_iter().map(|lock| RangeLock {
            buffer: lock.buffer,
            range: lock.range,
            fence,
            frame,
        }));
        log::trace!("locked {} range(s) behind {fence:?}", self.fences[&fence]);
        Some(fence)
    }

    /// Returns `true` if any lock overlaps `range` of `buffer`.
    pub fn is_locked(&self, buffer: BufferId, range: BufferRange) -> bool {
        self.locks
            .iter()
            .any(|lock| lock.buffer == buffer && lock.range.overlaps(&range))
    }

    /// Waits for every fence guarding a range overlapping `range` of `buffer`.
    ///
    /// With `blocking` the call only returns once the range is free. Without
    /// it each fence is polled once and the return value says whether the
    /// range is writable now.
    pub fn wait_for_locked_range<A: GlApi>(
        &mut self,
        api: &mut A,
        buffer: BufferId,
        range: BufferRange,
        blocking: bool,
    ) -> bool {
        let mut pending: Vec<SyncHandle> = self
            .locks
            .iter()
            .filter(|lock| lock.buffer == buffer && lock.range.overlaps(&range))
            .map(|lock| lock.fence)
            .collect();
        pending.sort_unstable();
        pending.dedup();

        let mut free = true;
        for fence in pending {
            if self.wait_fence(api, fence, blocking) {
                self.release_where(api, |lock| {
                    lock.fence == fence && lock.buffer == buffer && lock.range.overlaps(&range)
                });
            } else {
                free = false;
            }
        }
        free
    }

    fn wait_fence<A: GlApi>(&mut self, api: &mut A, fence: SyncHandle, blocking: bool) -> bool {
        self.fence_waits += 1;
        let timeout = if blocking { self.timeout_ns } else { 0 };
        loop {
            let result = api.client_wait_sync(fence, timeout);
            if result.is_signaled() {
                return true;
            }
            match result {
                WaitResult::WaitFailed => {
                    log::error!("waiting on {fence:?} failed; treating its ranges as released");
                    return true;
                }
                _ if !blocking => return false,
                _ => log::trace!("{fence:?} still pending after {timeout}ns"),
            }
        }
    }

    /// Drops every lock overlapping `range` of `buffer` without waiting.
    ///
    /// Only valid once the caller knows the GPU is done with the range, e.g.
    /// after the frame fence of the frame that locked it has signalled.
    pub fn release_range<A: GlApi>(&mut self, api: &mut A, buffer: BufferId, range: BufferRange) {
        self.release_where(api, |lock| lock.buffer == buffer && lock.range.overlaps(&range));
    }

    /// Releases locks whose fence has signalled, and every lock taken at or
    /// before `completed_frame`. Returns the number of locks released.
    pub fn cleanup_expired<A: GlApi>(
        &mut self,
        api: &mut A,
        completed_frame: Option<u64>,
    ) -> usize {
        let before = self.locks.len();
        if let Some(frame) = completed_frame {
            self.release_where(api, |lock| lock.frame <= frame);
        }
        let mut fences: Vec<SyncHandle> = self.fences.keys().copied().collect();
        fences.sort_unstable();
        for fence in fences {
            if api.client_wait_sync(fence, 0).is_signaled() {
                self.release_where(api, |lock| lock.fence == fence);
            }
        }
        before - self.locks.len()
    }

    fn release_where<A: GlApi>(&mut self, api: &mut A, predicate: impl Fn(&RangeLock) -> bool) {
        let fences = &mut self.fences;
        self.locks.retain(|lock| {
            if !predicate(lock) {
                return true;
            }
            if let Some(count) = fences.get_mut(&lock.fence) {
                *count -= 1;
                if *count == 0 {
                    fences.remove(&lock.fence);
                    api.delete_sync(lock.fence);
                }
            }
            false
        });
    }

    /// Number of locked ranges.
    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }

    /// Number of live fences.
    pub fn fence_count(&self) -> usize {
        self.fences.len()
    }

    /// Returns and resets the fences-created and fence-waits counters.
    pub fn take_counters(&mut self) -> (u32, u32) {
        let counters = (self.fences_created, self.fence_waits);
        self.fences_created = 0;
        self.fence_waits = 0;
        counters
    }
}

/// One fence per frame in flight.
///
/// [`begin_frame`](Self::begin_frame) waits for the frame that last used the
/// slot, so at most `frames_in_flight` frames are ever queued on the GPU.
#[derive(Debug)]
pub struct FrameFences {
    slots: Vec<Option<(u64, SyncHandle)>>,
    timeout_ns: u64,
    completed: Option<u64>,
}

impl FrameFences {
    /// Creates a ring of `frames_in_flight` slots.
    pub fn new(frames_in_flight: usize, timeout_ns: u64) -> Self {
        assert!(frames_in_flight > 0, "at least one frame must be in flight");
        Self {
            slots: vec![None; frames_in_flight],
            timeout_ns: timeout_ns.max(1),
            completed: None,
        }
    }

    /// Number of slots.
    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Waits until the slot of `frame` is free. Returns `true` if a wait was needed.
    pub fn begin_frame<A: GlApi>(&mut self, api: &mut A, frame: u64) -> bool {
        let slot = (frame % self.slots.len() as u64) as usize;
        match self.slots[slot].take() {
            Some((old_frame, fence)) => {
                self.wait(api, old_frame, fence);
                true
            }
            None => false,
        }
    }

    /// Inserts the frame-end fence for `frame`.
    pub fn end_frame<A: GlApi>(&mut self, api: &mut A, frame: u64) {
        let slot = (frame % self.slots.len() as u64) as usize;
        if let Some((old_frame, fence)) = self.slots[slot].take() {
            // Only reachable if begin_frame was skipped.
            self.wait(api, old_frame, fence);
        }
        self.slots[slot] = Some((frame, api.fence_sync()));
    }

    /// Waits for every frame in flight.
    pub fn wait_all<A: GlApi>(&mut self, api: &mut A) {
        let mut pending: Vec<(u64, SyncHandle)> =
            self.slots.iter_mut().filter_map(Option::take).collect();
        pending.sort_unstable_by_key(|(frame, _)| *frame);
        for (frame, fence) in pending {
            self.wait(api, frame, fence);
        }
    }

    fn wait<A: GlApi>(&mut self, api: &mut A, frame: u64, fence: SyncHandle) {
        loop {
            let result = api.client_wait_sync(fence, self.timeout_ns);
            if result.is_signaled() || result == WaitResult::WaitFailed {
                break;
            }
            log::trace!("frame {frame} still in flight");
        }
        api.delete_sync(fence);
        self.completed = Some(self.completed.map_or(frame, |c| c.max(frame)));
    }

    /// The newest frame known to have finished on the GPU.
    pub fn completed_frame(&self) -> Option<u64> {
        self.completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::gl::headless::{GlCall, HeadlessGl};

    fn lock(buffer: u32, offset: usize, length: usize) -> BufferLock {
        BufferLock {
            buffer: BufferId(buffer),
            range: BufferRange::new(offset, length),
        }
    }

    #[test]
    fn test_one_fence_per_barrier() {
        let mut gl = HeadlessGl::new();
        let mut locks = LockManager::new(1000);
        let fence = locks.lock_ranges(&mut gl, &[lock(1, 0, 64), lock(2, 0, 64)], 0);
        assert!(fence.is_some());
        assert_eq!(locks.lock_count(), 2);
        assert_eq!(locks.fence_count(), 1);
        assert_eq!(gl.count(|c| matches!(c, GlCall::FenceSync(_))), 1);
        assert!(locks.lock_ranges(&mut gl, &[], 0).is_none());
    }

    #[test]
    fn test_polling_wait_reports_pending_ranges() {
        let mut gl = HeadlessGl {
            auto_signal: false,
            ..Default::default()
        };
        let mut locks = LockManager::new(1000);
        locks.lock_ranges(&mut gl, &[lock(1, 0, 64)], 0);

        let inside = BufferRange::new(32, 8);
        let after = BufferRange::new(64, 8);
        assert!(!locks.wait_for_locked_range(&mut gl, BufferId(1), inside, false));
        assert!(locks.wait_for_locked_range(&mut gl, BufferId(1), after, false));
        assert!(locks.is_locked(BufferId(1), BufferRange::new(0, 1)));

        gl.signal_all_fences();
        assert!(locks.wait_for_locked_range(&mut gl, BufferId(1), inside, false));
        assert_eq!(locks.lock_count(), 0);
        assert_eq!(gl.live_fences(), 0);
    }

    #[test]
    fn test_fence_survives_until_last_lock_released() {
        let mut gl = HeadlessGl::new();
        let mut locks = LockManager::new(1000);
        locks.lock_ranges(&mut gl, &[lock(1, 0, 64), lock(1, 128, 64)], 0);

        locks.release_range(&mut gl, BufferId(1), BufferRange::new(0, 64));
        assert_eq!(locks.fence_count(), 1);
        locks.release_range(&mut gl, BufferId(1), BufferRange::new(128, 64));
        assert_eq!(locks.fence_count(), 0);
        assert_eq!(gl.count(|c| matches!(c, GlCall::DeleteSync(_))), 1);
    }

    #[test]
    fn test_cleanup_releases_completed_frames() {
        let mut gl = HeadlessGl {
            auto_signal: false,
            ..Default::default()
        };
        let mut locks = LockManager::new(1000);
        locks.lock_ranges(&mut gl, &[lock(1, 0, 64)], 1);
        locks.lock_ranges(&mut gl, &[lock(1, 64, 64)], 2);
        assert_eq!(locks.cleanup_expired(&mut gl, Some(1)), 1);
        assert_eq!(locks.lock_count(), 1);
    }

    #[test]
    fn test_frame_ring_waits_on_reuse() {
        let mut gl = HeadlessGl::new();
        let mut frames = FrameFences::new(2, 1000);
        for frame in 0..2 {
            assert!(!frames.begin_frame(&mut gl, frame));
            frames.end_frame(&mut gl, frame);
        }
        assert!(frames.begin_frame(&mut gl, 2));
        assert_eq!(frames.completed_frame(), Some(0));
        frames.end_frame(&mut gl, 2);
        frames.wait_all(&mut gl);
        assert_eq!(frames.completed_frame(), Some(2));
        assert_eq!(gl.live_fences(), 0);
    }
}

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

//! Fixed-capacity pooling of command buffers.
//!
//! A [`CommandBufferPool`] is a cheap handle to shared state: clones hand out
//! buffers from the same pool, so buffers recorded on worker threads can be
//! released on the render thread.

use super::CommandBuffer;
use crate::renderer::error::ResourceError;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug)]
struct PoolShared {
    capacity: usize,
    free: Mutex<Vec<CommandBuffer>>,
    created: AtomicUsize,
    outstanding: AtomicUsize,
}

/// A bounded pool of reusable [`CommandBuffer`]s.
#[derive(Debug, Clone)]
pub struct CommandBufferPool {
    shared: Arc<PoolShared>,
}

impl CommandBufferPool {
    /// Creates a pool that never hands out more than `capacity` buffers at once.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "command buffer pool needs a non-zero capacity");
        Self {
            shared: Arc::new(PoolShared {
                capacity,
                free: Mutex::new(Vec::with_capacity(capacity)),
                created: AtomicUsize::new(0),
                outstanding: AtomicUsize::new(0),
            }),
        }
    }

    /// The pool's fixed capacity.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Buffers currently handed out.
    pub fn outstanding(&self) -> usize {
        self.shared.outstanding.load(Ordering::Acquire)
    }

    /// Buffers ready for reuse without allocating.
    pub fn free_count(&self) -> usize {
        self.shared
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Takes a buffer from the pool.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::PoolExhausted`] if `capacity` buffers are outstanding.
    pub fn try_allocate_buffer(&self) -> Result<CommandBuffer, ResourceError> {
        let mut free = self
            .shared
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let buffer = match free.pop() {
            Some(buffer) => buffer,
            None => {
                let created = self.shared.created.load(Ordering::Acquire);
                if created >= self.shared.capacity {
                    return Err(ResourceError::PoolExhausted {
                        pool: "command buffer",
                        capacity: self.shared.capacity,
                    });
                }
                self.shared.created.store(created + 1, Ordering::Release);
                log::debug!(
                    "Command buffer pool grew to {}/{}",
                    created + 1,
                    self.shared.capacity
                );
                CommandBuffer::new()
            }
        };

        self.shared.outstanding.fetch_add(1, Ordering::AcqRel);
        Ok(buffer)
    }

    /// Takes a buffer from the pool.
    ///
    /// # Panics
    ///
    /// Panics if the pool is exhausted. The capacity is a configuration bound.
    pub fn allocate_buffer(&self) -> CommandBuffer {
        match self.try_allocate_buffer() {
            Ok(buffer) => buffer,
            Err(err) => panic!("{err}: raise the command buffer pool capacity"),
        }
    }

    /// Clears `buffer`, keeping its capacity, and returns it to the pool.
    ///
    /// # Panics
    ///
    /// Panics if more buffers are returned than were handed out.
    pub fn deallocate_buffer(&self, mut buffer: CommandBuffer) {
        buffer.clear(false);
        let released =
            self.shared
                .outstanding
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        assert!(
            released.is_ok(),
            "command buffer returned to a pool that has none outstanding"
        );
        self.shared
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(buffer);
    }

    /// Takes a buffer that returns itself to the pool when dropped.
    ///
    /// # Panics
    ///
    /// Panics if the pool is exhausted.
    pub fn scoped(&self) -> ScopedCommandBuffer {
        ScopedCommandBuffer {
            buffer: Some(self.allocate_buffer()),
            pool: self.clone(),
        }
    }

    /// Fallible version of [`scoped`](Self::scoped).
    pub fn try_scoped(&self) -> Result<ScopedCommandBuffer, ResourceError> {
        Ok(ScopedCommandBuffer {
            buffer: Some(self.try_allocate_buffer()?),
            pool: self.clone(),
        })
    }
}

/// A pooled [`CommandBuffer`] released on drop, on every exit path.
#[derive(Debug)]
pub struct ScopedCommandBuffer {
    buffer: Option<CommandBuffer>,
    pool: CommandBufferPool,
}

impl ScopedCommandBuffer {
    /// The pool the buffer returns to.
    pub fn pool(&self) -> &CommandBufferPool {
        &self.pool
    }
}

impl Deref for ScopedCommandBuffer {
    type Target = CommandBuffer;

    fn deref(&self) -> &CommandBuffer {
        // Only `drop` takes the buffer out.
        self.buffer.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for ScopedCommandBuffer {
    fn deref_mut(&mut self) -> &mut CommandBuffer {
        self.buffer.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for ScopedCommandBuffer {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.pool.deallocate_buffer(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::command::EndRenderPassCommand;

    #[test]
    fn test_scoped_buffer_returns_on_drop() {
        let pool = CommandBufferPool::new(2);
        {
            let mut scoped = pool.scoped();
            scoped.add(EndRenderPassCommand::default());
            assert_eq!(pool.outstanding(), 1);
        }
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.free_count(), 1);

        let reused = pool.scoped();
        assert!(reused.is_empty());
    }

    #[test]
    fn test_try_allocate_reports_exhaustion() {
        let pool = CommandBufferPool::new(1);
        let _held = pool.scoped();
        assert_eq!(
            pool.try_allocate_buffer().err(),
            Some(ResourceError::PoolExhausted {
                pool: "command buffer",
                capacity: 1
            })
        );
    }

    #[test]
    #[should_panic(expected = "pool exhausted")]
    fn test_allocate_panics_when_exhausted() {
        let pool = CommandBufferPool::new(1);
        let _a = pool.allocate_buffer();
        let _b = pool.allocate_buffer();
    }

    #[test]
    #[should_panic(expected = "none outstanding")]
    fn test_returning_foreign_buffer_panics() {
        let pool = CommandBufferPool::new(1);
        pool.deallocate_buffer(CommandBuffer::new());
    }
}

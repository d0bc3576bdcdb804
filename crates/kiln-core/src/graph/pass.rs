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

//! Parallel recording of render passes into pooled command buffers.

use super::task::{TaskGraph, TaskId};
use crate::renderer::command::{CommandBuffer, CommandBufferPool, ScopedCommandBuffer};
use crate::renderer::error::{RenderError, ResourceError};

/// Identifies a pass within its [`RenderPassGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassId(TaskId);

/// A recorded pass, ready to be flushed.
#[derive(Debug)]
pub struct RecordedPass {
    /// The pass name.
    pub name: String,
    /// Its commands. Returns to the pool when dropped.
    pub buffer: ScopedCommandBuffer,
}

type RecordFn<'env> = Box<dyn FnOnce(&mut CommandBuffer) + Send + 'env>;

/// Render passes with ordering dependencies.
///
/// Every pass records into its own pooled buffer on a worker thread. The
/// buffers come back in dependency order, which is the order they must be
/// flushed in. Passes with no ordering between them keep the order they
/// were added in.
pub struct RenderPassGraph<'env> {
    recorders: Vec<(String, RecordFn<'env>)>,
    edges: Vec<(PassId, PassId)>,
}

impl Default for RenderPassGraph<'_> {
    fn default() -> Self {
        Self {
            recorders: Vec::new(),
            edges: Vec::new(),
        }
    }
}

impl<'env> RenderPassGraph<'env> {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pass recorded by `record`.
    pub fn add_pass(
        &mut self,
        name: impl Into<String>,
        record: impl FnOnce(&mut CommandBuffer) + Send + 'env,
    ) -> PassId {
        self.recorders.push((name.into(), Box::new(record)));
        PassId(TaskId(self.recorders.len() - 1))
    }

    /// Makes `pass` execute after `depends_on`.
    pub fn add_dependency(&mut self, pass: PassId, depends_on: PassId) {
        self.edges.push((pass, depends_on));
    }

    /// Number of passes.
    pub fn len(&self) -> usize {
        self.recorders.len()
    }

    /// Returns `true` if no pass was added.
    pub fn is_empty(&self) -> bool {
        self.recorders.is_empty()
    }

    /// Records every pass on up to `workers` threads.
    ///
    /// # Errors
    ///
    /// Fails if the passes form a cycle or the pool cannot supply one buffer per pass.
    pub fn record(
        self,
        pool: &CommandBufferPool,
        workers: usize,
    ) -> Result<Vec<RecordedPass>, RenderError> {
        let mut graph: TaskGraph<'env, Result<RecordedPass, ResourceError>> = TaskGraph::new();
        for (name, record) in self.recorders {
            let pool = pool.clone();
            graph.add_task(name.clone(), move || {
                let mut buffer = pool.try_scoped()?;
                record(&mut *buffer);
                Ok(RecordedPass { name, buffer })
            });
        }
        for (PassId(pass), PassId(depends_on)) in self.edges {
            graph.add_dependency(pass, depends_on);
        }

        let order = graph.execution_order()?;
        let mut recorded: Vec<Option<RecordedPass>> = Vec::with_capacity(order.len());
        for pass in graph.run(workers)? {
            recorded.push(Some(pass?));
        }

        let passes: Vec<RecordedPass> = order
            .into_iter()
            .filter_map(|TaskId(index)| recorded[index].take())
            .collect();
        log::debug!("Recorded {} render pass(es)", passes.len());
        Ok(passes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::command::{AddDebugMessageCommand, CommandRef};

    fn marker(text: &'static str) -> impl FnOnce(&mut CommandBuffer) + Send {
        move |buffer: &mut CommandBuffer| {
            buffer.add(AddDebugMessageCommand {
                message: text.into(),
                id: 0,
            });
        }
    }

    #[test]
    fn test_passes_come_back_in_dependency_order() {
        let pool = CommandBufferPool::new(4);
        let mut graph = RenderPassGraph::new();
        let post = graph.add_pass("post", marker("post"));
        let gbuffer = graph.add_pass("gbuffer", marker("gbuffer"));
        let shadows = graph.add_pass("shadows", marker("shadows"));
        graph.add_dependency(post, gbuffer);
        graph.add_dependency(gbuffer, shadows);

        let passes = graph.record(&pool, 3).unwrap();

        let names: Vec<_> = passes.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["shadows", "gbuffer", "post"]);
        assert!(matches!(
            passes[0].buffer.iter().next(),
            Some(CommandRef::AddDebugMessage(m)) if m.message == "shadows"
        ));
        assert_eq!(pool.outstanding(), 3);
        drop(passes);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_too_small_pool_is_an_error() {
        let pool = CommandBufferPool::new(1);
        let mut graph = RenderPassGraph::new();
        graph.add_pass("a", marker("a"));
        graph.add_pass("b", marker("b"));
        let err = graph.record(&pool, 1).unwrap_err();
        assert!(matches!(
            err,
            RenderError::Resource(ResourceError::PoolExhausted { .. })
        ));
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_cycle_is_an_error() {
        let pool = CommandBufferPool::new(2);
        let mut graph = RenderPassGraph::new();
        let a = graph.add_pass("a", marker("a"));
        let b = graph.add_pass("b", marker("b"));
        graph.add_dependency(a, b);
        graph.add_dependency(b, a);
        assert!(matches!(
            graph.record(&pool, 2),
            Err(RenderError::PassGraph(_))
        ));
    }
}

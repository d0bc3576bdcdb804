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

//! Bounded pool of GPU query objects.

use super::api::{GlApi, QueryTarget};
use kiln_core::renderer::command::QueryMask;
use kiln_core::renderer::{QueryId, QueryResult, ResourceError};

impl QueryTarget {
    /// The mask bit reported in [`QueryResult::kind`].
    pub fn mask(self) -> QueryMask {
        match self {
            Self::SamplesPassed => QueryMask::SAMPLES_PASSED,
            Self::AnySamplesPassed => QueryMask::ANY_SAMPLES_PASSED,
            Self::PrimitivesGenerated => QueryMask::PRIMITIVES_GENERATED,
            Self::TimeElapsed => QueryMask::TIME_ELAPSED,
        }
    }

    /// The targets selected by `mask`, in bit order.
    pub fn from_mask(mask: QueryMask) -> impl Iterator<Item = QueryTarget> {
        [
            Self::SamplesPassed,
            Self::AnySamplesPassed,
            Self::PrimitivesGenerated,
            Self::TimeElapsed,
        ]
        .into_iter()
        .filter(move |target| mask.contains(target.mask()))
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingQuery {
    query: QueryId,
    tag: u32,
    target: QueryTarget,
}

/// Query objects recycled once their results have been read back.
#[derive(Debug)]
pub struct QueryPool {
    capacity: usize,
    created: usize,
    free: Vec<QueryId>,
    pending: Vec<PendingQuery>,
    ready: Vec<QueryResult>,
}

impl QueryPool {
    /// Creates a pool that never holds more than `capacity` query objects.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            created: 0,
            free: Vec::new(),
            pending: Vec::new(),
            ready: Vec::new(),
        }
    }

    /// Takes a free query object, creating one while under capacity.
    ///
    /// # Errors
    ///
    /// [`ResourceError::PoolExhausted`] if every query is still awaiting its result.
    pub fn allocate<A: GlApi>(&mut self, api: &mut A) -> Result<QueryId, ResourceError> {
        if let Some(query) = self.free.pop() {
            return Ok(query);
        }
        if self.created < self.capacity {
            self.created += 1;
            return Ok(api.create_query());
        }
        Err(ResourceError::PoolExhausted {
            pool: "query",
            capacity: self.capacity,
        })
    }

    /// Registers an ended query whose result will be reported under `tag`.
    pub fn submit(&mut self, query: QueryId, tag: u32, target: QueryTarget) {
        self.pending.push(PendingQuery { query, tag, target });
    }

    /// Reads back every available result and recycles those queries.
    ///
    /// With `wait` the call blocks until every pending result is available.
    /// Returns the number of queries recycled.
    pub fn collect<A: GlApi>(&mut self, api: &mut A, wait: bool) -> usize {
        let before = self.pending.len();
        let mut still_pending = Vec::with_capacity(before);
        for pending in self.pending.drain(..) {
            match api.query_result(pending.query, wait) {
                Some(value) => {
                    self.ready.push(QueryResult {
                        tag: pending.tag,
                        kind: pending.target.mask().bits(),
                        value,
                    });
                    self.free.push(pending.query);
                }
                None if wait => {
                    log::error!(
                        "query {:?} has no result after waiting; dropping it",
                        pending.query
                    );
                    api.delete_query(pending.query);
                    self.created -= 1;
                }
                None => still_pending.push(pending),
            }
        }
        self.pending = still_pending;
        before - self.pending.len()
    }

    /// Results read back since the last call.
    pub fn take_results(&mut self) -> Vec<QueryResult> {
        std::mem::take(&mut self.ready)
    }

    /// Number of queries awaiting results.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Deletes every query object.
    pub fn destroy_all<A: GlApi>(&mut self, api: &mut A) {
        for query in self.free.drain(..) {
            api.delete_query(query);
        }
        for pending in self.pending.drain(..) {
            api.delete_query(pending.query);
        }
        self.created = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::gl::headless::HeadlessGl;

    #[test]
    fn test_mask_targets_in_bit_order() {
        let targets: Vec<_> =
            QueryTarget::from_mask(QueryMask::TIME_ELAPSED | QueryMask::SAMPLES_PASSED).collect();
        assert_eq!(targets, vec![QueryTarget::SamplesPassed, QueryTarget::TimeElapsed]);
    }

    #[test]
    fn test_exhaustion_and_recycling() {
        let mut gl = HeadlessGl::new();
        let mut pool = QueryPool::new(1);
        let query = pool.allocate(&mut gl).unwrap();
        assert!(pool.allocate(&mut gl).is_err());

        gl.begin_query(QueryTarget::SamplesPassed, query);
        gl.end_query(QueryTarget::SamplesPassed);
        pool.submit(query, 7, QueryTarget::SamplesPassed);
        assert_eq!(pool.collect(&mut gl, false), 1);

        assert_eq!(pool.allocate(&mut gl).unwrap(), query);
        let results = pool.take_results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].tag, 7);
        assert_eq!(results[0].kind, QueryMask::SAMPLES_PASSED.bits());
    }
}

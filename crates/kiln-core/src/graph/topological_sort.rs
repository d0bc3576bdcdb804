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

//! Kahn's algorithm with a stable tie-break.

use ahash::AHashMap;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::hash::Hash;
use thiserror::Error;

/// A cycle was detected in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dependency cycle detected among {remaining} node(s)")]
pub struct CycleError {
    /// Nodes that could not be ordered.
    pub remaining: usize,
}

/// Orders `nodes` so every parent precedes its children.
///
/// Among nodes that are ready at the same time, the one listed first in
/// `nodes` comes first, so the order is deterministic.
///
/// # Arguments
///
/// * `nodes`: The unique nodes of the graph.
/// * `edges`: Directed `(parent, child)` dependencies. Edges naming unknown nodes are ignored.
///
/// # Returns
///
/// * `Ok(Vec<T>)`: The nodes in dependency order.
/// * `Err(CycleError)`: If the graph contains a cycle.
pub fn topological_sort<T>(
    nodes: impl IntoIterator<Item = T>,
    edges: impl IntoIterator<Item = (T, T)>,
) -> Result<Vec<T>, CycleError>
where
    T: Copy + Eq + Hash,
{
    let node_list: Vec<T> = nodes.into_iter().collect();
    let position: AHashMap<T, usize> = node_list
        .iter()
        .enumerate()
        .map(|(i, node)| (*node, i))
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); node_list.len()];
    let mut in_degree = vec![0usize; node_list.len()];
    for (parent, child) in edges {
        if let (Some(&p), Some(&c)) = (position.get(&parent), position.get(&child)) {
            children[p].push(c);
            in_degree[c] += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut sorted = Vec::with_capacity(node_list.len());
    while let Some(Reverse(node)) = ready.pop() {
        sorted.push(node_list[node]);
        for &child in &children[node] {
            in_degree[child] -= 1;
            if in_degree[child] == 0 {
                ready.push(Reverse(child));
            }
        }
    }

    if sorted.len() != node_list.len() {
        return Err(CycleError {
            remaining: node_list.len() - sorted.len(),
        });
    }
    Ok(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_chain() {
        let order = topological_sort([3, 2, 1], [(1, 2), (2, 3)]).unwrap();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_ties_follow_listing_order() {
        // 'a' and 'c' are both roots; 'a' is listed first.
        let order = topological_sort(['a', 'b', 'c'], [('a', 'b')]).unwrap();
        assert_eq!(order, vec!['a', 'b', 'c']);
        let order = topological_sort(['c', 'a', 'b'], [('a', 'b')]).unwrap();
        assert_eq!(order, vec!['c', 'a', 'b']);
    }

    #[test]
    fn test_cycle_is_reported() {
        let err = topological_sort([1, 2, 3], [(1, 2), (2, 3), (3, 2)]).unwrap_err();
        assert_eq!(err, CycleError { remaining: 2 });
    }

    #[test]
    fn test_empty_graph() {
        assert_eq!(topological_sort::<u8>([], []), Ok(vec![]));
    }
}

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

//! Explicit task graphs executed on a worker pool.
//!
//! Tasks never wait on each other inside a worker. A scheduler on the calling
//! thread tracks how many dependencies of every task are still pending and
//! hands a task to the workers only once that count reaches zero.

use super::topological_sort::{topological_sort, CycleError};
use crossbeam_channel::unbounded;
use std::panic::{self, AssertUnwindSafe};

/// Identifies a task within its [`TaskGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub usize);

type Job<'env, T> = Box<dyn FnOnce() -> T + Send + 'env>;

struct TaskNode<'env, T> {
    name: String,
    job: Job<'env, T>,
}

/// A set of jobs with dependency edges, producing one `T` per job.
pub struct TaskGraph<'env, T> {
    tasks: Vec<TaskNode<'env, T>>,
    edges: Vec<(TaskId, TaskId)>,
}

impl<T> Default for TaskGraph<'_, T> {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            edges: Vec::new(),
        }
    }
}

impl<'env, T: Send + 'env> TaskGraph<'env, T> {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a job and returns its ID.
    pub fn add_task(
        &mut self,
        name: impl Into<String>,
        job: impl FnOnce() -> T + Send + 'env,
    ) -> TaskId {
        self.tasks.push(TaskNode {
            name: name.into(),
            job: Box::new(job),
        });
        TaskId(self.tasks.len() - 1)
    }

    /// Makes `task` wait for `depends_on`.
    ///
    /// # Panics
    ///
    /// Panics if either ID is unknown or a task depends on itself.
    pub fn add_dependency(&mut self, task: TaskId, depends_on: TaskId) {
        assert!(
            task.0 < self.tasks.len() && depends_on.0 < self.tasks.len(),
            "task dependency names an unknown task"
        );
        assert_ne!(task, depends_on, "task '{}' depends on itself", self.tasks[task.0].name);
        self.edges.push((depends_on, task));
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` if the graph has no task.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// The name given to `task`.
    pub fn name(&self, task: TaskId) -> &str {
        &self.tasks[task.0].name
    }

    /// A dependency-respecting order, ties broken by insertion order.
    pub fn execution_order(&self) -> Result<Vec<TaskId>, CycleError> {
        topological_sort((0..self.tasks.len()).map(TaskId), self.edges.iter().copied())
    }

    /// Runs every job on up to `workers` threads and returns the results indexed by [`TaskId`].
    ///
    /// A job starts only after all of its dependencies finished. If a job
    /// panics, no further job is started and the panic resumes on the caller.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError`] without running anything if the graph has a cycle.
    pub fn run(self, workers: usize) -> Result<Vec<T>, CycleError> {
        let order = self.execution_order()?;
        let task_count = self.tasks.len();
        if task_count == 0 {
            return Ok(Vec::new());
        }

        let mut dependants = vec![Vec::new(); task_count];
        let mut pending = vec![0usize; task_count];
        for &(TaskId(parent), TaskId(child)) in &self.edges {
            dependants[parent].push(child);
            pending[child] += 1;
        }

        let mut jobs: Vec<Option<Job<'env, T>>> =
            self.tasks.into_iter().map(|task| Some(task.job)).collect();
        let mut results: Vec<Option<T>> = (0..task_count).map(|_| None).collect();
        let workers = workers.clamp(1, task_count);
        let mut failure = None;

        let (job_tx, job_rx) = unbounded::<(usize, Job<'env, T>)>();
        let (done_tx, done_rx) = unbounded::<(usize, std::thread::Result<T>)>();

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let done_tx = done_tx.clone();
                scope.spawn(move || {
                    for (id, job) in job_rx.iter() {
                        let outcome = panic::catch_unwind(AssertUnwindSafe(job));
                        if done_tx.send((id, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(job_rx);
            drop(done_tx);

            let mut submit = |id: usize| {
                if let Some(job) = jobs[id].take() {
                    // Workers only exit once `job_tx` is dropped below.
                    let _ = job_tx.send((id, job));
                }
            };

            for &TaskId(id) in &order {
                if pending[id] == 0 {
                    submit(id);
                }
            }

            let mut completed = 0;
            while completed < task_count {
                let Ok((id, outcome)) = done_rx.recv() else {
                    break;
                };
                completed += 1;
                match outcome {
                    Ok(value) => {
                        results[id] = Some(value);
                        for &child in &dependants[id] {
                            pending[child] -= 1;
                            if pending[child] == 0 {
                                submit(child);
                            }
                        }
                    }
                    Err(payload) => {
                        failure = Some(payload);
                        break;
                    }
                }
            }
            drop(job_tx);
        });

        if let Some(payload) = failure {
            panic::resume_unwind(payload);
        }

        log::trace!("Task graph ran {task_count} task(s) on {workers} worker(s)");
        Ok(results.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_results_are_indexed_by_task() {
        let mut graph = TaskGraph::new();
        let a = graph.add_task("a", || 1);
        let b = graph.add_task("b", || 2);
        graph.add_dependency(b, a);
        assert_eq!(graph.run(4).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_dependencies_complete_first() {
        let log = Mutex::new(Vec::new());
        let mut graph = TaskGraph::new();
        let shadow = graph.add_task("shadow", || log.lock().unwrap().push("shadow"));
        let depth = graph.add_task("depth", || log.lock().unwrap().push("depth"));
        let lighting = graph.add_task("lighting", || log.lock().unwrap().push("lighting"));
        graph.add_dependency(lighting, shadow);
        graph.add_dependency(lighting, depth);

        graph.run(3).unwrap();

        let log = log.into_inner().unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log[2], "lighting");
    }

    #[test]
    fn test_cycle_runs_nothing() {
        let ran = Mutex::new(false);
        let mut graph = TaskGraph::new();
        let a = graph.add_task("a", || *ran.lock().unwrap() = true);
        let b = graph.add_task("b", || *ran.lock().unwrap() = true);
        graph.add_dependency(a, b);
        graph.add_dependency(b, a);
        assert!(graph.run(2).is_err());
        assert!(!*ran.lock().unwrap());
    }

    #[test]
    #[should_panic(expected = "boom")]
    fn test_job_panic_propagates() {
        let mut graph = TaskGraph::new();
        graph.add_task("ok", || ());
        graph.add_task("bad", || panic!("boom"));
        let _ = graph.run(2);
    }
}

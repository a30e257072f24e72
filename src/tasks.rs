//! Task graph execution.
//!
//! A graph is an ordered list of stages; each stage is a group of named
//! tasks run concurrently on the rayon pool. A stage starts only after
//! every task of the previous stage has finished, failed or not:
//! failures are logged and reported but do not stop the graph.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{error, info};

use crate::error::TaskError;

/// What a finished task produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskOutput {
    pub files: u64,
    pub bytes: u64,
}

impl TaskOutput {
    pub fn new(files: u64, bytes: u64) -> Self {
        Self { files, bytes }
    }
}

/// Body of a task
pub type TaskFn = Box<dyn Fn() -> Result<TaskOutput, TaskError> + Send + Sync>;

/// A named unit of work within a stage
pub struct Task {
    pub name: &'static str,
    run: TaskFn,
}

impl Task {
    pub fn new(
        name: &'static str,
        run: impl Fn() -> Result<TaskOutput, TaskError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            run: Box::new(run),
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task").field("name", &self.name).finish()
    }
}

/// Result of a task
#[derive(Debug)]
pub struct TaskReport {
    /// Task name
    pub name: &'static str,
    /// Index of the stage the task ran in
    pub stage: usize,
    /// Success or failure status
    pub status: TaskStatus,
    /// Files and bytes written
    pub output: TaskOutput,
    /// Time taken for this task
    pub duration: Duration,
}

/// Task outcome
#[derive(Debug)]
pub enum TaskStatus {
    Success,
    Failed(TaskError),
}

impl TaskStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskStatus::Success)
    }
}

/// Cache-line aligned atomic counter to prevent false sharing
/// Each counter is on its own 64-byte cache line
#[repr(align(64))]
pub struct CacheAlignedAtomic(pub AtomicU64);

impl CacheAlignedAtomic {
    pub const fn new(val: u64) -> Self {
        Self(AtomicU64::new(val))
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Counters shared by tasks running on different threads
pub struct TaskStats {
    pub files_written: CacheAlignedAtomic,
    pub bytes_written: CacheAlignedAtomic,
    pub failures: CacheAlignedAtomic,
}

impl TaskStats {
    pub fn new() -> Self {
        Self {
            files_written: CacheAlignedAtomic::new(0),
            bytes_written: CacheAlignedAtomic::new(0),
            failures: CacheAlignedAtomic::new(0),
        }
    }

    fn record(&self, report: &TaskReport) {
        match report.status {
            TaskStatus::Success => {
                self.files_written
                    .0
                    .fetch_add(report.output.files, Ordering::Relaxed);
                self.bytes_written
                    .0
                    .fetch_add(report.output.bytes, Ordering::Relaxed);
            }
            TaskStatus::Failed(_) => {
                self.failures.0.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl Default for TaskStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Ordered stages of concurrently-run tasks
#[derive(Debug, Default)]
pub struct TaskGraph {
    stages: Vec<Vec<Task>>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage; its tasks run concurrently after every earlier stage
    pub fn stage(mut self, tasks: Vec<Task>) -> Self {
        if !tasks.is_empty() {
            self.stages.push(tasks);
        }
        self
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn task_count(&self) -> usize {
        self.stages.iter().map(Vec::len).sum()
    }

    /// Task names per stage, in declaration order
    pub fn plan(&self) -> Vec<Vec<&'static str>> {
        self.stages
            .iter()
            .map(|stage| stage.iter().map(|t| t.name).collect())
            .collect()
    }

    /// Run every stage in order; `on_done` is called as each task finishes
    pub fn run(&self, stats: &TaskStats, on_done: &(dyn Fn(&TaskReport) + Sync)) -> Vec<TaskReport> {
        let mut reports = Vec::with_capacity(self.task_count());

        for (index, stage) in self.stages.iter().enumerate() {
            let stage_reports: Vec<TaskReport> = stage
                .par_iter()
                .map(|task| {
                    let report = run_task(task, index);
                    stats.record(&report);
                    on_done(&report);
                    report
                })
                .collect();
            reports.extend(stage_reports);
        }

        reports
    }
}

fn run_task(task: &Task, stage: usize) -> TaskReport {
    let start = Instant::now();
    let (status, output) = match (task.run)() {
        Ok(output) => {
            info!(
                task = task.name,
                files = output.files,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "finished"
            );
            (TaskStatus::Success, output)
        }
        Err(e) => {
            error!(task = task.name, error = %e, "task failed");
            (TaskStatus::Failed(e), TaskOutput::default())
        }
    };

    TaskReport {
        name: task.name,
        stage,
        status,
        output,
        duration: start.elapsed(),
    }
}

/// Collect and aggregate results from a graph run
pub fn collect_results(results: Vec<TaskReport>) -> (Vec<TaskReport>, bool, bool) {
    let mut all_results = Vec::with_capacity(results.len());
    let mut has_success = false;
    let mut has_failure = false;

    for result in results {
        match &result.status {
            TaskStatus::Success => has_success = true,
            TaskStatus::Failed(_) => has_failure = true,
        }
        all_results.push(result);
    }

    (all_results, has_success, has_failure)
}

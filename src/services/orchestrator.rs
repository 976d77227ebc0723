//! Split task orchestration.
//!
//! `create_split_task` validates the chapter set, registers a `Pending` task and spawns one
//! execution per task. The execution walks chapters in page order, calling the splitter once
//! per chapter and publishing progress to the [`TaskRegistry`]; the first failure ends the
//! task as `Failed` and leaves earlier outputs in place. Readers only ever get cloned
//! snapshots.

use crate::config::TaskConfig;
use crate::error::{Result, SplitError};
use crate::models::{ChapterDefinition, ChapterOutput, SplitTask, TaskId, TaskStatus};
use crate::services::splitter::{Splitter, chapter_output_path};
use crate::services::validator::ensure_valid;
use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Process-wide `TaskId -> SplitTask` map.
///
/// Each entry has exactly one writer, the execution spawned for it.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: DashMap<TaskId, SplitTask>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, task: SplitTask) {
        self.tasks.insert(task.task_id.clone(), task);
    }

    /// Copy of the current state of a task.
    pub fn snapshot(&self, task_id: &TaskId) -> Option<SplitTask> {
        self.tasks.get(task_id).map(|entry| entry.value().clone())
    }

    pub fn snapshots(&self) -> Vec<SplitTask> {
        self.tasks.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Mutate a task under its entry lock. Terminal tasks are never touched again and
    /// progress never moves backwards.
    fn update(&self, task_id: &TaskId, f: impl FnOnce(&mut SplitTask)) -> Result<()> {
        let mut entry = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| SplitError::InternalRegistry(format!("task {task_id} vanished")))?;
        let task = entry.value_mut();
        if task.status.is_terminal() {
            return Err(SplitError::InternalRegistry(format!(
                "task {task_id} is already {:?}",
                task.status
            )));
        }
        let floor = task.progress;
        f(task);
        task.progress = task.progress.max(floor);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Per-status task counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
    /// Executions currently holding a concurrency permit.
    pub running_executions: usize,
    pub max_concurrent_tasks: usize,
}

pub struct SplitOrchestrator {
    registry: Arc<TaskRegistry>,
    splitter: Arc<dyn Splitter>,
    output_dir: PathBuf,
    permits: Arc<Semaphore>,
    max_concurrent_tasks: usize,
}

impl SplitOrchestrator {
    pub fn new(splitter: Arc<dyn Splitter>, config: &TaskConfig) -> Arc<Self> {
        let max_concurrent_tasks = config.max_concurrent_tasks.max(1);
        Arc::new(Self {
            registry: Arc::new(TaskRegistry::new()),
            splitter,
            output_dir: config.output_dir.clone(),
            permits: Arc::new(Semaphore::new(max_concurrent_tasks)),
            max_concurrent_tasks,
        })
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Register a task for a committed chapter set and start it in the background.
    ///
    /// Must be called from within a Tokio runtime. Returns the `Pending` record without
    /// waiting for execution to begin.
    pub fn create_split_task(
        self: &Arc<Self>,
        file_id: &str,
        chapters: &[ChapterDefinition],
        total_pages: u32,
    ) -> Result<SplitTask> {
        ensure_valid(chapters, total_pages)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SplitError::InternalRegistry(format!("no async runtime: {e}")))?;

        let task = SplitTask::pending(file_id, chapters.to_vec());
        let task_id = task.task_id.clone();
        self.registry.insert(task.clone());

        tracing::info!(
            task_id = %task_id,
            file_id,
            chapters = chapters.len(),
            "split task created"
        );

        let orchestrator = Arc::clone(self);
        runtime.spawn(async move { orchestrator.supervise(task_id).await });

        Ok(task)
    }

    /// Non-blocking read of a task's current state.
    pub fn get_task_status(&self, task_id: &TaskId) -> Result<SplitTask> {
        self.registry
            .snapshot(task_id)
            .ok_or_else(|| SplitError::TaskNotFound(task_id.to_string()))
    }

    /// Tasks newest first, optionally limited to one file.
    pub fn list_tasks(&self, file_id: Option<&str>) -> Vec<SplitTask> {
        let mut tasks: Vec<SplitTask> = self
            .registry
            .snapshots()
            .into_iter()
            .filter(|t| file_id.is_none_or(|id| t.file_id == id))
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks
    }

    /// Pending and processing tasks, oldest first.
    pub fn active_tasks(&self) -> Vec<SplitTask> {
        let mut tasks: Vec<SplitTask> = self
            .registry
            .snapshots()
            .into_iter()
            .filter(|t| !t.status.is_terminal())
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        tasks
    }

    pub fn queue_status(&self) -> QueueStatus {
        let mut status = QueueStatus {
            pending: 0,
            processing: 0,
            completed: 0,
            failed: 0,
            total: 0,
            running_executions: self.max_concurrent_tasks - self.permits.available_permits(),
            max_concurrent_tasks: self.max_concurrent_tasks,
        };
        for task in self.registry.snapshots() {
            status.total += 1;
            match task.status {
                TaskStatus::Pending => status.pending += 1,
                TaskStatus::Processing => status.processing += 1,
                TaskStatus::Completed => status.completed += 1,
                TaskStatus::Failed => status.failed += 1,
            }
        }
        status
    }

    /// Runs the execution in its own task so a panicking splitter still ends in `Failed`.
    async fn supervise(self: Arc<Self>, task_id: TaskId) {
        let orchestrator = Arc::clone(&self);
        let id = task_id.clone();
        let outcome = tokio::spawn(async move { orchestrator.execute(id).await }).await;

        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(join_err) => format!("execution aborted: {join_err}"),
        };

        tracing::error!(task_id = %task_id, error = %failure, "split task failed");
        let recorded = self.registry.update(&task_id, |task| {
            task.status = TaskStatus::Failed;
            task.error_message = Some(failure);
            task.completed_at = Some(Utc::now());
        });
        if let Err(e) = recorded {
            // The execution may already have recorded its own terminal state.
            tracing::debug!(task_id = %task_id, error = %e, "failure not recorded");
        }
    }

    async fn execute(&self, task_id: TaskId) -> Result<()> {
        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| SplitError::InternalRegistry(format!("task permits closed: {e}")))?;

        let (file_id, chapters) = self
            .registry
            .snapshot(&task_id)
            .map(|t| (t.file_id, t.chapters))
            .ok_or_else(|| SplitError::InternalRegistry(format!("task {task_id} vanished")))?;

        self.registry.update(&task_id, |task| {
            task.status = TaskStatus::Processing;
        })?;
        tracing::info!(task_id = %task_id, file_id = %file_id, "split task started");

        // Committed sets are ordered by start page, so this is ascending page order.
        let total = chapters.len();
        for (index, chapter) in chapters.iter().enumerate() {
            let target = chapter_output_path(&self.output_dir, &file_id, index, &chapter.title);
            let path = self
                .splitter
                .split_range(&file_id, chapter.start_page, chapter.end_page, &target)
                .await
                .map_err(|source| SplitError::SplitFailure {
                    chapter: index + 1,
                    title: chapter.title.clone(),
                    source,
                })?;

            let done = index + 1;
            let progress = chapter_progress(done, total);
            self.registry.update(&task_id, |task| {
                task.outputs.push(ChapterOutput {
                    chapter_index: index,
                    title: chapter.title.clone(),
                    path,
                });
                task.progress = progress;
                if done == total {
                    task.status = TaskStatus::Completed;
                    task.completed_at = Some(Utc::now());
                }
            })?;

            tracing::info!(
                task_id = %task_id,
                chapter = %chapter.title,
                progress,
                "chapter split"
            );
        }

        tracing::info!(task_id = %task_id, chapters = total, "split task completed");
        Ok(())
    }
}

/// `round(done / total * 100)`, held below 100 until the last chapter is done.
/// The last chapter's output lands in the same update that marks the task Completed.
fn chapter_progress(done: usize, total: usize) -> u8 {
    if total == 0 || done >= total {
        return 100;
    }
    let rounded = (200 * done + total) / (2 * total);
    rounded.min(99) as u8
}

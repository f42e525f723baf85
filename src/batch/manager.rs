//! Task registry and background execution
//!
//! Every batch gets one [`TaskEntry`] holding its state behind a lock, a
//! cancellation token and a `watch` channel carrying the latest snapshot.
//! Only the owning worker mutates a task, and it publishes the new snapshot
//! while still holding the write lock, so status reads (which only borrow
//! the channel) never observe a half-applied transition.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use validator::Validate;

use super::ingest::{FileFault, SubmittedFile, process_file};
use crate::models::{FileReport, PerRecordResult, Task, TaskSnapshot, TaskStatus};

// ============================================
// Errors
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("Task '{0}' not found")]
    NotFound(String),

    #[error("Task {id} is {status}; results are available once it has completed")]
    NotReady { id: Uuid, status: TaskStatus },

    #[error("No files provided")]
    NoFiles,

    #[error("{0}")]
    Validation(String),

    #[error("Task registry is full: {0} tasks are still active")]
    CapacityExceeded(usize),
}

/// Unknown and malformed ids are both reported as not found
pub fn parse_task_id(raw: &str) -> Result<Uuid, TaskError> {
    Uuid::parse_str(raw.trim()).map_err(|_| TaskError::NotFound(raw.to_string()))
}

// ============================================
// Registry
// ============================================

#[derive(Debug, Clone, Copy)]
pub struct RegistryLimits {
    /// Maximum number of tasks kept in memory, active or not
    pub max_tasks: usize,
    /// Age after which a terminal task is dropped
    pub task_ttl: Duration,
}

impl Default for RegistryLimits {
    fn default() -> Self {
        Self {
            max_tasks: 1024,
            task_ttl: Duration::from_secs(3600),
        }
    }
}

struct TaskEntry {
    task: RwLock<Task>,
    cancel: CancellationToken,
    updates: watch::Sender<TaskSnapshot>,
}

impl TaskEntry {
    fn snapshot(&self) -> TaskSnapshot {
        self.updates.borrow().clone()
    }

    /// Apply one transition and publish the resulting snapshot
    async fn update(&self, transition: impl FnOnce(&mut Task)) -> TaskSnapshot {
        let mut task = self.task.write().await;
        transition(&mut task);
        let snapshot = task.snapshot();
        self.updates.send_replace(snapshot.clone());
        snapshot
    }

    /// Terminal for at least `ttl`
    fn finished_before(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let snapshot = self.updates.borrow();
        match snapshot.finished_at {
            Some(finished) if snapshot.status.is_terminal() => now
                .signed_duration_since(finished)
                .to_std()
                .map(|age| age >= ttl)
                .unwrap_or(false),
            _ => false,
        }
    }
}

/// Full output of a completed task
#[derive(Debug, Clone)]
pub struct TaskResults {
    pub snapshot: TaskSnapshot,
    pub results: Vec<PerRecordResult>,
    pub files: Vec<FileReport>,
}

/// Number of registered tasks per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub error: usize,
    pub cancelled: usize,
}

struct Inner {
    tasks: RwLock<HashMap<Uuid, Arc<TaskEntry>>>,
    limits: RegistryLimits,
}

/// Shared handle to the task registry. Cloning is cheap.
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<Inner>,
}

impl TaskManager {
    pub fn new(limits: RegistryLimits) -> Self {
        Self {
            inner: Arc::new(Inner {
                tasks: RwLock::new(HashMap::new()),
                limits,
            }),
        }
    }

    pub fn limits(&self) -> RegistryLimits {
        self.inner.limits
    }

    /// Register a batch and start processing it in the background.
    ///
    /// Returns as soon as the task is registered; the work done here does
    /// not depend on the size of the submitted content.
    pub async fn create(
        &self,
        files: Vec<SubmittedFile>,
        has_header: bool,
    ) -> Result<TaskSnapshot, TaskError> {
        let Some(first) = files.first() else {
            return Err(TaskError::NoFiles);
        };
        for file in &files {
            file.validate()
                .map_err(|e| TaskError::Validation(format!("Invalid file entry: {e}")))?;
        }

        let id = Uuid::new_v4();
        let mut task = Task::new(id, files.len());
        task.start(&first.filename);
        let snapshot = task.snapshot();

        let entry = Arc::new(TaskEntry {
            task: RwLock::new(task),
            cancel: CancellationToken::new(),
            updates: watch::channel(snapshot.clone()).0,
        });

        {
            let mut tasks = self.inner.tasks.write().await;
            self.make_room(&mut tasks)?;
            tasks.insert(id, entry.clone());
        }

        tracing::info!(
            task_id = %id,
            total_files = files.len(),
            has_header,
            "Batch task created"
        );

        tokio::spawn(execute(entry, files, has_header));

        Ok(snapshot)
    }

    /// Drop expired terminal tasks, then the oldest terminal task if the
    /// registry is still full.
    fn make_room(&self, tasks: &mut HashMap<Uuid, Arc<TaskEntry>>) -> Result<(), TaskError> {
        let limits = self.inner.limits;
        let now = Utc::now();
        tasks.retain(|_, entry| !entry.finished_before(now, limits.task_ttl));

        if tasks.len() < limits.max_tasks {
            return Ok(());
        }

        let oldest_terminal = tasks
            .iter()
            .filter_map(|(id, entry)| {
                let snapshot = entry.updates.borrow();
                snapshot
                    .status
                    .is_terminal()
                    .then(|| (*id, snapshot.finished_at.unwrap_or(snapshot.created_at)))
            })
            .min_by_key(|(_, finished)| *finished)
            .map(|(id, _)| id);

        match oldest_terminal {
            Some(id) => {
                tasks.remove(&id);
                tracing::warn!(task_id = %id, "Task registry full, evicted oldest finished task");
                Ok(())
            }
            None => {
                tracing::warn!(
                    active = tasks.len(),
                    max_tasks = limits.max_tasks,
                    "Task registry full, rejecting batch"
                );
                Err(TaskError::CapacityExceeded(tasks.len()))
            }
        }
    }

    async fn entry(&self, id: Uuid) -> Result<Arc<TaskEntry>, TaskError> {
        self.inner
            .tasks
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| TaskError::NotFound(id.to_string()))
    }

    pub async fn status(&self, id: Uuid) -> Result<TaskSnapshot, TaskError> {
        Ok(self.entry(id).await?.snapshot())
    }

    pub async fn results(&self, id: Uuid) -> Result<TaskResults, TaskError> {
        let entry = self.entry(id).await?;
        let status = entry.snapshot().status;
        if status != TaskStatus::Completed {
            return Err(TaskError::NotReady { id, status });
        }

        // Completed tasks never change again, so this lock is uncontended
        let task = entry.task.read().await;
        Ok(TaskResults {
            snapshot: task.snapshot(),
            results: task.results.clone(),
            files: task.files.clone(),
        })
    }

    /// Request cancellation. The worker stops before its next file; a
    /// terminal task is left untouched.
    pub async fn cancel(&self, id: Uuid) -> Result<TaskSnapshot, TaskError> {
        let entry = self.entry(id).await?;
        let snapshot = entry.snapshot();
        if !snapshot.status.is_terminal() {
            entry.cancel.cancel();
            tracing::info!(task_id = %id, "Cancellation requested");
        }
        Ok(snapshot)
    }

    pub async fn subscribe(&self, id: Uuid) -> Result<watch::Receiver<TaskSnapshot>, TaskError> {
        Ok(self.entry(id).await?.updates.subscribe())
    }

    /// Snapshots of every registered task, newest first
    pub async fn list(&self) -> Vec<TaskSnapshot> {
        let mut snapshots: Vec<_> = self
            .inner
            .tasks
            .read()
            .await
            .values()
            .map(|entry| entry.snapshot())
            .collect();
        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        snapshots
    }

    pub async fn counts(&self) -> TaskCounts {
        let tasks = self.inner.tasks.read().await;
        let mut counts = TaskCounts::default();
        for entry in tasks.values() {
            match entry.updates.borrow().status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Running => counts.running += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Error => counts.error += 1,
                TaskStatus::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    /// Remove terminal tasks older than the TTL, returning how many went
    pub async fn evict_expired(&self) -> usize {
        let ttl = self.inner.limits.task_ttl;
        let now = Utc::now();
        let mut tasks = self.inner.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, entry| !entry.finished_before(now, ttl));
        before - tasks.len()
    }

    /// Periodically evict expired tasks until `shutdown` fires
    pub fn spawn_sweeper(&self, every: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let evicted = manager.evict_expired().await;
                        if evicted > 0 {
                            tracing::info!(evicted, "Evicted expired tasks");
                        }
                    }
                }
            }
            tracing::debug!("Task sweeper stopped");
        })
    }
}

// ============================================
// Worker
// ============================================

async fn execute(entry: Arc<TaskEntry>, files: Vec<SubmittedFile>, has_header: bool) {
    let task_id = entry.snapshot().task_id;
    let mut files = files.into_iter().peekable();

    while let Some(file) = files.next() {
        if entry.cancel.is_cancelled() {
            let snapshot = entry.update(Task::cancel).await;
            tracing::info!(
                task_id = %task_id,
                processed_files = snapshot.processed_files,
                "Batch task cancelled"
            );
            return;
        }

        let next_file = files.peek().map(|next| next.filename.clone());
        let filename = file.filename.clone();
        entry.update(|task| task.begin_file(&filename)).await;

        let outcome = match tokio::task::spawn_blocking(move || process_file(&file, has_header)).await
        {
            Ok(outcome) => outcome,
            Err(join_error) => {
                tracing::error!(task_id = %task_id, filename = %filename, "File worker panicked: {}", join_error);
                Err(FileFault::Worker {
                    filename: filename.clone(),
                    message: join_error.to_string(),
                })
            }
        };

        match outcome {
            Ok(ingested) => {
                let snapshot = entry
                    .update(move |task| {
                        task.finish_file(ingested.report, ingested.results, next_file.as_deref())
                    })
                    .await;
                tracing::debug!(
                    task_id = %task_id,
                    filename = %filename,
                    progress = snapshot.progress,
                    "File finished"
                );
            }
            Err(fault) => {
                tracing::warn!(task_id = %task_id, filename = %filename, "File fault: {}", fault);
                entry.update(|task| task.fail(fault.to_string())).await;
                return;
            }
        }
    }

    let snapshot = entry.snapshot();
    tracing::info!(
        task_id = %task_id,
        status = %snapshot.status,
        records = snapshot.records_processed,
        "Batch task finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::ingest::ContentEncoding;
    use crate::models::ClassificationStatus;

    const HEADER: &str = "timestamp,source_ip,dest_ip,protocol,action,threat_label,log_type,bytes_transferred,user_agent,request_path";
    const MALICIOUS: &str = r#"2024-07-31T00:00:00,177.52.183.80,192.168.1.50,HTTPS,blocked,suspicious,ids,45164,"Mozilla/5.0",/login?backup.sql"#;
    const BENIGN: &str = r#"2024-04-07T00:00:00,192.168.1.248,192.168.1.15,HTTP,allowed,benign,application,20652,"Mozilla/5.0",/login"#;

    fn delimited_file(name: &str, rows: &[&str]) -> SubmittedFile {
        let mut content = String::from(HEADER);
        for row in rows {
            content.push('\n');
            content.push_str(row);
        }
        SubmittedFile::text(name, content)
    }

    /// A batch large enough to still be running when the next call lands
    fn long_batch(prefix: &str) -> Vec<SubmittedFile> {
        let rows = vec![MALICIOUS; 5_000];
        (0..10)
            .map(|i| delimited_file(&format!("{prefix}{i}.csv"), &rows))
            .collect()
    }

    async fn wait_terminal(manager: &TaskManager, id: Uuid) -> TaskSnapshot {
        let mut rx = manager.subscribe(id).await.unwrap();
        let snapshot = rx
            .wait_for(|s| s.status.is_terminal())
            .await
            .unwrap()
            .clone();
        snapshot
    }

    #[tokio::test]
    async fn empty_batch_is_rejected_without_a_task() {
        let manager = TaskManager::new(RegistryLimits::default());
        let err = manager.create(Vec::new(), true).await.unwrap_err();
        assert_eq!(err, TaskError::NoFiles);
        assert!(manager.list().await.is_empty());
    }

    #[tokio::test]
    async fn create_returns_running_task() {
        let manager = TaskManager::new(RegistryLimits::default());
        let snapshot = manager
            .create(vec![delimited_file("a.csv", &[BENIGN]), delimited_file("b.csv", &[BENIGN])], true)
            .await
            .unwrap();
        assert_eq!(snapshot.status, TaskStatus::Running);
        assert_eq!(snapshot.total_files, 2);
        assert_eq!(snapshot.processed_files, 0);
        assert_eq!(snapshot.progress, 0);
        assert_eq!(snapshot.current_file.as_deref(), Some("a.csv"));
    }

    #[tokio::test]
    async fn batch_completes_with_isolated_fault() {
        let manager = TaskManager::new(RegistryLimits::default());
        let files = vec![
            delimited_file("a.csv", &[MALICIOUS, "invalid,input,format", BENIGN]),
            delimited_file("b.csv", &[BENIGN]),
        ];
        let id = manager.create(files, true).await.unwrap().task_id;

        let done = wait_terminal(&manager, id).await;
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.progress, 100);
        assert_eq!(done.current_file, None);
        assert_eq!(done.processed_files, 2);

        let output = manager.results(id).await.unwrap();
        assert_eq!(output.results.len(), 4);
        assert_eq!(output.files.len(), 2);
        let error = &output.results[1];
        assert_eq!(error.filename, "a.csv");
        assert_eq!(error.line_number, 3);
        assert_eq!(error.result.status(), ClassificationStatus::Error);
        assert_eq!(output.results[3].filename, "b.csv");
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_100_only_when_completed() {
        let manager = TaskManager::new(RegistryLimits::default());
        let files: Vec<_> = (0..5)
            .map(|i| delimited_file(&format!("f{i}.csv"), &[BENIGN, MALICIOUS]))
            .collect();
        let id = manager.create(files, true).await.unwrap().task_id;
        let mut rx = manager.subscribe(id).await.unwrap();

        let mut last = 0;
        loop {
            let snapshot = rx.borrow_and_update().clone();
            assert!(snapshot.progress >= last);
            assert_eq!(
                snapshot.progress == 100,
                snapshot.status == TaskStatus::Completed
            );
            last = snapshot.progress;
            if snapshot.status.is_terminal() {
                break;
            }
            rx.changed().await.unwrap();
        }
        assert_eq!(last, 100);
    }

    #[tokio::test]
    async fn file_fault_stops_the_task() {
        let manager = TaskManager::new(RegistryLimits::default());
        let bad = SubmittedFile {
            filename: "bad.csv".to_string(),
            content: "%%%".to_string(),
            encoding: ContentEncoding::Base64,
        };
        let files = vec![delimited_file("a.csv", &[BENIGN]), bad, delimited_file("c.csv", &[BENIGN])];
        let id = manager.create(files, true).await.unwrap().task_id;

        let done = wait_terminal(&manager, id).await;
        assert_eq!(done.status, TaskStatus::Error);
        assert_eq!(done.processed_files, 1);
        assert_eq!(done.current_file, None);
        assert!(done.error.as_deref().unwrap().contains("bad.csv"));
        assert!(done.progress < 100);

        let err = manager.results(id).await.unwrap_err();
        assert!(matches!(
            err,
            TaskError::NotReady {
                status: TaskStatus::Error,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn results_are_not_ready_while_running() {
        let manager = TaskManager::new(RegistryLimits::default());
        let id = manager
            .create(vec![delimited_file("a.csv", &[BENIGN])], true)
            .await
            .unwrap()
            .task_id;
        assert!(matches!(
            manager.results(id).await,
            Err(TaskError::NotReady {
                status: TaskStatus::Running,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn cancel_stops_between_files() {
        let manager = TaskManager::new(RegistryLimits::default());
        let files: Vec<_> = (0..3)
            .map(|i| delimited_file(&format!("f{i}.csv"), &[BENIGN]))
            .collect();
        let id = manager.create(files, true).await.unwrap().task_id;
        manager.cancel(id).await.unwrap();

        let done = wait_terminal(&manager, id).await;
        assert_eq!(done.status, TaskStatus::Cancelled);
        assert!(done.processed_files < done.total_files);
        assert_eq!(done.current_file, None);
        assert!(matches!(
            manager.results(id).await,
            Err(TaskError::NotReady { .. })
        ));

        // cancelling again reports the terminal state unchanged
        let again = manager.cancel(id).await.unwrap();
        assert_eq!(again.status, TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let manager = TaskManager::new(RegistryLimits::default());
        let id = Uuid::new_v4();
        assert!(matches!(manager.status(id).await, Err(TaskError::NotFound(_))));
        assert!(matches!(manager.results(id).await, Err(TaskError::NotFound(_))));
        assert!(matches!(manager.cancel(id).await, Err(TaskError::NotFound(_))));
        assert!(matches!(parse_task_id("not-a-uuid"), Err(TaskError::NotFound(_))));
    }

    #[tokio::test]
    async fn full_registry_evicts_finished_tasks_only() {
        let manager = TaskManager::new(RegistryLimits {
            max_tasks: 1,
            task_ttl: Duration::from_secs(3600),
        });
        let first = manager
            .create(long_batch("a"), true)
            .await
            .unwrap()
            .task_id;

        let err = manager
            .create(vec![delimited_file("b.csv", &[BENIGN])], true)
            .await
            .unwrap_err();
        assert_eq!(err, TaskError::CapacityExceeded(1));

        manager.cancel(first).await.unwrap();
        assert_eq!(
            wait_terminal(&manager, first).await.status,
            TaskStatus::Cancelled
        );
        let second = manager
            .create(vec![delimited_file("b.csv", &[BENIGN])], true)
            .await
            .unwrap()
            .task_id;
        assert!(matches!(manager.status(first).await, Err(TaskError::NotFound(_))));
        assert!(manager.status(second).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_batches_keep_their_own_results() {
        let manager = TaskManager::new(RegistryLimits::default());
        let a_files: Vec<_> = (0..2)
            .map(|i| delimited_file(&format!("a{i}.csv"), &[MALICIOUS, BENIGN]))
            .collect();
        let b_files: Vec<_> = (0..3)
            .map(|i| delimited_file(&format!("b{i}.csv"), &[BENIGN, BENIGN, MALICIOUS]))
            .collect();

        let a = manager.create(a_files, true).await.unwrap().task_id;
        let b = manager.create(b_files, true).await.unwrap().task_id;
        assert_ne!(a, b);

        let (done_a, done_b) = tokio::join!(wait_terminal(&manager, a), wait_terminal(&manager, b));
        for (done, files) in [(&done_a, 2), (&done_b, 3)] {
            assert_eq!(done.status, TaskStatus::Completed);
            assert_eq!(done.progress, 100);
            assert_eq!(done.processed_files, files);
            assert_eq!(done.total_files, files);
        }

        for (id, prefix, rows) in [(a, "a", 4), (b, "b", 9)] {
            let output = manager.results(id).await.unwrap();
            assert_eq!(output.results.len(), rows);
            assert!(output.results.iter().all(|r| r.filename.starts_with(prefix)));
            assert!(output.files.iter().all(|f| f.filename.starts_with(prefix)));
        }
    }

    #[tokio::test]
    async fn expired_tasks_are_swept() {
        let manager = TaskManager::new(RegistryLimits {
            max_tasks: 8,
            task_ttl: Duration::ZERO,
        });
        let id = manager
            .create(vec![delimited_file("a.csv", &[BENIGN])], true)
            .await
            .unwrap()
            .task_id;
        assert_eq!(manager.evict_expired().await, 0);

        wait_terminal(&manager, id).await;
        assert_eq!(manager.counts().await.completed, 1);
        assert_eq!(manager.evict_expired().await, 1);
        assert_eq!(manager.counts().await, TaskCounts::default());
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let manager = TaskManager::new(RegistryLimits::default());
        let older = manager
            .create(vec![delimited_file("a.csv", &[BENIGN])], true)
            .await
            .unwrap()
            .task_id;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let newer = manager
            .create(vec![delimited_file("b.csv", &[BENIGN])], true)
            .await
            .unwrap()
            .task_id;

        let ids: Vec<_> = manager.list().await.iter().map(|s| s.task_id).collect();
        assert_eq!(ids, [newer, older]);
    }
}

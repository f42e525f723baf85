use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::classification::PerRecordResult;
use super::record::FileFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Error,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Error => "error",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Error | TaskStatus::Cancelled
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance of one fully processed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub filename: String,
    pub format: FileFormat,
    /// Physical lines read, header and blank lines included
    pub lines: usize,
    /// Hex SHA-256 of the decoded file content
    pub sha256: String,
}

/// Run-state of one submitted batch.
///
/// All mutation goes through the transition methods below, which only
/// act on a `Running` task (except `start`, which only acts on `Pending`).
/// Once terminal the task never changes again.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: Uuid,
    pub status: TaskStatus,
    pub total_files: usize,
    pub processed_files: usize,
    pub progress: u8,
    pub current_file: Option<String>,
    pub results: Vec<PerRecordResult>,
    pub files: Vec<FileReport>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Point-in-time view of a task, without its results
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSnapshot {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub progress: u8,
    pub processed_files: usize,
    pub total_files: usize,
    pub current_file: Option<String>,
    pub error: Option<String>,
    pub records_processed: usize,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(id: Uuid, total_files: usize) -> Self {
        Self {
            id,
            status: TaskStatus::Pending,
            total_files,
            processed_files: 0,
            progress: 0,
            current_file: None,
            results: Vec::new(),
            files: Vec::new(),
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Pending -> Running, pointing at the first file of the batch
    pub fn start(&mut self, first_file: &str) {
        if self.status != TaskStatus::Pending {
            return;
        }
        self.status = TaskStatus::Running;
        self.current_file = Some(first_file.to_string());
        self.started_at = Some(Utc::now());
    }

    pub fn begin_file(&mut self, filename: &str) {
        if self.status != TaskStatus::Running {
            return;
        }
        self.current_file = Some(filename.to_string());
    }

    /// Records a finished file. The last file completes the task in the same
    /// step, so progress reaches 100 only together with `Completed`.
    pub fn finish_file(
        &mut self,
        report: FileReport,
        results: Vec<PerRecordResult>,
        next_file: Option<&str>,
    ) {
        if self.status != TaskStatus::Running {
            return;
        }
        self.results.extend(results);
        self.files.push(report);
        self.processed_files += 1;

        if self.processed_files >= self.total_files {
            self.status = TaskStatus::Completed;
            self.progress = 100;
            self.current_file = None;
            self.finished_at = Some(Utc::now());
        } else {
            let progress = (self.processed_files * 100 / self.total_files) as u8;
            self.progress = self.progress.max(progress);
            self.current_file = next_file.map(str::to_string);
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        if self.status != TaskStatus::Running {
            return;
        }
        self.status = TaskStatus::Error;
        self.error = Some(message.into());
        self.current_file = None;
        self.finished_at = Some(Utc::now());
    }

    pub fn cancel(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = TaskStatus::Cancelled;
        self.current_file = None;
        self.finished_at = Some(Utc::now());
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            task_id: self.id,
            status: self.status,
            progress: self.progress,
            processed_files: self.processed_files,
            total_files: self.total_files,
            current_file: self.current_file.clone(),
            error: self.error.clone(),
            records_processed: self.results.len(),
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

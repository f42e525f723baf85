pub mod aggregate;
pub mod ingest;
pub mod manager;

pub use aggregate::{Counts, FileGroup, group_by_file};
pub use ingest::{ContentEncoding, FileFault, IngestedFile, SubmittedFile, process_file};
pub use manager::{
    RegistryLimits, TaskCounts, TaskError, TaskManager, TaskResults, parse_task_id,
};

pub mod classification;
pub mod record;
pub mod task;

pub use classification::{
    AttackType, ClassificationResult, ClassificationStatus, NO_INDICATORS_REASON,
    PerRecordResult,
};
pub use record::{Action, ActivityRecord, FileFormat, ThreatLabel};
pub use task::{FileReport, Task, TaskSnapshot, TaskStatus};

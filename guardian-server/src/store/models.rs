use guardian_core::{Decision, LogEntry};

/// log entry with its storage id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredLog {
    pub id: i64,
    pub entry: LogEntry,
}

/// decision with its storage id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDecision {
    pub id: i64,
    pub decision: Decision,
}

//! In-memory task store
//!
//! The store exclusively owns the task collection. A single lock guards
//! the id-increment-and-append sequence so concurrent turns serialize id
//! assignment; ids start at 1, grow monotonically, and are never reused.

use crate::models::{TaskRecord, TaskStatus};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;

struct TaskLedger {
    next_id: u64,
    records: Vec<TaskRecord>,
}

/// Append-only task collection shared across all sessions
pub struct TaskStore {
    ledger: Arc<RwLock<TaskLedger>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self {
            ledger: Arc::new(RwLock::new(TaskLedger {
                next_id: 1,
                records: Vec::new(),
            })),
        }
    }

    /// Append a pending task and return its freshly assigned id.
    pub async fn add(&self, description: &str, date_full: String, time_only: String) -> u64 {
        let mut ledger = self.ledger.write().await;

        let id = ledger.next_id;
        ledger.next_id += 1;

        ledger.records.push(TaskRecord {
            id,
            description: description.to_string(),
            date_full,
            time_only,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
        });

        id
    }

    /// All tasks, most-recently-created first (descending id).
    pub async fn list(&self) -> Vec<TaskRecord> {
        let ledger = self.ledger.read().await;

        let mut records = ledger.records.clone();
        records.sort_by(|a, b| b.id.cmp(&a.id));
        records
    }

    pub async fn count(&self) -> usize {
        self.ledger.read().await.records.len()
    }
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

//! Task-progress tracking.
//!
//! Each async task writes its status into the cache under
//! `quality:task:{task_id}`; polling clients read the same record. Every
//! update refreshes the TTL (heartbeat), so abandoned records expire on
//! their own. Updates are read-modify-write with last-writer-wins; one
//! task id has exactly one owning worker.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::CacheStore;

const TASK_KEY_PREFIX: &str = "quality:task";

/// Lifecycle state of an async task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Polled task record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub status: TaskState,
    /// 0-100.
    pub progress: u8,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_id: Option<String>,
    /// Milliseconds since the epoch of the last update.
    pub updated_at: i64,
}

#[derive(Clone)]
pub struct TaskTracker {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl TaskTracker {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn key(task_id: &str) -> String {
        format!("{}:{}", TASK_KEY_PREFIX, task_id)
    }

    /// Create the record in `pending` at 0%.
    pub async fn init(&self, task_id: &str) {
        self.write(
            task_id,
            TaskStatus {
                status: TaskState::Pending,
                progress: 0,
                message: "queued".to_string(),
                result_id: None,
                updated_at: now_ms(),
            },
        )
        .await;
    }

    /// Move to `processing` with a new progress value; refreshes the TTL.
    pub async fn update_progress(&self, task_id: &str, progress: u8, message: &str) {
        let mut status = self.get(task_id).await.unwrap_or(TaskStatus {
            status: TaskState::Processing,
            progress: 0,
            message: String::new(),
            result_id: None,
            updated_at: now_ms(),
        });
        status.status = TaskState::Processing;
        status.progress = progress.min(100);
        status.message = message.to_string();
        status.updated_at = now_ms();
        self.write(task_id, status).await;
    }

    pub async fn mark_completed(&self, task_id: &str, result_id: &str) {
        self.write(
            task_id,
            TaskStatus {
                status: TaskState::Completed,
                progress: 100,
                message: "completed".to_string(),
                result_id: Some(result_id.to_string()),
                updated_at: now_ms(),
            },
        )
        .await;
    }

    pub async fn mark_failed(&self, task_id: &str, message: &str) {
        self.write(
            task_id,
            TaskStatus {
                status: TaskState::Failed,
                progress: 0,
                message: message.to_string(),
                result_id: None,
                updated_at: now_ms(),
            },
        )
        .await;
    }

    /// Fetch the record; fail-open on transport errors.
    pub async fn get(&self, task_id: &str) -> Option<TaskStatus> {
        match self.store.get(&Self::key(task_id)).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(task_id, error = %e, "task status read failed");
                None
            }
        }
    }

    /// Explicit deletion; expiry usually handles cleanup.
    pub async fn delete(&self, task_id: &str) -> bool {
        match self.store.delete(&Self::key(task_id)).await {
            Ok(existed) => existed,
            Err(e) => {
                warn!(task_id, error = %e, "task status delete failed");
                false
            }
        }
    }

    async fn write(&self, task_id: &str, status: TaskStatus) {
        let raw = match serde_json::to_string(&status) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(task_id, error = %e, "task status serialization failed");
                return;
            }
        };
        if let Err(e) = self.store.set(&Self::key(task_id), raw, self.ttl).await {
            warn!(task_id, error = %e, "task status write failed");
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;

    fn tracker() -> TaskTracker {
        TaskTracker::new(Arc::new(InMemoryCache::new()), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let tracker = tracker();
        tracker.init("t1").await;
        let status = tracker.get("t1").await.unwrap();
        assert_eq!(status.status, TaskState::Pending);
        assert_eq!(status.progress, 0);

        tracker.update_progress("t1", 40, "computing").await;
        let status = tracker.get("t1").await.unwrap();
        assert_eq!(status.status, TaskState::Processing);
        assert_eq!(status.progress, 40);
        assert_eq!(status.message, "computing");

        tracker.mark_completed("t1", "file-9").await;
        let status = tracker.get("t1").await.unwrap();
        assert_eq!(status.status, TaskState::Completed);
        assert_eq!(status.progress, 100);
        assert_eq!(status.result_id.as_deref(), Some("file-9"));
    }

    #[tokio::test]
    async fn test_failed_reports_zero_progress_and_message() {
        let tracker = tracker();
        tracker.init("t2").await;
        tracker.mark_failed("t2", "boom").await;
        let status = tracker.get("t2").await.unwrap();
        assert_eq!(status.status, TaskState::Failed);
        assert_eq!(status.progress, 0);
        assert_eq!(status.message, "boom");
        assert!(status.result_id.is_none());
    }

    #[tokio::test]
    async fn test_progress_clamped() {
        let tracker = tracker();
        tracker.update_progress("t3", 250, "over").await;
        let status = tracker.get("t3").await.unwrap();
        assert_eq!(status.progress, 100);
    }

    #[tokio::test]
    async fn test_missing_task_is_none() {
        assert!(tracker().get("absent").await.is_none());
    }
}

// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory FIFO of attempt tasks mirrored by durable `pending_tasks` rows.
//!
//! Enqueue runs the atomic admission transaction (session flip + row insert
//! + USER_IN event) and only then appends the in-memory handle, so the
//! memory view never leads the durable view. Dequeue hands the task to a
//! worker WITHOUT deleting the backing row; deletion happens when the
//! engine finalizes the attempt. A crash between dequeue and finalization
//! leaves the row in place for replay on the next start (at-least-once).

use std::collections::VecDeque;
use std::sync::Arc;

use promptgate_core::types::{AdmitOutcome, AdmitRequest, TaskPayload};
use promptgate_core::{PromptgateError, StorageAdapter};
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Crash-safe FIFO of pending attempts.
pub struct PersistentQueue {
    storage: Arc<dyn StorageAdapter>,
    inner: Mutex<VecDeque<TaskPayload>>,
    notify: Notify,
}

impl PersistentQueue {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self {
            storage,
            inner: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Rehydrate the in-memory queue from surviving `pending_tasks` rows.
    /// Called once at startup, before workers start.
    pub async fn restore(&self) -> Result<usize, PromptgateError> {
        let tasks = self.storage.list_pending_tasks().await?;
        let restored = tasks.len();
        if restored > 0 {
            let mut queue = self.inner.lock().await;
            for task in tasks {
                queue.push_back(task);
            }
            drop(queue);
            for _ in 0..restored {
                self.notify.notify_one();
            }
            info!(restored, "restored pending tasks from storage");
        }
        Ok(restored)
    }

    /// Admit and enqueue one task. The admission transaction decides the
    /// outcome; only `Queued` touches the in-memory FIFO.
    pub async fn enqueue(&self, req: AdmitRequest) -> Result<AdmitOutcome, PromptgateError> {
        let task = req.task.clone();
        let outcome = self.storage.admit_attempt(req).await?;
        if let AdmitOutcome::Queued { depth } = &outcome {
            debug!(task_id = task.task_id.as_str(), depth, "task enqueued");
            self.inner.lock().await.push_back(task);
            self.notify.notify_one();
        }
        Ok(outcome)
    }

    /// Block until a task is available or shutdown is signaled. Returns
    /// `None` on shutdown.
    pub async fn dequeue(&self, cancel: &CancellationToken) -> Option<TaskPayload> {
        loop {
            if let Some(task) = self.inner.lock().await.pop_front() {
                return Some(task);
            }
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = self.notify.notified() => {}
            }
        }
    }

    /// Approximate number of queued tasks.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Drop every in-memory handle. The caller is responsible for clearing
    /// the backing rows (admin clear-queue does both).
    pub async fn clear(&self) -> usize {
        let mut queue = self.inner.lock().await;
        let dropped = queue.len();
        queue.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::NoopStorage;
    use std::time::Duration;

    // Queue mechanics that do not need real storage: FIFO order, blocking
    // dequeue, and cancellation. Admission-path behavior is covered in the
    // storage and end-to-end suites.

    fn make_task(task_id: &str) -> TaskPayload {
        TaskPayload {
            task_id: task_id.to_string(),
            user_id: 1,
            telegram_user_id: 1,
            chat_id: 1,
            message_id: 1,
            username: None,
            level_id: 1,
            session_id: 1,
            user_prompt: "p".into(),
            enqueued_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn make_req(task_id: &str) -> AdmitRequest {
        AdmitRequest {
            task: make_task(task_id),
            queue_max_length: 10,
            event: promptgate_core::types::NewLogEvent {
                trace_id: task_id.to_string(),
                event_type: promptgate_core::types::EventType::UserIn,
                telegram_user_id: 1,
                chat_id: 1,
                level_id: Some(1),
                session_id: None,
                turn_index: None,
                content: "p".into(),
                metadata: None,
            },
        }
    }

    #[tokio::test]
    async fn enqueue_then_dequeue_is_fifo() {
        let queue = PersistentQueue::new(Arc::new(NoopStorage));
        let cancel = CancellationToken::new();

        queue.enqueue(make_req("t1")).await.unwrap();
        queue.enqueue(make_req("t2")).await.unwrap();
        assert_eq!(queue.len().await, 2);

        let first = queue.dequeue(&cancel).await.unwrap();
        let second = queue.dequeue(&cancel).await.unwrap();
        assert_eq!(first.task_id, "t1");
        assert_eq!(second.task_id, "t2");
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn dequeue_blocks_until_enqueue() {
        let queue = Arc::new(PersistentQueue::new(Arc::new(NoopStorage)));
        let cancel = CancellationToken::new();

        let waiter = {
            let queue = queue.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { queue.dequeue(&cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        queue.enqueue(make_req("delayed")).await.unwrap();

        let task = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("dequeue timed out")
            .unwrap();
        assert_eq!(task.unwrap().task_id, "delayed");
    }

    #[tokio::test]
    async fn dequeue_returns_none_on_shutdown() {
        let queue = PersistentQueue::new(Arc::new(NoopStorage));
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(queue.dequeue(&cancel).await.is_none());
    }

    #[tokio::test]
    async fn clear_drops_in_memory_handles() {
        let queue = PersistentQueue::new(Arc::new(NoopStorage));
        queue.enqueue(make_req("t1")).await.unwrap();
        queue.enqueue(make_req("t2")).await.unwrap();
        assert_eq!(queue.clear().await, 2);
        assert!(queue.is_empty().await);
    }
}

// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-size worker pool draining the attempt queue.
//!
//! Each worker loops dequeue -> engine -> dequeue. On shutdown the dequeue
//! races the cancellation token, so idle workers exit immediately and busy
//! workers get the drain deadline to finish their current attempt; whatever
//! is still running past the deadline is aborted so no worker touches
//! storage after the caller closes it. Pending rows left behind survive
//! for the next run.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::GameEngine;
use crate::queue::PersistentQueue;

/// A pool of N workers consuming tasks from the queue.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `concurrency` workers. They run until `cancel` fires.
    pub fn spawn(
        queue: Arc<PersistentQueue>,
        engine: Arc<GameEngine>,
        concurrency: usize,
        cancel: CancellationToken,
    ) -> Self {
        let mut handles = Vec::with_capacity(concurrency);
        for worker_id in 0..concurrency {
            let queue = queue.clone();
            let engine = engine.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                debug!(worker_id, "worker started");
                while let Some(task) = queue.dequeue(&cancel).await {
                    debug!(
                        worker_id,
                        task_id = task.task_id.as_str(),
                        "worker picked up task"
                    );
                    engine.process_task(task).await;
                }
                debug!(worker_id, "worker stopped");
            }));
        }
        info!(concurrency, "worker pool started");
        Self { handles }
    }

    /// Wait up to `drain` for in-flight workers to finish, then abort the
    /// stragglers and await their termination. The cancellation token must
    /// already be triggered.
    pub async fn shutdown(self, drain: Duration) {
        let count = self.handles.len();
        let deadline = tokio::time::Instant::now() + drain;
        let mut aborted = 0usize;
        for mut handle in self.handles {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                // Past the deadline: the task must not keep writing after
                // the caller checkpoints and closes storage. Its pending
                // row survives and replays on the next run.
                handle.abort();
                let _ = handle.await;
                aborted += 1;
            }
        }
        if aborted == 0 {
            info!(count, "worker pool drained");
        } else {
            warn!(count, aborted, "drain deadline reached, stragglers aborted");
        }
    }
}

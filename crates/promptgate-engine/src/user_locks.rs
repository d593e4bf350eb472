// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user admission locks with lazy creation and reference-counted cleanup.
//!
//! Admission must serialize the "check state, flip INFLIGHT, enqueue"
//! sequence per user without a global lock. Workers never take these locks,
//! so there is no deadlock risk.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;

/// Map of `user_id -> mutex`, created on demand and pruned when unused.
#[derive(Default)]
pub struct UserLockMap {
    inner: StdMutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl UserLockMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (or create) the lock handle for one user.
    pub fn acquire(&self, user_id: i64) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(user_id).or_default().clone()
    }

    /// Return a handle; the entry is dropped once no one else holds it.
    pub fn release(&self, user_id: i64, handle: Arc<Mutex<()>>) {
        drop(handle);
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = map.get(&user_id) {
            if Arc::strong_count(entry) == 1 {
                map.remove(&user_id);
            }
        }
    }

    /// Number of live entries (for stats and tests).
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Content provider: reloadable access to the activity, level, and reward
//! configuration documents.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use promptgate_core::PromptgateError;

use crate::loader;
use crate::model::{ActivityConfig, LevelConfig, LevelsDocument, RewardPoolConfig, RewardsDocument};
use crate::validation::validate_content;

/// Read access to the current content configuration.
///
/// Implementations must be cheap to query (the engine reads per message)
/// and atomically swappable on reload.
pub trait ContentProvider: Send + Sync {
    fn activity(&self) -> ActivityConfig;
    fn levels(&self) -> Vec<LevelConfig>;
    fn level(&self, level_id: i64) -> Option<LevelConfig>;
    fn reward_pool(&self, pool_id: &str) -> Option<RewardPoolConfig>;
    fn reward_pools(&self) -> Vec<RewardPoolConfig>;

    /// Re-read and validate the backing documents, swapping the snapshot
    /// atomically. A validation failure leaves the old snapshot in place.
    fn reload(&self) -> Result<(), PromptgateError>;
}

struct Snapshot {
    activity: ActivityConfig,
    levels: Vec<LevelConfig>,
    levels_by_id: HashMap<i64, usize>,
    pools: Vec<RewardPoolConfig>,
    pools_by_id: HashMap<String, usize>,
}

impl Snapshot {
    fn build(
        activity: ActivityConfig,
        levels: LevelsDocument,
        rewards: RewardsDocument,
    ) -> Result<Self, PromptgateError> {
        let errors = validate_content(&activity, &levels, &rewards);
        if !errors.is_empty() {
            return Err(PromptgateError::Config(format!(
                "content validation failed: {}",
                errors.join("; ")
            )));
        }

        let levels = levels.levels;
        let levels_by_id = levels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.level_id, i))
            .collect();
        let pools = rewards.reward_pools;
        let pools_by_id = pools
            .iter()
            .enumerate()
            .map(|(i, p)| (p.pool_id.clone(), i))
            .collect();

        Ok(Self {
            activity,
            levels,
            levels_by_id,
            pools,
            pools_by_id,
        })
    }
}

/// Content provider backed by the three JSON documents on disk.
pub struct JsonContentProvider {
    activity_path: PathBuf,
    levels_path: PathBuf,
    rewards_path: PathBuf,
    snapshot: RwLock<Snapshot>,
}

impl JsonContentProvider {
    /// Load, validate, and index the three documents.
    pub fn open(
        activity_path: impl Into<PathBuf>,
        levels_path: impl Into<PathBuf>,
        rewards_path: impl Into<PathBuf>,
    ) -> Result<Self, PromptgateError> {
        let activity_path = activity_path.into();
        let levels_path = levels_path.into();
        let rewards_path = rewards_path.into();

        let snapshot = Snapshot::build(
            loader::load_activity(&activity_path)?,
            loader::load_levels(&levels_path)?,
            loader::load_rewards(&rewards_path)?,
        )?;

        Ok(Self {
            activity_path,
            levels_path,
            rewards_path,
            snapshot: RwLock::new(snapshot),
        })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Snapshot> {
        // Lock poisoning only happens if a reader panicked while holding the
        // guard; recover with the last good snapshot.
        self.snapshot.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl ContentProvider for JsonContentProvider {
    fn activity(&self) -> ActivityConfig {
        self.read().activity.clone()
    }

    fn levels(&self) -> Vec<LevelConfig> {
        self.read().levels.clone()
    }

    fn level(&self, level_id: i64) -> Option<LevelConfig> {
        let snap = self.read();
        snap.levels_by_id
            .get(&level_id)
            .map(|&i| snap.levels[i].clone())
    }

    fn reward_pool(&self, pool_id: &str) -> Option<RewardPoolConfig> {
        let snap = self.read();
        snap.pools_by_id.get(pool_id).map(|&i| snap.pools[i].clone())
    }

    fn reward_pools(&self) -> Vec<RewardPoolConfig> {
        self.read().pools.clone()
    }

    fn reload(&self) -> Result<(), PromptgateError> {
        let fresh = Snapshot::build(
            loader::load_activity(&self.activity_path)?,
            loader::load_levels(&self.levels_path)?,
            loader::load_rewards(&self.rewards_path)?,
        )?;
        let mut guard = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
        *guard = fresh;
        Ok(())
    }
}

/// Content provider holding fixed documents, for tests and tooling.
pub struct StaticContentProvider {
    snapshot: Snapshot,
}

impl StaticContentProvider {
    pub fn new(
        activity: ActivityConfig,
        levels: LevelsDocument,
        rewards: RewardsDocument,
    ) -> Result<Self, PromptgateError> {
        Ok(Self {
            snapshot: Snapshot::build(activity, levels, rewards)?,
        })
    }
}

impl ContentProvider for StaticContentProvider {
    fn activity(&self) -> ActivityConfig {
        self.snapshot.activity.clone()
    }

    fn levels(&self) -> Vec<LevelConfig> {
        self.snapshot.levels.clone()
    }

    fn level(&self, level_id: i64) -> Option<LevelConfig> {
        self.snapshot
            .levels_by_id
            .get(&level_id)
            .map(|&i| self.snapshot.levels[i].clone())
    }

    fn reward_pool(&self, pool_id: &str) -> Option<RewardPoolConfig> {
        self.snapshot
            .pools_by_id
            .get(pool_id)
            .map(|&i| self.snapshot.pools[i].clone())
    }

    fn reward_pools(&self) -> Vec<RewardPoolConfig> {
        self.snapshot.pools.clone()
    }

    fn reload(&self) -> Result<(), PromptgateError> {
        // Fixed documents; nothing to re-read.
        Ok(())
    }
}

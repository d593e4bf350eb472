// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for all pluggable collaborators.

pub mod adapter;
pub mod channel;
pub mod llm;
pub mod storage;

pub use adapter::PluginAdapter;
pub use channel::ChannelAdapter;
pub use llm::LlmClient;
pub use storage::{RewardItemSync, RewardPoolSync, StorageAdapter};

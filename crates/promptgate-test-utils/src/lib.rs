// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock adapters and a full-stack test harness for the Promptgate
//! activity engine.

pub mod harness;
pub mod mock_channel;
pub mod mock_llm;

pub use harness::{default_activity, default_levels, default_rewards, TestHarness};
pub use mock_channel::{MockChannel, SentMessage};
pub use mock_llm::MockLlm;

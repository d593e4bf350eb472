// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per table plus the two multi-table attempt
//! transactions. All functions accept `&Database` and run through the
//! single writer thread.

pub mod attempt_flow;
pub mod attempts;
pub mod logs;
pub mod progress;
pub mod rewards;
pub mod sessions;
pub mod stats;
pub mod tasks;
pub mod users;

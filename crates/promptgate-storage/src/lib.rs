// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for the Promptgate activity engine.
//!
//! All writes are serialized through `tokio-rusqlite`'s single background
//! thread; the [`Database`] struct IS the single writer. Query modules
//! accept `&Database` and call through `connection().call()`. Do NOT create
//! additional Connection instances for writes.
//!
//! The two operations the engine's correctness leans on live in
//! `queries::attempt_flow`: atomic admission (the anti-double-submit
//! barrier) and atomic finalization (attempt + claim + session + queue row
//! in one transaction).

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod queries;

pub use adapter::SqliteStorage;
pub use database::Database;

// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Promptgate activity engine.
//!
//! Deployment settings load through Figment with env overrides; the three
//! activity content documents (activity, levels, rewards) load as JSON,
//! validate as a set, and hot-reload behind [`content::ContentProvider`].

pub mod content;
pub mod loader;
pub mod model;
pub mod validation;

pub use content::{ContentProvider, JsonContentProvider, StaticContentProvider};
pub use loader::{load_app_config, load_app_config_from_str};

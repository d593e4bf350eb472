// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Promptgate activity engine.
//!
//! This crate provides the foundational trait definitions, error type, and
//! domain models used throughout the Promptgate workspace. All adapters
//! implement traits defined here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::PromptgateError;
pub use types::{AdapterType, HealthStatus};

// Re-export all adapter traits at crate root.
pub use traits::{ChannelAdapter, LlmClient, PluginAdapter, StorageAdapter};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_variants_construct() {
        let _config = PromptgateError::Config("test".into());
        let _storage = PromptgateError::Storage {
            source: Box::new(std::io::Error::other("test")),
        };
        let _channel = PromptgateError::Channel {
            message: "test".into(),
            source: None,
        };
        let _llm = PromptgateError::Llm {
            message: "test".into(),
            source: None,
        };
        let _timeout = PromptgateError::Timeout {
            duration: std::time::Duration::from_secs(30),
        };
        let _full = PromptgateError::QueueFull;
        let _internal = PromptgateError::Internal("test".into());
    }

    #[test]
    fn transient_classification() {
        assert!(PromptgateError::Timeout {
            duration: std::time::Duration::from_secs(1)
        }
        .is_transient());
        assert!(PromptgateError::Llm {
            message: "503".into(),
            source: None
        }
        .is_transient());
        assert!(!PromptgateError::QueueFull.is_transient());
        assert!(!PromptgateError::Config("x".into()).is_transient());
    }

    #[test]
    fn all_trait_modules_are_exported() {
        // If any trait module is missing or broken, this won't compile.
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_channel_adapter<T: ChannelAdapter>() {}
        fn _assert_llm_client<T: LlmClient>() {}
        fn _assert_storage_adapter<T: StorageAdapter>() {}
    }
}

//! # llm-session-core
//!
//! Core types for the LLM session lifecycle manager.
//!
//! This crate contains all fundamental types with **no internal dependencies**
//! on other llm-session crates. It provides:
//!
//! - Lifecycle types (Phase, LifecycleStatus, ManagerId, Operation)
//! - Chat history items
//! - Option and metadata types exchanged with the inference engine
//! - Diagnostic info snapshots
//! - Configuration
//! - Error types
//!
//! ## Architecture
//!
//! This is Layer 0 in the architecture - all other crates depend on this one,
//! but this crate has no dependencies on other llm-session crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod history;
pub mod info;
pub mod options;
pub mod status;

// Re-export commonly used types
pub use config::{
    ContextSettings, EngineSettings, LifecycleConfig, LoggingSettings, ModelSettings,
    SessionSettings,
};
pub use error::{EngineError, EngineResult, Error, ErrorKind, Result};
pub use history::ChatHistoryItem;
pub use info::{ContextInfo, DeviceInfo, ManagerInfo, ModelInfo};
pub use options::{
    BuildPolicy, ContextMetadata, ContextOptions, DeviceMemoryState, EngineLogLevel,
    EngineOptions, GpuPreference, ModelOptions, SessionOptions, Token,
};
pub use status::{LifecycleStatus, ManagerId, Operation, Phase};

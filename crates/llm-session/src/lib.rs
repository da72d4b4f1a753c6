//! # llm-session
//!
//! Lifecycle management for a locally hosted LLM chat session.
//!
//! This crate provides:
//! - The [`LifecycleManager`] state machine (uninitialized → loading → ready
//!   → generating, with an error phase reachable from anywhere)
//! - Ordered setup stages: runtime module, engine, model, chat session
//! - Streaming prompts, history export/import and session teardown
//! - Best-effort diagnostic snapshots
//! - Tracing initialisation from configuration
//!
//! ## Architecture
//!
//! This is Layer 2 in the architecture - it depends on llm-session-core and
//! llm-session-engine and drives any engine implementing the capability
//! traits.
//!
//! ```
//! use llm_session::{LifecycleManager, Phase};
//! use llm_session_engine::ScriptedProvider;
//!
//! # #[tokio::main]
//! # async fn main() -> llm_session::Result<()> {
//! let provider = ScriptedProvider::new().with_model("models/tiny.gguf", 2048);
//! let mut manager = LifecycleManager::new(provider);
//! manager.load_module().await?;
//! manager.load_engine(Default::default()).await?;
//! manager.load_model("models/tiny.gguf").await?;
//! manager.init_session("Answer briefly.").await?;
//!
//! let reply = manager.prompt_streaming("hello", |chunk| print!("{chunk}")).await?;
//! assert_eq!(reply, "hello");
//! assert_eq!(manager.status().phase, Phase::Ready);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chat;
pub mod logging;
pub mod manager;
mod status;

// Re-export commonly used types
pub use llm_session_core::{
    ChatHistoryItem, Error, ErrorKind, GpuPreference, LifecycleConfig, LifecycleStatus,
    ManagerId, ManagerInfo, Operation, Phase, Result,
};
pub use logging::init_tracing;
pub use manager::LifecycleManager;

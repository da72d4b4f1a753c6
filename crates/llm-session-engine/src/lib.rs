//! # llm-session-engine
//!
//! Capability interface to the inference engine driven by the lifecycle
//! manager.
//!
//! This crate provides:
//! - The handle chain as traits: provider → runtime module → engine →
//!   model → context → chat session
//! - Generation options (token chunk sink, cancellation)
//! - A deterministic in-process [`scripted`] engine implementing every trait
//!
//! ## Architecture
//!
//! This is Layer 1 in the architecture - it depends on llm-session-core and
//! is consumed by the llm-session manager. Real engine bindings implement the
//! traits in [`traits`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod scripted;
pub mod traits;

// Re-export commonly used types
pub use scripted::{CancelBehavior, ScriptedCall, ScriptedCalls, ScriptedProvider};
pub use traits::{
    ChatSession, GenerateOptions, InferenceContext, InferenceEngine, InferenceProvider,
    LoadedModel, RuntimeModule, TokenChunkSink,
};

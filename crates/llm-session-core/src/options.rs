//! Option and metadata types exchanged with the inference engine.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single model token id.
pub type Token = u32;

/// GPU backend the engine should bind to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum GpuPreference {
    /// Let the engine pick the best available backend
    #[default]
    Auto,
    /// NVIDIA CUDA
    Cuda,
    /// Vulkan
    Vulkan,
    /// Apple Metal
    Metal,
    /// No GPU, CPU only
    Cpu,
}

/// Whether the engine may build its native backend from source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BuildPolicy {
    /// Use a prebuilt binary, build only if none fits
    #[default]
    Auto,
    /// Never build, fail if no prebuilt binary fits
    Never,
    /// Try building, fall back to a prebuilt binary
    Try,
    /// Always rebuild
    ForceRebuild,
}

/// Verbosity of the engine's own logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum EngineLogLevel {
    /// No engine logs
    Disabled,
    /// Fatal errors only
    Fatal,
    /// Errors
    Error,
    /// Warnings and errors
    #[default]
    Warn,
    /// Informational
    Info,
    /// Everything
    Debug,
}

/// Options for configuring the inference engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct EngineOptions {
    /// Engine log verbosity
    pub log_level: EngineLogLevel,
    /// Native build policy
    pub build_policy: BuildPolicy,
    /// GPU backend affinity
    pub gpu: GpuPreference,
}

/// Options for loading model weights.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ModelOptions {
    /// Path to the model file
    pub path: String,
}

impl ModelOptions {
    /// Create model options for a path.
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Options for creating an inference context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ContextOptions {
    /// Worker threads used for evaluation
    pub thread_count: u32,
    /// Sampling seed, fixed for reproducible output
    pub seed: u32,
    /// Number of sequences the context can host
    pub sequence_count: u32,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            thread_count: 6,
            seed: 1111,
            sequence_count: 1,
        }
    }
}

/// Options for opening a chat session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SessionOptions {
    /// System prompt the session starts with
    pub system_prompt: String,
}

/// Sizing metadata reported by an inference context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ContextMetadata {
    /// Tokens evaluated per batch
    pub batch_size: u32,
    /// Context window size in tokens
    pub context_size: u32,
    /// Sequences still available for new sessions
    pub sequences_remaining: u32,
    /// Size of the context state in bytes
    pub state_size_bytes: u64,
    /// Total sequences the context was created with
    pub total_sequences: u32,
}

/// Device memory usage reported by the engine, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DeviceMemoryState {
    /// Total device memory
    pub total: u64,
    /// Memory in use
    pub used: u64,
    /// Memory available
    pub free: u64,
}

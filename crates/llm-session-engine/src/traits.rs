//! Capability traits for the inference engine collaborator.
//!
//! Each handle is obtained from the previous one, in the order the manager
//! loads them. Handles are boxed trait objects so a manager can own a chain
//! built by any engine binding.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use llm_session_core::{
    ChatHistoryItem, ContextMetadata, ContextOptions, DeviceMemoryState, EngineOptions,
    EngineResult, ModelOptions, SessionOptions, Token,
};

/// Entry point of an inference library.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Load the runtime module.
    async fn acquire_module(&self) -> EngineResult<Box<dyn RuntimeModule>>;
}

/// Loaded runtime of an inference library.
#[async_trait]
pub trait RuntimeModule: Send + Sync {
    /// Configure an engine instance.
    async fn configure_engine(
        &self,
        options: EngineOptions,
    ) -> EngineResult<Box<dyn InferenceEngine>>;
}

/// Configured engine bound to a device.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Load model weights.
    async fn load_model(&self, options: ModelOptions) -> EngineResult<Box<dyn LoadedModel>>;

    /// Current device memory usage.
    async fn device_memory_state(&self) -> EngineResult<DeviceMemoryState>;

    /// Names of the devices the engine runs on.
    async fn device_names(&self) -> EngineResult<Vec<String>>;
}

/// Model weights loaded from a file.
#[async_trait]
pub trait LoadedModel: Send + Sync {
    /// File name of the weights.
    fn file_name(&self) -> Option<String>;

    /// Context size the model was trained with.
    fn trained_context_size(&self) -> u32;

    /// Decode tokens to text.
    fn detokenize(&self, tokens: &[Token]) -> String;

    /// Create an evaluation context.
    async fn create_context(
        &self,
        options: ContextOptions,
    ) -> EngineResult<Box<dyn InferenceContext>>;
}

/// Evaluation context created from a model.
#[async_trait]
pub trait InferenceContext: Send + Sync {
    /// Sizing metadata.
    fn metadata(&self) -> ContextMetadata;

    /// Open a chat session on one of the context's sequences.
    async fn open_session(&self, options: SessionOptions) -> EngineResult<Box<dyn ChatSession>>;
}

/// Callback receiving each raw token chunk as it is produced.
pub type TokenChunkSink<'a> = &'a mut (dyn FnMut(&[Token]) + Send);

/// Options for a single generation.
pub struct GenerateOptions<'a> {
    /// Receives token chunks in generation order
    pub on_token_chunk: Option<TokenChunkSink<'a>>,
    /// Fired to abort the generation
    pub cancellation: CancellationToken,
}

impl<'a> GenerateOptions<'a> {
    /// Options with no chunk sink.
    pub fn new(cancellation: CancellationToken) -> Self {
        Self {
            on_token_chunk: None,
            cancellation,
        }
    }

    /// Attach a chunk sink.
    pub fn with_sink(mut self, sink: TokenChunkSink<'a>) -> Self {
        self.on_token_chunk = Some(sink);
        self
    }
}

impl std::fmt::Debug for GenerateOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerateOptions")
            .field("on_token_chunk", &self.on_token_chunk.is_some())
            .field("cancellation", &self.cancellation)
            .finish()
    }
}

/// Chat session holding a system prompt and a mutable history.
#[async_trait]
pub trait ChatSession: Send + Sync {
    /// Generate a response to `text`, returning the full response.
    async fn generate(&mut self, text: &str, options: GenerateOptions<'_>)
        -> EngineResult<String>;

    /// Export the chat history, oldest item first.
    async fn export_history(&self) -> EngineResult<Vec<ChatHistoryItem>>;

    /// Replace the chat history.
    async fn import_history(&mut self, items: Vec<ChatHistoryItem>) -> EngineResult<()>;

    /// Release the session's sequence. The context and model stay alive.
    async fn dispose(&mut self);

    /// Whether the session still holds its context sequence.
    fn has_sequence(&self) -> bool;

    /// Wipe the sequence's evaluated history in place.
    async fn clear_sequence_history(&mut self) -> EngineResult<()>;
}

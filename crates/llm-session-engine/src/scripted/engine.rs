//! Scripted runtime module, engine and model handles.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use llm_session_core::{
    ContextOptions, DeviceMemoryState, EngineError, EngineOptions, EngineResult, ModelOptions,
    Token,
};

use super::session::ScriptedContext;
use super::{ScriptedCall, Shared};
use crate::traits::{InferenceContext, InferenceEngine, LoadedModel, RuntimeModule};

/// Scripted [`RuntimeModule`].
#[derive(Debug)]
pub struct ScriptedModule {
    shared: Arc<Shared>,
}

impl ScriptedModule {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }
}

#[async_trait]
impl RuntimeModule for ScriptedModule {
    async fn configure_engine(
        &self,
        options: EngineOptions,
    ) -> EngineResult<Box<dyn InferenceEngine>> {
        self.shared.enter(ScriptedCall::ConfigureEngine)?;
        if !self.shared.supports_gpu(options.gpu) {
            return Err(EngineError::Unsupported(format!(
                "gpu backend {:?}",
                options.gpu
            )));
        }
        debug!("Scripted engine configured: {:?}", options);
        Ok(Box::new(ScriptedEngine {
            shared: Arc::clone(&self.shared),
        }))
    }
}

/// Scripted [`InferenceEngine`].
#[derive(Debug)]
pub struct ScriptedEngine {
    shared: Arc<Shared>,
}

#[async_trait]
impl InferenceEngine for ScriptedEngine {
    async fn load_model(&self, options: ModelOptions) -> EngineResult<Box<dyn LoadedModel>> {
        self.shared.enter(ScriptedCall::LoadModel)?;
        let trained_context_size = self
            .shared
            .trained_context_size(&options.path)
            .ok_or_else(|| EngineError::NotFound(options.path.clone()))?;

        debug!("Scripted model loaded: {}", options.path);
        Ok(Box::new(ScriptedModel {
            shared: Arc::clone(&self.shared),
            path: options.path,
            trained_context_size,
        }))
    }

    async fn device_memory_state(&self) -> EngineResult<DeviceMemoryState> {
        self.shared.enter(ScriptedCall::DeviceMemory)?;
        Ok(self.shared.memory())
    }

    async fn device_names(&self) -> EngineResult<Vec<String>> {
        self.shared.enter(ScriptedCall::DeviceNames)?;
        Ok(self.shared.devices())
    }
}

/// Scripted [`LoadedModel`].
#[derive(Debug)]
pub struct ScriptedModel {
    shared: Arc<Shared>,
    path: String,
    trained_context_size: u32,
}

#[async_trait]
impl LoadedModel for ScriptedModel {
    fn file_name(&self) -> Option<String> {
        Path::new(&self.path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }

    fn trained_context_size(&self) -> u32 {
        self.trained_context_size
    }

    fn detokenize(&self, tokens: &[Token]) -> String {
        tokens.iter().filter_map(|&t| char::from_u32(t)).collect()
    }

    async fn create_context(
        &self,
        options: ContextOptions,
    ) -> EngineResult<Box<dyn InferenceContext>> {
        self.shared.enter(ScriptedCall::CreateContext)?;
        if options.thread_count == 0 || options.sequence_count == 0 {
            return Err(EngineError::Unsupported(format!(
                "context options {options:?}"
            )));
        }
        debug!(
            "Scripted context created: threads={}, seed={}, sequences={}",
            options.thread_count, options.seed, options.sequence_count
        );
        Ok(Box::new(ScriptedContext::new(
            Arc::clone(&self.shared),
            self.shared.batch_size(),
            self.trained_context_size,
            options.sequence_count,
        )))
    }
}

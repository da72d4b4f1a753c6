//! Deterministic in-process inference engine.
//!
//! Implements every capability trait without native code: models are
//! registered by path, tokens are Unicode scalar values and responses come
//! from a queue (or echo the prompt). Failures can be queued per call so the
//! manager's error paths can be driven on demand, and every call is counted.
//!
//! ```
//! use llm_session_core::EngineError;
//! use llm_session_engine::{ScriptedCall, ScriptedProvider};
//!
//! let provider = ScriptedProvider::new()
//!     .with_model("models/tiny.gguf", 2048)
//!     .with_response("Hello there");
//! provider.fail_next(ScriptedCall::LoadModel, EngineError::Failed("disk".to_string()));
//! assert_eq!(provider.calls().total(), 0);
//! ```

mod engine;
mod session;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use llm_session_core::{DeviceMemoryState, EngineError, EngineResult, GpuPreference};

use crate::traits::{InferenceProvider, RuntimeModule};

pub use engine::{ScriptedEngine, ScriptedModel, ScriptedModule};
pub use session::{split_chunks, ScriptedContext, ScriptedSession};

const GIB: u64 = 1024 * 1024 * 1024;

/// Engine calls the scripted engine counts and can fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptedCall {
    /// `InferenceProvider::acquire_module`
    AcquireModule,
    /// `RuntimeModule::configure_engine`
    ConfigureEngine,
    /// `InferenceEngine::load_model`
    LoadModel,
    /// `InferenceEngine::device_memory_state`
    DeviceMemory,
    /// `InferenceEngine::device_names`
    DeviceNames,
    /// `LoadedModel::create_context`
    CreateContext,
    /// `InferenceContext::open_session`
    OpenSession,
    /// `ChatSession::generate`
    Generate,
    /// `ChatSession::export_history`
    ExportHistory,
    /// `ChatSession::import_history`
    ImportHistory,
    /// `ChatSession::dispose`
    Dispose,
    /// `ChatSession::clear_sequence_history`
    ClearSequenceHistory,
}

/// How a scripted generation reacts once its cancellation token has fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelBehavior {
    /// Fail with [`EngineError::Aborted`].
    #[default]
    Abort,
    /// Stop streaming and return the text produced so far.
    Stop,
    /// Keep streaming as if the token never fired.
    Ignore,
}

/// Per-call counters shared by every handle of one provider.
#[derive(Debug, Default)]
pub struct ScriptedCalls {
    counts: Mutex<HashMap<ScriptedCall, usize>>,
}

impl ScriptedCalls {
    /// Number of times `call` was made.
    pub fn count(&self, call: ScriptedCall) -> usize {
        lock(&self.counts).get(&call).copied().unwrap_or(0)
    }

    /// Number of calls of any kind.
    pub fn total(&self) -> usize {
        lock(&self.counts).values().sum()
    }

    fn record(&self, call: ScriptedCall) {
        *lock(&self.counts).entry(call).or_insert(0) += 1;
    }
}

#[derive(Debug)]
struct ScriptState {
    reachable: bool,
    models: HashMap<String, u32>,
    gpus: Vec<GpuPreference>,
    devices: Vec<String>,
    memory: DeviceMemoryState,
    batch_size: u32,
    responses: VecDeque<String>,
    failures: HashMap<ScriptedCall, VecDeque<EngineError>>,
    generation_failure: Option<(usize, EngineError)>,
    detached_sequence: bool,
    cancel_behavior: CancelBehavior,
}

impl Default for ScriptState {
    fn default() -> Self {
        Self {
            reachable: true,
            models: HashMap::new(),
            gpus: vec![GpuPreference::Auto, GpuPreference::Cpu],
            devices: vec!["Scripted CPU".to_string()],
            memory: DeviceMemoryState {
                total: 8 * GIB,
                used: 0,
                free: 8 * GIB,
            },
            batch_size: 512,
            responses: VecDeque::new(),
            failures: HashMap::new(),
            generation_failure: None,
            detached_sequence: false,
            cancel_behavior: CancelBehavior::Abort,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Shared {
    state: Mutex<ScriptState>,
    calls: Arc<ScriptedCalls>,
}

impl Shared {
    /// Count `call` and return the failure queued for it, if any.
    pub(crate) fn enter(&self, call: ScriptedCall) -> EngineResult<()> {
        self.calls.record(call);
        let mut state = lock(&self.state);
        match state.failures.get_mut(&call).and_then(VecDeque::pop_front) {
            Some(err) => {
                debug!("Scripted engine failing {:?}: {}", call, err);
                Err(err)
            }
            None => Ok(()),
        }
    }

    pub(crate) fn trained_context_size(&self, path: &str) -> Option<u32> {
        lock(&self.state).models.get(path).copied()
    }

    pub(crate) fn supports_gpu(&self, gpu: GpuPreference) -> bool {
        lock(&self.state).gpus.contains(&gpu)
    }

    pub(crate) fn devices(&self) -> Vec<String> {
        lock(&self.state).devices.clone()
    }

    pub(crate) fn memory(&self) -> DeviceMemoryState {
        lock(&self.state).memory
    }

    pub(crate) fn batch_size(&self) -> u32 {
        lock(&self.state).batch_size
    }

    pub(crate) fn detached_sequence(&self) -> bool {
        lock(&self.state).detached_sequence
    }

    pub(crate) fn cancel_behavior(&self) -> CancelBehavior {
        lock(&self.state).cancel_behavior
    }

    /// Next scripted response, or the prompt itself when the queue is empty.
    pub(crate) fn next_response(&self, prompt: &str) -> String {
        lock(&self.state)
            .responses
            .pop_front()
            .unwrap_or_else(|| prompt.to_string())
    }

    pub(crate) fn take_generation_failure(&self) -> Option<(usize, EngineError)> {
        lock(&self.state).generation_failure.take()
    }
}

/// Scripted [`InferenceProvider`].
///
/// Cloning shares the script and counters, so a test can keep a clone to
/// queue failures after handing the provider to a manager.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProvider {
    shared: Arc<Shared>,
}

impl ScriptedProvider {
    /// Create a provider with no models registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a provider whose runtime can never be loaded.
    pub fn unreachable() -> Self {
        let provider = Self::new();
        lock(&provider.shared.state).reachable = false;
        provider
    }

    /// Register a model file.
    pub fn with_model(self, path: impl Into<String>, trained_context_size: u32) -> Self {
        lock(&self.shared.state)
            .models
            .insert(path.into(), trained_context_size);
        self
    }

    /// Allow an additional GPU backend.
    pub fn with_gpu(self, gpu: GpuPreference) -> Self {
        lock(&self.shared.state).gpus.push(gpu);
        self
    }

    /// Replace the reported device names.
    pub fn with_devices(self, devices: Vec<String>) -> Self {
        lock(&self.shared.state).devices = devices;
        self
    }

    /// Replace the reported device memory state.
    pub fn with_memory(self, memory: DeviceMemoryState) -> Self {
        lock(&self.shared.state).memory = memory;
        self
    }

    /// Queue a response.
    pub fn with_response(self, response: impl Into<String>) -> Self {
        self.push_response(response);
        self
    }

    /// Open sessions without a context sequence.
    pub fn with_detached_sequence(self) -> Self {
        lock(&self.shared.state).detached_sequence = true;
        self
    }

    /// Change how generations react to a fired cancellation token.
    pub fn with_cancel_behavior(self, behavior: CancelBehavior) -> Self {
        lock(&self.shared.state).cancel_behavior = behavior;
        self
    }

    /// Queue a response.
    pub fn push_response(&self, response: impl Into<String>) {
        lock(&self.shared.state).responses.push_back(response.into());
    }

    /// Fail the next `call` with `error`. Queued failures are consumed in order.
    pub fn fail_next(&self, call: ScriptedCall, error: EngineError) {
        lock(&self.shared.state)
            .failures
            .entry(call)
            .or_default()
            .push_back(error);
    }

    /// Fail the next generation with `error` once `chunks` chunks were produced.
    pub fn fail_generation_after(&self, chunks: usize, error: EngineError) {
        lock(&self.shared.state).generation_failure = Some((chunks, error));
    }

    /// Call counters.
    pub fn calls(&self) -> Arc<ScriptedCalls> {
        Arc::clone(&self.shared.calls)
    }
}

#[async_trait]
impl InferenceProvider for ScriptedProvider {
    async fn acquire_module(&self) -> EngineResult<Box<dyn RuntimeModule>> {
        self.shared.enter(ScriptedCall::AcquireModule)?;
        if !lock(&self.shared.state).reachable {
            return Err(EngineError::NotFound("inference runtime".to_string()));
        }
        debug!("Scripted runtime module acquired");
        Ok(Box::new(ScriptedModule::new(Arc::clone(&self.shared))))
    }
}

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

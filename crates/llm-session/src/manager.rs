//! Lifecycle manager: setup stages, teardown and diagnostics.
//!
//! Setup is four ordered stages, each producing a handle the next stage
//! needs:
//!
//! ```text
//! load_module → load_engine → load_model → init_session
//! ```
//!
//! Every stage validates its preconditions before touching the engine. A
//! guard failure or engine failure moves the manager to [`Phase::Error`]
//! with a message tagged by the operation (`loadModel:...`), and the error
//! is returned to the caller. Any stage may be re-invoked; a successful
//! reload releases the handles that were built on the replaced one.
//!
//! Prompt and history operations live in [`crate::chat`].

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use llm_session_core::{
    ContextOptions, DeviceInfo, Error, GpuPreference, LifecycleConfig, LifecycleStatus, ManagerId,
    ManagerInfo, ModelInfo, ModelOptions, Operation, Phase, Result, SessionOptions,
};
use llm_session_engine::{
    ChatSession, InferenceContext, InferenceEngine, InferenceProvider, LoadedModel, RuntimeModule,
};

use crate::status::StatusTracker;

pub(crate) const NO_MODULE: &str = "runtime module not loaded, call load_module first";
pub(crate) const NO_ENGINE: &str = "engine not loaded, call load_engine first";
pub(crate) const NO_MODEL: &str = "model not loaded, call load_model first";
pub(crate) const NO_SESSION: &str = "no active session, call init_session first";
pub(crate) const EMPTY_PATH: &str = "model path is empty";

/// Context and chat session opened on it.
///
/// Field order is drop order: the session goes before its context.
pub(crate) struct ActiveSession {
    pub(crate) chat: Box<dyn ChatSession>,
    pub(crate) context: Box<dyn InferenceContext>,
}

/// State machine around one inference session.
///
/// Not designed for concurrent use: mutating operations take `&mut self`,
/// so callers serialize them by construction.
pub struct LifecycleManager {
    id: ManagerId,
    config: LifecycleConfig,
    pub(crate) tracker: StatusTracker,
    pub(crate) cancellation: CancellationToken,

    // Field order is drop order: downstream handles are released first.
    pub(crate) session: Option<ActiveSession>,
    pub(crate) model: Option<Box<dyn LoadedModel>>,
    engine: Option<Box<dyn InferenceEngine>>,
    module: Option<Box<dyn RuntimeModule>>,
    provider: Box<dyn InferenceProvider>,
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("id", &self.id)
            .field("status", self.tracker.current())
            .field("module", &self.module.is_some())
            .field("engine", &self.engine.is_some())
            .field("model", &self.model.is_some())
            .field("session", &self.session.is_some())
            .finish_non_exhaustive()
    }
}

impl LifecycleManager {
    /// Create a manager with default configuration.
    pub fn new<P>(provider: P) -> Self
    where
        P: InferenceProvider + 'static,
    {
        Self::build(Box::new(provider), LifecycleConfig::default())
    }

    /// Create a manager with custom configuration.
    ///
    /// The configuration is validated first, so a config built in code is
    /// held to the same rules as one loaded from YAML.
    pub fn with_config<P>(provider: P, config: LifecycleConfig) -> Result<Self>
    where
        P: InferenceProvider + 'static,
    {
        config.validate()?;
        Ok(Self::build(Box::new(provider), config))
    }

    fn build(provider: Box<dyn InferenceProvider>, config: LifecycleConfig) -> Self {
        let id = ManagerId::new();
        info!("Creating lifecycle manager: id={}", id);
        Self {
            id,
            config,
            tracker: StatusTracker::new(id),
            cancellation: CancellationToken::new(),
            session: None,
            model: None,
            engine: None,
            module: None,
            provider,
        }
    }

    /// Get the manager ID.
    pub fn id(&self) -> ManagerId {
        self.id
    }

    /// Get the configuration.
    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Get the current status.
    pub fn status(&self) -> LifecycleStatus {
        self.tracker.current().clone()
    }

    /// Get the current phase.
    pub fn phase(&self) -> Phase {
        self.tracker.phase()
    }

    /// Whether the manager is idle with an open session, i.e. can be prompted.
    pub fn is_ready(&self) -> bool {
        self.tracker.phase() == Phase::Ready && self.session.is_some()
    }

    /// Whether the runtime module is loaded.
    pub fn has_module(&self) -> bool {
        self.module.is_some()
    }

    /// Whether the engine is loaded.
    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    /// Whether a model is loaded.
    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Whether a chat session is open.
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Token passed to the current generation.
    ///
    /// Cancelling a clone from another task aborts the in-flight generation.
    /// A fired token is replaced when the next generation starts.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Record a failure and hand the error back for returning.
    pub(crate) fn fail(&mut self, err: Error) -> Error {
        error!("Lifecycle operation failed: id={}, {}", self.id, err);
        self.tracker.set(Phase::Error, err.to_string());
        err
    }

    /// Load the runtime module.
    pub async fn load_module(&mut self) -> Result<()> {
        info!("Loading runtime module: id={}", self.id);
        self.tracker.set(Phase::Loading, "loading runtime module");

        let result = self.provider.acquire_module().await;
        match result {
            Ok(module) => {
                if self.module.is_some() {
                    self.release_engine().await;
                }
                self.module = Some(module);
                self.tracker.set(Phase::Ready, "runtime module loaded");
                Ok(())
            }
            Err(err) => Err(self.fail(Error::stage(Operation::LoadModule, &err))),
        }
    }

    /// Configure the inference engine on the given GPU backend.
    pub async fn load_engine(&mut self, gpu: GpuPreference) -> Result<()> {
        let Some(module) = self.module.as_deref() else {
            return Err(self.fail(Error::precondition(Operation::LoadEngine, NO_MODULE)));
        };

        let options = self.config.engine.options(gpu);
        info!("Loading engine: id={}, options={:?}", self.id, options);
        self.tracker.set(Phase::Loading, "loading engine");

        let result = module.configure_engine(options).await;
        match result {
            Ok(engine) => {
                if self.engine.is_some() {
                    self.release_engine().await;
                }
                self.engine = Some(engine);
                self.tracker.set(Phase::Ready, "engine loaded");
                Ok(())
            }
            Err(err) => Err(self.fail(Error::stage(Operation::LoadEngine, &err))),
        }
    }

    /// Load model weights from `path`.
    pub async fn load_model(&mut self, path: &str) -> Result<()> {
        if path.trim().is_empty() {
            return Err(self.fail(Error::precondition(Operation::LoadModel, EMPTY_PATH)));
        }
        if self.module.is_none() {
            return Err(self.fail(Error::precondition(Operation::LoadModel, NO_MODULE)));
        }
        let Some(engine) = self.engine.as_deref() else {
            return Err(self.fail(Error::precondition(Operation::LoadModel, NO_ENGINE)));
        };

        info!("Loading model: id={}, path='{}'", self.id, path);
        self.tracker.set(Phase::Loading, format!("loading model {path}"));

        let result = engine.load_model(ModelOptions::new(path)).await;
        match result {
            Ok(model) => {
                self.release_model().await;
                info!(
                    "Model loaded: id={}, file={:?}, trained_context_size={}",
                    self.id,
                    model.file_name(),
                    model.trained_context_size()
                );
                self.model = Some(model);
                self.tracker.set(Phase::Ready, "model loaded");
                Ok(())
            }
            Err(err) => Err(self.fail(Error::stage(Operation::LoadModel, &err))),
        }
    }

    /// Create a context from the loaded model and open a chat session on it.
    ///
    /// An existing session is disposed first. The context uses the
    /// configured thread count, seed and sequence count.
    pub async fn init_session(&mut self, system_prompt: &str) -> Result<()> {
        let reason = if self.module.is_none() {
            Some(NO_MODULE)
        } else if self.engine.is_none() {
            Some(NO_ENGINE)
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(self.fail(Error::precondition(Operation::InitSession, reason)));
        }
        let Some(model) = self.model.as_deref() else {
            return Err(self.fail(Error::precondition(Operation::InitSession, NO_MODEL)));
        };

        let context_options: ContextOptions = self.config.context.into();
        info!(
            "Initializing session: id={}, context={:?}, system_prompt={} chars",
            self.id,
            context_options,
            system_prompt.len()
        );
        self.tracker.set(Phase::Loading, "initializing session");

        if let Some(mut previous) = self.session.take() {
            debug!("Disposing previous session: id={}", self.id);
            previous.chat.dispose().await;
        }
        if self.cancellation.is_cancelled() {
            self.cancellation = CancellationToken::new();
        }

        let result = model.create_context(context_options).await;
        let context = match result {
            Ok(context) => context,
            Err(err) => return Err(self.fail(Error::stage(Operation::InitSession, &err))),
        };
        let session_options = SessionOptions {
            system_prompt: system_prompt.to_string(),
        };
        let result = context.open_session(session_options).await;
        let chat = match result {
            Ok(chat) => chat,
            Err(err) => return Err(self.fail(Error::stage(Operation::InitSession, &err))),
        };

        debug!(
            "Session opened: id={}, context={:?}",
            self.id,
            context.metadata()
        );
        self.session = Some(ActiveSession { chat, context });
        self.tracker.set(Phase::Ready, "session ready");
        Ok(())
    }

    /// Run all four stages from the configuration, stopping at the first
    /// failure.
    pub async fn load_all(&mut self) -> Result<()> {
        let gpu = self.config.engine.gpu;
        let path = self.config.model.path.clone().unwrap_or_default();
        let system_prompt = self.config.session.system_prompt.clone();

        self.load_module().await?;
        self.load_engine(gpu).await?;
        self.load_model(&path).await?;
        self.init_session(&system_prompt).await
    }

    /// Release every handle, newest first, and return to
    /// [`Phase::Uninitialized`].
    pub async fn dispose(&mut self) {
        info!("Disposing lifecycle manager: id={}", self.id);
        self.release_engine().await;
        self.module = None;
        self.tracker.set_default(Phase::Uninitialized);
    }

    /// Best-effort diagnostic snapshot. Never fails.
    ///
    /// Each section is present only while its source handle exists; device
    /// queries the engine cannot answer are left out.
    pub async fn get_info(&self) -> ManagerInfo {
        let mut info = ManagerInfo::new(self.id);

        if let Some(model) = self.model.as_deref() {
            info.model = Some(ModelInfo {
                file_name: model.file_name(),
                trained_context_size: model.trained_context_size(),
            });
        }

        if let Some(active) = &self.session {
            info.context = Some(active.context.metadata().into());
        }

        if let Some(engine) = self.engine.as_deref() {
            let memory = match engine.device_memory_state().await {
                Ok(memory) => Some(memory),
                Err(err) => {
                    warn!("Device memory state unavailable: id={}, {}", self.id, err);
                    None
                }
            };
            let names = match engine.device_names().await {
                Ok(names) => names,
                Err(err) => {
                    warn!("Device names unavailable: id={}, {}", self.id, err);
                    Vec::new()
                }
            };
            info.device = Some(DeviceInfo { memory, names });
        }

        info
    }

    pub(crate) async fn release_session(&mut self) {
        if let Some(mut active) = self.session.take() {
            active.chat.dispose().await;
            debug!("Session released: id={}", self.id);
        }
    }

    async fn release_model(&mut self) {
        self.release_session().await;
        if self.model.take().is_some() {
            debug!("Model released: id={}", self.id);
        }
    }

    async fn release_engine(&mut self) {
        self.release_model().await;
        if self.engine.take().is_some() {
            debug!("Engine released: id={}", self.id);
        }
    }
}

//! Lifecycle types: manager identity, phases and the operation tags used in
//! diagnostics.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a lifecycle manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ManagerId(Uuid);

impl ManagerId {
    /// Create a new random manager ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for ManagerId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for ManagerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ManagerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse lifecycle phase of a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Nothing has been loaded yet
    Uninitialized,
    /// A setup stage or history import is in flight
    Loading,
    /// Idle and able to accept the next operation
    Ready,
    /// A generation or history export is in flight
    Generating,
    /// The last operation failed
    Error,
}

impl Phase {
    /// Message reported when a transition does not supply one.
    pub fn default_message(&self) -> &'static str {
        match self {
            Phase::Uninitialized => "not initialized",
            Phase::Loading => "loading",
            Phase::Ready => "ready",
            Phase::Generating => "generating",
            Phase::Error => "error",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Uninitialized => "uninitialized",
            Phase::Loading => "loading",
            Phase::Ready => "ready",
            Phase::Generating => "generating",
            Phase::Error => "error",
        };
        f.write_str(name)
    }
}

/// Snapshot of a manager's phase and diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LifecycleStatus {
    /// Current phase
    pub phase: Phase,
    /// Human-readable diagnostic
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl LifecycleStatus {
    /// Create a status with an explicit message.
    pub fn new(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: Some(message.into()),
        }
    }

    /// Create a status carrying the phase's default message.
    pub fn with_default_message(phase: Phase) -> Self {
        Self::new(phase, phase.default_message())
    }
}

impl Default for LifecycleStatus {
    fn default() -> Self {
        Self::with_default_message(Phase::Uninitialized)
    }
}

/// Manager operation, used to tag errors and status messages.
///
/// The tags are the stable `camelCase` names callers already grep logs for,
/// e.g. `loadModel:model file not found`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Operation {
    /// Acquire the runtime module
    LoadModule,
    /// Configure the inference engine
    LoadEngine,
    /// Load model weights
    LoadModel,
    /// Create a context and open a chat session
    InitSession,
    /// Generate a response
    Prompt,
    /// Export chat history
    GetHistory,
    /// Replace chat history
    SetHistory,
    /// Release the chat session
    DisposeSession,
    /// Wipe the session's sequence history
    ClearHistory,
}

impl Operation {
    /// Tag used as the prefix of error and status messages.
    pub fn tag(&self) -> &'static str {
        match self {
            Operation::LoadModule => "loadModule",
            Operation::LoadEngine => "loadLlama",
            Operation::LoadModel => "loadModel",
            Operation::InitSession => "initSession",
            Operation::Prompt => "prompt",
            Operation::GetHistory => "getHistory",
            Operation::SetHistory => "setHistory",
            Operation::DisposeSession => "disposeSession",
            Operation::ClearHistory => "clearHistory",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_id_creation() {
        let id1 = ManagerId::new();
        let id2 = ManagerId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_manager_id_display() {
        let id = ManagerId::new();
        let display = format!("{id}");
        assert_eq!(display.len(), 36); // UUID format length
    }

    #[test]
    fn test_default_status_is_uninitialized() {
        let status = LifecycleStatus::default();
        assert_eq!(status.phase, Phase::Uninitialized);
        assert_eq!(status.message.as_deref(), Some("not initialized"));
    }

    #[test]
    fn test_operation_tags() {
        assert_eq!(Operation::LoadModule.tag(), "loadModule");
        assert_eq!(Operation::LoadEngine.tag(), "loadLlama");
        assert_eq!(Operation::LoadModel.to_string(), "loadModel");
        assert_eq!(Operation::InitSession.tag(), "initSession");
        assert_eq!(Operation::ClearHistory.tag(), "clearHistory");
    }

    #[test]
    fn test_status_serialization() {
        let status = LifecycleStatus::new(Phase::Error, "loadModel:missing");
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"phase\":\"error\""));

        let deserialized: LifecycleStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, status);
    }
}

//! Diagnostic snapshots returned by `get_info`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{ContextMetadata, DeviceMemoryState, ManagerId};

/// Best-effort diagnostic snapshot of a manager.
///
/// Every field except the identity is present only while the handle it is
/// read from exists, so a snapshot of a fresh manager serializes as `{"id"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ManagerInfo {
    /// Manager identity
    pub id: ManagerId,
    /// Loaded model metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelInfo>,
    /// Active context sizing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextInfo>,
    /// Engine device state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceInfo>,
}

impl ManagerInfo {
    /// Create a snapshot containing only the identity.
    pub fn new(id: ManagerId) -> Self {
        Self {
            id,
            model: None,
            context: None,
            device: None,
        }
    }

    /// Whether every optional section is populated.
    pub fn is_complete(&self) -> bool {
        self.model.is_some() && self.context.is_some() && self.device.is_some()
    }
}

/// Metadata of the loaded model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ModelInfo {
    /// File name of the weights, if the engine reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Context size the model was trained with
    pub trained_context_size: u32,
}

/// Sizing of the active context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ContextInfo {
    /// Tokens evaluated per batch
    pub batch_size: u32,
    /// Context window size in tokens
    pub context_size: u32,
    /// Sequences still available
    pub sequences_remaining: u32,
    /// Context state size in bytes
    pub state_size_bytes: u64,
    /// Total sequences
    pub total_sequences: u32,
}

impl From<ContextMetadata> for ContextInfo {
    fn from(meta: ContextMetadata) -> Self {
        Self {
            batch_size: meta.batch_size,
            context_size: meta.context_size,
            sequences_remaining: meta.sequences_remaining,
            state_size_bytes: meta.state_size_bytes,
            total_sequences: meta.total_sequences,
        }
    }
}

/// Engine device state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DeviceInfo {
    /// Memory usage, absent if the engine could not report it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<DeviceMemoryState>,
    /// Names of the devices the engine is bound to
    #[serde(default)]
    pub names: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_only_snapshot() {
        let id = ManagerId::new();
        let info = ManagerInfo::new(id);
        assert_eq!(info.id, id);
        assert!(!info.is_complete());

        let json = serde_json::to_value(&info).unwrap();
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["id"]);
        assert_eq!(json["id"], serde_json::json!(id.to_string()));
    }

    #[test]
    fn test_context_info_from_metadata() {
        let info = ContextInfo::from(ContextMetadata {
            batch_size: 512,
            context_size: 4096,
            sequences_remaining: 0,
            state_size_bytes: 1024,
            total_sequences: 1,
        });
        assert_eq!(info.batch_size, 512);
        assert_eq!(info.context_size, 4096);
        assert_eq!(info.total_sequences, 1);
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::workspace::CursorPosition;

pub const BRIDGE_PROTOCOL: &str = "oc-obsidian-bridge";
pub const BRIDGE_VERSION: &str = "1.0.0";

/// Wire envelope for one bridge message. Ephemeral; accepted only when
/// protocol, version and channel id all match the currently attached channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeEnvelope {
    pub protocol: String,
    pub version: String,
    pub channel_id: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub payload: Value,
}

impl BridgeEnvelope {
    pub fn new(channel_id: &str, message_type: &str, payload: Value) -> Self {
        Self {
            protocol: BRIDGE_PROTOCOL.to_string(),
            version: BRIDGE_VERSION.to_string(),
            channel_id: channel_id.to_string(),
            message_type: message_type.to_string(),
            payload,
        }
    }
}

/// Messages the host pushes to the embedded UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostMessageType {
    Init,
    Context,
    SessionActive,
    PersonalityActive,
}

impl HostMessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "bridge/init",
            Self::Context => "bridge/context",
            Self::SessionActive => "bridge/session/active",
            Self::PersonalityActive => "bridge/personality/active",
        }
    }
}

/// Messages the embedded UI sends to the host. Closed set; anything else is
/// dropped at the channel boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UiMessageType {
    Ready,
    SessionSelected,
    RequestContextNow,
    OpenFile,
    CreateNote,
    InsertText,
    SetPersonality,
    CompileWorkflow,
}

impl UiMessageType {
    pub const ALL: &'static [UiMessageType] = &[
        Self::Ready,
        Self::SessionSelected,
        Self::RequestContextNow,
        Self::OpenFile,
        Self::CreateNote,
        Self::InsertText,
        Self::SetPersonality,
        Self::CompileWorkflow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ui/ready",
            Self::SessionSelected => "ui/session/selected",
            Self::RequestContextNow => "ui/requestContextNow",
            Self::OpenFile => "ui/vault/openFile",
            Self::CreateNote => "ui/vault/createNote",
            Self::InsertText => "ui/editor/insertText",
            Self::SetPersonality => "ui/personality/set",
            Self::CompileWorkflow => "ui/canvas/compileWorkflow",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == tag)
    }
}

// Host → UI payloads.

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitPayload {
    pub vault_name: String,
    pub plugin_version: String,
    pub server_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_mode: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextPayload {
    pub active_file: Option<String>,
    pub selection: Option<String>,
    pub open_tabs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_position: Option<CursorPosition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionActivePayload {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalityActivePayload {
    pub personality_id: String,
    pub name: String,
}

// UI → host payloads, deserialized after schema validation.

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSelectedPayload {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContextNowPayload {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenFilePayload {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotePayload {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertPosition {
    Cursor,
    End,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertTextPayload {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<InsertPosition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPersonalityPayload {
    pub personality_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileWorkflowPayload {
    pub canvas_path: String,
}

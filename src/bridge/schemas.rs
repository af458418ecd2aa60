use std::collections::HashMap;

use jsonschema::Validator;
use once_cell::sync::Lazy;
use serde_json::{Value, json};

use crate::bridge::envelope::{BRIDGE_PROTOCOL, BRIDGE_VERSION, UiMessageType};

fn compile(schema: Value) -> Validator {
    jsonschema::validator_for(&schema).expect("bridge schema compiles")
}

/// Structural check applied to every inbound message before anything else
/// looks at it: literal protocol/version, non-empty channel id and type.
pub static ENVELOPE_SCHEMA: Lazy<Validator> = Lazy::new(|| {
    compile(json!({
        "type": "object",
        "properties": {
            "protocol": { "const": BRIDGE_PROTOCOL },
            "version": { "const": BRIDGE_VERSION },
            "channelId": { "type": "string", "minLength": 1 },
            "type": { "type": "string", "minLength": 1 },
            "payload": {}
        },
        "required": ["protocol", "version", "channelId", "type"]
    }))
});

/// Per-message-type payload schemas. Types without an entry forward their
/// payload unvalidated.
pub static PAYLOAD_SCHEMAS: Lazy<HashMap<&'static str, Validator>> = Lazy::new(|| {
    let mut schemas = HashMap::new();
    schemas.insert(
        UiMessageType::Ready.as_str(),
        compile(json!({
            "type": "object",
            "properties": { "uiVersion": { "type": "string" } }
        })),
    );
    schemas.insert(
        UiMessageType::SessionSelected.as_str(),
        compile(json!({
            "type": "object",
            "properties": { "sessionId": { "type": "string", "minLength": 1 } },
            "required": ["sessionId"]
        })),
    );
    schemas.insert(
        UiMessageType::RequestContextNow.as_str(),
        compile(json!({
            "type": "object",
            "properties": { "sessionId": { "type": "string", "minLength": 1 } },
            "required": ["sessionId"]
        })),
    );
    schemas.insert(
        UiMessageType::OpenFile.as_str(),
        compile(json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "minLength": 1 },
                "line": { "type": "integer", "minimum": 0 }
            },
            "required": ["path"]
        })),
    );
    schemas.insert(
        UiMessageType::CreateNote.as_str(),
        compile(json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "minLength": 1 },
                "content": { "type": "string" }
            },
            "required": ["path", "content"]
        })),
    );
    schemas.insert(
        UiMessageType::InsertText.as_str(),
        compile(json!({
            "type": "object",
            "properties": {
                "text": { "type": "string" },
                "position": { "enum": ["cursor", "end"] }
            },
            "required": ["text"]
        })),
    );
    schemas.insert(
        UiMessageType::SetPersonality.as_str(),
        compile(json!({
            "type": "object",
            "properties": { "personalityId": { "type": "string", "minLength": 1 } },
            "required": ["personalityId"]
        })),
    );
    schemas.insert(
        UiMessageType::CompileWorkflow.as_str(),
        compile(json!({
            "type": "object",
            "properties": { "canvasPath": { "type": "string", "minLength": 1 } },
            "required": ["canvasPath"]
        })),
    );
    schemas
});

use serde::{Deserialize, Serialize};

/// One node of a canvas document, as stored on disk. `node_type` is
/// free-form ("text", "file", "link", "group"); the compiler infers the
/// semantic workflow type from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasEdge {
    pub id: String,
    pub from_node: String,
    pub to_node: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_side: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_side: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasData {
    pub nodes: Vec<CanvasNode>,
    #[serde(default)]
    pub edges: Vec<CanvasEdge>,
}

impl CanvasNode {
    pub fn text_node(id: &str, text: &str) -> Self {
        Self {
            id: id.to_string(),
            node_type: "text".to_string(),
            x: 0.0,
            y: 0.0,
            width: 200.0,
            height: 60.0,
            text: Some(text.to_string()),
            file: None,
            url: None,
            label: None,
        }
    }

    pub fn file_node(id: &str, file: &str) -> Self {
        Self {
            id: id.to_string(),
            node_type: "file".to_string(),
            x: 0.0,
            y: 0.0,
            width: 200.0,
            height: 60.0,
            text: None,
            file: Some(file.to_string()),
            url: None,
            label: None,
        }
    }
}

impl CanvasEdge {
    pub fn between(id: &str, from: &str, to: &str) -> Self {
        Self {
            id: id.to_string(),
            from_node: from.to_string(),
            to_node: to.to_string(),
            from_side: None,
            to_side: None,
            label: None,
        }
    }
}

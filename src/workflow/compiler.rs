use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::vault::VaultReader;
use crate::workflow::canvas::CanvasData;

pub const WORKFLOW_VERSION: &str = "openwork.workflow.v1";
pub const CANVAS_EXTENSION: &str = ".canvas";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowNodeType {
    Prompt,
    File,
    Output,
    Decision,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: WorkflowNodeType,
    pub content: String,
    pub dependencies: Vec<String>,
}

/// Compiled, validated workflow: referentially intact and acyclic. Built
/// once per compile call and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowGraph {
    pub version: String,
    pub nodes: Vec<WorkflowNode>,
    pub entry_points: Vec<String>,
}

/// Validation failures come back in this envelope rather than as errors, so
/// they can cross the bridge boundary as plain data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<WorkflowGraph>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl CompileResult {
    fn failure(errors: Vec<String>) -> Self {
        Self {
            success: false,
            graph: None,
            errors,
            warnings: Vec::new(),
        }
    }
}

/// Turns a canvas document into a [`WorkflowGraph`], or a list of
/// validation errors. Pure transform apart from reading the source.
#[derive(Debug)]
pub struct WorkflowCompiler {
    vault: Arc<dyn VaultReader>,
}

impl WorkflowCompiler {
    pub fn new(vault: Arc<dyn VaultReader>) -> Self {
        Self { vault }
    }

    pub async fn compile(&self, canvas_path: &str) -> CompileResult {
        if !self.vault.exists(canvas_path).await {
            return CompileResult::failure(vec![format!("Canvas file not found: {canvas_path}")]);
        }
        if !canvas_path.ends_with(CANVAS_EXTENSION) {
            return CompileResult::failure(vec!["File is not a .canvas file".to_string()]);
        }

        let content = match self.vault.read(canvas_path).await {
            Ok(content) => content,
            Err(err) => {
                return CompileResult::failure(vec![format!("Failed to read canvas: {err}")]);
            }
        };

        let value: serde_json::Value = match serde_json::from_str(&content) {
            Ok(value) => value,
            Err(err) => {
                return CompileResult::failure(vec![format!("Failed to parse canvas: {err}")]);
            }
        };
        if !value.get("nodes").map(|n| n.is_array()).unwrap_or(false) {
            return CompileResult::failure(vec![
                "Invalid canvas: missing nodes array".to_string(),
            ]);
        }
        let data: CanvasData = match serde_json::from_value(value) {
            Ok(data) => data,
            Err(err) => {
                return CompileResult::failure(vec![format!("Failed to parse canvas: {err}")]);
            }
        };

        compile_canvas(&data)
    }
}

/// Validate and compile already-parsed canvas data.
pub fn compile_canvas(data: &CanvasData) -> CompileResult {
    let mut errors = validate_refs(data);
    if let Some(cycle) = detect_cycles(data) {
        errors.push(cycle);
    }
    if !errors.is_empty() {
        return CompileResult::failure(errors);
    }

    CompileResult {
        success: true,
        graph: Some(build_graph(data)),
        errors: Vec::new(),
        warnings: Vec::new(),
    }
}

/// Every dangling edge endpoint is reported, not just the first.
fn validate_refs(data: &CanvasData) -> Vec<String> {
    let node_ids: HashSet<&str> = data.nodes.iter().map(|n| n.id.as_str()).collect();
    let mut errors = Vec::new();
    for edge in &data.edges {
        if !node_ids.contains(edge.from_node.as_str()) {
            errors.push(format!(
                "Edge {} references unknown fromNode: {}",
                edge.id, edge.from_node
            ));
        }
        if !node_ids.contains(edge.to_node.as_str()) {
            errors.push(format!(
                "Edge {} references unknown toNode: {}",
                edge.id, edge.to_node
            ));
        }
    }
    errors
}

/// Depth-first cycle detection over an explicit adjacency map, using a
/// visited set and an in-progress (recursion stack) set. Every component is
/// walked, so disjoint cycles are still found.
fn detect_cycles(data: &CanvasData) -> Option<String> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for node in &data.nodes {
        adjacency.entry(node.id.as_str()).or_default();
    }
    for edge in &data.edges {
        if let Some(next) = adjacency.get_mut(edge.from_node.as_str()) {
            next.push(edge.to_node.as_str());
        }
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut in_progress: HashSet<&str> = HashSet::new();
    for node in &data.nodes {
        if !visited.contains(node.id.as_str())
            && walk_for_cycle(node.id.as_str(), &adjacency, &mut visited, &mut in_progress)
        {
            return Some("Cycle detected in workflow graph".to_string());
        }
    }
    None
}

fn walk_for_cycle<'a>(
    node: &'a str,
    adjacency: &HashMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    in_progress: &mut HashSet<&'a str>,
) -> bool {
    visited.insert(node);
    in_progress.insert(node);
    for &next in adjacency.get(node).map(Vec::as_slice).unwrap_or_default() {
        if !visited.contains(next) {
            if walk_for_cycle(next, adjacency, visited, in_progress) {
                return true;
            }
        } else if in_progress.contains(next) {
            // Back-edge into the current walk.
            return true;
        }
    }
    in_progress.remove(node);
    false
}

fn build_graph(data: &CanvasData) -> WorkflowGraph {
    let mut dependencies: HashMap<&str, Vec<String>> = HashMap::new();
    for node in &data.nodes {
        dependencies.entry(node.id.as_str()).or_default();
    }
    for edge in &data.edges {
        if let Some(deps) = dependencies.get_mut(edge.to_node.as_str()) {
            deps.push(edge.from_node.clone());
        }
    }

    let nodes: Vec<WorkflowNode> = data
        .nodes
        .iter()
        .map(|node| WorkflowNode {
            id: node.id.clone(),
            node_type: infer_node_type(&node.node_type, node.text.as_deref()),
            content: extract_content(node),
            dependencies: dependencies.remove(node.id.as_str()).unwrap_or_default(),
        })
        .collect();

    let entry_points = nodes
        .iter()
        .filter(|n| n.dependencies.is_empty())
        .map(|n| n.id.clone())
        .collect();

    WorkflowGraph {
        version: WORKFLOW_VERSION.to_string(),
        nodes,
        entry_points,
    }
}

/// Text nodes may carry inline tag markers steering their semantic type;
/// file nodes always map to file content extraction.
fn infer_node_type(raw_type: &str, text: Option<&str>) -> WorkflowNodeType {
    if raw_type == "file" {
        return WorkflowNodeType::File;
    }
    if raw_type == "text" {
        let text = text.unwrap_or_default().to_lowercase();
        if text.contains("@output") || text.contains("@result") {
            return WorkflowNodeType::Output;
        }
        if text.contains("@if") || text.contains("@decision") {
            return WorkflowNodeType::Decision;
        }
    }
    WorkflowNodeType::Prompt
}

fn extract_content(node: &crate::workflow::canvas::CanvasNode) -> String {
    match node.node_type.as_str() {
        "text" => node.text.clone().unwrap_or_default(),
        "file" => node.file.clone().unwrap_or_default(),
        "link" => node.url.clone().unwrap_or_default(),
        _ => String::new(),
    }
}

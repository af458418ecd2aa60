use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::context::injector::ContextInjector;
use crate::context::snapshot::ContextSnapshot;
use crate::observer::{Registry, Subscription};
use crate::server::client::SessionClient;
use crate::vault::VaultReader;
use crate::workflow::compiler::{WorkflowGraph, WorkflowNode, WorkflowNodeType};

pub const WORKFLOW_HEADER: &str = "[WORKFLOW v1]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Full progress snapshot, broadcast on every transition. The node lists are
/// copies, never live references into runner state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowProgress {
    pub status: WorkflowStatus,
    pub current_node_id: Option<String>,
    pub completed_nodes: Vec<String>,
    pub failed_nodes: Vec<String>,
    pub total_nodes: usize,
}

#[derive(Debug)]
struct RunnerState {
    status: WorkflowStatus,
    current_node_id: Option<String>,
    completed_nodes: Vec<String>,
    failed_nodes: Vec<String>,
    total_nodes: usize,
}

impl RunnerState {
    fn reset(&mut self, total_nodes: usize) {
        self.status = WorkflowStatus::Idle;
        self.current_node_id = None;
        self.completed_nodes.clear();
        self.failed_nodes.clear();
        self.total_nodes = total_nodes;
    }

    fn progress(&self) -> WorkflowProgress {
        WorkflowProgress {
            status: self.status,
            current_node_id: self.current_node_id.clone(),
            completed_nodes: self.completed_nodes.clone(),
            failed_nodes: self.failed_nodes.clone(),
            total_nodes: self.total_nodes,
        }
    }
}

/// Executes a compiled workflow against a server session, dependency order
/// first, fail-fast, with cooperative cancellation between nodes.
#[derive(Debug)]
pub struct WorkflowRunner {
    client: Arc<dyn SessionClient>,
    vault: Arc<dyn VaultReader>,
    injector: Arc<ContextInjector>,
    state: Mutex<RunnerState>,
    subscribers: Registry<WorkflowProgress>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl WorkflowRunner {
    pub fn new(
        client: Arc<dyn SessionClient>,
        vault: Arc<dyn VaultReader>,
        injector: Arc<ContextInjector>,
    ) -> Self {
        Self {
            client,
            vault,
            injector,
            state: Mutex::new(RunnerState {
                status: WorkflowStatus::Idle,
                current_node_id: None,
                completed_nodes: Vec::new(),
                failed_nodes: Vec::new(),
                total_nodes: 0,
            }),
            subscribers: Registry::new(),
            cancel: Mutex::new(None),
        }
    }

    pub fn status(&self) -> WorkflowStatus {
        self.state.lock().expect("runner lock").status
    }

    pub fn on_progress(
        &self,
        handler: impl Fn(&WorkflowProgress) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribers.subscribe(handler)
    }

    /// Request cancellation. The current node finishes; the next one is
    /// never started.
    pub fn cancel(&self) {
        if let Some(token) = self.cancel.lock().expect("runner lock").as_ref() {
            token.cancel();
        }
    }

    /// Run the graph to completion, failure, or cancellation. Refuses
    /// re-entry while a run is in flight.
    pub async fn run(
        &self,
        session_id: &str,
        graph: &WorkflowGraph,
        context: ContextSnapshot,
    ) -> bool {
        let token = {
            let mut state = self.state.lock().expect("runner lock");
            if state.status == WorkflowStatus::Running {
                warn!("workflow already running, refusing re-entry");
                return false;
            }
            state.reset(graph.nodes.len());
            state.status = WorkflowStatus::Running;
            let token = CancellationToken::new();
            *self.cancel.lock().expect("runner lock") = Some(token.clone());
            token
        };
        self.emit_progress();

        self.inject_summary(session_id, graph, context).await;

        let nodes_by_id: HashMap<&str, &WorkflowNode> =
            graph.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        let order = topological_order(graph);

        for node_id in order {
            if token.is_cancelled() {
                self.finish(WorkflowStatus::Cancelled);
                return false;
            }
            let Some(node) = nodes_by_id.get(node_id.as_str()) else {
                continue;
            };

            {
                let mut state = self.state.lock().expect("runner lock");
                state.current_node_id = Some(node_id.clone());
            }
            self.emit_progress();

            if self.execute_node(session_id, node).await {
                let mut state = self.state.lock().expect("runner lock");
                state.completed_nodes.push(node_id.clone());
            } else {
                {
                    let mut state = self.state.lock().expect("runner lock");
                    state.failed_nodes.push(node_id.clone());
                    state.status = WorkflowStatus::Failed;
                }
                self.emit_progress();
                return false;
            }
            self.emit_progress();

            if token.is_cancelled() {
                self.finish(WorkflowStatus::Cancelled);
                return false;
            }
        }

        {
            let mut state = self.state.lock().expect("runner lock");
            state.status = WorkflowStatus::Completed;
            state.current_node_id = None;
        }
        self.emit_progress();
        true
    }

    fn finish(&self, status: WorkflowStatus) {
        {
            let mut state = self.state.lock().expect("runner lock");
            state.status = status;
        }
        self.emit_progress();
    }

    /// Push the current context and a textual summary of the graph into the
    /// session before execution starts. Neither failure aborts the run.
    async fn inject_summary(
        &self,
        session_id: &str,
        graph: &WorkflowGraph,
        context: ContextSnapshot,
    ) {
        self.injector.inject(session_id, context).await;
        let summary = build_workflow_summary(graph);
        if let Err(err) = self.client.prompt_no_reply(session_id, &summary).await {
            error!("failed to inject workflow summary: {err}");
        }
    }

    async fn execute_node(&self, session_id: &str, node: &WorkflowNode) -> bool {
        debug!(node = %node.id, node_type = ?node.node_type, "executing workflow node");
        let result = match node.node_type {
            WorkflowNodeType::Prompt => {
                self.client.prompt_no_reply(session_id, &node.content).await
            }
            WorkflowNodeType::File => match self.vault.read(&node.content).await {
                Ok(file_content) => {
                    let text =
                        format!("[File: {}]\n```\n{file_content}\n```", node.content);
                    self.client.prompt_no_reply(session_id, &text).await
                }
                Err(_) => {
                    // Absent files are skipped, not failed.
                    debug!(path = %node.content, "file node target missing, skipping");
                    return true;
                }
            },
            WorkflowNodeType::Output => {
                let text = format!("[Output marker] {}", node.content);
                self.client.prompt_no_reply(session_id, &text).await
            }
            WorkflowNodeType::Decision => {
                let text = format!("[Decision point] {}", node.content);
                self.client.prompt_no_reply(session_id, &text).await
            }
        };
        match result {
            Ok(()) => true,
            Err(err) => {
                error!(node = %node.id, "workflow node failed: {err}");
                false
            }
        }
    }

    fn emit_progress(&self) {
        let progress = self.state.lock().expect("runner lock").progress();
        self.subscribers.notify(&progress);
    }
}

fn build_workflow_summary(graph: &WorkflowGraph) -> String {
    let mut lines = vec![
        WORKFLOW_HEADER.to_string(),
        format!("Nodes: {}", graph.nodes.len()),
        format!("Entry points: {}", graph.entry_points.join(", ")),
        String::new(),
        "Tasks:".to_string(),
    ];
    for node in &graph.nodes {
        let deps = if node.dependencies.is_empty() {
            String::new()
        } else {
            format!(" (depends on: {})", node.dependencies.join(", "))
        };
        let ty = match node.node_type {
            WorkflowNodeType::Prompt => "prompt",
            WorkflowNodeType::File => "file",
            WorkflowNodeType::Output => "output",
            WorkflowNodeType::Decision => "decision",
        };
        lines.push(format!("  - [{ty}] {}{deps}", node.id));
    }
    lines.join("\n")
}

/// Depth-first topological order over the compiled graph: dependencies
/// before dependents, deterministic given input order. Already-visited and
/// self-referential nodes are no-ops, so a graph that somehow escaped the
/// compiler's cycle check cannot loop here.
pub fn topological_order(graph: &WorkflowGraph) -> Vec<String> {
    let nodes_by_id: HashMap<&str, &WorkflowNode> =
        graph.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
    let mut order = Vec::with_capacity(graph.nodes.len());
    let mut visited: HashSet<&str> = HashSet::new();
    let mut in_progress: HashSet<&str> = HashSet::new();
    for node in &graph.nodes {
        visit(
            node.id.as_str(),
            &nodes_by_id,
            &mut visited,
            &mut in_progress,
            &mut order,
        );
    }
    order
}

fn visit<'a>(
    node_id: &'a str,
    nodes_by_id: &HashMap<&'a str, &'a WorkflowNode>,
    visited: &mut HashSet<&'a str>,
    in_progress: &mut HashSet<&'a str>,
    order: &mut Vec<String>,
) {
    if visited.contains(node_id) || in_progress.contains(node_id) {
        return;
    }
    in_progress.insert(node_id);
    if let Some(node) = nodes_by_id.get(node_id) {
        for dep in &node.dependencies {
            if let Some((key, _)) = nodes_by_id.get_key_value(dep.as_str()) {
                visit(key, nodes_by_id, visited, in_progress, order);
            }
        }
    }
    in_progress.remove(node_id);
    visited.insert(node_id);
    order.push(node_id.to_string());
}

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use openwork::context::injector::ContextInjector;
use openwork::context::snapshot::ContextSnapshot;
use openwork::server::client::{ApiError, SessionClient, SessionInfo};
use openwork::vault::{FsVault, VaultReader};
use openwork::workflow::compiler::{WorkflowGraph, WorkflowNode, WorkflowNodeType};
use openwork::workflow::runner::{WorkflowRunner, WorkflowStatus};

/// Records every prompt; fails any prompt containing the poison string.
#[derive(Debug, Default)]
struct ScriptedClient {
    poison: Option<String>,
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl SessionClient for ScriptedClient {
    async fn prompt_no_reply(&self, _session_id: &str, text: &str) -> Result<(), ApiError> {
        if let Some(poison) = &self.poison
            && text.contains(poison)
        {
            return Err(ApiError::Status {
                operation: "promptNoReply",
                status: 500,
                body: "injected failure".to_string(),
            });
        }
        self.prompts.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn prompt_no_reply_with_system(
        &self,
        session_id: &str,
        text: &str,
        _system: &str,
    ) -> Result<(), ApiError> {
        self.prompt_no_reply(session_id, text).await
    }

    async fn list_sessions(&self) -> Result<Vec<SessionInfo>, ApiError> {
        Ok(Vec::new())
    }

    async fn health_check(&self) -> bool {
        true
    }
}

fn node(id: &str, node_type: WorkflowNodeType, content: &str, deps: &[&str]) -> WorkflowNode {
    WorkflowNode {
        id: id.to_string(),
        node_type,
        content: content.to_string(),
        dependencies: deps.iter().map(|d| d.to_string()).collect(),
    }
}

fn graph(nodes: Vec<WorkflowNode>) -> WorkflowGraph {
    let entry_points = nodes
        .iter()
        .filter(|n| n.dependencies.is_empty())
        .map(|n| n.id.clone())
        .collect();
    WorkflowGraph {
        version: "openwork.workflow.v1".to_string(),
        nodes,
        entry_points,
    }
}

fn runner_with(client: Arc<ScriptedClient>, vault: Arc<FsVault>) -> WorkflowRunner {
    let injector = ContextInjector::new(client.clone() as Arc<dyn SessionClient>, None);
    WorkflowRunner::new(client, vault, injector)
}

#[tokio::test]
async fn completed_run_sends_nodes_in_dependency_order() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(ScriptedClient::default());
    let runner = runner_with(client.clone(), Arc::new(FsVault::new(dir.path())));

    let g = graph(vec![
        node("b", WorkflowNodeType::Prompt, "second step", &["a"]),
        node("a", WorkflowNodeType::Prompt, "first step", &[]),
    ]);

    assert!(runner.run("s1", &g, ContextSnapshot::empty()).await);
    assert_eq!(runner.status(), WorkflowStatus::Completed);

    let prompts = client.prompts.lock().unwrap();
    // Context injection, workflow summary, then nodes dependency-first.
    assert!(prompts[1].starts_with("[WORKFLOW v1]"));
    let first = prompts.iter().position(|p| p == "first step").unwrap();
    let second = prompts.iter().position(|p| p == "second step").unwrap();
    assert!(first < second);
}

#[tokio::test]
async fn failing_node_stops_the_run_before_dependents() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(ScriptedClient {
        poison: Some("first step".to_string()),
        ..Default::default()
    });
    let runner = runner_with(client.clone(), Arc::new(FsVault::new(dir.path())));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = runner.on_progress(move |p| sink.lock().unwrap().push(p.clone()));

    let g = graph(vec![
        node("a", WorkflowNodeType::Prompt, "first step", &[]),
        node("b", WorkflowNodeType::Prompt, "second step", &["a"]),
    ]);

    assert!(!runner.run("s1", &g, ContextSnapshot::empty()).await);
    assert_eq!(runner.status(), WorkflowStatus::Failed);

    let progress_log = seen.lock().unwrap();
    let last = progress_log.last().unwrap();
    assert_eq!(last.status, WorkflowStatus::Failed);
    assert!(last.completed_nodes.is_empty());
    assert_eq!(last.failed_nodes, vec!["a"]);

    // b never reached the client.
    let prompts = client.prompts.lock().unwrap();
    assert!(!prompts.iter().any(|p| p == "second step"));
}

#[tokio::test]
async fn file_nodes_send_fenced_content_and_skip_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    let vault = Arc::new(FsVault::new(dir.path()));
    vault.create_note("notes/ref.md", "file body").await.unwrap();

    let client = Arc::new(ScriptedClient::default());
    let runner = runner_with(client.clone(), vault);

    let g = graph(vec![
        node("present", WorkflowNodeType::File, "notes/ref.md", &[]),
        node("absent", WorkflowNodeType::File, "notes/gone.md", &["present"]),
        node("out", WorkflowNodeType::Output, "done", &["absent"]),
    ]);

    assert!(runner.run("s1", &g, ContextSnapshot::empty()).await);
    assert_eq!(runner.status(), WorkflowStatus::Completed);

    let prompts = client.prompts.lock().unwrap();
    assert!(
        prompts
            .iter()
            .any(|p| p.starts_with("[File: notes/ref.md]") && p.contains("file body"))
    );
    assert!(!prompts.iter().any(|p| p.contains("gone.md")));
    assert!(prompts.iter().any(|p| p == "[Output marker] done"));
}

#[tokio::test]
async fn cancel_between_nodes_halts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(ScriptedClient::default());
    let runner = Arc::new(runner_with(client.clone(), Arc::new(FsVault::new(dir.path()))));

    // Cancel as soon as the first node completes.
    let canceller = Arc::clone(&runner);
    let _sub = runner.on_progress(move |p| {
        if p.completed_nodes.len() == 1 {
            canceller.cancel();
        }
    });

    let g = graph(vec![
        node("a", WorkflowNodeType::Prompt, "first step", &[]),
        node("b", WorkflowNodeType::Prompt, "second step", &["a"]),
    ]);

    assert!(!runner.run("s1", &g, ContextSnapshot::empty()).await);
    assert_eq!(runner.status(), WorkflowStatus::Cancelled);

    let prompts = client.prompts.lock().unwrap();
    assert!(prompts.iter().any(|p| p == "first step"));
    assert!(!prompts.iter().any(|p| p == "second step"));
}

#[tokio::test]
async fn decision_nodes_send_tagged_markers() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(ScriptedClient::default());
    let runner = runner_with(client.clone(), Arc::new(FsVault::new(dir.path())));

    let g = graph(vec![node(
        "d",
        WorkflowNodeType::Decision,
        "ready to ship?",
        &[],
    )]);

    assert!(runner.run("s1", &g, ContextSnapshot::empty()).await);
    let prompts = client.prompts.lock().unwrap();
    assert!(prompts.iter().any(|p| p == "[Decision point] ready to ship?"));
}

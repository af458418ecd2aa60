use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{debug, error};

use crate::context::snapshot::ContextSnapshot;
use crate::server::client::SessionClient;

pub const DEFAULT_RATE_LIMIT: Duration = Duration::from_millis(2000);

/// Pushes context snapshots into a server session, rate-limited to one
/// injection per window. Calls inside the window coalesce into a single
/// rescheduled injection carrying the latest snapshot (last write wins);
/// nothing is ever queued.
#[derive(Debug)]
pub struct ContextInjector {
    client: Arc<dyn SessionClient>,
    rate_limit: Duration,
    last_injection: Mutex<Option<Instant>>,
    pending: Mutex<Option<(String, ContextSnapshot)>>,
    pending_task: Mutex<Option<JoinHandle<()>>>,
}

impl ContextInjector {
    pub fn new(client: Arc<dyn SessionClient>, rate_limit: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            client,
            rate_limit: rate_limit.unwrap_or(DEFAULT_RATE_LIMIT),
            last_injection: Mutex::new(None),
            pending: Mutex::new(None),
            pending_task: Mutex::new(None),
        })
    }

    /// Inject `snapshot` into `session_id`, or schedule it for the end of
    /// the current rate-limit window. Returns whether a network injection
    /// happened now; failures are logged and reported as `false`, never
    /// raised.
    pub async fn inject(self: &Arc<Self>, session_id: &str, snapshot: ContextSnapshot) -> bool {
        let remaining = {
            let last = self.last_injection.lock().expect("injector lock");
            last.map(|at| self.rate_limit.saturating_sub(at.elapsed()))
        };
        if let Some(remaining) = remaining
            && !remaining.is_zero()
        {
            self.schedule_pending(session_id, snapshot, remaining);
            return false;
        }
        self.do_inject(session_id, &snapshot).await
    }

    /// Drop any scheduled injection.
    pub fn cancel_pending(&self) {
        if let Some(task) = self.pending_task.lock().expect("injector lock").take() {
            task.abort();
        }
        *self.pending.lock().expect("injector lock") = None;
    }

    fn schedule_pending(
        self: &Arc<Self>,
        session_id: &str,
        snapshot: ContextSnapshot,
        delay: Duration,
    ) {
        self.cancel_pending();
        *self.pending.lock().expect("injector lock") =
            Some((session_id.to_string(), snapshot));

        let injector = Arc::clone(self);
        *self.pending_task.lock().expect("injector lock") = Some(tokio::spawn(async move {
            sleep(delay).await;
            let taken = injector.pending.lock().expect("injector lock").take();
            if let Some((session_id, snapshot)) = taken {
                injector.do_inject(&session_id, &snapshot).await;
            }
        }));
    }

    async fn do_inject(&self, session_id: &str, snapshot: &ContextSnapshot) -> bool {
        let text = snapshot.format_context();
        match self.client.prompt_no_reply(session_id, &text).await {
            Ok(()) => {
                *self.last_injection.lock().expect("injector lock") = Some(Instant::now());
                debug!(%session_id, "context injected");
                true
            }
            Err(err) => {
                error!(%session_id, "context injection failed: {err}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::client::{ApiError, SessionInfo};
    use async_trait::async_trait;

    #[derive(Debug, Default)]
    struct RecordingClient {
        prompts: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl SessionClient for RecordingClient {
        async fn prompt_no_reply(&self, session_id: &str, text: &str) -> Result<(), ApiError> {
            if self.fail {
                return Err(ApiError::Status {
                    operation: "promptNoReply",
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            self.prompts
                .lock()
                .unwrap()
                .push((session_id.to_string(), text.to_string()));
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
            !self.fail
        }
    }

    fn snapshot_with_file(name: &str) -> ContextSnapshot {
        ContextSnapshot {
            active_file: Some(name.to_string()),
            ..ContextSnapshot::empty()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_injection_goes_straight_through() {
        let client = Arc::new(RecordingClient::default());
        let injector = ContextInjector::new(client.clone(), None);
        assert!(injector.inject("s1", snapshot_with_file("a.md")).await);
        assert_eq!(client.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn calls_inside_window_coalesce_to_latest_payload() {
        let client = Arc::new(RecordingClient::default());
        let injector = ContextInjector::new(client.clone(), None);

        // Prime the window.
        assert!(injector.inject("s1", snapshot_with_file("first.md")).await);

        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(!injector.inject("s1", snapshot_with_file("second.md")).await);
        // Let the spawned pending task register its sleep before advancing,
        // otherwise its deadline lands beyond the final advance.
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(!injector.inject("s1", snapshot_with_file("third.md")).await);
        tokio::task::yield_now().await;

        tokio::time::advance(Duration::from_millis(2_500)).await;
        tokio::task::yield_now().await;

        let prompts = client.prompts.lock().unwrap();
        // One primed call plus exactly one coalesced call with the latest file.
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].1.contains("third.md"));
        assert!(!prompts.iter().any(|(_, text)| text.contains("second.md")));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_pending_drops_the_scheduled_injection() {
        let client = Arc::new(RecordingClient::default());
        let injector = ContextInjector::new(client.clone(), None);

        assert!(injector.inject("s1", snapshot_with_file("a.md")).await);
        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(!injector.inject("s1", snapshot_with_file("b.md")).await);
        injector.cancel_pending();

        tokio::time::advance(Duration::from_millis(3_000)).await;
        tokio::task::yield_now().await;
        assert_eq!(client.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_absorbed_as_false() {
        let client = Arc::new(RecordingClient {
            fail: true,
            ..Default::default()
        });
        let injector = ContextInjector::new(client, None);
        assert!(!injector.inject("s1", snapshot_with_file("a.md")).await);
    }
}

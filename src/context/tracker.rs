use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::context::snapshot::ContextSnapshot;
use crate::observer::{Registry, Subscription};
use crate::workspace::{WorkspaceEvent, WorkspaceObserver};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Observes host-side editing events, debounces them, and emits a fresh
/// [`ContextSnapshot`] to subscribers whenever it actually changed.
#[derive(Debug)]
pub struct ContextTracker {
    observer: Arc<dyn WorkspaceObserver>,
    debounce: Duration,
    last_snapshot: Mutex<ContextSnapshot>,
    subscribers: Registry<ContextSnapshot>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl ContextTracker {
    pub fn new(observer: Arc<dyn WorkspaceObserver>, debounce: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            observer,
            debounce: debounce.unwrap_or(DEFAULT_DEBOUNCE),
            last_snapshot: Mutex::new(ContextSnapshot::empty()),
            subscribers: Registry::new(),
            pending: Mutex::new(None),
        })
    }

    /// Capture the current context and emit it unconditionally. Called once
    /// when tracking begins so subscribers start from a real snapshot.
    pub fn start(&self) {
        let snapshot = ContextSnapshot::capture(self.observer.as_ref());
        *self.last_snapshot.lock().expect("tracker lock") = snapshot.clone();
        self.subscribers.notify(&snapshot);
    }

    /// Cancel any pending debounced emission.
    pub fn stop(&self) {
        if let Some(pending) = self.pending.lock().expect("tracker lock").take() {
            pending.abort();
        }
    }

    pub fn on_context_change(
        &self,
        handler: impl Fn(&ContextSnapshot) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribers.subscribe(handler)
    }

    /// Current context, captured on demand.
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot::capture(self.observer.as_ref())
    }

    /// Report a host-side editing event. Events within the debounce window
    /// collapse into a single recapture; the snapshot is only emitted when it
    /// differs field-wise from the last one.
    pub fn notify_event(self: &Arc<Self>, _event: WorkspaceEvent) {
        let tracker = Arc::clone(self);
        let mut pending = self.pending.lock().expect("tracker lock");
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        *pending = Some(tokio::spawn(async move {
            sleep(tracker.debounce).await;
            tracker.emit_if_changed();
        }));
    }

    fn emit_if_changed(&self) {
        let snapshot = ContextSnapshot::capture(self.observer.as_ref());
        {
            let mut last = self.last_snapshot.lock().expect("tracker lock");
            if *last == snapshot {
                return;
            }
            *last = snapshot.clone();
        }
        self.subscribers.notify(&snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::CursorPosition;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct FakeWorkspace {
        state: Mutex<(Option<String>, Vec<String>)>,
    }

    impl FakeWorkspace {
        fn set_active(&self, file: &str) {
            self.state.lock().unwrap().0 = Some(file.to_string());
        }
    }

    impl WorkspaceObserver for FakeWorkspace {
        fn active_file(&self) -> Option<String> {
            self.state.lock().unwrap().0.clone()
        }
        fn selection(&self) -> Option<String> {
            None
        }
        fn cursor_position(&self) -> Option<CursorPosition> {
            None
        }
        fn open_tabs(&self) -> Vec<String> {
            self.state.lock().unwrap().1.clone()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_events_collapse_into_one_emission() {
        let workspace = Arc::new(FakeWorkspace::default());
        let tracker = ContextTracker::new(workspace.clone(), None);
        let emissions = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&emissions);
        let _sub = tracker.on_context_change(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        workspace.set_active("a.md");
        tracker.notify_event(WorkspaceEvent::FileOpen);
        // Let the spawned debounce task register its sleep before advancing,
        // otherwise its deadline lands beyond the final advance.
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(100)).await;
        tracker.notify_event(WorkspaceEvent::EditorChange);
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(400)).await;
        tokio::task::yield_now().await;

        assert_eq!(emissions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_snapshot_is_not_reemitted() {
        let workspace = Arc::new(FakeWorkspace::default());
        let tracker = ContextTracker::new(workspace.clone(), None);
        let emissions = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&emissions);
        let _sub = tracker.on_context_change(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        workspace.set_active("a.md");
        tracker.notify_event(WorkspaceEvent::FileOpen);
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(400)).await;
        tokio::task::yield_now().await;
        assert_eq!(emissions.load(Ordering::SeqCst), 1);

        // Same context again: debounce fires but nothing is emitted.
        tracker.notify_event(WorkspaceEvent::LayoutChange);
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(400)).await;
        tokio::task::yield_now().await;
        assert_eq!(emissions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_pending_emission() {
        let workspace = Arc::new(FakeWorkspace::default());
        let tracker = ContextTracker::new(workspace.clone(), None);
        let emissions = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&emissions);
        let _sub = tracker.on_context_change(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        workspace.set_active("a.md");
        tracker.notify_event(WorkspaceEvent::FileOpen);
        tracker.stop();
        tokio::time::advance(Duration::from_millis(400)).await;
        tokio::task::yield_now().await;
        assert_eq!(emissions.load(Ordering::SeqCst), 0);
    }
}

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::observer::{Registry, Subscription};
use crate::server::client::probe_health;
use crate::server::port::{DEFAULT_MAX_ATTEMPTS, find_free_port};
use crate::settings::{DEFAULT_CORS_ORIGINS, ServerConfig};

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const STOP_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
    Error,
}

/// Owns the external server process: spawn, health poll, graceful stop.
///
/// Exactly one instance owns the process handle and the [`ServerState`];
/// every transition goes through the internal state-setter, which notifies
/// subscribers synchronously.
#[derive(Debug)]
pub struct ServerSupervisor {
    config: Mutex<ServerConfig>,
    state: Mutex<ServerState>,
    last_error: Mutex<Option<String>>,
    actual_port: Mutex<Option<u16>>,
    child: Mutex<Option<Child>>,
    early_exit_code: Mutex<Option<i32>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
    subscribers: Registry<ServerState>,
    http: reqwest::Client,
}

impl ServerSupervisor {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        Arc::new(Self {
            config: Mutex::new(config),
            state: Mutex::new(ServerState::Stopped),
            last_error: Mutex::new(None),
            actual_port: Mutex::new(None),
            child: Mutex::new(None),
            early_exit_code: Mutex::new(None),
            monitor: Mutex::new(None),
            subscribers: Registry::new(),
            http: reqwest::Client::new(),
        })
    }

    /// Replace the configuration used by the next start attempt. Has no
    /// effect on an attempt already in flight.
    pub fn update_config(&self, config: ServerConfig) {
        *self.config.lock().expect("config lock") = config;
    }

    pub fn state(&self) -> ServerState {
        *self.state.lock().expect("state lock")
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().expect("last_error lock").clone()
    }

    pub fn port(&self) -> Option<u16> {
        *self.actual_port.lock().expect("port lock")
    }

    /// Base URL of the running server, with the project directory encoded
    /// into the path so the served UI can recover its root from the URL
    /// alone. `None` when no port is resolved.
    pub fn url(&self) -> Option<String> {
        let port = self.port()?;
        let config = self.config.lock().expect("config lock");
        let project = config.project_directory.as_ref()?;
        Some(build_server_url(&config.hostname, port, project))
    }

    pub fn on_state_change(
        &self,
        handler: impl Fn(&ServerState) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribers.subscribe(handler)
    }

    /// Start the server. Idempotent: returns `true` immediately while
    /// already starting or running. On failure the supervisor lands in
    /// [`ServerState::Error`] with a message from [`Self::last_error`].
    pub async fn start(self: &Arc<Self>) -> bool {
        // Check-and-transition under a single lock acquisition: on the
        // multi-threaded runtime two concurrent callers must not both pass
        // the guard.
        {
            let mut state = self.state.lock().expect("state lock");
            if matches!(*state, ServerState::Starting | ServerState::Running) {
                return true;
            }
            *state = ServerState::Starting;
        }
        self.subscribers.notify(&ServerState::Starting);
        *self.last_error.lock().expect("last_error lock") = None;
        *self.early_exit_code.lock().expect("early_exit lock") = None;

        let config = self.config.lock().expect("config lock").clone();
        let Some(project_dir) = config.project_directory.clone() else {
            return self.fail("Project directory not configured".to_string());
        };

        // A healthy server already answering on the preferred port is an
        // external or pre-existing instance; absorb it instead of spawning a
        // second one. It holds that port, so this probe has to happen before
        // the free-port search would step past it.
        let preferred_url = build_server_url(&config.hostname, config.port, &project_dir);
        if probe_health(&self.http, &preferred_url).await {
            info!(
                port = config.port,
                "server already running, absorbing existing instance"
            );
            *self.actual_port.lock().expect("port lock") = Some(config.port);
            self.set_state(ServerState::Running);
            return true;
        }

        let port = match find_free_port(config.port, DEFAULT_MAX_ATTEMPTS).await {
            Ok(port) => port,
            Err(err) => return self.fail(format!("Failed to find free port: {err}")),
        };
        *self.actual_port.lock().expect("port lock") = Some(port);

        let base_url = build_server_url(&config.hostname, port, &project_dir);

        info!(
            exe = %config.opencode_path,
            port,
            hostname = %config.hostname,
            project = %project_dir.display(),
            "starting server"
        );

        let mut child = match spawn_server(&config, port, &project_dir) {
            Ok(child) => child,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return self.fail(format!(
                    "Executable not found at '{}'",
                    config.opencode_path
                ));
            }
            Err(err) => return self.fail(format!("Failed to start: {err}")),
        };
        debug!(pid = ?child.id(), "server process spawned");

        forward_output(&mut child);
        *self.child.lock().expect("child lock") = Some(child);

        let timeout = Duration::from_millis(config.startup_timeout_ms);
        if self.wait_for_ready_or_exit(&base_url, timeout).await {
            self.set_state(ServerState::Running);
            self.spawn_exit_monitor();
            return true;
        }

        let early_exit = *self.early_exit_code.lock().expect("early_exit lock");
        let exited = self.child.lock().expect("child lock").is_none();
        self.stop();
        match early_exit {
            Some(code) => self.fail(format!("Process exited unexpectedly (exit code {code})")),
            None if exited => self.fail("Process exited before server became ready".to_string()),
            None => self.fail("Server failed to start within timeout".to_string()),
        }
    }

    /// Stop the server. Idempotent and fire-and-forget: the state flips to
    /// stopped and the port is cleared immediately; actual process teardown
    /// (TERM, then KILL after a grace period) happens in the background.
    pub fn stop(&self) {
        if let Some(monitor) = self.monitor.lock().expect("monitor lock").take() {
            monitor.abort();
        }

        let child = self.child.lock().expect("child lock").take();
        *self.actual_port.lock().expect("port lock") = None;
        self.set_state(ServerState::Stopped);

        let Some(mut child) = child else {
            return;
        };
        info!(pid = ?child.id(), "stopping server process");
        tokio::spawn(async move {
            terminate_gracefully(&mut child);
            if tokio::time::timeout(STOP_GRACE, child.wait()).await.is_err() {
                warn!("server process still running after grace period, killing");
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
        });
    }

    /// Health check against the running server; never errors.
    pub async fn check_health(&self) -> bool {
        match self.url() {
            Some(url) => probe_health(&self.http, &url).await,
            None => false,
        }
    }

    fn set_state(&self, state: ServerState) {
        *self.state.lock().expect("state lock") = state;
        self.subscribers.notify(&state);
    }

    fn fail(&self, message: String) -> bool {
        error!("{message}");
        *self.last_error.lock().expect("last_error lock") = Some(message);
        self.set_state(ServerState::Error);
        false
    }

    /// Poll the health endpoint every 500 ms until it answers, the watched
    /// process exits, or the timeout elapses. Checks are strictly
    /// sequential; the loop fails fast the moment an exit is observed.
    async fn wait_for_ready_or_exit(&self, base_url: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            match self.observe_exit() {
                ExitObservation::Exited => {
                    debug!("process exited before server became ready");
                    return false;
                }
                ExitObservation::Gone => return false,
                ExitObservation::Alive => {}
            }
            if probe_health(&self.http, base_url).await {
                return true;
            }
            sleep(POLL_INTERVAL).await;
        }
        false
    }

    fn observe_exit(&self) -> ExitObservation {
        let mut guard = self.child.lock().expect("child lock");
        let Some(child) = guard.as_mut() else {
            return ExitObservation::Gone;
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                if let Some(code) = status.code()
                    && code != 0
                {
                    *self.early_exit_code.lock().expect("early_exit lock") = Some(code);
                }
                *guard = None;
                ExitObservation::Exited
            }
            Ok(None) => ExitObservation::Alive,
            Err(err) => {
                warn!("failed to poll server process: {err}");
                ExitObservation::Alive
            }
        }
    }

    /// Watch for the process dying out from under a running server and fold
    /// that into the state machine as a stop.
    fn spawn_exit_monitor(self: &Arc<Self>) {
        let supervisor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                sleep(POLL_INTERVAL).await;
                if supervisor.state() != ServerState::Running {
                    break;
                }
                match supervisor.observe_exit() {
                    ExitObservation::Alive => {}
                    ExitObservation::Exited => {
                        warn!("server process exited unexpectedly");
                        *supervisor.actual_port.lock().expect("port lock") = None;
                        supervisor.set_state(ServerState::Stopped);
                        break;
                    }
                    ExitObservation::Gone => break,
                }
            }
        });
        if let Some(previous) = self
            .monitor
            .lock()
            .expect("monitor lock")
            .replace(handle)
        {
            previous.abort();
        }
    }
}

enum ExitObservation {
    Alive,
    Exited,
    Gone,
}

/// `http://{hostname}:{port}/{base64(project_dir)}`
pub fn build_server_url(hostname: &str, port: u16, project_dir: &Path) -> String {
    format!(
        "http://{hostname}:{port}/{}",
        encode_project_path(project_dir)
    )
}

pub fn encode_project_path(project_dir: &Path) -> String {
    BASE64.encode(project_dir.to_string_lossy().as_bytes())
}

/// Inverse of the path-embedding in [`build_server_url`].
pub fn decode_project_path(url: &str) -> Option<PathBuf> {
    let parsed = Url::parse(url).ok()?;
    // '/' is part of the standard base64 alphabet, so the encoded directory
    // is the entire path, not its last segment.
    let encoded = parsed.path().trim_start_matches('/');
    let bytes = BASE64.decode(encoded).ok()?;
    Some(PathBuf::from(String::from_utf8(bytes).ok()?))
}

/// Arguments for the `serve` invocation. At least one `--cors` flag is
/// always emitted: an empty origin list falls back to the default origins,
/// since a server without CORS would reject the embedding host outright.
fn server_args(config: &ServerConfig, port: u16) -> Vec<String> {
    let mut args = vec![
        "serve".to_string(),
        "--port".to_string(),
        port.to_string(),
        "--hostname".to_string(),
        config.hostname.clone(),
    ];
    let origins: Vec<String> = if config.cors_origins.is_empty() {
        DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect()
    } else {
        config.cors_origins.clone()
    };
    for origin in origins {
        args.push("--cors".to_string());
        args.push(origin);
    }
    args
}

fn spawn_server(
    config: &ServerConfig,
    port: u16,
    project_dir: &Path,
) -> std::io::Result<Child> {
    let mut command = Command::new(&config.opencode_path);
    command.args(server_args(config, port));

    // Isolate the spawned server from the user's own opencode configuration.
    let plugin_config_dir = crate::util::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("opencode-plugin");
    if let Err(err) = std::fs::create_dir_all(&plugin_config_dir) {
        warn!(
            "could not create isolated config dir {}: {err}",
            plugin_config_dir.display()
        );
    }
    command.env("OPENCODE_CONFIG_DIR", &plugin_config_dir);

    if let Some(auth) = &config.basic_auth {
        command.env("OPENCODE_BASIC_AUTH_USER", &auth.username);
        command.env("OPENCODE_BASIC_AUTH_PASS", &auth.password);
        command.env("OPENCODE_SERVER_PASSWORD", &auth.password);
    }

    command
        .current_dir(project_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    command.spawn()
}

/// Drain the child's stdout/stderr into the log so startup diagnostics are
/// not lost when the pipe buffers fill.
fn forward_output(child: &mut Child) {
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "openwork::server::process", "{line}");
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(target: "openwork::server::process", "{line}");
            }
        });
    }
}

#[cfg(unix)]
fn terminate_gracefully(child: &mut Child) {
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    } else {
        let _ = child.start_kill();
    }
}

#[cfg(not(unix))]
fn terminate_gracefully(child: &mut Child) {
    let _ = child.start_kill();
}

//! Drives the external steamcmd binary.
//!
//! Each invocation runs in its own process group under a hard timeout;
//! output is consumed line-buffered and folded through the marker table
//! in [`super::markers`]. The adapter owns the saved-session lifecycle
//! and emits one-way [`FetchEvent`]s while a fetch runs; it knows
//! nothing about jobs.

use super::events::{FetchEvent, FetchOutcome};
use super::markers::{self, ObservedMarkers, SecondFactorKind};
use super::session::{SessionLifecycle, SessionState};
use crate::workspace::canonical_content_dir;
use async_trait::async_trait;
use chrono::Utc;
use modvault_model::{AppId, FailureKind, WorkshopItemId};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Steam account credentials for non-anonymous downloads.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
    /// One-shot second-factor code for session bootstrap.
    pub guard_code: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub steamcmd_path: PathBuf,
    /// Hard bound on one content fetch.
    pub fetch_timeout: Duration,
    /// Hard bound on a login-and-quit session probe.
    pub verify_timeout: Duration,
    /// Delay between SIGTERM and SIGKILL when terminating the tool.
    pub kill_grace: Duration,
    /// How long a verified session is reused without re-probing.
    pub session_cache: Duration,
    /// Overrides `HOME` for the child so the credential store lands in
    /// a stable location.
    pub steam_home: Option<PathBuf>,
    pub credentials: Option<Credentials>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            steamcmd_path: PathBuf::from("steamcmd"),
            fetch_timeout: Duration::from_secs(2 * 60 * 60),
            verify_timeout: Duration::from_secs(30),
            kill_grace: Duration::from_secs(5),
            session_cache: Duration::from_secs(30 * 60),
            steam_home: None,
            credentials: None,
        }
    }
}

/// Why a session could not be made ready for a credentialed fetch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionFailure {
    #[error("second factor required")]
    SecondFactorRequired(SecondFactorKind),
    #[error("saved session expired and credentials were rejected")]
    Expired,
    #[error("steam client unavailable: {0}")]
    Client(String),
}

impl SessionFailure {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            SessionFailure::SecondFactorRequired(_) | SessionFailure::Expired => {
                FailureKind::SecondFactorRequired
            }
            SessionFailure::Client(_) => FailureKind::Internal,
        }
    }
}

/// Seam between the orchestrator and the external tool.
#[async_trait]
pub trait WorkshopFetcher: Send + Sync {
    /// Makes the session usable for the next fetch, or reports why it
    /// cannot be. A no-op in anonymous mode.
    async fn prepare_session(&self) -> Result<(), SessionFailure>;

    /// Runs one download attempt into `workspace`, streaming events to
    /// `events` while it runs.
    async fn fetch(
        &self,
        workspace: &Path,
        app_id: AppId,
        item_id: WorkshopItemId,
        events: mpsc::Sender<FetchEvent>,
        cancel: CancellationToken,
    ) -> FetchOutcome;
}

/// The production fetcher: wraps the steamcmd binary.
pub struct SteamCmdAdapter {
    config: AdapterConfig,
    session: Mutex<SessionLifecycle>,
}

impl std::fmt::Debug for SteamCmdAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SteamCmdAdapter")
            .field("steamcmd_path", &self.config.steamcmd_path)
            .finish_non_exhaustive()
    }
}

enum LoginArgs<'a> {
    Anonymous,
    /// Username only; the tool reuses its saved credential store.
    Cached(&'a str),
    Full {
        username: &'a str,
        password: &'a str,
        guard_code: Option<&'a str>,
    },
}

/// Result of one login probe.
#[derive(Debug, PartialEq, Eq)]
enum LoginProbe {
    Ok,
    SecondFactor(SecondFactorKind),
    Rejected,
    Inconclusive,
}

struct RunResult {
    observed: ObservedMarkers,
    exit_code: Option<i32>,
    timed_out: bool,
    cancelled: bool,
}

impl SteamCmdAdapter {
    pub fn new(config: AdapterConfig) -> Self {
        let session = SessionLifecycle::new(config.session_cache);
        Self {
            config,
            session: Mutex::new(session),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.config.credentials.is_none()
    }

    pub async fn session_state(&self) -> SessionState {
        self.session.lock().await.state()
    }

    /// One-shot session bootstrap with a fresh second-factor code.
    pub async fn authenticate(&self, guard_code: Option<&str>) -> Result<(), SessionFailure> {
        let creds = self
            .config
            .credentials
            .as_ref()
            .ok_or_else(|| SessionFailure::Client("no credentials configured".into()))?;
        let password = creds
            .password
            .as_deref()
            .ok_or_else(|| SessionFailure::Client("no password configured".into()))?;
        let code = guard_code.or(creds.guard_code.as_deref());

        let probe = self
            .probe_login(LoginArgs::Full {
                username: &creds.username,
                password,
                guard_code: code,
            })
            .await?;

        let mut session = self.session.lock().await;
        match probe {
            LoginProbe::Ok => {
                session.mark_verified(Utc::now());
                info!("steam session bootstrapped");
                Ok(())
            }
            LoginProbe::SecondFactor(kind) => {
                session.invalidate();
                Err(SessionFailure::SecondFactorRequired(kind))
            }
            LoginProbe::Rejected | LoginProbe::Inconclusive => {
                session.invalidate();
                Err(SessionFailure::Expired)
            }
        }
    }

    /// Login-and-quit probe against the saved credential store.
    pub async fn verify_session(&self) -> Result<bool, SessionFailure> {
        let Some(creds) = self.config.credentials.as_ref() else {
            return Ok(true);
        };
        let probe = self.probe_login(LoginArgs::Cached(&creds.username)).await?;
        let mut session = self.session.lock().await;
        match probe {
            LoginProbe::Ok => {
                session.mark_verified(Utc::now());
                Ok(true)
            }
            _ => {
                session.invalidate();
                Ok(false)
            }
        }
    }

    async fn probe_login(&self, login: LoginArgs<'_>) -> Result<LoginProbe, SessionFailure> {
        let args = invocation_args(None, &login, None);
        let mut cmd = self.command(&args, None);
        let run = self
            .drive(&mut cmd, self.config.verify_timeout, None, CancellationToken::new())
            .await
            .map_err(|err| SessionFailure::Client(err.to_string()))?;

        if run.timed_out {
            return Ok(LoginProbe::Inconclusive);
        }
        Ok(match run.observed.resolve() {
            Some(markers::Marker::SecondFactor(kind)) => LoginProbe::SecondFactor(kind),
            Some(markers::Marker::SessionExpired) => LoginProbe::Rejected,
            Some(markers::Marker::LoginSuccess) if run.observed.login_succeeded() => LoginProbe::Ok,
            _ => LoginProbe::Inconclusive,
        })
    }

    fn command(&self, args: &[String], workspace: Option<&Path>) -> Command {
        let mut cmd = Command::new(&self.config.steamcmd_path);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ws) = workspace {
            cmd.current_dir(ws);
        }
        if let Some(home) = &self.config.steam_home {
            cmd.env("HOME", home);
        }
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }

    /// Runs the tool to completion, folding output through the marker
    /// table and forwarding events. Terminates the process group on
    /// deadline, cancellation, or an interactive second-factor prompt
    /// (the tool would otherwise block on stdin forever).
    async fn drive(
        &self,
        cmd: &mut Command,
        timeout: Duration,
        events: Option<&mpsc::Sender<FetchEvent>>,
        cancel: CancellationToken,
    ) -> std::io::Result<RunResult> {
        let mut child = cmd.spawn()?;
        let (line_tx, mut line_rx) = mpsc::channel::<String>(256);
        if let Some(stdout) = child.stdout.take() {
            spawn_line_reader(stdout, line_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_reader(stderr, line_tx);
        }

        let mut observed = ObservedMarkers::default();
        let mut timed_out = false;
        let mut cancelled = false;
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    warn!("steamcmd exceeded its deadline, terminating");
                    kill_group(&mut child, self.config.kill_grace).await;
                    timed_out = true;
                    break;
                }
                _ = cancel.cancelled() => {
                    kill_group(&mut child, self.config.kill_grace).await;
                    cancelled = true;
                    break;
                }
                line = line_rx.recv() => match line {
                    Some(line) => {
                        debug!(target: "steamcmd", "{line}");
                        if let Some(events) = events {
                            let _ = events.send(FetchEvent::OutputLine(line.clone())).await;
                            if markers::is_download_hint(&line) {
                                let _ = events.send(FetchEvent::ProgressTick).await;
                            }
                        }
                        if let Some(marker) = observed.observe(&line) {
                            if marker.is_second_factor() {
                                kill_group(&mut child, self.config.kill_grace).await;
                                break;
                            }
                        }
                    }
                    // Both output streams reached EOF.
                    None => break,
                },
            }
        }

        let exit_code = match tokio::time::timeout(self.config.kill_grace.max(Duration::from_secs(5)), child.wait()).await {
            Ok(Ok(status)) => status.code(),
            _ => {
                kill_group(&mut child, self.config.kill_grace).await;
                None
            }
        };

        Ok(RunResult {
            observed,
            exit_code,
            timed_out,
            cancelled,
        })
    }
}

#[async_trait]
impl WorkshopFetcher for SteamCmdAdapter {
    async fn prepare_session(&self) -> Result<(), SessionFailure> {
        let Some(creds) = self.config.credentials.as_ref() else {
            return Ok(());
        };

        {
            let session = self.session.lock().await;
            if session.is_cached(Utc::now()) {
                return Ok(());
            }
        }

        // Probe the saved credential store first; it survives restarts.
        if self.verify_session().await? {
            return Ok(());
        }

        let Some(password) = creds.password.as_deref() else {
            return Err(SessionFailure::Expired);
        };
        let probe = self
            .probe_login(LoginArgs::Full {
                username: &creds.username,
                password,
                guard_code: creds.guard_code.as_deref(),
            })
            .await?;

        let mut session = self.session.lock().await;
        match probe {
            LoginProbe::Ok => {
                session.mark_verified(Utc::now());
                Ok(())
            }
            LoginProbe::SecondFactor(kind) => {
                session.invalidate();
                Err(SessionFailure::SecondFactorRequired(kind))
            }
            LoginProbe::Rejected | LoginProbe::Inconclusive => {
                session.invalidate();
                Err(SessionFailure::Expired)
            }
        }
    }

    async fn fetch(
        &self,
        workspace: &Path,
        app_id: AppId,
        item_id: WorkshopItemId,
        events: mpsc::Sender<FetchEvent>,
        cancel: CancellationToken,
    ) -> FetchOutcome {
        let login_owned;
        let login = match &self.config.credentials {
            // The session was prepared before the attempt; invoke
            // without a password and let the credential store carry it.
            Some(creds) => {
                login_owned = creds.username.clone();
                LoginArgs::Cached(&login_owned)
            }
            None => LoginArgs::Anonymous,
        };

        let args = invocation_args(Some(workspace), &login, Some((app_id, item_id)));
        let mut cmd = self.command(&args, Some(workspace));
        let run = match self
            .drive(&mut cmd, self.config.fetch_timeout, Some(&events), cancel)
            .await
        {
            Ok(run) => run,
            Err(err) => {
                return FetchOutcome::TransientFailure(format!("failed to run steamcmd: {err}"));
            }
        };

        if run.cancelled {
            return FetchOutcome::TransientFailure("fetch cancelled".into());
        }
        if run.timed_out {
            return FetchOutcome::Timeout;
        }

        match run.observed.resolve() {
            Some(markers::Marker::SecondFactor(kind)) => {
                self.session.lock().await.invalidate();
                FetchOutcome::NeedsSecondFactor(kind)
            }
            Some(markers::Marker::SessionExpired) => {
                self.session.lock().await.invalidate();
                FetchOutcome::SessionExpired
            }
            Some(markers::Marker::AccessDenied) => FetchOutcome::AccessDenied,
            Some(markers::Marker::NotFound) => FetchOutcome::NotFound,
            Some(markers::Marker::Transient) => FetchOutcome::TransientFailure(
                run.observed
                    .transient_detail()
                    .unwrap_or("tool reported a failure")
                    .to_string(),
            ),
            // Textual success is necessary but not sufficient: the
            // content directory decides.
            Some(markers::Marker::LoginSuccess) | None => {
                let expected = canonical_content_dir(workspace, app_id, item_id);
                if dir_is_non_empty(&expected).await {
                    if run.observed.login_succeeded() && self.config.credentials.is_some() {
                        self.session.lock().await.mark_verified(Utc::now());
                    }
                    FetchOutcome::ContentWritten(expected)
                } else {
                    FetchOutcome::TransientFailure(match run.exit_code {
                        Some(code) => {
                            format!("no content at expected path (exit code {code})")
                        }
                        None => "no content at expected path".to_string(),
                    })
                }
            }
        }
    }
}

/// Argument list for one invocation. `+force_install_dir` must precede
/// `+login`, and the password never appears in cached mode.
fn invocation_args(
    workspace: Option<&Path>,
    login: &LoginArgs<'_>,
    download: Option<(AppId, WorkshopItemId)>,
) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(ws) = workspace {
        args.push("+force_install_dir".to_string());
        args.push(ws.display().to_string());
    }
    args.push("+login".to_string());
    match login {
        LoginArgs::Anonymous => args.push("anonymous".to_string()),
        LoginArgs::Cached(username) => args.push((*username).to_string()),
        LoginArgs::Full {
            username,
            password,
            guard_code,
        } => {
            args.push((*username).to_string());
            args.push((*password).to_string());
            if let Some(code) = guard_code {
                args.push((*code).to_string());
            }
        }
    }
    if let Some((app_id, item_id)) = download {
        args.push("+workshop_download_item".to_string());
        args.push(app_id.to_string());
        args.push(item_id.to_string());
        args.push("validate".to_string());
    }
    args.push("+quit".to_string());
    args
}

/// Reads a stream in chunks, forwarding complete lines. Interactive
/// prompts arrive without a trailing newline, so a partial tail that
/// classifies as a second-factor prompt is forwarded as a line too.
fn spawn_line_reader<R>(stream: R, tx: mpsc::Sender<String>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut stream = stream;
        let mut pending = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let read = match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            pending.extend_from_slice(&chunk[..read]);
            while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                let raw: Vec<u8> = pending.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&raw).trim().to_string();
                if !line.is_empty() && tx.send(line).await.is_err() {
                    return;
                }
            }
            if !pending.is_empty() {
                let tail = String::from_utf8_lossy(&pending);
                if markers::classify_line(&tail).is_some_and(|m| m.is_second_factor()) {
                    let tail = tail.trim().to_string();
                    pending.clear();
                    if tx.send(tail).await.is_err() {
                        return;
                    }
                }
            }
        }
        if !pending.is_empty() {
            let line = String::from_utf8_lossy(&pending).trim().to_string();
            if !line.is_empty() {
                let _ = tx.send(line).await;
            }
        }
    });
}

#[cfg(unix)]
async fn kill_group(child: &mut Child, grace: Duration) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        let pgid = Pid::from_raw(pid as i32);
        let _ = killpg(pgid, Signal::SIGTERM);
        if tokio::time::timeout(grace, child.wait()).await.is_err() {
            let _ = killpg(pgid, Signal::SIGKILL);
            let _ = child.wait().await;
        }
    } else {
        let _ = child.kill().await;
    }
}

#[cfg(not(unix))]
async fn kill_group(child: &mut Child, _grace: Duration) {
    let _ = child.kill().await;
    let _ = child.wait().await;
}

async fn dir_is_non_empty(path: &Path) -> bool {
    match tokio::fs::read_dir(path).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_invocation_shape() {
        let args = invocation_args(
            Some(Path::new("/tmp/ws")),
            &LoginArgs::Anonymous,
            Some((AppId(221100), WorkshopItemId(42))),
        );
        assert_eq!(
            args,
            vec![
                "+force_install_dir",
                "/tmp/ws",
                "+login",
                "anonymous",
                "+workshop_download_item",
                "221100",
                "42",
                "validate",
                "+quit",
            ]
        );
    }

    #[test]
    fn cached_invocation_omits_the_password() {
        let args = invocation_args(
            Some(Path::new("/tmp/ws")),
            &LoginArgs::Cached("steamuser"),
            Some((AppId(221100), WorkshopItemId(7))),
        );
        assert!(args.contains(&"steamuser".to_string()));
        assert!(!args.iter().any(|a| a.contains("hunter2")));
    }

    #[test]
    fn full_login_probe_has_no_download_step() {
        let args = invocation_args(
            None,
            &LoginArgs::Full {
                username: "steamuser",
                password: "hunter2",
                guard_code: Some("ABC12"),
            },
            None,
        );
        assert_eq!(
            args,
            vec!["+login", "steamuser", "hunter2", "ABC12", "+quit"]
        );
    }

    #[cfg(unix)]
    mod with_fake_tool {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        /// Writes an executable shell script standing in for steamcmd.
        fn fake_tool(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("steamcmd.sh");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            let mut perms = std::fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
            path
        }

        fn adapter_with(tool: PathBuf, credentials: Option<Credentials>) -> SteamCmdAdapter {
            SteamCmdAdapter::new(AdapterConfig {
                steamcmd_path: tool,
                fetch_timeout: Duration::from_secs(20),
                verify_timeout: Duration::from_secs(10),
                kill_grace: Duration::from_millis(500),
                credentials,
                ..AdapterConfig::default()
            })
        }

        #[tokio::test]
        async fn fetch_classifies_content_written() {
            let dir = tempfile::tempdir().unwrap();
            let ws = dir.path().join("ws");
            let content = canonical_content_dir(&ws, AppId(221100), WorkshopItemId(42));
            std::fs::create_dir_all(&content).unwrap();
            std::fs::write(content.join("mod.cpp"), b"payload").unwrap();

            let tool = fake_tool(
                dir.path(),
                "echo 'Loading Steam API...OK'\n\
                 echo 'Update state (0x61) downloading, progress: 50.0'\n\
                 echo 'Success. Downloaded item 42'",
            );
            let adapter = adapter_with(tool, None);

            let (tx, mut rx) = mpsc::channel(64);
            let outcome = adapter
                .fetch(&ws, AppId(221100), WorkshopItemId(42), tx, CancellationToken::new())
                .await;
            assert_eq!(outcome, FetchOutcome::ContentWritten(content));

            let mut saw_tick = false;
            while let Ok(event) = rx.try_recv() {
                if matches!(event, FetchEvent::ProgressTick) {
                    saw_tick = true;
                }
            }
            assert!(saw_tick, "download hint should produce a progress tick");
        }

        #[tokio::test]
        async fn textual_success_without_content_is_transient() {
            let dir = tempfile::tempdir().unwrap();
            let ws = dir.path().join("ws");
            std::fs::create_dir_all(&ws).unwrap();

            let tool = fake_tool(dir.path(), "echo 'Logged in OK'");
            let adapter = adapter_with(tool, None);

            let (tx, _rx) = mpsc::channel(64);
            let outcome = adapter
                .fetch(&ws, AppId(221100), WorkshopItemId(42), tx, CancellationToken::new())
                .await;
            assert!(matches!(outcome, FetchOutcome::TransientFailure(_)));
        }

        #[tokio::test]
        async fn newline_less_guard_prompt_is_detected_and_killed() {
            let dir = tempfile::tempdir().unwrap();
            let ws = dir.path().join("ws");
            std::fs::create_dir_all(&ws).unwrap();

            // The prompt has no trailing newline and the tool then
            // blocks, exactly like the real client waiting on stdin.
            let tool = fake_tool(dir.path(), "printf 'Steam Guard code: '; sleep 60");
            let adapter = adapter_with(
                tool,
                Some(Credentials {
                    username: "steamuser".into(),
                    password: None,
                    guard_code: None,
                }),
            );

            let (tx, _rx) = mpsc::channel(64);
            let started = std::time::Instant::now();
            let outcome = adapter
                .fetch(&ws, AppId(221100), WorkshopItemId(42), tx, CancellationToken::new())
                .await;
            assert_eq!(
                outcome,
                FetchOutcome::NeedsSecondFactor(SecondFactorKind::Email)
            );
            assert!(started.elapsed() < Duration::from_secs(15), "prompt must short-circuit");
            assert_eq!(adapter.session_state().await, SessionState::Invalid);
        }

        #[tokio::test]
        async fn expired_session_is_classified_and_invalidated() {
            let dir = tempfile::tempdir().unwrap();
            let ws = dir.path().join("ws");
            std::fs::create_dir_all(&ws).unwrap();

            let tool = fake_tool(dir.path(), "echo 'FAILED (Invalid Password)'; exit 5");
            let adapter = adapter_with(
                tool,
                Some(Credentials {
                    username: "steamuser".into(),
                    password: None,
                    guard_code: None,
                }),
            );

            let (tx, _rx) = mpsc::channel(64);
            let outcome = adapter
                .fetch(&ws, AppId(221100), WorkshopItemId(42), tx, CancellationToken::new())
                .await;
            assert_eq!(outcome, FetchOutcome::SessionExpired);
            assert_eq!(adapter.session_state().await, SessionState::Invalid);
        }

        #[tokio::test]
        async fn cancellation_terminates_the_tool() {
            let dir = tempfile::tempdir().unwrap();
            let ws = dir.path().join("ws");
            std::fs::create_dir_all(&ws).unwrap();

            let tool = fake_tool(dir.path(), "sleep 60");
            let adapter = adapter_with(tool, None);

            let cancel = CancellationToken::new();
            let cancel_clone = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                cancel_clone.cancel();
            });

            let (tx, _rx) = mpsc::channel(64);
            let started = std::time::Instant::now();
            let outcome = adapter
                .fetch(&ws, AppId(221100), WorkshopItemId(42), tx, cancel)
                .await;
            assert!(matches!(outcome, FetchOutcome::TransientFailure(_)));
            assert!(started.elapsed() < Duration::from_secs(15));
        }

        #[tokio::test]
        async fn verify_session_marks_the_lifecycle() {
            let dir = tempfile::tempdir().unwrap();
            let tool = fake_tool(dir.path(), "echo 'Logged in OK'");
            let adapter = adapter_with(
                tool,
                Some(Credentials {
                    username: "steamuser".into(),
                    password: None,
                    guard_code: None,
                }),
            );

            assert!(adapter.verify_session().await.unwrap());
            assert!(matches!(
                adapter.session_state().await,
                SessionState::Verified(_)
            ));
        }
    }
}

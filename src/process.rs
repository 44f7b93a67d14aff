//! Lifecycle of a single supervised child process.
//!
//! A [`ProcessService`] owns at most one OS process at a time. It spawns the
//! command produced by its [`ServiceLauncher`], pumps stdio into the per-day
//! log, waits for the HTTP health probe and tears the whole process tree down
//! again on failure or on request. Both the explicit `stop` path and the
//! background exit watcher funnel into the same idempotent cleanup.
use std::{
    ffi::OsString,
    fmt,
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    sync::{Arc, Mutex, MutexGuard},
    thread,
    time::{Duration, Instant},
};

use serde::Serialize;
use strum_macros::{AsRefStr, Display};
use tracing::{debug, error, info, warn};

use crate::{
    constants::{EXIT_POLL_INTERVAL, KILL_GRACE, STOP_TIMEOUT, WATCHER_INTERVAL},
    error::ProcessError,
    health::{HealthCheckOptions, HealthProbe, wait_for_healthy_while},
    logs::{ServiceLog, spawn_log_writer},
    runtime::{RuntimeMode, RuntimePaths},
    services::ServiceName,
    termination::{Delivery, TermSignal, configure_command, terminate_tree},
};

/// Runtime status of a process service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ServiceStatus {
    #[default]
    Stopped,
    Starting,
    Running,
    Error,
}

/// Program, arguments, working directory and environment of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub current_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Looks up an environment entry set on this spec.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Address the Next.js server proxies API calls to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendTarget {
    pub host: String,
    pub port: u16,
}

/// Everything a launcher needs to build its command line.
#[derive(Debug, Clone)]
pub struct LaunchContext<'a> {
    pub port: u16,
    pub mode: RuntimeMode,
    pub paths: &'a RuntimePaths,
    /// Root of the bundled runtimes in a packaged install.
    pub resources_dir: &'a Path,
    /// Root of the source checkout in development.
    pub project_dir: &'a Path,
    /// Resolved backend address, required by Next.js.
    pub backend: Option<BackendTarget>,
}

/// Knows how to launch and probe one of the managed programs.
pub trait ServiceLauncher: Send + Sync {
    fn name(&self) -> ServiceName;

    /// Builds the platform- and mode-specific command line.
    fn command(&self, ctx: &LaunchContext<'_>) -> Result<CommandSpec, ProcessError>;

    /// Health endpoint of an instance listening on `port`.
    fn health_probe(&self, port: u16) -> HealthProbe;
}

/// Tunables shared by every process service.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub health: HealthCheckOptions,
    pub stop_timeout: Duration,
    pub log_dir: PathBuf,
}

impl ProcessOptions {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            health: HealthCheckOptions::default(),
            stop_timeout: STOP_TIMEOUT,
            log_dir: log_dir.into(),
        }
    }
}

#[derive(Debug, Default)]
struct ServiceState {
    status: ServiceStatus,
    child: Option<Child>,
    port: Option<u16>,
    log: Option<ServiceLog>,
    /// Bumped on every spawn so stale watchers leave newer processes alone.
    generation: u64,
}

/// Supervises one external program.
pub struct ProcessService {
    launcher: Box<dyn ServiceLauncher>,
    options: ProcessOptions,
    state: Arc<Mutex<ServiceState>>,
}

fn lock_state(state: &Mutex<ServiceState>) -> MutexGuard<'_, ServiceState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Releases everything tied to the current process. Idempotent.
fn cleanup(state: &mut ServiceState) {
    if let Some(mut child) = state.child.take() {
        let _ = child.try_wait();
    }
    if let Some(log) = state.log.take() {
        log.close();
    }
    state.port = None;
    state.status = ServiceStatus::Stopped;
}

impl ProcessService {
    pub fn new(launcher: Box<dyn ServiceLauncher>, options: ProcessOptions) -> Self {
        Self {
            launcher,
            options,
            state: Arc::new(Mutex::new(ServiceState::default())),
        }
    }

    pub fn name(&self) -> ServiceName {
        self.launcher.name()
    }

    pub fn launcher(&self) -> &dyn ServiceLauncher {
        self.launcher.as_ref()
    }

    pub fn status(&self) -> ServiceStatus {
        lock_state(&self.state).status
    }

    pub fn port(&self) -> Option<u16> {
        lock_state(&self.state).port
    }

    pub fn pid(&self) -> Option<u32> {
        lock_state(&self.state).child.as_ref().map(Child::id)
    }

    pub fn log_path(&self) -> Option<PathBuf> {
        lock_state(&self.state)
            .log
            .as_ref()
            .map(|log| log.path().to_path_buf())
    }

    /// Spawns the service and blocks until it is healthy.
    ///
    /// A failed health check always stops the process before the error is
    /// returned.
    pub fn start(&self, ctx: &LaunchContext<'_>) -> Result<u16, ProcessError> {
        let name = self.name();
        let port = ctx.port;
        let generation = self.spawn(ctx)?;

        self.spawn_exit_watcher(generation);

        let probe = self.launcher.health_probe(port);
        debug!("Waiting for '{name}' at {}", probe.url);

        let health = wait_for_healthy_while(&probe, &self.options.health, || {
            self.is_current(generation)
        });

        match health {
            Ok(()) => {
                let mut state = lock_state(&self.state);
                if state.generation == generation && state.child.is_some() {
                    state.status = ServiceStatus::Running;
                    info!("Service '{name}' is running on port {port}");
                    return Ok(port);
                }
                drop(state);
                self.fail_start(
                    generation,
                    crate::error::HealthCheckError::ProcessExited { url: probe.url },
                )
            }
            Err(source) => self.fail_start(generation, source),
        }
    }

    fn fail_start(
        &self,
        generation: u64,
        source: crate::error::HealthCheckError,
    ) -> Result<u16, ProcessError> {
        let name = self.name();
        error!("Service '{name}' failed to become healthy: {source}");
        {
            let mut state = lock_state(&self.state);
            if state.generation == generation {
                state.status = ServiceStatus::Error;
            }
        }

        if let Err(err) = self.stop() {
            error!("Failed to stop '{name}' after failed start: {err}");
        }

        Err(ProcessError::HealthCheck {
            service: name.to_string(),
            source,
        })
    }

    /// Spawns the process and its log pumps. Returns the new generation.
    fn spawn(&self, ctx: &LaunchContext<'_>) -> Result<u64, ProcessError> {
        let name = self.name();
        let mut state = lock_state(&self.state);

        if state.child.is_some() {
            return Err(ProcessError::AlreadyRunning {
                service: name.to_string(),
            });
        }

        state.status = ServiceStatus::Starting;
        state.port = Some(ctx.port);

        let spec = match self.launcher.command(ctx) {
            Ok(spec) => spec,
            Err(err) => {
                state.status = ServiceStatus::Error;
                cleanup(&mut state);
                return Err(err);
            }
        };

        let log = match ServiceLog::open(&self.options.log_dir, name.as_ref()) {
            Ok(log) => log,
            Err(source) => {
                state.status = ServiceStatus::Error;
                cleanup(&mut state);
                return Err(ProcessError::LogFile {
                    service: name.to_string(),
                    source,
                });
            }
        };

        let mut cmd = spec.to_command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        configure_command(&mut cmd);

        info!("Launching '{name}' on port {}: `{spec}`", ctx.port);
        log.write_line("launcher", &format!("starting `{spec}` on port {}", ctx.port));

        match cmd.spawn() {
            Ok(mut child) => {
                debug!("Service '{name}' started with PID {}", child.id());
                if let Some(out) = child.stdout.take() {
                    spawn_log_writer(name.as_ref(), out, "stdout", log.clone());
                }
                if let Some(err) = child.stderr.take() {
                    spawn_log_writer(name.as_ref(), err, "stderr", log.clone());
                }

                state.child = Some(child);
                state.log = Some(log);
                state.generation += 1;
                Ok(state.generation)
            }
            Err(source) => {
                error!("Failed to start service '{name}': {source}");
                log.write_line("launcher", &format!("spawn failed: {source}"));
                state.status = ServiceStatus::Error;
                state.log = Some(log);
                cleanup(&mut state);
                Err(ProcessError::SpawnFailed {
                    service: name.to_string(),
                    source,
                })
            }
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        let state = lock_state(&self.state);
        state.generation == generation && state.child.is_some()
    }

    /// Reaps the process when it exits on its own.
    fn spawn_exit_watcher(&self, generation: u64) {
        let state = Arc::clone(&self.state);
        let name = self.name();

        thread::spawn(move || {
            loop {
                thread::sleep(WATCHER_INTERVAL);

                let mut guard = lock_state(&state);
                if guard.generation != generation {
                    return;
                }
                let Some(child) = guard.child.as_mut() else {
                    return;
                };

                match child.try_wait() {
                    Ok(None) => continue,
                    Ok(Some(status)) => {
                        if guard.status == ServiceStatus::Running {
                            warn!("Service '{name}' exited unexpectedly: {status}");
                        } else {
                            info!("Service '{name}' exited: {status}");
                        }
                        if let Some(log) = guard.log.as_ref() {
                            log.write_line("launcher", &format!("process exited: {status}"));
                        }
                    }
                    Err(err) => {
                        warn!("Lost track of service '{name}': {err}");
                    }
                }

                cleanup(&mut guard);
                return;
            }
        });
    }

    /// Terminates the process tree. Never blocks longer than the stop timeout
    /// plus the SIGKILL grace period; a no-op when nothing is running.
    pub fn stop(&self) -> Result<(), ProcessError> {
        let name = self.name();

        let (pid, generation) = {
            let mut state = lock_state(&self.state);
            let running = match state.child.as_mut() {
                Some(child) => match child.try_wait() {
                    Ok(Some(_)) => None,
                    _ => Some(child.id()),
                },
                None => None,
            };
            let Some(pid) = running else {
                cleanup(&mut state);
                return Ok(());
            };
            (pid, state.generation)
        };

        info!("Stopping service '{name}' (PID {pid})");
        let mut failure = None;

        match terminate_tree(pid, TermSignal::Graceful) {
            Ok(Delivery::Sent) => debug!("Sent SIGTERM to '{name}'"),
            Ok(Delivery::Gone) => debug!("Service '{name}' exited before SIGTERM"),
            Err(err) => {
                warn!("SIGTERM to '{name}' failed ({err}); escalating to SIGKILL");
                if let Err(kill_err) = terminate_tree(pid, TermSignal::Forceful) {
                    failure = Some(kill_err);
                }
            }
        }

        if !self.wait_for_exit(generation, self.options.stop_timeout) {
            warn!(
                "Service '{name}' did not exit within {:?}; sending SIGKILL",
                self.options.stop_timeout
            );
            if let Err(err) = terminate_tree(pid, TermSignal::Forceful) {
                error!("Failed to forcefully terminate service '{name}': {err}");
                failure = Some(err);
            }
            if !self.wait_for_exit(generation, KILL_GRACE) {
                error!("Service '{name}' (PID {pid}) survived SIGKILL; abandoning handle");
            }
        }

        {
            let mut state = lock_state(&self.state);
            if state.generation == generation {
                cleanup(&mut state);
            }
        }

        match failure {
            Some(source) => Err(ProcessError::StopFailed {
                service: name.to_string(),
                source,
            }),
            None => {
                debug!("Service '{name}' stopped");
                Ok(())
            }
        }
    }

    /// Polls until the process of `generation` is gone or `timeout` elapses.
    fn wait_for_exit(&self, generation: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        loop {
            {
                let mut state = lock_state(&self.state);
                if state.generation != generation {
                    return true;
                }
                match state.child.as_mut().map(Child::try_wait) {
                    None | Some(Ok(Some(_))) | Some(Err(_)) => {
                        cleanup(&mut state);
                        return true;
                    }
                    Some(Ok(None)) => {}
                }
            }

            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }
    }
}

impl fmt::Debug for ProcessService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessService")
            .field("name", &self.name())
            .field("status", &self.status())
            .field("port", &self.port())
            .finish()
    }
}

//! Error handling for the Ambrosia launcher.
use std::path::PathBuf;

use thiserror::Error;

/// Top-level errors surfaced by the service manager.
#[derive(Debug, Error)]
pub enum LauncherError {
    /// Configuration could not be read, written or validated.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A managed process failed to start or stop.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// The requested service name is not one of the managed services.
    #[error("Unknown service '{0}'")]
    UnknownService(String),

    /// An operation needed ports and configs from a previous `start_all`.
    #[error("Services have not been started yet")]
    NotStarted,

    /// `start_all` was called while the services are already up.
    #[error("Services are already started")]
    AlreadyStarted,

    /// The service is managed outside this launcher and cannot be controlled.
    #[error("Service '{0}' is running externally and is not managed by this launcher")]
    ExternalService(String),
}

/// Errors raised while loading or persisting configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or writing a configuration file failed.
    #[error("Failed to access config file {path}: {source}")]
    Io {
        /// File or directory that could not be accessed.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// A required key is absent from a service configuration file.
    #[error("Missing required key '{key}' in {file}")]
    MissingKey {
        /// File name the key was expected in.
        file: &'static str,
        /// The missing key.
        key: &'static str,
    },

    /// A key is present but its value cannot be used.
    #[error("Invalid value '{value}' for key '{key}' in {file}")]
    InvalidValue {
        /// File name holding the bad value.
        file: &'static str,
        /// Key whose value is invalid.
        key: &'static str,
        /// The offending value.
        value: String,
    },

    /// Error parsing the YAML launcher settings.
    #[error("Invalid YAML format: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The settings file references an undefined environment variable.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// A duration string is not of the form `<n>[ms|s|m|h]`.
    #[error("Invalid duration value: '{0}'")]
    InvalidDuration(String),

    /// An explicitly requested settings file does not exist.
    #[error("Settings file not found: {0}")]
    SettingsNotFound(PathBuf),

    /// Secret generation failed.
    #[error("Failed to generate secret: {0}")]
    Secret(String),
}

impl ConfigError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised by a single process service.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// `start` was called while a process handle is still held.
    #[error("Service '{service}' is already running")]
    AlreadyRunning {
        /// The service that is already running.
        service: String,
    },

    /// Error spawning the service process.
    #[error("Failed to start service '{service}': {source}")]
    SpawnFailed {
        /// The service name that failed to start.
        service: String,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// The per-day log file could not be opened.
    #[error("Failed to open log file for '{service}': {source}")]
    LogFile {
        /// The service whose log could not be opened.
        service: String,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// The service never became healthy.
    #[error("Service '{service}' failed its health check: {source}")]
    HealthCheck {
        /// The service that failed its health check.
        service: String,
        /// The underlying health check failure.
        #[source]
        source: HealthCheckError,
    },

    /// Signals could not be delivered to the process tree.
    #[error("Failed to stop service '{service}': {source}")]
    StopFailed {
        /// The service name that failed to stop.
        service: String,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// The launcher could not build a command line.
    #[error("Cannot launch '{service}': {reason}")]
    Launch {
        /// The service that cannot be launched.
        service: String,
        /// Why the command could not be built.
        reason: String,
    },
}

/// Errors raised by HTTP health polling.
#[derive(Debug, Error)]
pub enum HealthCheckError {
    /// All attempts were used without an acceptable response.
    #[error("timed out waiting for {url} after {attempts} attempts")]
    TimedOut {
        /// The polled URL.
        url: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// The process being probed exited before it became healthy.
    #[error("process exited while waiting for {url}")]
    ProcessExited {
        /// The polled URL.
        url: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

//! Launcher settings: an optional YAML file layered under CLI flags.
use regex::Regex;
use serde::Deserialize;
use std::{
    env, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::LazyLock,
    time::Duration,
};
use tracing::debug;

use crate::{
    constants::STOP_TIMEOUT,
    error::ConfigError,
    health::HealthCheckOptions,
    process::ProcessOptions,
    runtime::{RuntimeMode, RuntimePaths, default_resources_dir},
    services::ServiceName,
};

/// Represents the structure of `launcher.yaml`. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsFile {
    /// Directory holding the bundled runtimes.
    pub resources_dir: Option<PathBuf>,
    /// Source checkout used in development.
    pub project_dir: Option<PathBuf>,
    /// Grace period between SIGTERM and SIGKILL.
    pub stop_timeout: Option<String>,
    /// Health check budgets.
    #[serde(default)]
    pub health: HealthSettings,
}

/// Per-service overrides of the health check budget.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthSettings {
    pub phoenixd: Option<ProbeSettings>,
    pub backend: Option<ProbeSettings>,
    pub nextjs: Option<ProbeSettings>,
    /// Probe used to detect already-running phoenixd/backend instances.
    pub external_probe: Option<ProbeSettings>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbeSettings {
    pub max_attempts: Option<u32>,
    pub interval: Option<String>,
    pub request_timeout: Option<String>,
}

impl ProbeSettings {
    fn apply(&self, base: HealthCheckOptions) -> Result<HealthCheckOptions, ConfigError> {
        let mut options = base;
        if let Some(attempts) = self.max_attempts {
            options.max_attempts = attempts;
        }
        if let Some(interval) = &self.interval {
            options.interval = parse_duration(interval)?;
        }
        if let Some(timeout) = &self.request_timeout {
            options.request_timeout = parse_duration(timeout)?;
        }
        Ok(options)
    }
}

/// Resolved health budgets for every probe the manager runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceHealth {
    pub phoenixd: HealthCheckOptions,
    pub backend: HealthCheckOptions,
    pub nextjs: HealthCheckOptions,
    pub external_probe: HealthCheckOptions,
}

impl Default for ServiceHealth {
    fn default() -> Self {
        Self {
            phoenixd: HealthCheckOptions::default(),
            backend: HealthCheckOptions::default(),
            nextjs: HealthCheckOptions::default(),
            external_probe: HealthCheckOptions::external_probe(),
        }
    }
}

impl ServiceHealth {
    pub fn for_service(&self, service: ServiceName) -> HealthCheckOptions {
        match service {
            ServiceName::Phoenixd => self.phoenixd,
            ServiceName::Backend => self.backend,
            ServiceName::Nextjs => self.nextjs,
        }
    }
}

/// Everything the service manager needs to know about its environment.
#[derive(Debug, Clone)]
pub struct LauncherSettings {
    pub mode: RuntimeMode,
    pub paths: RuntimePaths,
    pub resources_dir: PathBuf,
    pub project_dir: PathBuf,
    pub stop_timeout: Duration,
    pub health: ServiceHealth,
}

impl LauncherSettings {
    /// Defaults for `mode` rooted at `paths`.
    pub fn new(mode: RuntimeMode, paths: RuntimePaths) -> Self {
        Self {
            mode,
            paths,
            resources_dir: default_resources_dir(),
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            stop_timeout: STOP_TIMEOUT,
            health: ServiceHealth::default(),
        }
    }

    /// Loads settings from `path`, or from `~/.Ambrosia-POS/launcher.yaml`
    /// when `path` is `None`. Only the implicit file may be absent.
    pub fn load(
        mode: RuntimeMode,
        paths: RuntimePaths,
        path: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let (settings_path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (paths.settings_file(), false),
        };

        match load_settings_file(&settings_path)? {
            Some(file) => {
                let base = settings_path.parent().unwrap_or_else(|| Path::new("."));
                Self::from_file(mode, paths, &file, base)
            }
            None if explicit => Err(ConfigError::SettingsNotFound(settings_path)),
            None => {
                debug!("No settings file at {}; using defaults", settings_path.display());
                Ok(Self::new(mode, paths))
            }
        }
    }

    /// Applies a parsed settings file. Relative paths resolve against `base`.
    pub fn from_file(
        mode: RuntimeMode,
        paths: RuntimePaths,
        file: &SettingsFile,
        base: &Path,
    ) -> Result<Self, ConfigError> {
        let mut settings = Self::new(mode, paths);

        if let Some(dir) = &file.resources_dir {
            settings.resources_dir = resolve(base, dir);
        }
        if let Some(dir) = &file.project_dir {
            settings.project_dir = resolve(base, dir);
        }
        if let Some(raw) = &file.stop_timeout {
            settings.stop_timeout = parse_duration(raw)?;
        }

        let health = &file.health;
        let defaults = ServiceHealth::default();
        let apply = |probe: &Option<ProbeSettings>, base: HealthCheckOptions| match probe {
            Some(probe) => probe.apply(base),
            None => Ok(base),
        };
        settings.health = ServiceHealth {
            phoenixd: apply(&health.phoenixd, defaults.phoenixd)?,
            backend: apply(&health.backend, defaults.backend)?,
            nextjs: apply(&health.nextjs, defaults.nextjs)?,
            external_probe: apply(&health.external_probe, defaults.external_probe)?,
        };

        Ok(settings)
    }

    /// Options for the process service of `service`.
    pub fn process_options(&self, service: ServiceName) -> ProcessOptions {
        ProcessOptions {
            health: self.health.for_service(service),
            stop_timeout: self.stop_timeout,
            log_dir: self.paths.log_dir().to_path_buf(),
        }
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?").expect("env var pattern is valid")
});

/// Expands `${VAR}` and `$VAR` references within a string.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut missing = None;
    let result = ENV_VAR_PATTERN.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        match env::var(var_name) {
            Ok(value) => value,
            Err(_) => {
                missing.get_or_insert_with(|| var_name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(var_name) => Err(ConfigError::MissingEnvVar(var_name)),
        None => Ok(result.to_string()),
    }
}

/// Parses settings YAML after environment expansion.
pub fn parse_settings(content: &str) -> Result<SettingsFile, ConfigError> {
    let expanded = expand_env_vars(content)?;
    if expanded.trim().is_empty() {
        return Ok(SettingsFile::default());
    }
    Ok(serde_yaml::from_str(&expanded)?)
}

/// Reads and parses a settings file; `None` when it does not exist.
pub fn load_settings_file(path: &Path) -> Result<Option<SettingsFile>, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(ConfigError::io(path, err)),
    };

    debug!("Loading launcher settings from {}", path.display());
    parse_settings(&content).map(Some)
}

/// Parses a user-facing duration string in the format `<number>[ms|s|m|h]`.
pub fn parse_duration(raw: &str) -> Result<Duration, ConfigError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ConfigError::InvalidDuration(raw.to_string()));
    }

    let invalid = || ConfigError::InvalidDuration(raw.to_string());

    if let Some(stripped) = value.strip_suffix("ms") {
        let amount: u64 = stripped.trim().parse().map_err(|_| invalid())?;
        return Ok(Duration::from_millis(amount));
    }

    let (amount_str, multiplier) = if let Some(stripped) = value.strip_suffix('s') {
        (stripped.trim(), 1)
    } else if let Some(stripped) = value.strip_suffix('m') {
        (stripped.trim(), 60)
    } else if let Some(stripped) = value.strip_suffix('h') {
        (stripped.trim(), 3600)
    } else {
        (value, 1)
    };

    let amount: u64 = amount_str.parse().map_err(|_| invalid())?;

    Ok(Duration::from_secs(amount.saturating_mul(multiplier)))
}

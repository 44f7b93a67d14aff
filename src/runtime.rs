//! Runtime paths and launch modes.
use std::{
    env, fmt,
    path::{Path, PathBuf},
};

use crate::constants::{
    AMBROSIA_CONFIG_FILE, AMBROSIA_DIR_NAME, LOG_DIR_NAME, PHOENIX_CONFIG_FILE,
    PHOENIX_DIR_NAME, SETTINGS_FILE_NAME,
};

/// How the services are launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeMode {
    /// Developer checkout: fixed ports, PATH commands, externals assumed.
    Development,
    /// Packaged app: dynamic ports, bundled runtimes.
    #[default]
    Production,
}

impl RuntimeMode {
    pub fn is_development(&self) -> bool {
        matches!(self, RuntimeMode::Development)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeMode::Development => "development",
            RuntimeMode::Production => "production",
        }
    }
}

impl fmt::Display for RuntimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// On-disk locations used by the launcher and the services it bootstraps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    home: PathBuf,
    ambrosia_dir: PathBuf,
    phoenix_dir: PathBuf,
    log_dir: PathBuf,
}

impl RuntimePaths {
    /// Resolves paths under `$HOME`, falling back to `/` when unset.
    pub fn from_env() -> Self {
        let home = env::var_os("HOME")
            .or_else(|| env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/"));
        Self::from_home(home)
    }

    /// Resolves paths under an explicit home directory.
    pub fn from_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let ambrosia_dir = home.join(AMBROSIA_DIR_NAME);
        let phoenix_dir = home.join(PHOENIX_DIR_NAME);
        let log_dir = ambrosia_dir.join(LOG_DIR_NAME);

        Self {
            home,
            ambrosia_dir,
            phoenix_dir,
            log_dir,
        }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Backend data directory (`~/.Ambrosia-POS`).
    pub fn ambrosia_dir(&self) -> &Path {
        &self.ambrosia_dir
    }

    /// phoenixd data directory (`~/.phoenix`).
    pub fn phoenix_dir(&self) -> &Path {
        &self.phoenix_dir
    }

    /// Directory holding per-day service logs.
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn ambrosia_config(&self) -> PathBuf {
        self.ambrosia_dir.join(AMBROSIA_CONFIG_FILE)
    }

    pub fn phoenix_config(&self) -> PathBuf {
        self.phoenix_dir.join(PHOENIX_CONFIG_FILE)
    }

    /// Default location of the optional YAML launcher settings.
    pub fn settings_file(&self) -> PathBuf {
        self.ambrosia_dir.join(SETTINGS_FILE_NAME)
    }
}

/// Directory holding bundled runtimes when none is configured: a `resources`
/// folder next to the launcher executable.
pub fn default_resources_dir() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("resources")))
        .unwrap_or_else(|| PathBuf::from("resources"))
}

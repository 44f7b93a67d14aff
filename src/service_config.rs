//! Flat `key=value` configuration files shared with the backend and phoenixd.
use std::{
    fs,
    io::{self, Write},
    path::Path,
};

use indexmap::IndexMap;
use tracing::warn;

use crate::{
    constants::{AMBROSIA_CONFIG_FILE, PHOENIX_CONFIG_FILE},
    error::ConfigError,
};

/// Ordered key/value record as stored in a `.conf` file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigRecord {
    entries: IndexMap<String, String>,
}

impl ConfigRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses file content. Blank lines and `#` comments are skipped, the
    /// value is everything after the first `=`.
    pub fn parse(content: &str) -> Self {
        let mut entries = IndexMap::new();

        for raw_line in content.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match line.split_once('=') {
                Some((key, value)) => {
                    let key = key.trim();
                    if key.is_empty() {
                        warn!("Ignoring config line without a key: {line}");
                        continue;
                    }
                    entries.insert(key.to_string(), value.trim().to_string());
                }
                None => warn!("Ignoring malformed config line: {line}"),
            }
        }

        Self { entries }
    }

    /// Reads and parses `path`; `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(Self::parse(&content))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ConfigError::io(path, err)),
        }
    }

    /// Serializes the record as `key=value` lines.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    /// Replaces the whole file: the content is written to a sibling temp file
    /// which is then renamed over `path`.
    pub fn write_atomic(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| ConfigError::io(parent, err))?;
        }

        let tmp_path = path.with_extension("conf.tmp");
        {
            let mut file = open_private(&tmp_path).map_err(|err| ConfigError::io(&tmp_path, err))?;
            file.write_all(self.render().as_bytes())
                .and_then(|_| file.sync_all())
                .map_err(|err| ConfigError::io(&tmp_path, err))?;
        }
        fs::rename(&tmp_path, path).map_err(|err| ConfigError::io(path, err))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.entries.insert(key.to_string(), value.into());
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn require(&self, file: &'static str, key: &'static str) -> Result<String, ConfigError> {
        match self.get(key) {
            Some(value) if !value.is_empty() => Ok(value.to_string()),
            _ => Err(ConfigError::MissingKey { file, key }),
        }
    }

    fn require_port(&self, file: &'static str, key: &'static str) -> Result<u16, ConfigError> {
        let raw = self.require(file, key)?;
        raw.parse::<u16>()
            .ok()
            .filter(|port| *port != 0)
            .ok_or(ConfigError::InvalidValue {
                file,
                key,
                value: raw,
            })
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;

    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

/// Keys of `ambrosia.conf`.
pub mod ambrosia_keys {
    pub const HTTP_ADDRESS: &str = "http-address";
    pub const HTTP_PORT: &str = "http-port";
    pub const SECRET: &str = "secret";
    pub const SECRET_HASH: &str = "secret-hash";
    pub const PHOENIXD_URL: &str = "phoenixd-url";
    pub const PHOENIXD_PASSWORD: &str = "phoenixd-password";
    pub const PHOENIXD_WEBHOOK_SECRET: &str = "phoenixd-webhook-secret";
}

/// Keys of `phoenix.conf`.
pub mod phoenix_keys {
    pub const HTTP_PASSWORD: &str = "http-password";
    pub const HTTP_PASSWORD_LIMITED: &str = "http-password-limited-access";
    pub const WEBHOOK: &str = "webhook";
    pub const WEBHOOK_SECRET: &str = "webhook-secret";
    pub const AUTO_LIQUIDITY: &str = "auto-liquidity";
    pub const MAX_MINING_FEE: &str = "max-mining-fee";
}

/// Typed view of the backend configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbrosiaConfig {
    pub http_address: String,
    pub http_port: u16,
    /// BIP39 mnemonic, the source of truth for `secret_hash`.
    pub secret: String,
    pub secret_hash: String,
    pub phoenixd_url: String,
    pub phoenixd_password: String,
    pub phoenixd_webhook_secret: String,
}

impl AmbrosiaConfig {
    pub fn from_record(record: &ConfigRecord) -> Result<Self, ConfigError> {
        use ambrosia_keys::*;
        const FILE: &str = AMBROSIA_CONFIG_FILE;

        Ok(Self {
            http_address: record.require(FILE, HTTP_ADDRESS)?,
            http_port: record.require_port(FILE, HTTP_PORT)?,
            secret: record.require(FILE, SECRET)?,
            secret_hash: record.require(FILE, SECRET_HASH)?,
            phoenixd_url: record.require(FILE, PHOENIXD_URL)?,
            phoenixd_password: record.require(FILE, PHOENIXD_PASSWORD)?,
            phoenixd_webhook_secret: record.require(FILE, PHOENIXD_WEBHOOK_SECRET)?,
        })
    }
}

/// Typed view of the phoenixd configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoenixConfig {
    /// Full-access API password.
    pub http_password: String,
    /// Read-only/invoice-only API password.
    pub http_password_limited_access: String,
    pub webhook: String,
    pub webhook_secret: String,
    pub auto_liquidity: String,
    pub max_mining_fee: String,
}

impl PhoenixConfig {
    pub fn from_record(record: &ConfigRecord) -> Result<Self, ConfigError> {
        use phoenix_keys::*;
        const FILE: &str = PHOENIX_CONFIG_FILE;

        Ok(Self {
            http_password: record.require(FILE, HTTP_PASSWORD)?,
            http_password_limited_access: record.require(FILE, HTTP_PASSWORD_LIMITED)?,
            webhook: record.require(FILE, WEBHOOK)?,
            webhook_secret: record.require(FILE, WEBHOOK_SECRET)?,
            auto_liquidity: record.require(FILE, AUTO_LIQUIDITY)?,
            max_mining_fee: record.require(FILE, MAX_MINING_FEE)?,
        })
    }
}

/// Both service configurations as produced by the bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfigs {
    pub ambrosia: AmbrosiaConfig,
    pub phoenix: PhoenixConfig,
}

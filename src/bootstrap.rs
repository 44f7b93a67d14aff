//! First-run bootstrap of the backend and phoenixd configuration files.
//!
//! Both files are created when missing or empty. On every later call only the
//! network-dependent entries are refreshed so they follow the ports allocated
//! for the current session, while generated secrets stay untouched.
use std::path::Path;

use tracing::{debug, info};

use crate::{
    constants::{DEFAULT_AUTO_LIQUIDITY, DEFAULT_MAX_MINING_FEE, LOOPBACK_HOST, WEBHOOK_PATH},
    error::ConfigError,
    ports::ServicePorts,
    runtime::RuntimePaths,
    secrets,
    service_config::{
        AmbrosiaConfig, ConfigRecord, PhoenixConfig, ServiceConfigs, ambrosia_keys,
        phoenix_keys,
    },
};

/// URL the backend uses to reach phoenixd.
pub fn phoenixd_url(port: u16) -> String {
    format!("http://{LOOPBACK_HOST}:{port}")
}

/// URL phoenixd posts payment notifications to.
pub fn webhook_url(backend_port: u16) -> String {
    format!("http://{LOOPBACK_HOST}:{backend_port}{WEBHOOK_PATH}")
}

/// Ensures both configuration files exist and reflect `ports`.
///
/// Filesystem errors are returned as-is; the caller treats them as fatal.
pub fn ensure_configurations(
    paths: &RuntimePaths,
    ports: &ServicePorts,
) -> Result<ServiceConfigs, ConfigError> {
    let phoenix = ensure_phoenix_config(&paths.phoenix_config(), ports)?;
    let ambrosia = ensure_ambrosia_config(&paths.ambrosia_config(), ports, &phoenix)?;

    Ok(ServiceConfigs { ambrosia, phoenix })
}

/// Loads `path`, treating a missing or empty file as uninitialized.
fn load_initialized(path: &Path) -> Result<Option<ConfigRecord>, ConfigError> {
    Ok(ConfigRecord::load(path)?.filter(|record| !record.is_empty()))
}

fn ensure_phoenix_config(
    path: &Path,
    ports: &ServicePorts,
) -> Result<PhoenixConfig, ConfigError> {
    use phoenix_keys::*;

    let mut record = match load_initialized(path)? {
        Some(record) => {
            debug!("phoenixd config already initialized at {}", path.display());
            record
        }
        None => {
            info!("Generating phoenixd config at {}", path.display());
            let mut record = ConfigRecord::new();
            record.set(HTTP_PASSWORD, secrets::random_secret());
            record.set(HTTP_PASSWORD_LIMITED, secrets::random_secret());
            record.set(WEBHOOK_SECRET, secrets::random_secret());
            record.set(AUTO_LIQUIDITY, DEFAULT_AUTO_LIQUIDITY);
            record.set(MAX_MINING_FEE, DEFAULT_MAX_MINING_FEE);
            record
        }
    };

    record.set(WEBHOOK, webhook_url(ports.backend));
    record.write_atomic(path)?;

    PhoenixConfig::from_record(&record)
}

fn ensure_ambrosia_config(
    path: &Path,
    ports: &ServicePorts,
    phoenix: &PhoenixConfig,
) -> Result<AmbrosiaConfig, ConfigError> {
    use ambrosia_keys::*;

    let mut record = match load_initialized(path)? {
        Some(record) => {
            debug!("Backend config already initialized at {}", path.display());
            record
        }
        None => {
            info!("Generating backend config at {}", path.display());
            let secret = secrets::generate_secret()?;
            let secret_hash = secrets::hash_secret(&secret);
            let mut record = ConfigRecord::new();
            record.set(HTTP_ADDRESS, LOOPBACK_HOST);
            record.set(SECRET, secret);
            record.set(SECRET_HASH, secret_hash);
            record
        }
    };

    if !record.contains_key(HTTP_ADDRESS) {
        record.set(HTTP_ADDRESS, LOOPBACK_HOST);
    }
    record.set(HTTP_PORT, ports.backend.to_string());
    record.set(PHOENIXD_URL, phoenixd_url(ports.phoenixd));
    record.set(PHOENIXD_PASSWORD, phoenix.http_password.as_str());
    record.set(PHOENIXD_WEBHOOK_SECRET, phoenix.webhook_secret.as_str());
    record.write_atomic(path)?;

    AmbrosiaConfig::from_record(&record)
}

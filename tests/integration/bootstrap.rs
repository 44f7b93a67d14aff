use std::fs;

use ambrosia_launcher::{
    bootstrap::ensure_configurations,
    ports::ServicePorts,
    runtime::RuntimePaths,
    secrets::{hash_secret, validate_secret},
    service_config::ConfigRecord,
};
use tempfile::tempdir;

#[test]
fn second_run_keeps_secrets_and_follows_new_ports() {
    let home = tempdir().unwrap();
    let paths = RuntimePaths::from_home(home.path());

    let first = ensure_configurations(&paths, &ServicePorts::DEFAULT).unwrap();

    let moved = ServicePorts {
        phoenixd: 9741,
        backend: 9156,
        nextjs: 3002,
    };
    let second = ensure_configurations(&paths, &moved).unwrap();

    assert_eq!(first.ambrosia.secret, second.ambrosia.secret);
    assert_eq!(first.ambrosia.secret_hash, second.ambrosia.secret_hash);
    assert_eq!(first.phoenix.http_password, second.phoenix.http_password);
    assert_eq!(first.phoenix.webhook_secret, second.phoenix.webhook_secret);

    assert_eq!(second.ambrosia.http_port, 9156);
    assert_eq!(second.ambrosia.phoenixd_url, "http://127.0.0.1:9741");
    assert_eq!(second.phoenix.webhook, "http://127.0.0.1:9156/webhook/phoenixd");
}

#[test]
fn written_files_use_key_value_lines() {
    let home = tempdir().unwrap();
    let paths = RuntimePaths::from_home(home.path());

    let configs = ensure_configurations(&paths, &ServicePorts::DEFAULT).unwrap();

    let phoenix = fs::read_to_string(paths.phoenix_config()).unwrap();
    assert!(phoenix.contains("auto-liquidity=off\n"));
    assert!(phoenix.contains("max-mining-fee=5000\n"));
    assert!(phoenix.contains(&format!("http-password={}\n", configs.phoenix.http_password)));

    let ambrosia = ConfigRecord::load(&paths.ambrosia_config()).unwrap().unwrap();
    let secret = ambrosia.get("secret").unwrap();
    assert!(validate_secret(secret));
    assert_eq!(secret.split_whitespace().count(), 12);
    assert_eq!(ambrosia.get("secret-hash"), Some(hash_secret(secret).as_str()));
    assert_eq!(
        ambrosia.get("phoenixd-webhook-secret"),
        Some(configs.phoenix.webhook_secret.as_str())
    );
    assert_eq!(ambrosia.get("http-address"), Some("127.0.0.1"));
}

#[test]
fn backend_password_tracks_edited_phoenix_password() {
    let home = tempdir().unwrap();
    let paths = RuntimePaths::from_home(home.path());
    ensure_configurations(&paths, &ServicePorts::DEFAULT).unwrap();

    let mut phoenix = ConfigRecord::load(&paths.phoenix_config()).unwrap().unwrap();
    phoenix.set("http-password", "rotated");
    phoenix.write_atomic(&paths.phoenix_config()).unwrap();

    let configs = ensure_configurations(&paths, &ServicePorts::DEFAULT).unwrap();
    assert_eq!(configs.ambrosia.phoenixd_password, "rotated");
}

#[cfg(unix)]
#[test]
fn config_files_are_private() {
    use std::os::unix::fs::PermissionsExt;

    let home = tempdir().unwrap();
    let paths = RuntimePaths::from_home(home.path());
    ensure_configurations(&paths, &ServicePorts::DEFAULT).unwrap();

    for path in [paths.ambrosia_config(), paths.phoenix_config()] {
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600, "{} is not private", path.display());
    }
}

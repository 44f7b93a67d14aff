#![cfg(unix)]

#[path = "common/mod.rs"]
mod common;

use std::{
    fs,
    net::TcpListener,
    path::Path,
    process::{Command, Stdio},
    sync::atomic::Ordering,
    thread,
    time::{Duration, Instant},
};

use ambrosia_launcher::{
    error::{LauncherError, ProcessError},
    events::ServiceEvent,
    manager::{ExternalServices, ManagerState, ServiceManager, ServiceStatuses},
    ports::ServicePorts,
    process::ServiceStatus,
    runtime::RuntimeMode,
    service_config::ConfigRecord,
    services::ServiceName,
};
use common::{
    FakeLauncher, StubServer, fast_health, is_process_alive, read_pid, test_settings,
    wait_for_process_exit,
};
use tempfile::tempdir;

/// Stubs and launchers for a fresh install where nothing is running yet.
struct Fixture {
    phoenixd: StubServer,
    backend: StubServer,
    nextjs: StubServer,
}

impl Fixture {
    fn fresh() -> Self {
        Self {
            phoenixd: StubServer::start(500),
            backend: StubServer::start(503),
            nextjs: StubServer::start(302),
        }
    }

    fn launchers(&self, dir: &Path) -> (FakeLauncher, FakeLauncher, FakeLauncher) {
        (
            FakeLauncher::new(ServiceName::Phoenixd, &self.phoenixd, dir).healthy_after_spawn(401),
            FakeLauncher::new(ServiceName::Backend, &self.backend, dir).healthy_after_spawn(200),
            FakeLauncher::new(ServiceName::Nextjs, &self.nextjs, dir),
        )
    }
}

fn all(status: ServiceStatus) -> ServiceStatuses {
    ServiceStatuses {
        phoenixd: status,
        backend: status,
        nextjs: status,
    }
}

#[test]
fn fresh_install_starts_services_in_order() {
    let home = tempdir().unwrap();
    let fixture = Fixture::fresh();
    let (phoenixd, backend, nextjs) = fixture.launchers(home.path());
    let pid_files = [phoenixd.pid_file(), backend.pid_file(), nextjs.pid_file()];

    let manager = ServiceManager::with_launchers(
        test_settings(home.path(), RuntimeMode::Production),
        Box::new(phoenixd),
        Box::new(backend),
        Box::new(nextjs),
    );
    let events = manager.subscribe();

    let url = manager.start_all().unwrap();
    let ports = manager.ports().unwrap();

    assert_eq!(url, format!("http://localhost:{}", ports.nextjs));
    assert_eq!(manager.nextjs_url(), Some(url));
    assert_eq!(manager.state(), ManagerState::Running);
    assert_eq!(manager.service_statuses(), all(ServiceStatus::Running));
    assert_eq!(manager.external_services(), ExternalServices::default());

    let received: Vec<_> = events.try_iter().collect();
    assert_eq!(
        received,
        vec![
            ServiceEvent::ServiceStarted {
                service: ServiceName::Phoenixd,
                port: ports.phoenixd,
            },
            ServiceEvent::ServiceStarted {
                service: ServiceName::Backend,
                port: ports.backend,
            },
            ServiceEvent::ServiceStarted {
                service: ServiceName::Nextjs,
                port: ports.nextjs,
            },
            ServiceEvent::AllStarted,
        ]
    );

    let configs = manager.configs().unwrap();
    assert_eq!(configs.ambrosia.http_port, ports.backend);
    assert_eq!(
        configs.ambrosia.phoenixd_url,
        format!("http://127.0.0.1:{}", ports.phoenixd)
    );

    let pids: Vec<u32> = pid_files.iter().map(|path| read_pid(path)).collect();
    manager.stop_all();

    for pid in pids {
        wait_for_process_exit(pid);
    }
    assert_eq!(manager.state(), ManagerState::Stopped);
    assert_eq!(manager.service_statuses(), all(ServiceStatus::Stopped));
    assert_eq!(events.try_iter().last(), Some(ServiceEvent::AllStopped));
}

#[test]
fn running_phoenixd_is_adopted_not_spawned() {
    let home = tempdir().unwrap();
    let fixture = Fixture::fresh();
    fixture.phoenixd.set_status(401);
    let (_, backend, nextjs) = fixture.launchers(home.path());
    let phoenixd = FakeLauncher::new(ServiceName::Phoenixd, &fixture.phoenixd, home.path());
    let phoenixd_spawns = phoenixd.spawn_counter();

    let manager = ServiceManager::with_launchers(
        test_settings(home.path(), RuntimeMode::Production),
        Box::new(phoenixd),
        Box::new(backend),
        Box::new(nextjs),
    );
    let events = manager.subscribe();

    manager.start_all().unwrap();

    assert_eq!(phoenixd_spawns.load(Ordering::SeqCst), 0);
    assert_eq!(
        manager.external_services(),
        ExternalServices {
            phoenixd: true,
            backend: false,
        }
    );
    assert_eq!(manager.ports().unwrap().phoenixd, 9740);
    assert_eq!(
        manager.configs().unwrap().ambrosia.phoenixd_url,
        "http://127.0.0.1:9740"
    );
    assert_eq!(
        events.try_iter().next(),
        Some(ServiceEvent::ServiceStarted {
            service: ServiceName::Phoenixd,
            port: 9740,
        })
    );

    let err = manager.restart_service("phoenixd").unwrap_err();
    assert!(matches!(err, LauncherError::ExternalService(name) if name == "phoenixd"));

    manager.stop_all();
    assert_eq!(phoenixd_spawns.load(Ordering::SeqCst), 0);
    assert_eq!(manager.service_statuses(), all(ServiceStatus::Stopped));
}

#[test]
fn running_backend_is_adopted_and_configs_follow_it() {
    let home = tempdir().unwrap();
    let fixture = Fixture::fresh();
    fixture.backend.set_status(200);

    // Something already owns the default backend port, so allocation moves
    // past it before the running backend is detected there.
    let _occupied = TcpListener::bind(("127.0.0.1", 9154)).ok();
    let mut external = Command::new("sleep")
        .arg("30")
        .stdout(Stdio::null())
        .spawn()
        .unwrap();

    let backend_env = home.path().join("nextjs-backend-port");
    let (phoenixd, _, _) = fixture.launchers(home.path());
    let backend = FakeLauncher::new(ServiceName::Backend, &fixture.backend, home.path());
    let backend_spawns = backend.spawn_counter();
    let nextjs = FakeLauncher::new(ServiceName::Nextjs, &fixture.nextjs, home.path())
        .with_script(&format!(
            "echo \"$BACKEND_PORT\" > '{}'; exec sleep 30",
            backend_env.display()
        ));

    let manager = ServiceManager::with_launchers(
        test_settings(home.path(), RuntimeMode::Production),
        Box::new(phoenixd),
        Box::new(backend),
        Box::new(nextjs),
    );
    let events = manager.subscribe();

    manager.start_all().unwrap();
    let ports = manager.ports().unwrap();

    assert_eq!(backend_spawns.load(Ordering::SeqCst), 0);
    assert_eq!(
        manager.external_services(),
        ExternalServices {
            phoenixd: false,
            backend: true,
        }
    );
    assert_eq!(ports.backend, 9154);

    let phoenix = ConfigRecord::load(&manager.settings().paths.phoenix_config())
        .unwrap()
        .unwrap();
    assert_eq!(
        phoenix.get("webhook"),
        Some("http://127.0.0.1:9154/webhook/phoenixd")
    );
    let ambrosia = ConfigRecord::load(&manager.settings().paths.ambrosia_config())
        .unwrap()
        .unwrap();
    assert_eq!(ambrosia.get("http-port"), Some("9154"));

    let nextjs_pid = read_pid(&home.path().join("nextjs.pid"));
    let deadline = Instant::now() + Duration::from_secs(5);
    let backend_port = loop {
        match fs::read_to_string(&backend_env) {
            Ok(contents) if contents.ends_with('\n') => break contents,
            _ if Instant::now() < deadline => thread::sleep(Duration::from_millis(50)),
            _ => panic!("Next.js never recorded BACKEND_PORT"),
        }
    };
    assert_eq!(backend_port.trim(), "9154");

    let received: Vec<_> = events.try_iter().collect();
    assert!(received.contains(&ServiceEvent::ServiceStarted {
        service: ServiceName::Backend,
        port: 9154,
    }));

    let err = manager.restart_service("backend").unwrap_err();
    assert!(matches!(err, LauncherError::ExternalService(name) if name == "backend"));

    manager.stop_all();
    wait_for_process_exit(nextjs_pid);
    assert!(is_process_alive(external.id()));
    assert_eq!(backend_spawns.load(Ordering::SeqCst), 0);

    external.kill().unwrap();
    external.wait().unwrap();
}

#[test]
fn backend_health_failure_tears_everything_down() {
    let home = tempdir().unwrap();
    let fixture = Fixture::fresh();
    let (phoenixd, _, nextjs) = fixture.launchers(home.path());
    let phoenixd_pid_file = phoenixd.pid_file();
    let backend = FakeLauncher::new(ServiceName::Backend, &fixture.backend, home.path())
        .healthy_after_spawn(500);
    let nextjs_spawns = nextjs.spawn_counter();

    let mut settings = test_settings(home.path(), RuntimeMode::Production);
    settings.health.backend = fast_health(3);
    let manager = ServiceManager::with_launchers(
        settings,
        Box::new(phoenixd),
        Box::new(backend),
        Box::new(nextjs),
    );
    let events = manager.subscribe();

    let err = manager.start_all().unwrap_err();

    assert!(matches!(
        err,
        LauncherError::Process(ProcessError::HealthCheck { ref service, .. }) if service == "backend"
    ));
    assert_eq!(manager.state(), ManagerState::Error);
    assert_eq!(manager.service_statuses(), all(ServiceStatus::Stopped));
    assert_eq!(nextjs_spawns.load(Ordering::SeqCst), 0);

    let phoenixd_pid = read_pid(&phoenixd_pid_file);
    wait_for_process_exit(phoenixd_pid);
    assert!(!is_process_alive(phoenixd_pid));

    let received: Vec<_> = events.try_iter().collect();
    assert!(matches!(
        received.as_slice(),
        [
            ServiceEvent::ServiceStarted {
                service: ServiceName::Phoenixd,
                ..
            },
            ServiceEvent::ServiceError { service: None, .. },
            ServiceEvent::AllStopped,
        ]
    ));
}

#[test]
fn second_start_all_is_rejected() {
    let home = tempdir().unwrap();
    let fixture = Fixture::fresh();
    let (phoenixd, backend, nextjs) = fixture.launchers(home.path());
    let backend_spawns = backend.spawn_counter();

    let manager = ServiceManager::with_launchers(
        test_settings(home.path(), RuntimeMode::Production),
        Box::new(phoenixd),
        Box::new(backend),
        Box::new(nextjs),
    );

    manager.start_all().unwrap();
    let ports = manager.ports();

    let err = manager.start_all().unwrap_err();

    assert!(matches!(err, LauncherError::AlreadyStarted));
    assert_eq!(backend_spawns.load(Ordering::SeqCst), 1);
    assert_eq!(manager.ports(), ports);
    assert_eq!(manager.service_statuses(), all(ServiceStatus::Running));

    manager.stop_all();
}

#[test]
fn stop_all_on_idle_manager_is_noop() {
    let home = tempdir().unwrap();
    let fixture = Fixture::fresh();
    let (phoenixd, backend, nextjs) = fixture.launchers(home.path());
    let manager = ServiceManager::with_launchers(
        test_settings(home.path(), RuntimeMode::Production),
        Box::new(phoenixd),
        Box::new(backend),
        Box::new(nextjs),
    );
    let events = manager.subscribe();

    manager.stop_all();

    assert_eq!(events.try_iter().collect::<Vec<_>>(), vec![ServiceEvent::AllStopped]);
    assert_eq!(manager.state(), ManagerState::Stopped);
}

#[test]
fn restart_replaces_owned_process_on_same_port() {
    let home = tempdir().unwrap();
    let fixture = Fixture::fresh();
    let (phoenixd, backend, nextjs) = fixture.launchers(home.path());
    let backend_pid_file = backend.pid_file();

    let manager = ServiceManager::with_launchers(
        test_settings(home.path(), RuntimeMode::Production),
        Box::new(phoenixd),
        Box::new(backend),
        Box::new(nextjs),
    );
    manager.start_all().unwrap();
    let events = manager.subscribe();
    let before = read_pid(&backend_pid_file);
    let backend_port = manager.ports().unwrap().backend;

    let port = manager.restart_service("backend").unwrap();

    assert_eq!(port, backend_port);
    wait_for_process_exit(before);
    let after = read_pid(&backend_pid_file);
    assert_ne!(before, after);
    assert!(is_process_alive(after));
    assert_eq!(manager.service_statuses().backend, ServiceStatus::Running);
    assert_eq!(
        events.try_iter().collect::<Vec<_>>(),
        vec![ServiceEvent::ServiceRestarted {
            service: ServiceName::Backend
        }]
    );

    assert!(matches!(
        manager.restart_service("redis"),
        Err(LauncherError::UnknownService(_))
    ));

    manager.stop_all();
    wait_for_process_exit(after);
}

#[test]
fn restart_after_stop_all_is_rejected() {
    let home = tempdir().unwrap();
    let fixture = Fixture::fresh();
    let (phoenixd, backend, nextjs) = fixture.launchers(home.path());
    let backend_spawns = backend.spawn_counter();
    let backend_pid_file = backend.pid_file();

    let manager = ServiceManager::with_launchers(
        test_settings(home.path(), RuntimeMode::Production),
        Box::new(phoenixd),
        Box::new(backend),
        Box::new(nextjs),
    );
    manager.start_all().unwrap();
    let backend_pid = read_pid(&backend_pid_file);
    manager.stop_all();
    wait_for_process_exit(backend_pid);

    let err = manager.restart_service("backend").unwrap_err();

    assert!(matches!(err, LauncherError::NotStarted));
    assert_eq!(backend_spawns.load(Ordering::SeqCst), 1);
    assert_eq!(manager.state(), ManagerState::Stopped);
    assert_eq!(manager.service_statuses(), all(ServiceStatus::Stopped));
}

#[test]
fn service_survives_invalid_utf8_output() {
    let home = tempdir().unwrap();
    let fixture = Fixture::fresh();
    let (phoenixd, _, nextjs) = fixture.launchers(home.path());
    let backend = FakeLauncher::new(ServiceName::Backend, &fixture.backend, home.path())
        .healthy_after_spawn(200)
        .with_script(
            "printf 'ok\\n\\377\\376bad\\n'; \
             for i in $(seq 1 30); do echo tick; done; exec sleep 30",
        );
    let backend_pid_file = backend.pid_file();

    let manager = ServiceManager::with_launchers(
        test_settings(home.path(), RuntimeMode::Production),
        Box::new(phoenixd),
        Box::new(backend),
        Box::new(nextjs),
    );
    manager.start_all().unwrap();
    let backend_pid = read_pid(&backend_pid_file);

    thread::sleep(Duration::from_secs(1));

    assert_eq!(manager.service_statuses().backend, ServiceStatus::Running);
    assert!(is_process_alive(backend_pid));
    let log_dir = manager.settings().paths.log_dir();
    let log = fs::read_dir(&log_dir)
        .unwrap()
        .filter_map(Result::ok)
        .find(|entry| entry.file_name().to_string_lossy().starts_with("backend-"))
        .map(|entry| fs::read_to_string(entry.path()).unwrap())
        .unwrap();
    assert!(log.contains("[stdout] ok"));
    assert!(log.contains("bad"));
    assert_eq!(log.matches("[stdout] tick").count(), 30);

    manager.stop_all();
    wait_for_process_exit(backend_pid);
}

#[test]
fn development_mode_starts_only_nextjs() {
    let home = tempdir().unwrap();
    let fixture = Fixture::fresh();
    let (phoenixd, backend, nextjs) = fixture.launchers(home.path());
    let phoenixd_spawns = phoenixd.spawn_counter();
    let backend_spawns = backend.spawn_counter();

    let manager = ServiceManager::with_launchers(
        test_settings(home.path(), RuntimeMode::Development),
        Box::new(phoenixd),
        Box::new(backend),
        Box::new(nextjs),
    );
    let events = manager.subscribe();

    let url = manager.start_all().unwrap();

    assert_eq!(url, "http://localhost:3000");
    assert_eq!(manager.ports(), Some(ServicePorts::DEFAULT));
    assert_eq!(phoenixd_spawns.load(Ordering::SeqCst), 0);
    assert_eq!(backend_spawns.load(Ordering::SeqCst), 0);
    assert_eq!(manager.service_statuses().nextjs, ServiceStatus::Running);
    assert_eq!(
        events.try_iter().collect::<Vec<_>>(),
        vec![
            ServiceEvent::ServiceStarted {
                service: ServiceName::Nextjs,
                port: 3000,
            },
            ServiceEvent::AllStarted,
        ]
    );

    for name in ["phoenixd", "backend"] {
        let err = manager.restart_service(name).unwrap_err();
        assert!(matches!(err, LauncherError::ExternalService(ref service) if service == name));
    }
    assert_eq!(phoenixd_spawns.load(Ordering::SeqCst), 0);
    assert_eq!(backend_spawns.load(Ordering::SeqCst), 0);

    // Configs are still bootstrapped for the developer's backend.
    let record = ConfigRecord::load(&manager.settings().paths.ambrosia_config())
        .unwrap()
        .unwrap();
    assert_eq!(record.get("http-port"), Some("9154"));

    manager.stop_all();
    assert_eq!(manager.service_statuses(), all(ServiceStatus::Stopped));
}

//! Coordinates port allocation, config bootstrap and the three services.
//!
//! The startup chain is strict: phoenixd must be healthy (or adopted as an
//! external instance) before the backend starts, and the backend before
//! Next.js, which is handed the backend's resolved address. A failure at any
//! stage tears down whatever was already started before the error is
//! returned, so a failed `start_all` never leaves a partial session behind.
use std::{
    str::FromStr,
    sync::{Mutex, MutexGuard, mpsc::Receiver},
};

use serde::Serialize;
use strum_macros::{AsRefStr, Display};
use tracing::{error, info, warn};

use crate::{
    bootstrap::ensure_configurations,
    config::LauncherSettings,
    constants::{DEFAULT_BACKEND_PORT, DEFAULT_PHOENIXD_PORT, LOOPBACK_HOST},
    error::LauncherError,
    events::{EventBus, ServiceEvent},
    health::is_healthy,
    ports::{ServicePorts, allocate_ports},
    process::{BackendTarget, LaunchContext, ProcessService, ServiceLauncher, ServiceStatus},
    service_config::ServiceConfigs,
    services::{BackendLauncher, NextJsLauncher, PhoenixdLauncher, ServiceName},
};

/// Lifecycle of the whole subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ManagerState {
    #[default]
    Stopped,
    Starting,
    Running,
    Error,
}

/// Snapshot of every process service's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceStatuses {
    pub phoenixd: ServiceStatus,
    pub backend: ServiceStatus,
    pub nextjs: ServiceStatus,
}

/// Services found already running and left alone. Fixed for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ExternalServices {
    pub phoenixd: bool,
    pub backend: bool,
}

impl ExternalServices {
    pub fn contains(&self, service: ServiceName) -> bool {
        match service {
            ServiceName::Phoenixd => self.phoenixd,
            ServiceName::Backend => self.backend,
            ServiceName::Nextjs => false,
        }
    }
}

#[derive(Debug, Default)]
struct Session {
    state: ManagerState,
    ports: Option<ServicePorts>,
    configs: Option<ServiceConfigs>,
    external: ExternalServices,
}

fn port_of(ports: &ServicePorts, service: ServiceName) -> u16 {
    match service {
        ServiceName::Phoenixd => ports.phoenixd,
        ServiceName::Backend => ports.backend,
        ServiceName::Nextjs => ports.nextjs,
    }
}

fn nextjs_url(port: u16) -> String {
    format!("http://localhost:{port}")
}

/// Owns the three process services and the session state around them.
pub struct ServiceManager {
    settings: LauncherSettings,
    phoenixd: ProcessService,
    backend: ProcessService,
    nextjs: ProcessService,
    session: Mutex<Session>,
    events: EventBus,
}

impl ServiceManager {
    pub fn new(settings: LauncherSettings) -> Self {
        Self::with_launchers(
            settings,
            Box::new(PhoenixdLauncher),
            Box::new(BackendLauncher),
            Box::new(NextJsLauncher),
        )
    }

    /// Builds a manager around custom launchers.
    pub fn with_launchers(
        settings: LauncherSettings,
        phoenixd: Box<dyn ServiceLauncher>,
        backend: Box<dyn ServiceLauncher>,
        nextjs: Box<dyn ServiceLauncher>,
    ) -> Self {
        let phoenixd =
            ProcessService::new(phoenixd, settings.process_options(ServiceName::Phoenixd));
        let backend =
            ProcessService::new(backend, settings.process_options(ServiceName::Backend));
        let nextjs = ProcessService::new(nextjs, settings.process_options(ServiceName::Nextjs));

        Self {
            settings,
            phoenixd,
            backend,
            nextjs,
            session: Mutex::new(Session::default()),
            events: EventBus::new(),
        }
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn service(&self, name: ServiceName) -> &ProcessService {
        match name {
            ServiceName::Phoenixd => &self.phoenixd,
            ServiceName::Backend => &self.backend,
            ServiceName::Nextjs => &self.nextjs,
        }
    }

    pub fn settings(&self) -> &LauncherSettings {
        &self.settings
    }

    /// Registers a new event listener.
    pub fn subscribe(&self) -> Receiver<ServiceEvent> {
        self.events.subscribe()
    }

    /// Starts every service and returns the URL of the web UI.
    pub fn start_all(&self) -> Result<String, LauncherError> {
        {
            let mut session = self.session();
            if matches!(session.state, ManagerState::Running | ManagerState::Starting) {
                return Err(LauncherError::AlreadyStarted);
            }
            session.state = ManagerState::Starting;
            session.external = ExternalServices::default();
        }

        info!("Starting services in {} mode", self.settings.mode);

        match self.run_startup() {
            Ok(url) => {
                self.session().state = ManagerState::Running;
                self.events.emit(ServiceEvent::AllStarted);
                info!("All services started; UI at {url}");
                Ok(url)
            }
            Err(err) => {
                error!("Startup failed: {err}");
                self.events.emit(ServiceEvent::ServiceError {
                    service: None,
                    error: err.to_string(),
                });
                self.stop_all();
                self.session().state = ManagerState::Error;
                Err(err)
            }
        }
    }

    fn run_startup(&self) -> Result<String, LauncherError> {
        let paths = &self.settings.paths;
        let mut ports = allocate_ports(self.settings.mode);
        let configs = ensure_configurations(paths, &ports)?;
        self.record(ports, configs);

        if self.settings.mode.is_development() {
            // phoenixd and the backend are run by the developer.
            self.session().external = ExternalServices {
                phoenixd: true,
                backend: true,
            };
            let target = BackendTarget {
                host: LOOPBACK_HOST.to_string(),
                port: DEFAULT_BACKEND_PORT,
            };
            let port = self.launch(ServiceName::Nextjs, ports.nextjs, Some(target))?;
            return Ok(nextjs_url(port));
        }

        for (name, default_port) in [
            (ServiceName::Phoenixd, DEFAULT_PHOENIXD_PORT),
            (ServiceName::Backend, DEFAULT_BACKEND_PORT),
        ] {
            if self.detect_external(name, default_port) {
                self.mark_external(name);
                self.events.emit(ServiceEvent::ServiceStarted {
                    service: name,
                    port: default_port,
                });

                if port_of(&ports, name) != default_port {
                    match name {
                        ServiceName::Phoenixd => ports.phoenixd = default_port,
                        _ => ports.backend = default_port,
                    }
                    let configs = ensure_configurations(paths, &ports)?;
                    self.record(ports, configs);
                }
            } else {
                self.launch(name, port_of(&ports, name), None)?;
            }
        }

        let target = BackendTarget {
            host: LOOPBACK_HOST.to_string(),
            port: ports.backend,
        };
        let port = self.launch(ServiceName::Nextjs, ports.nextjs, Some(target))?;
        Ok(nextjs_url(port))
    }

    fn record(&self, ports: ServicePorts, configs: ServiceConfigs) {
        let mut session = self.session();
        session.ports = Some(ports);
        session.configs = Some(configs);
    }

    fn mark_external(&self, name: ServiceName) {
        let mut session = self.session();
        match name {
            ServiceName::Phoenixd => session.external.phoenixd = true,
            ServiceName::Backend => session.external.backend = true,
            ServiceName::Nextjs => {}
        }
    }

    /// True when a healthy instance already answers on `default_port`.
    fn detect_external(&self, name: ServiceName, default_port: u16) -> bool {
        let probe = self.service(name).launcher().health_probe(default_port);
        let found = is_healthy(&probe, &self.settings.health.external_probe);
        if found {
            info!("Found running '{name}' on port {default_port}; using it");
        }
        found
    }

    /// Starts one owned service and announces it.
    fn launch(
        &self,
        name: ServiceName,
        port: u16,
        backend: Option<BackendTarget>,
    ) -> Result<u16, LauncherError> {
        let ctx = LaunchContext {
            port,
            mode: self.settings.mode,
            paths: &self.settings.paths,
            resources_dir: &self.settings.resources_dir,
            project_dir: &self.settings.project_dir,
            backend,
        };

        let port = self.service(name).start(&ctx)?;
        self.events.emit(ServiceEvent::ServiceStarted {
            service: name,
            port,
        });
        Ok(port)
    }

    /// Stops every owned service, Next.js first. Never fails.
    pub fn stop_all(&self) {
        let external = self.session().external;
        info!("Stopping all services");

        for name in [ServiceName::Nextjs, ServiceName::Backend, ServiceName::Phoenixd] {
            if external.contains(name) {
                info!("Leaving external '{name}' running");
                continue;
            }
            if let Err(err) = self.service(name).stop() {
                error!("Failed to stop '{name}': {err}");
            }
        }

        self.session().state = ManagerState::Stopped;
        self.events.emit(ServiceEvent::AllStopped);
    }

    /// Stops and starts one owned service on its previously allocated port.
    pub fn restart_service(&self, name: &str) -> Result<u16, LauncherError> {
        let service =
            ServiceName::from_str(name).map_err(|_| LauncherError::UnknownService(name.into()))?;

        let (ports, external) = {
            let session = self.session();
            let ports = match (session.state, session.ports) {
                (ManagerState::Running, Some(ports)) => ports,
                _ => return Err(LauncherError::NotStarted),
            };
            (ports, session.external)
        };

        if external.contains(service) {
            warn!("Refusing to restart external '{service}'");
            return Err(LauncherError::ExternalService(service.to_string()));
        }

        info!("Restarting '{service}'");
        match self.restart_owned(service, &ports) {
            Ok(port) => {
                self.events
                    .emit(ServiceEvent::ServiceRestarted { service });
                Ok(port)
            }
            Err(err) => {
                error!("Failed to restart '{service}': {err}");
                self.events.emit(ServiceEvent::ServiceError {
                    service: Some(service),
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    fn restart_owned(&self, name: ServiceName, ports: &ServicePorts) -> Result<u16, LauncherError> {
        self.service(name).stop()?;

        let backend = (name == ServiceName::Nextjs).then(|| BackendTarget {
            host: LOOPBACK_HOST.to_string(),
            port: if self.settings.mode.is_development() {
                DEFAULT_BACKEND_PORT
            } else {
                ports.backend
            },
        });

        let ctx = LaunchContext {
            port: port_of(ports, name),
            mode: self.settings.mode,
            paths: &self.settings.paths,
            resources_dir: &self.settings.resources_dir,
            project_dir: &self.settings.project_dir,
            backend,
        };
        Ok(self.service(name).start(&ctx)?)
    }

    pub fn service_statuses(&self) -> ServiceStatuses {
        ServiceStatuses {
            phoenixd: self.phoenixd.status(),
            backend: self.backend.status(),
            nextjs: self.nextjs.status(),
        }
    }

    pub fn external_services(&self) -> ExternalServices {
        self.session().external
    }

    pub fn ports(&self) -> Option<ServicePorts> {
        self.session().ports
    }

    pub fn configs(&self) -> Option<ServiceConfigs> {
        self.session().configs.clone()
    }

    pub fn state(&self) -> ManagerState {
        self.session().state
    }

    /// URL of the web UI while the session is running.
    pub fn nextjs_url(&self) -> Option<String> {
        let session = self.session();
        match (session.state, session.ports) {
            (ManagerState::Running, Some(ports)) => Some(nextjs_url(ports.nextjs)),
            _ => None,
        }
    }
}

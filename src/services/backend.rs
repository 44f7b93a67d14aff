use std::{ffi::OsString, path::PathBuf};

use crate::{
    error::ProcessError,
    health::HealthProbe,
    process::{CommandSpec, LaunchContext, ServiceLauncher},
    runtime::RuntimeMode,
};

use super::{ServiceName, executable};

const JAR_NAME: &str = "ambrosia.jar";

/// Launches the Kotlin backend jar. The port comes from `ambrosia.conf`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BackendLauncher;

impl ServiceLauncher for BackendLauncher {
    fn name(&self) -> ServiceName {
        ServiceName::Backend
    }

    fn command(&self, ctx: &LaunchContext<'_>) -> Result<CommandSpec, ProcessError> {
        let (java, jar): (OsString, PathBuf) = match ctx.mode {
            RuntimeMode::Development => (
                executable("java").into(),
                ctx.project_dir
                    .join("server")
                    .join("build")
                    .join("libs")
                    .join(JAR_NAME),
            ),
            RuntimeMode::Production => (
                ctx.resources_dir
                    .join("jre")
                    .join("bin")
                    .join(executable("java"))
                    .into_os_string(),
                ctx.resources_dir.join("backend").join(JAR_NAME),
            ),
        };

        let data_dir = ctx.paths.ambrosia_dir();

        Ok(CommandSpec::new(java)
            .arg("-jar")
            .arg(jar)
            .current_dir(data_dir)
            .env("AMBROSIA_DATA_DIR", data_dir.to_string_lossy()))
    }

    fn health_probe(&self, port: u16) -> HealthProbe {
        HealthProbe::backend(port)
    }
}

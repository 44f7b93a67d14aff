use std::ffi::OsString;

use crate::{
    constants::LOOPBACK_HOST,
    error::ProcessError,
    health::HealthProbe,
    process::{CommandSpec, LaunchContext, ServiceLauncher},
    runtime::RuntimeMode,
};

use super::{ServiceName, executable};

/// Launches phoenixd bound to loopback with its data in `~/.phoenix`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PhoenixdLauncher;

impl ServiceLauncher for PhoenixdLauncher {
    fn name(&self) -> ServiceName {
        ServiceName::Phoenixd
    }

    fn command(&self, ctx: &LaunchContext<'_>) -> Result<CommandSpec, ProcessError> {
        let program: OsString = match ctx.mode {
            RuntimeMode::Development => executable("phoenixd").into(),
            RuntimeMode::Production => ctx
                .resources_dir
                .join("phoenixd")
                .join(executable("phoenixd"))
                .into_os_string(),
        };

        let data_dir = ctx.paths.phoenix_dir();

        Ok(CommandSpec::new(program)
            .arg("--agree-to-terms-of-service")
            .arg("--http-bind-ip")
            .arg(LOOPBACK_HOST)
            .arg("--http-bind-port")
            .arg(ctx.port.to_string())
            .arg("--datadir")
            .arg(data_dir)
            .current_dir(data_dir))
    }

    fn health_probe(&self, port: u16) -> HealthProbe {
        HealthProbe::phoenixd(port)
    }
}

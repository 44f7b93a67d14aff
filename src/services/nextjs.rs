use std::ffi::OsString;

use crate::{
    constants::LOOPBACK_HOST,
    error::ProcessError,
    health::HealthProbe,
    process::{CommandSpec, LaunchContext, ServiceLauncher},
    runtime::RuntimeMode,
};

use super::ServiceName;

/// Launches the web UI: `npm run dev` in a checkout, the standalone
/// `server.js` with the bundled Node runtime otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct NextJsLauncher;

fn npm() -> &'static str {
    if cfg!(windows) { "npm.cmd" } else { "npm" }
}

impl ServiceLauncher for NextJsLauncher {
    fn name(&self) -> ServiceName {
        ServiceName::Nextjs
    }

    fn command(&self, ctx: &LaunchContext<'_>) -> Result<CommandSpec, ProcessError> {
        let Some(backend) = ctx.backend.as_ref() else {
            return Err(ProcessError::Launch {
                service: self.name().to_string(),
                reason: "backend address is not known".to_string(),
            });
        };

        let spec = match ctx.mode {
            RuntimeMode::Development => CommandSpec::new(npm())
                .args(["run", "dev"])
                .current_dir(ctx.project_dir.join("client")),
            RuntimeMode::Production => {
                let node: OsString = if cfg!(windows) {
                    ctx.resources_dir.join("node").join("node.exe").into()
                } else {
                    ctx.resources_dir.join("node").join("bin").join("node").into()
                };
                let client_dir = ctx.resources_dir.join("client");
                CommandSpec::new(node)
                    .arg(client_dir.join("server.js"))
                    .current_dir(client_dir)
            }
        };

        Ok(spec
            .env("PORT", ctx.port.to_string())
            .env("HOSTNAME", LOOPBACK_HOST)
            .env("BACKEND_HOST", backend.host.as_str())
            .env("BACKEND_PORT", backend.port.to_string())
            .env("NODE_ENV", ctx.mode.as_str())
            .env("NEXT_TELEMETRY_DISABLED", "1"))
    }

    fn health_probe(&self, port: u16) -> HealthProbe {
        HealthProbe::nextjs(port)
    }
}

//! TCP port allocation for the managed services.
use std::{
    io,
    net::{SocketAddr, TcpListener},
    ops::Range,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    constants::{
        BACKEND_PORT_RANGE, DEFAULT_BACKEND_PORT, DEFAULT_NEXTJS_PORT,
        DEFAULT_PHOENIXD_PORT, NEXTJS_PORT_RANGE, PHOENIXD_PORT_RANGE,
    },
    runtime::RuntimeMode,
};

/// Ports assigned to the three services for one launcher session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePorts {
    pub phoenixd: u16,
    pub backend: u16,
    pub nextjs: u16,
}

impl ServicePorts {
    /// The well-known ports used in development and as the fail-safe.
    pub const DEFAULT: ServicePorts = ServicePorts {
        phoenixd: DEFAULT_PHOENIXD_PORT,
        backend: DEFAULT_BACKEND_PORT,
        nextjs: DEFAULT_NEXTJS_PORT,
    };
}

impl Default for ServicePorts {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Allocates ports, probing the local interface for free ones in production.
pub fn allocate_ports(mode: RuntimeMode) -> ServicePorts {
    allocate_ports_with(mode, is_port_available)
}

/// Allocates ports with a caller-supplied availability probe.
///
/// Development mode returns [`ServicePorts::DEFAULT`] without probing. In
/// production any probing failure falls back to the full default triple so a
/// partially allocated set is never returned.
pub fn allocate_ports_with<F>(mode: RuntimeMode, mut probe: F) -> ServicePorts
where
    F: FnMut(u16) -> io::Result<bool>,
{
    if mode.is_development() {
        debug!("Development mode: using fixed ports {:?}", ServicePorts::DEFAULT);
        return ServicePorts::DEFAULT;
    }

    match probe_all(&mut probe) {
        Ok(ports) => {
            info!(
                "Allocated ports: phoenixd={}, backend={}, nextjs={}",
                ports.phoenixd, ports.backend, ports.nextjs
            );
            ports
        }
        Err(err) => {
            warn!("Port allocation failed ({err}); falling back to default ports");
            ServicePorts::DEFAULT
        }
    }
}

fn probe_all<F>(probe: &mut F) -> io::Result<ServicePorts>
where
    F: FnMut(u16) -> io::Result<bool>,
{
    let mut taken = Vec::with_capacity(3);
    let phoenixd = find_free_port(PHOENIXD_PORT_RANGE, &taken, probe)?;
    taken.push(phoenixd);
    let backend = find_free_port(BACKEND_PORT_RANGE, &taken, probe)?;
    taken.push(backend);
    let nextjs = find_free_port(NEXTJS_PORT_RANGE, &taken, probe)?;

    Ok(ServicePorts {
        phoenixd,
        backend,
        nextjs,
    })
}

fn find_free_port<F>(range: Range<u16>, taken: &[u16], probe: &mut F) -> io::Result<u16>
where
    F: FnMut(u16) -> io::Result<bool>,
{
    let (start, end) = (range.start, range.end);
    for port in range {
        if taken.contains(&port) {
            continue;
        }
        if probe(port)? {
            debug!("Port {port} is free");
            return Ok(port);
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AddrInUse,
        format!("no free port in range {start}-{}", end.saturating_sub(1)),
    ))
}

/// Bind-and-release check on the loopback interface.
pub fn is_port_available(port: u16) -> io::Result<bool> {
    match TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], port))) {
        Ok(_) => Ok(true),
        Err(err)
            if matches!(
                err.kind(),
                io::ErrorKind::AddrInUse | io::ErrorKind::PermissionDenied
            ) =>
        {
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

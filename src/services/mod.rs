//! The three programs the launcher manages.
use std::env::consts::EXE_SUFFIX;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use crate::process::{ProcessOptions, ProcessService};

mod backend;
mod nextjs;
mod phoenixd;

pub use backend::BackendLauncher;
pub use nextjs::NextJsLauncher;
pub use phoenixd::PhoenixdLauncher;

/// Identifier of a managed service.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ServiceName {
    Phoenixd,
    Backend,
    Nextjs,
}

/// `name` with the platform executable suffix appended.
pub(crate) fn executable(name: &str) -> String {
    format!("{name}{EXE_SUFFIX}")
}

/// The Lightning node.
pub fn phoenixd_service(options: ProcessOptions) -> ProcessService {
    ProcessService::new(Box::new(PhoenixdLauncher), options)
}

/// The Java backend.
pub fn backend_service(options: ProcessOptions) -> ProcessService {
    ProcessService::new(Box::new(BackendLauncher), options)
}

/// The Next.js web UI.
pub fn nextjs_service(options: ProcessOptions) -> ProcessService {
    ProcessService::new(Box::new(NextJsLauncher), options)
}

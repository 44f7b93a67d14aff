//! Ambrosia launcher starts, supervises and stops the services behind the Ambrosia
//! point-of-sale desktop app: the phoenixd Lightning node, the Kotlin backend and
//! the Next.js web UI. It allocates their ports, bootstraps their shared
//! configuration files on first run and tears every process tree down again on
//! failure or shutdown.

/// First-run creation and refresh of the service configuration files.
pub mod bootstrap;

/// CLI interface.
pub mod cli;

/// Launcher settings.
pub mod config;

/// Well-known ports, paths and timings.
pub mod constants;

/// Error handling.
pub mod error;

/// Lifecycle notifications.
pub mod events;

/// HTTP health probes.
pub mod health;

/// Per-day service log files.
pub mod logs;

/// Orchestration of the whole service set.
pub mod manager;

/// Port allocation.
pub mod ports;

/// Single supervised process.
pub mod process;

/// Launch modes and on-disk locations.
pub mod runtime;

/// Recovery phrase and random secret generation.
pub mod secrets;

/// `key=value` configuration records.
pub mod service_config;

/// The managed programs.
pub mod services;

/// Process-tree signalling.
pub mod termination;

#[cfg(test)]
pub(crate) mod test_utils;

//! Constants and default values for the launcher.
//!
//! Centralizes the well-known ports, probe ranges, file names and timing
//! values used across port allocation, bootstrap and process supervision.

use std::{ops::Range, time::Duration};

// ============================================================================
// Ports
// ============================================================================

/// Well-known phoenixd HTTP port.
pub const DEFAULT_PHOENIXD_PORT: u16 = 9740;

/// Well-known backend HTTP port.
pub const DEFAULT_BACKEND_PORT: u16 = 9154;

/// Well-known Next.js port.
pub const DEFAULT_NEXTJS_PORT: u16 = 3000;

/// Search range for a free phoenixd port in production.
pub const PHOENIXD_PORT_RANGE: Range<u16> = 9740..9800;

/// Search range for a free backend port in production.
pub const BACKEND_PORT_RANGE: Range<u16> = 9154..9200;

/// Search range for a free Next.js port in production.
pub const NEXTJS_PORT_RANGE: Range<u16> = 3000..3100;

/// Loopback host every service binds to and is probed on.
pub const LOOPBACK_HOST: &str = "127.0.0.1";

// ============================================================================
// File System Constants
// ============================================================================

/// Data directory of the POS backend, relative to the user's home.
pub const AMBROSIA_DIR_NAME: &str = ".Ambrosia-POS";

/// Data directory of phoenixd, relative to the user's home.
pub const PHOENIX_DIR_NAME: &str = ".phoenix";

/// Backend configuration file name.
pub const AMBROSIA_CONFIG_FILE: &str = "ambrosia.conf";

/// phoenixd configuration file name.
pub const PHOENIX_CONFIG_FILE: &str = "phoenix.conf";

/// Optional YAML launcher settings, stored in the Ambrosia data directory.
pub const SETTINGS_FILE_NAME: &str = "launcher.yaml";

/// Sub-directory of the Ambrosia data directory holding service logs.
pub const LOG_DIR_NAME: &str = "logs";

// ============================================================================
// Health Check Timing
// ============================================================================

/// Attempts made before a health check gives up.
pub const HEALTH_MAX_ATTEMPTS: u32 = 60;

/// Delay between health check attempts.
pub const HEALTH_INTERVAL: Duration = Duration::from_secs(1);

/// Timeout of a single health check request.
pub const HEALTH_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Progress is logged on every n-th attempt.
pub const HEALTH_LOG_EVERY: u32 = 10;

/// Attempts used when probing for an already running external instance.
pub const EXTERNAL_PROBE_ATTEMPTS: u32 = 1;

/// Request timeout used when probing for an external instance.
pub const EXTERNAL_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// Process Management Timing
// ============================================================================

/// Time a process tree gets to exit after SIGTERM before SIGKILL is forced.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Extra time allowed for the kernel to reap a tree after SIGKILL.
pub const KILL_GRACE: Duration = Duration::from_secs(2);

/// Polling interval while waiting for a process to exit.
pub const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Polling interval of the background exit watcher.
pub const WATCHER_INTERVAL: Duration = Duration::from_millis(200);

// ============================================================================
// Generated Configuration Values
// ============================================================================

/// Random bytes behind each generated phoenixd password or webhook secret.
pub const RANDOM_SECRET_BYTES: usize = 32;

/// Entropy for the backend mnemonic (12 words).
pub const MNEMONIC_ENTROPY_BYTES: usize = 16;

/// Path phoenixd posts payment webhooks to on the backend.
pub const WEBHOOK_PATH: &str = "/webhook/phoenixd";

/// Default phoenixd liquidity policy.
pub const DEFAULT_AUTO_LIQUIDITY: &str = "off";

/// Default phoenixd mining fee cap in satoshis.
pub const DEFAULT_MAX_MINING_FEE: &str = "5000";

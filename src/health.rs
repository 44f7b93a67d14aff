//! HTTP readiness polling for spawned services.
use std::{thread, time::Duration};

use reqwest::{StatusCode, blocking::Client, redirect::Policy};
use tracing::{debug, info};

use crate::{
    constants::{
        EXTERNAL_PROBE_ATTEMPTS, EXTERNAL_PROBE_TIMEOUT, HEALTH_INTERVAL, HEALTH_LOG_EVERY,
        HEALTH_MAX_ATTEMPTS, HEALTH_REQUEST_TIMEOUT, LOOPBACK_HOST,
    },
    error::HealthCheckError,
};

/// Which HTTP statuses count as healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusRule {
    /// Any 2xx.
    Success,
    /// 2xx, or 401 from an endpoint that requires credentials.
    SuccessOrUnauthorized,
    /// Anything in `[200, 400)`.
    SuccessOrRedirect,
}

impl StatusRule {
    pub fn accepts(&self, status: StatusCode) -> bool {
        match self {
            StatusRule::Success => status.is_success(),
            StatusRule::SuccessOrUnauthorized => {
                status.is_success() || status == StatusCode::UNAUTHORIZED
            }
            StatusRule::SuccessOrRedirect => status.is_success() || status.is_redirection(),
        }
    }
}

/// An endpoint to poll and the rule its response is judged by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthProbe {
    pub url: String,
    pub rule: StatusRule,
}

impl HealthProbe {
    pub fn new(url: impl Into<String>, rule: StatusRule) -> Self {
        Self {
            url: url.into(),
            rule,
        }
    }

    /// phoenixd: `GET /getinfo`; 401 proves it is up and routing.
    pub fn phoenixd(port: u16) -> Self {
        Self::new(
            format!("http://{LOOPBACK_HOST}:{port}/getinfo"),
            StatusRule::SuccessOrUnauthorized,
        )
    }

    /// Backend: `GET /api/health`.
    pub fn backend(port: u16) -> Self {
        Self::new(
            format!("http://{LOOPBACK_HOST}:{port}/api/health"),
            StatusRule::Success,
        )
    }

    /// Next.js: `GET /`, redirects included.
    pub fn nextjs(port: u16) -> Self {
        Self::new(
            format!("http://{LOOPBACK_HOST}:{port}/"),
            StatusRule::SuccessOrRedirect,
        )
    }
}

/// Retry budget for one health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthCheckOptions {
    pub max_attempts: u32,
    pub interval: Duration,
    pub request_timeout: Duration,
}

impl Default for HealthCheckOptions {
    fn default() -> Self {
        Self {
            max_attempts: HEALTH_MAX_ATTEMPTS,
            interval: HEALTH_INTERVAL,
            request_timeout: HEALTH_REQUEST_TIMEOUT,
        }
    }
}

impl HealthCheckOptions {
    /// Single quick attempt used to detect an instance that is already running.
    pub fn external_probe() -> Self {
        Self {
            max_attempts: EXTERNAL_PROBE_ATTEMPTS,
            interval: Duration::ZERO,
            request_timeout: EXTERNAL_PROBE_TIMEOUT,
        }
    }
}

fn build_client(options: &HealthCheckOptions) -> Result<Client, HealthCheckError> {
    Ok(Client::builder()
        .timeout(options.request_timeout)
        .redirect(Policy::none())
        .build()?)
}

/// Performs a single request, returning the response status.
fn perform_health_check(client: &Client, url: &str) -> Result<StatusCode, reqwest::Error> {
    Ok(client.get(url).send()?.status())
}

/// Polls `probe` until it answers with an acceptable status.
pub fn wait_for_healthy(
    probe: &HealthProbe,
    options: &HealthCheckOptions,
) -> Result<(), HealthCheckError> {
    wait_for_healthy_while(probe, options, || true)
}

/// Like [`wait_for_healthy`] but gives up early once `alive` reports that the
/// probed process is gone.
pub fn wait_for_healthy_while<F>(
    probe: &HealthProbe,
    options: &HealthCheckOptions,
    mut alive: F,
) -> Result<(), HealthCheckError>
where
    F: FnMut() -> bool,
{
    let client = build_client(options)?;
    let attempts = options.max_attempts.max(1);

    for attempt in 1..=attempts {
        match perform_health_check(&client, &probe.url) {
            Ok(status) if probe.rule.accepts(status) => {
                debug!("{} healthy ({status}) on attempt {attempt}", probe.url);
                return Ok(());
            }
            Ok(status) => {
                debug!("{} answered {status} on attempt {attempt}", probe.url);
            }
            Err(err) => {
                debug!("{} unreachable on attempt {attempt}: {err}", probe.url);
            }
        }

        if attempt % HEALTH_LOG_EVERY == 0 {
            info!(
                "Still waiting for {} (attempt {attempt}/{attempts})",
                probe.url
            );
        }

        if !alive() {
            return Err(HealthCheckError::ProcessExited {
                url: probe.url.clone(),
            });
        }

        if attempt != attempts {
            thread::sleep(options.interval);
        }
    }

    Err(HealthCheckError::TimedOut {
        url: probe.url.clone(),
        attempts,
    })
}

/// True when `probe` is healthy within `options`; errors count as unhealthy.
pub fn is_healthy(probe: &HealthProbe, options: &HealthCheckOptions) -> bool {
    wait_for_healthy(probe, options).is_ok()
}

pub fn check_phoenixd(port: u16, options: &HealthCheckOptions) -> Result<(), HealthCheckError> {
    wait_for_healthy(&HealthProbe::phoenixd(port), options)
}

pub fn check_backend(port: u16, options: &HealthCheckOptions) -> Result<(), HealthCheckError> {
    wait_for_healthy(&HealthProbe::backend(port), options)
}

pub fn check_nextjs(port: u16, options: &HealthCheckOptions) -> Result<(), HealthCheckError> {
    wait_for_healthy(&HealthProbe::nextjs(port), options)
}

//! Lifecycle notifications published by the service manager.
use std::{
    fmt,
    sync::{
        Mutex,
        mpsc::{self, Receiver, Sender},
    },
};

use serde::Serialize;
use tracing::debug;

use crate::services::ServiceName;

/// A lifecycle notification. Serializes as `{"event": "service:started", ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event")]
pub enum ServiceEvent {
    #[serde(rename = "service:started")]
    ServiceStarted { service: ServiceName, port: u16 },

    #[serde(rename = "service:restarted")]
    ServiceRestarted { service: ServiceName },

    /// `service` is `None` when the failure is not tied to one service.
    #[serde(rename = "service:error")]
    ServiceError {
        service: Option<ServiceName>,
        error: String,
    },

    #[serde(rename = "all:started")]
    AllStarted,

    #[serde(rename = "all:stopped")]
    AllStopped,
}

impl ServiceEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServiceEvent::ServiceStarted { .. } => "service:started",
            ServiceEvent::ServiceRestarted { .. } => "service:restarted",
            ServiceEvent::ServiceError { .. } => "service:error",
            ServiceEvent::AllStarted => "all:started",
            ServiceEvent::AllStopped => "all:stopped",
        }
    }
}

impl fmt::Display for ServiceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceEvent::ServiceStarted { service, port } => {
                write!(f, "{service} started on port {port}")
            }
            ServiceEvent::ServiceRestarted { service } => write!(f, "{service} restarted"),
            ServiceEvent::ServiceError {
                service: Some(service),
                error,
            } => write!(f, "{service} error: {error}"),
            ServiceEvent::ServiceError {
                service: None,
                error,
            } => write!(f, "error: {error}"),
            ServiceEvent::AllStarted => f.write_str("all services started"),
            ServiceEvent::AllStopped => f.write_str("all services stopped"),
        }
    }
}

/// Fan-out of events to every live subscriber.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<ServiceEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<ServiceEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(tx);
        rx
    }

    /// Delivers `event` to all subscribers, dropping those that hung up.
    pub fn emit(&self, event: ServiceEvent) {
        debug!("Event {}: {event}", event.name());
        self.subscribers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

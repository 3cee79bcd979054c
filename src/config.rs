//! Runtime configuration for the streaming endpoints.

use std::time::Duration;

pub const DEFAULT_POSITION_PERIOD: Duration = Duration::from_secs(2);
pub const DEFAULT_HEARTBEAT_PERIOD: Duration = Duration::from_secs(5);
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Which browser origins may open a stream.
///
/// Requests without an `Origin` header are never rejected; only browsers send
/// one, and other clients are not subject to the same-origin model.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum OriginPolicy {
    #[default]
    AllowAny,
    AllowList(Vec<String>),
}

impl OriginPolicy {
    /// An empty list means any origin is accepted.
    pub fn from_origins(origins: Vec<String>) -> Self {
        if origins.is_empty() {
            OriginPolicy::AllowAny
        } else {
            OriginPolicy::AllowList(origins)
        }
    }

    pub fn permits(&self, origin: Option<&str>) -> bool {
        match (self, origin) {
            (OriginPolicy::AllowAny, _) | (_, None) => true,
            (OriginPolicy::AllowList(allowed), Some(origin)) => {
                let origin = origin.trim_end_matches('/');
                allowed
                    .iter()
                    .any(|a| a.trim_end_matches('/').eq_ignore_ascii_case(origin))
            }
        }
    }
}

/// Timing of a single session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSettings {
    /// Time between two ticks. The first tick fires one period after start.
    pub period: Duration,
    /// Upper bound on a single frame write.
    pub send_timeout: Duration,
}

/// Settings handed to every stream handler.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub position_period: Duration,
    pub heartbeat_period: Duration,
    pub send_timeout: Duration,
    pub origin_policy: OriginPolicy,
}

impl StreamConfig {
    pub fn positions(&self) -> SessionSettings {
        SessionSettings {
            period: self.position_period,
            send_timeout: self.send_timeout,
        }
    }

    pub fn heartbeat(&self) -> SessionSettings {
        SessionSettings {
            period: self.heartbeat_period,
            send_timeout: self.send_timeout,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            position_period: DEFAULT_POSITION_PERIOD,
            heartbeat_period: DEFAULT_HEARTBEAT_PERIOD,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            origin_policy: OriginPolicy::AllowAny,
        }
    }
}

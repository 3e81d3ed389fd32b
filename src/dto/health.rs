//! Health endpoint payload.

use std::time::SystemTime;

use serde::Serialize;
use utoipa::ToSchema;

use crate::dto::format_system_time;

const SERVICE_NAME: &str = "planning-poker-back";

/// Health response returned by the `/health` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Name of the reporting service.
    pub service: String,
    /// RFC 3339 timestamp of the probe.
    pub timestamp: String,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok() -> Self {
        Self::with_status("ok")
    }

    /// Create a health response indicating the system is in degraded mode.
    pub fn degraded() -> Self {
        Self::with_status("degraded")
    }

    fn with_status(status: &str) -> Self {
        Self {
            status: status.to_owned(),
            service: SERVICE_NAME.to_owned(),
            timestamp: format_system_time(SystemTime::now()),
        }
    }
}

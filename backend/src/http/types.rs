// HTTP response payload types.

use serde::Serialize;

use ping_core::status::{Indicator, StatusValue};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub schema_version: &'static str,
    pub timestamp_ms: u64,
    pub status: StatusValue,
    pub label: String,
    pub indicator: Indicator,
}

impl StatusResponse {
    pub fn from_status(status: StatusValue, timestamp_ms: u64) -> Self {
        Self {
            schema_version: crate::constants::SCHEMA_VERSION,
            timestamp_ms,
            label: status.label(),
            indicator: status.indicator(),
            status,
        }
    }
}

#[derive(Serialize)]
pub struct ToggleResponse {
    pub enabled: bool,
    pub status: StatusValue,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// Mumble UDP ping codec.
// Invariants: no I/O; responses are accepted only at exactly PROBE_RESPONSE_LEN bytes.

use thiserror::Error;

use crate::model::{ProbeResponse, Version};

pub const PROBE_REQUEST: [u8; PROBE_REQUEST_LEN] = [0, 0, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8];
pub const PROBE_REQUEST_LEN: usize = 12;
pub const PROBE_RESPONSE_LEN: usize = 24;

const VERSION_OFFSET: usize = 1;
const USERS_OFFSET: usize = 12;
const MAX_USERS_OFFSET: usize = 16;
const BANDWIDTH_OFFSET: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed ping response: expected 24 bytes, got {len}")]
    MalformedResponse { len: usize },
}

pub fn encode_probe_request() -> [u8; PROBE_REQUEST_LEN] {
    PROBE_REQUEST
}

pub fn decode_probe_response(payload: &[u8]) -> Result<ProbeResponse, DecodeError> {
    if payload.len() != PROBE_RESPONSE_LEN {
        return Err(DecodeError::MalformedResponse { len: payload.len() });
    }

    let version = Version::new(
        payload[VERSION_OFFSET],
        payload[VERSION_OFFSET + 1],
        payload[VERSION_OFFSET + 2],
    );

    Ok(ProbeResponse {
        version,
        users: read_u32_be(payload, USERS_OFFSET),
        max_users: read_u32_be(payload, MAX_USERS_OFFSET),
        bandwidth: read_u32_be(payload, BANDWIDTH_OFFSET),
    })
}

// Callers guarantee offset + 4 <= PROBE_RESPONSE_LEN.
fn read_u32_be(payload: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&payload[offset..offset + 4]);
    u32::from_be_bytes(bytes)
}

/// Builds a response datagram the way a Mumble server lays it out. The
/// identifier echo at bytes 4..12 is copied from the request.
pub fn encode_probe_response(response: &ProbeResponse) -> [u8; PROBE_RESPONSE_LEN] {
    let mut out = [0u8; PROBE_RESPONSE_LEN];
    out[VERSION_OFFSET] = response.version.major;
    out[VERSION_OFFSET + 1] = response.version.minor;
    out[VERSION_OFFSET + 2] = response.version.patch;
    out[4..USERS_OFFSET].copy_from_slice(&PROBE_REQUEST[4..]);
    out[USERS_OFFSET..USERS_OFFSET + 4].copy_from_slice(&response.users.to_be_bytes());
    out[MAX_USERS_OFFSET..MAX_USERS_OFFSET + 4].copy_from_slice(&response.max_users.to_be_bytes());
    out[BANDWIDTH_OFFSET..BANDWIDTH_OFFSET + 4].copy_from_slice(&response.bandwidth.to_be_bytes());
    out
}

// Shared constants for settings defaults, bounds, and the status surface.

pub const SCHEMA_VERSION: &str = "1.0";
pub const DEFAULT_MUMBLE_HOST: &str = "localhost";
pub const DEFAULT_MUMBLE_PORT: u16 = 64738;
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 120;
pub const MIN_REFRESH_INTERVAL_SECS: u64 = 1;
pub const MAX_REFRESH_INTERVAL_SECS: u64 = 3600;
pub const DEFAULT_HTTP_BIND: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 10087;
// Larger than a valid response so oversized datagrams are not truncated into a match.
pub const PROBE_RECV_BUFFER: usize = 64;

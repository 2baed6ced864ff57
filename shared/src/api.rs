// ============================================================================
// Calendar server endpoints
// ============================================================================

/// Lightweight authenticated-status endpoint used to probe a server
pub const AUTH_ME_PATH: &str = "/api/auth/me";

/// Event list for the signed-in user
pub const EVENTS_PATH: &str = "/api/events";

/// Join a base URL and an absolute API path without doubling the slash.
pub fn endpoint_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

pub fn auth_me_url(base: &str) -> String {
    endpoint_url(base, AUTH_ME_PATH)
}

pub fn events_url(base: &str) -> String {
    endpoint_url(base, EVENTS_PATH)
}

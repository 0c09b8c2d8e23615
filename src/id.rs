//! ID generation utilities for toolpilot
//!
//! Provides functions for generating identifiers for loop sessions and tool invocations.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Generate a unique session ID
///
/// Format: `ses-{timestamp_ms}-{random_hex}`
/// Example: `ses-1738300800123-a1b2`
pub fn generate_session_id() -> String {
    let timestamp = now_ms();
    let random: u16 = rand::rng().random();
    format!("ses-{}-{:04x}", timestamp, random)
}

/// Generate an ID for an authenticated gateway session
///
/// Format: `gws-{timestamp_ms}-{random_hex}`
pub fn generate_gateway_session_id() -> String {
    let timestamp = now_ms();
    let random: u16 = rand::rng().random();
    format!("gws-{}-{:04x}", timestamp, random)
}

/// Generate an invocation ID for a tool call
///
/// Format: `inv-{iteration}-{index}-{random_hex}`
///
/// The iteration/index pair already makes the id unique inside one
/// conversation; the random suffix keeps ids distinct across sessions.
pub fn generate_invocation_id(iteration: u32, index: usize) -> String {
    let random: u32 = rand::rng().random();
    format!("inv-{}-{}-{:08x}", iteration, index, random)
}

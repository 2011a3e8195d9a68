//! ID generation utilities for reconcilr
//!
//! Provides identifiers for batch runs and for the opaque keys that tag
//! outbound lookup queries.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Generate a unique batch run ID
///
/// Format: `batch-{timestamp_ms}-{random_hex}`
/// Example: `batch-1738300800123-a1b2`
pub fn generate_batch_id() -> String {
    let timestamp = now_ms();
    let random: u16 = rand::rng().random();
    format!("batch-{}-{:04x}", timestamp, random)
}

/// Generate the opaque key a single reconciliation query is filed under
///
/// Format: `q{random_hex}`
pub fn generate_query_key() -> String {
    let random: u32 = rand::rng().random();
    format!("q{:08x}", random)
}

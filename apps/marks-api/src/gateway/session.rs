//! Per-connection gateway session state.

use std::sync::atomic::{AtomicU64, Ordering};

/// State for a single WebSocket connection.
pub struct GatewaySession {
    /// Unique session identifier (`gw_` prefixed ULID).
    pub session_id: String,
    /// Owner whose bookmark changes this session receives.
    pub user_id: String,
    pub email: Option<String>,
    /// Monotonically increasing sequence number for dispatch events.
    seq: AtomicU64,
}

impl GatewaySession {
    pub fn new(session_id: String, user_id: String, email: Option<String>) -> Self {
        Self {
            session_id,
            user_id,
            email,
            seq: AtomicU64::new(0),
        }
    }

    /// Get the next sequence number for a dispatch event.
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }
}

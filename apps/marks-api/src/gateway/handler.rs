//! IDENTIFY handling.

use marks_common::api::SessionUser;
use marks_common::gateway::{EventName, GatewayMessage, IdentifyPayload, ReadyPayload};
use marks_common::id::{prefix, prefixed_ulid};

use crate::auth::tokens;
use crate::AppState;

use super::session::GatewaySession;

/// Heartbeat interval sent to clients in the READY payload (ms).
pub const HEARTBEAT_INTERVAL_MS: u64 = 41250;

/// Process an IDENTIFY opcode. Returns a (`GatewaySession`, READY message) on success.
pub async fn handle_identify(
    state: &AppState,
    payload: IdentifyPayload,
) -> Result<(GatewaySession, GatewayMessage), &'static str> {
    // Consume the WS ticket (single-use).
    let subject = tokens::consume_ws_ticket(state.kv.as_ref(), &payload.ticket)
        .await
        .map_err(|_| "Ticket lookup failed")?
        .ok_or("Invalid or expired ticket")?;

    let session_id = prefixed_ulid(prefix::GATEWAY_SESSION);

    let ready = ReadyPayload {
        session_id: session_id.clone(),
        user: SessionUser {
            id: subject.user_id.clone(),
            email: subject.email.clone(),
        },
        heartbeat_interval: HEARTBEAT_INTERVAL_MS,
    };
    let ready_data = serde_json::to_value(&ready).map_err(|_| "Failed to build READY")?;

    let session = GatewaySession::new(session_id, subject.user_id, subject.email);
    let seq = session.next_seq();
    let ready_msg = GatewayMessage::dispatch(EventName::READY, seq, ready_data);

    Ok((session, ready_msg))
}

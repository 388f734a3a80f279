//! WebSocket upgrade handler and per-connection event loop.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use marks_common::gateway::{
    BookmarkResyncPayload, ClientMessage, EventName, GatewayMessage, HeartbeatPayload,
    IdentifyPayload, OP_HEARTBEAT, OP_IDENTIFY,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::time;

use crate::AppState;

use super::fanout::{BroadcastPayload, OwnerReceiver};
use super::handler::{handle_identify, HEARTBEAT_INTERVAL_MS};
use super::session::GatewaySession;

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

// Application close codes.
const CLOSE_UNKNOWN_ERROR: u16 = 4000;
const CLOSE_UNKNOWN_OPCODE: u16 = 4001;
const CLOSE_NOT_AUTHENTICATED: u16 = 4003;
const CLOSE_AUTH_FAILED: u16 = 4004;
const CLOSE_SESSION_TIMEOUT: u16 = 4009;

/// Timeout for receiving IDENTIFY after connection (seconds).
const IDENTIFY_TIMEOUT_SECS: u64 = 10;

pub fn router() -> Router<AppState> {
    Router::new().route("/gateway", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let identify = time::timeout(
        Duration::from_secs(IDENTIFY_TIMEOUT_SECS),
        read_identify(&mut ws_rx),
    )
    .await;

    let payload = match identify {
        Ok(Ok(payload)) => payload,
        Ok(Err((code, reason))) => {
            tracing::debug!(%reason, "initial handshake failed");
            let _ = send_close(&mut ws_tx, code, reason).await;
            return;
        }
        Err(_timeout) => {
            let _ = send_close(&mut ws_tx, CLOSE_SESSION_TIMEOUT, "Handshake timeout").await;
            return;
        }
    };

    let (session, ready_msg) = match handle_identify(&state, payload).await {
        Ok(result) => result,
        Err(reason) => {
            tracing::debug!(%reason, "identify handler failed");
            let _ = send_close(&mut ws_tx, CLOSE_AUTH_FAILED, reason).await;
            return;
        }
    };

    // Subscribe before READY so no event dispatched after READY is missed.
    let owner_rx = state.broadcast.subscribe(&session.user_id);

    if send_json(&mut ws_tx, &ready_msg).await.is_err() {
        drop(owner_rx);
        state.broadcast.release(&session.user_id);
        return;
    }

    tracing::info!(
        session_id = %session.session_id,
        user_id = %session.user_id,
        "gateway session established"
    );

    let session = Arc::new(session);
    run_session(session.clone(), ws_tx, ws_rx, owner_rx).await;

    // The session's receiver is gone; drop the owner channel if it was the last.
    state.broadcast.release(&session.user_id);

    tracing::info!(
        session_id = %session.session_id,
        user_id = %session.user_id,
        "gateway session ended"
    );
}

/// Read messages until the client sends IDENTIFY.
async fn read_identify(ws_rx: &mut WsStream) -> Result<IdentifyPayload, (u16, &'static str)> {
    while let Some(msg) = ws_rx.next().await {
        let text = match msg {
            Ok(Message::Text(t)) => t,
            Ok(Message::Close(_)) => return Err((CLOSE_UNKNOWN_ERROR, "client closed")),
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(?e, "ws read error during identify");
                return Err((CLOSE_UNKNOWN_ERROR, "read error"));
            }
        };

        let client_msg: ClientMessage = serde_json::from_str(&text)
            .map_err(|_| (CLOSE_UNKNOWN_ERROR, "Invalid JSON"))?;

        if client_msg.op != OP_IDENTIFY {
            return Err((CLOSE_NOT_AUTHENTICATED, "Expected IDENTIFY"));
        }

        return serde_json::from_value(client_msg.d)
            .map_err(|_| (CLOSE_AUTH_FAILED, "invalid identify payload"));
    }
    Err((CLOSE_UNKNOWN_ERROR, "connection closed before identify"))
}

/// What to do with one text frame from an identified client.
#[derive(Debug)]
enum Step {
    Reply(GatewayMessage),
    Close(u16, &'static str),
}

fn on_client_text(text: &str) -> Step {
    let Ok(msg) = serde_json::from_str::<ClientMessage>(text) else {
        return Step::Close(CLOSE_UNKNOWN_ERROR, "Invalid JSON");
    };
    match msg.op {
        OP_HEARTBEAT => {
            let seq = serde_json::from_value::<HeartbeatPayload>(msg.d)
                .map(|p| p.seq)
                .unwrap_or(0);
            Step::Reply(GatewayMessage::heartbeat_ack(seq))
        }
        OP_IDENTIFY => Step::Close(CLOSE_UNKNOWN_ERROR, "Already identified"),
        _ => Step::Close(CLOSE_UNKNOWN_OPCODE, "Unknown opcode"),
    }
}

/// The frame to forward for one owner-channel event, or `None` once the
/// channel has closed. A lagged receiver gets a BOOKMARK_RESYNC in place of
/// the events it missed.
fn owner_frame(
    session: &GatewaySession,
    result: Result<Arc<BroadcastPayload>, RecvError>,
) -> Option<GatewayMessage> {
    match result {
        Ok(payload) => Some(GatewayMessage::dispatch(
            &payload.event_name,
            session.next_seq(),
            payload.data.clone(),
        )),
        Err(RecvError::Lagged(skipped)) => {
            tracing::warn!(
                session_id = %session.session_id,
                skipped,
                "gateway session lagged behind broadcast, asking client to resync"
            );
            let data = BookmarkResyncPayload {
                owner_id: session.user_id.clone(),
                skipped,
            };
            Some(GatewayMessage::dispatch(
                EventName::BOOKMARK_RESYNC,
                session.next_seq(),
                serde_json::to_value(data).unwrap_or_default(),
            ))
        }
        Err(RecvError::Closed) => None,
    }
}

/// Per-session loop. The client must heartbeat within 1.5x the advertised
/// interval; owner events are forwarded with the session's sequence.
async fn run_session(
    session: Arc<GatewaySession>,
    mut ws_tx: WsSink,
    mut ws_rx: WsStream,
    mut owner_rx: OwnerReceiver,
) {
    let heartbeat_deadline = Duration::from_millis(HEARTBEAT_INTERVAL_MS * 3 / 2);
    let mut heartbeat_timer = time::interval(heartbeat_deadline);
    heartbeat_timer.tick().await; // First tick fires immediately; skip it.
    let mut got_heartbeat = true;

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => match on_client_text(&text) {
                        Step::Reply(reply) => {
                            got_heartbeat = true;
                            if send_json(&mut ws_tx, &reply).await.is_err() {
                                break;
                            }
                        }
                        Step::Close(code, reason) => {
                            let _ = send_close(&mut ws_tx, code, reason).await;
                            break;
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::debug!(?e, session_id = %session.session_id, "ws read error");
                        break;
                    }
                }
            }

            result = owner_rx.recv() => {
                let Some(msg) = owner_frame(&session, result) else {
                    break;
                };
                if send_json(&mut ws_tx, &msg).await.is_err() {
                    break;
                }
            }

            _ = heartbeat_timer.tick() => {
                if !got_heartbeat {
                    tracing::debug!(session_id = %session.session_id, "missed heartbeat");
                    let _ = send_close(&mut ws_tx, CLOSE_SESSION_TIMEOUT, "Heartbeat timeout").await;
                    break;
                }
                got_heartbeat = false;
            }
        }
    }
}

async fn send_json(ws_tx: &mut WsSink, msg: &GatewayMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    ws_tx.send(Message::Text(json.into())).await
}

async fn send_close(ws_tx: &mut WsSink, code: u16, reason: &str) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}

#[cfg(test)]
mod tests {
    use marks_common::gateway::OP_HEARTBEAT_ACK;
    use serde_json::json;

    use super::*;
    use crate::gateway::fanout::{GatewayBroadcast, OWNER_CHANNEL_CAPACITY};

    fn created(n: usize) -> BroadcastPayload {
        BroadcastPayload {
            event_name: EventName::BOOKMARK_CREATE.to_string(),
            data: json!({ "n": n }),
        }
    }

    #[tokio::test]
    async fn overflowed_owner_channel_yields_a_resync() {
        let hub = GatewayBroadcast::new();
        let session = GatewaySession::new("gw_1".into(), "usr_1".into(), None);
        let mut rx = hub.subscribe("usr_1");

        for n in 0..OWNER_CHANNEL_CAPACITY + 10 {
            hub.dispatch("usr_1", created(n));
        }

        let frame = owner_frame(&session, rx.recv().await).unwrap();
        assert_eq!(frame.event_name(), Some(EventName::BOOKMARK_RESYNC));
        assert_eq!(frame.s, Some(1));
        let payload: BookmarkResyncPayload = serde_json::from_value(frame.d).unwrap();
        assert_eq!(payload.owner_id, "usr_1");
        assert_eq!(payload.skipped, 10);

        // Delivery resumes with the oldest event still buffered.
        let frame = owner_frame(&session, rx.recv().await).unwrap();
        assert_eq!(frame.event_name(), Some(EventName::BOOKMARK_CREATE));
        assert_eq!(frame.d["n"], 10);
        assert_eq!(frame.s, Some(2));
    }

    #[tokio::test]
    async fn closed_owner_channel_ends_the_session() {
        let session = GatewaySession::new("gw_1".into(), "usr_1".into(), None);
        assert!(owner_frame(&session, Err(RecvError::Closed)).is_none());
    }

    #[test]
    fn heartbeat_is_acknowledged_with_its_sequence() {
        let text = json!({ "op": OP_HEARTBEAT, "d": { "seq": 7 } }).to_string();
        match on_client_text(&text) {
            Step::Reply(ack) => {
                assert_eq!(ack.op, OP_HEARTBEAT_ACK);
                assert_eq!(ack.d["ack"], 7);
            }
            other => panic!("expected ack, got {other:?}"),
        }
    }

    #[test]
    fn protocol_violations_close_the_session() {
        let identify = json!({ "op": OP_IDENTIFY, "d": { "ticket": "wst_x" } }).to_string();
        assert!(matches!(
            on_client_text(&identify),
            Step::Close(CLOSE_UNKNOWN_ERROR, "Already identified")
        ));
        let unknown = json!({ "op": 99, "d": null }).to_string();
        assert!(matches!(
            on_client_text(&unknown),
            Step::Close(CLOSE_UNKNOWN_OPCODE, _)
        ));
        assert!(matches!(
            on_client_text("not json"),
            Step::Close(CLOSE_UNKNOWN_ERROR, "Invalid JSON")
        ));
    }
}

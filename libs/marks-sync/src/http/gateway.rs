//! Gateway subscription: ticket, IDENTIFY, READY, then a pump task that
//! forwards bookmark dispatches and keeps the connection alive.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use marks_common::api::GatewayTicketResponse;
use marks_common::gateway::{
    BookmarkDeletePayload, BookmarkResyncPayload, ClientMessage, EventName, GatewayMessage, ReadyPayload, OP_DISPATCH,
};
use marks_common::Bookmark;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::RemoteError;
use crate::store::{ChangeKind, ChangeNotice, Subscription};

use super::client::ApiClient;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long the server has to answer IDENTIFY with READY.
const READY_TIMEOUT: Duration = Duration::from_secs(10);

pub(super) async fn subscribe(client: &ApiClient, owner_id: &str) -> Result<Subscription, RemoteError> {
    let ticket_url = client.endpoint(&["api", "v1", "gateway", "ticket"])?;
    let ticket: GatewayTicketResponse = client.post_for(ticket_url).await?;

    let gateway_url = client.gateway_url()?;
    let (mut socket, _) = tokio_tungstenite::connect_async(gateway_url.as_str())
        .await
        .map_err(|e| RemoteError::Transport(format!("gateway connect failed: {e}")))?;

    send(&mut socket, &ClientMessage::identify(&ticket.ticket)).await?;

    let (ready, seq) = time::timeout(READY_TIMEOUT, read_ready(&mut socket))
        .await
        .map_err(|_| RemoteError::Transport("timed out waiting for READY".to_string()))??;

    if ready.user.id != owner_id {
        let _ = socket.close(None).await;
        return Err(RemoteError::Rejected {
            status: 403,
            message: "gateway session belongs to another owner".to_string(),
        });
    }

    tracing::debug!(
        session_id = %ready.session_id,
        heartbeat_ms = ready.heartbeat_interval,
        "gateway ready"
    );

    let (tx, subscription) = Subscription::channel();
    let heartbeat = Duration::from_millis(ready.heartbeat_interval.max(1));
    tokio::spawn(pump(socket, tx, owner_id.to_string(), heartbeat, seq));
    Ok(subscription)
}

async fn send(socket: &mut Socket, msg: &ClientMessage) -> Result<(), RemoteError> {
    let json = serde_json::to_string(msg).map_err(|e| RemoteError::Decode(e.to_string()))?;
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|e| RemoteError::Transport(format!("gateway send failed: {e}")))
}

async fn read_ready(socket: &mut Socket) -> Result<(ReadyPayload, u64), RemoteError> {
    while let Some(msg) = socket.next().await {
        let msg = msg.map_err(|e| RemoteError::Transport(format!("gateway read failed: {e}")))?;
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(frame) => {
                let reason = frame
                    .map(|f| f.reason.to_string())
                    .unwrap_or_else(|| "closed".to_string());
                return Err(RemoteError::Rejected {
                    status: 401,
                    message: format!("gateway refused session: {reason}"),
                });
            }
            _ => continue,
        };
        let msg: GatewayMessage =
            serde_json::from_str(&text).map_err(|e| RemoteError::Decode(e.to_string()))?;
        if msg.event_name() == Some(EventName::READY) {
            let ready: ReadyPayload =
                serde_json::from_value(msg.d).map_err(|e| RemoteError::Decode(e.to_string()))?;
            return Ok((ready, msg.s.unwrap_or(0)));
        }
    }
    Err(RemoteError::Transport("gateway closed before READY".to_string()))
}

/// Translate a dispatch into a notice for `owner_id`. Unknown events and
/// other owners' rows yield `None`.
fn to_notice(msg: GatewayMessage, owner_id: &str) -> Option<ChangeNotice> {
    if msg.op != OP_DISPATCH {
        return None;
    }
    let kind = match msg.t.as_deref()? {
        EventName::BOOKMARK_CREATE => ChangeKind::Insert,
        EventName::BOOKMARK_UPDATE => ChangeKind::Update,
        EventName::BOOKMARK_DELETE => ChangeKind::Delete,
        EventName::BOOKMARK_RESYNC => ChangeKind::Resync,
        _ => return None,
    };

    if kind == ChangeKind::Resync {
        let payload: BookmarkResyncPayload = serde_json::from_value(msg.d).ok()?;
        return (payload.owner_id == owner_id).then(ChangeNotice::resync);
    }

    if kind == ChangeKind::Delete {
        let payload: BookmarkDeletePayload = serde_json::from_value(msg.d).ok()?;
        return (payload.owner_id == owner_id).then(|| ChangeNotice::deleted(payload.id));
    }

    let row: Bookmark = serde_json::from_value(msg.d).ok()?;
    (row.owner_id == owner_id).then(|| ChangeNotice {
        kind,
        bookmark_id: row.id.clone(),
        row: Some(row),
    })
}

async fn pump(
    socket: Socket,
    tx: mpsc::Sender<ChangeNotice>,
    owner_id: String,
    heartbeat: Duration,
    mut seq: u64,
) {
    let (mut sink, mut stream) = socket.split();
    let mut ticker = time::interval(heartbeat);
    ticker.tick().await; // First tick fires immediately; skip it.

    loop {
        tokio::select! {
            _ = tx.closed() => {
                tracing::debug!(%owner_id, "subscription closed by consumer");
                break;
            }

            _ = ticker.tick() => {
                let beat = match serde_json::to_string(&ClientMessage::heartbeat(seq)) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::warn!(?e, "failed to encode heartbeat");
                        break;
                    }
                };
                if sink.send(Message::Text(beat.into())).await.is_err() {
                    break;
                }
            }

            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let msg: GatewayMessage = match serde_json::from_str(&text) {
                            Ok(m) => m,
                            Err(e) => {
                                tracing::warn!(?e, "malformed gateway message");
                                continue;
                            }
                        };
                        if let Some(s) = msg.s {
                            seq = s;
                        }
                        if let Some(notice) = to_notice(msg, &owner_id) {
                            if tx.send(notice).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(%owner_id, ?frame, "gateway closed the connection");
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::warn!(%owner_id, ?e, "gateway read error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    let _ = sink.send(Message::Close(None)).await;
}

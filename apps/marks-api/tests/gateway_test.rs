mod common;

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Helper: log a user in over real HTTP and return the access token.
async fn login(addr: SocketAddr, user_id: &str) -> String {
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/api/v1/auth/login"))
        .json(&json!({ "id_token": common::mint_identity_token(user_id) }))
        .send()
        .await
        .expect("login request");
    let body: Value = resp.json().await.expect("parse login response");
    body["access_token"].as_str().expect("access_token").to_string()
}

async fn ticket(addr: SocketAddr, token: &str) -> String {
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/api/v1/gateway/ticket"))
        .bearer_auth(token)
        .send()
        .await
        .expect("ticket request");
    let body: Value = resp.json().await.expect("parse ticket response");
    body["ticket"].as_str().expect("ticket").to_string()
}

async fn connect(addr: SocketAddr) -> Ws {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/gateway"))
        .await
        .expect("ws connect");
    ws
}

async fn send(ws: &mut Ws, msg: Value) {
    ws.send(WsMessage::Text(msg.to_string().into()))
        .await
        .expect("ws send");
}

async fn next_message(ws: &mut Ws) -> WsMessage {
    time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timeout waiting for message")
        .expect("stream ended")
        .expect("ws read error")
}

async fn next_json(ws: &mut Ws) -> Value {
    let text = next_message(ws).await.into_text().expect("not text");
    serde_json::from_str(&text).expect("parse message")
}

/// Connect, IDENTIFY and consume READY.
async fn identified(addr: SocketAddr, token: &str) -> (Ws, Value) {
    let ticket = ticket(addr, token).await;
    let mut ws = connect(addr).await;
    send(&mut ws, json!({ "op": 2, "d": { "ticket": ticket } })).await;
    let ready = next_json(&mut ws).await;
    (ws, ready)
}

async fn create_bookmark(addr: SocketAddr, token: &str, title: &str) -> Value {
    reqwest::Client::new()
        .post(format!("http://{addr}/api/v1/users/@me/bookmarks"))
        .bearer_auth(token)
        .json(&json!({ "title": title, "url": "https://example.com" }))
        .send()
        .await
        .expect("create request")
        .json()
        .await
        .expect("parse bookmark")
}

fn close_code(msg: WsMessage) -> Option<u16> {
    match msg {
        WsMessage::Close(Some(frame)) => Some(u16::from(frame.code)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn identify_returns_ready() {
    let (addr, _state) = common::start_server().await;
    let user_id = common::new_user_id();
    let token = login(addr, &user_id).await;

    let (_ws, ready) = identified(addr, &token).await;

    assert_eq!(ready["op"], 0);
    assert_eq!(ready["t"], "READY");
    assert_eq!(ready["s"], 1);
    assert!(ready["d"]["session_id"].as_str().unwrap().starts_with("gw_"));
    assert_eq!(ready["d"]["user"]["id"], user_id);
    assert!(ready["d"]["heartbeat_interval"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn heartbeat_is_acknowledged() {
    let (addr, _state) = common::start_server().await;
    let token = login(addr, &common::new_user_id()).await;
    let (mut ws, _ready) = identified(addr, &token).await;

    send(&mut ws, json!({ "op": 1, "d": { "seq": 1 } })).await;
    let ack = next_json(&mut ws).await;
    assert_eq!(ack["op"], 6);
}

#[tokio::test]
async fn ticket_is_single_use() {
    let (addr, _state) = common::start_server().await;
    let token = login(addr, &common::new_user_id()).await;
    let ticket = ticket(addr, &token).await;

    let mut first = connect(addr).await;
    send(&mut first, json!({ "op": 2, "d": { "ticket": ticket } })).await;
    assert_eq!(next_json(&mut first).await["t"], "READY");

    let mut second = connect(addr).await;
    send(&mut second, json!({ "op": 2, "d": { "ticket": ticket } })).await;
    assert_eq!(close_code(next_message(&mut second).await), Some(4004));
}

#[tokio::test]
async fn first_message_must_be_identify() {
    let (addr, _state) = common::start_server().await;
    let mut ws = connect(addr).await;

    send(&mut ws, json!({ "op": 1, "d": { "seq": 0 } })).await;
    assert_eq!(close_code(next_message(&mut ws).await), Some(4003));
}

#[tokio::test]
async fn bookmark_events_reach_only_their_owner() {
    let (addr, state) = common::start_server().await;
    let alice = common::new_user_id();
    let bob = common::new_user_id();
    let alice_token = login(addr, &alice).await;
    let bob_token = login(addr, &bob).await;

    let (mut alice_ws, _) = identified(addr, &alice_token).await;
    let (mut bob_ws, _) = identified(addr, &bob_token).await;
    assert_eq!(state.broadcast.listener_count(&alice), 1);

    let created = create_bookmark(addr, &alice_token, "Pushed").await;

    let event = next_json(&mut alice_ws).await;
    assert_eq!(event["op"], 0);
    assert_eq!(event["t"], "BOOKMARK_CREATE");
    assert_eq!(event["s"], 2);
    assert_eq!(event["d"]["id"], created["id"]);

    // Bob sees nothing; prove it with a heartbeat round trip.
    send(&mut bob_ws, json!({ "op": 1, "d": { "seq": 1 } })).await;
    assert_eq!(next_json(&mut bob_ws).await["op"], 6);

    let resp = reqwest::Client::new()
        .delete(format!(
            "http://{addr}/api/v1/users/@me/bookmarks/{}",
            created["id"].as_str().unwrap()
        ))
        .bearer_auth(&alice_token)
        .send()
        .await
        .expect("delete request");
    assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);

    let event = next_json(&mut alice_ws).await;
    assert_eq!(event["t"], "BOOKMARK_DELETE");
    assert_eq!(event["d"], json!({ "id": created["id"], "owner_id": alice }));
}

#[tokio::test]
async fn closing_the_socket_releases_the_owner_channel() {
    let (addr, state) = common::start_server().await;
    let user_id = common::new_user_id();
    let token = login(addr, &user_id).await;

    let (mut ws, _) = identified(addr, &token).await;
    assert_eq!(state.broadcast.listener_count(&user_id), 1);

    ws.close(None).await.expect("close");
    drop(ws);

    let mut released = false;
    for _ in 0..50 {
        if state.broadcast.listener_count(&user_id) == 0 {
            released = true;
            break;
        }
        time::sleep(Duration::from_millis(20)).await;
    }
    assert!(released, "owner channel still has listeners");
}

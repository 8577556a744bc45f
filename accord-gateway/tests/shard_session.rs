//! Shard handshake tests against a local mock gateway.

use accord_gateway::{Event, Shard, Stage};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    accept_async,
    tungstenite::protocol::{frame::coding::CloseCode, CloseFrame},
    tungstenite::Message,
    WebSocketStream,
};

type ServerStream = WebSocketStream<TcpStream>;

async fn send(ws: &mut ServerStream, value: &Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

/// Read the next non-heartbeat payload, acknowledging heartbeats.
async fn next_payload(ws: &mut ServerStream) -> Value {
    loop {
        let message = ws.next().await.expect("socket ended").unwrap();

        let bytes = match &message {
            Message::Text(text) => text.as_bytes().to_vec(),
            Message::Binary(bytes) => bytes.clone(),
            _ => continue,
        };

        let value: Value = serde_json::from_slice(&bytes).unwrap();

        if value["op"] == 1 {
            send(ws, &json!({ "op": 11 })).await;

            continue;
        }

        return value;
    }
}

async fn send_hello(ws: &mut ServerStream) {
    send(ws, &json!({ "op": 10, "d": { "heartbeat_interval": 45_000 } })).await;
}

/// A resumable close followed by a successful RESUME restores the session
/// without a second identify.
#[tokio::test]
async fn resumable_close_resumes_without_identify() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        // First connection: identify, dispatch, then a resumable close.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        send_hello(&mut ws).await;

        let identify = next_payload(&mut ws).await;
        assert_eq!(2, identify["op"], "expected IDENTIFY, got {identify}");
        assert_eq!("Bot token", identify["d"]["token"]);
        assert_eq!(0, identify["d"]["shard"][0]);

        send(
            &mut ws,
            &json!({
                "op": 0,
                "s": 42,
                "t": "READY",
                "d": { "v": 9, "session_id": "sess", "guilds": [] }
            }),
        )
        .await;
        send(
            &mut ws,
            &json!({
                "op": 0,
                "s": 43,
                "t": "MESSAGE_CREATE",
                "d": { "content": "hi" }
            }),
        )
        .await;

        ws.send(Message::Close(Some(CloseFrame {
            code: CloseCode::Library(4000),
            reason: "".into(),
        })))
        .await
        .unwrap();

        // Second connection: the shard must resume, not identify.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        send_hello(&mut ws).await;

        let resume = next_payload(&mut ws).await;
        assert_eq!(6, resume["op"], "expected RESUME, got {resume}");
        assert_eq!("sess", resume["d"]["session_id"]);
        assert_eq!(43, resume["d"]["seq"]);

        // Replay the missed dispatch and mark the resume done.
        send(
            &mut ws,
            &json!({
                "op": 0,
                "s": 44,
                "t": "MESSAGE_UPDATE",
                "d": { "content": "edited" }
            }),
        )
        .await;
        send(&mut ws, &json!({ "op": 0, "s": 45, "t": "RESUMED", "d": null })).await;

        // Keep the connection up until the client is done.
        while let Some(Ok(_)) = ws.next().await {}
    });

    let (shard, mut events) = Shard::builder("token")
        .gateway_url(Some(format!("ws://{addr}")))
        .build();

    shard.start().await.unwrap();

    let mut identifies = 0;
    let mut saw_dispatch = false;
    let mut saw_disconnect = false;
    let mut saw_resuming = false;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);

    loop {
        let event = tokio::time::timeout_at(deadline, events.next())
            .await
            .expect("test timed out")
            .expect("event stream ended");

        match event {
            Event::ShardIdentifying(_) => identifies += 1,
            Event::Dispatch(dispatch) if dispatch.name == "MESSAGE_CREATE" => {
                assert_eq!(43, dispatch.seq);
                saw_dispatch = true;
            }
            Event::ShardDisconnected(disconnected) => {
                assert_eq!(Some(4000), disconnected.code);
                saw_disconnect = true;
            }
            Event::ShardResuming(resuming) => {
                assert_eq!(43, resuming.seq);
                saw_resuming = true;
            }
            Event::Resumed => break,
            _ => {}
        }
    }

    assert_eq!(1, identifies, "the resume must not touch the identify gate");
    assert!(saw_dispatch);
    assert!(saw_disconnect);
    assert!(saw_resuming);

    let info = shard.info().unwrap();
    assert_eq!(Stage::Active, info.stage());
    assert_eq!(45, info.seq());
    assert_eq!(Some("sess"), info.session_id());

    shard.shutdown();
    server.abort();
}

/// A non-resumable INVALID_SESSION after identify clears the session and
/// re-identifies under a fresh ticket.
#[tokio::test]
async fn invalid_session_reidentifies() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        send_hello(&mut ws).await;

        let identify = next_payload(&mut ws).await;
        assert_eq!(2, identify["op"]);

        send(&mut ws, &json!({ "op": 9, "d": false })).await;

        // The shard waits a jittered 1-5 seconds, then identifies again on
        // the same connection.
        let identify = next_payload(&mut ws).await;
        assert_eq!(2, identify["op"], "expected a second IDENTIFY");

        send(
            &mut ws,
            &json!({
                "op": 0,
                "s": 1,
                "t": "READY",
                "d": { "v": 9, "session_id": "fresh", "guilds": [] }
            }),
        )
        .await;

        while let Some(Ok(_)) = ws.next().await {}
    });

    let (shard, mut events) = Shard::builder("token")
        .gateway_url(Some(format!("ws://{addr}")))
        .build();

    shard.start().await.unwrap();

    let mut identifies = 0;
    let mut invalidated = false;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);

    loop {
        let event = tokio::time::timeout_at(deadline, events.next())
            .await
            .expect("test timed out")
            .expect("event stream ended");

        match event {
            Event::ShardIdentifying(_) => identifies += 1,
            Event::GatewayInvalidateSession(resumable) => {
                assert!(!resumable);
                invalidated = true;
            }
            Event::Ready(ready) => {
                assert_eq!("fresh", ready.session_id);
                break;
            }
            _ => {}
        }
    }

    assert_eq!(2, identifies);
    assert!(invalidated);
    assert_eq!(Stage::Active, shard.info().unwrap().stage());

    shard.shutdown();
    server.abort();
}

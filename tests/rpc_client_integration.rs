//! RPC client behaviour against an in-process mock vendor server.

#![allow(clippy::unwrap_used)]

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use audioserver::backends::rpc::{RpcClient, RpcError};

/// Mock vendor endpoint speaking the message-id dialect. Each accepted
/// connection answers `ping` with a result, `chunks` with two partial
/// frames and a final one, and drops the socket on `die`.
async fn spawn_mock() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let Ok(ws) = accept_async(stream).await else {
                    return;
                };
                let (mut tx, mut rx) = ws.split();

                // Server-pushed event right after connect.
                let _ = tx
                    .send(Message::Text(
                        json!({ "event": "connected", "data": {} }).to_string().into(),
                    ))
                    .await;

                while let Some(Ok(msg)) = rx.next().await {
                    let text = match msg {
                        Message::Text(text) => text,
                        Message::Ping(p) => {
                            let _ = tx.send(Message::Pong(p)).await;
                            continue;
                        }
                        _ => continue,
                    };
                    let Ok(frame) = serde_json::from_str::<Value>(&text) else {
                        continue;
                    };
                    let id = frame["message_id"].as_u64().unwrap_or(0);
                    match frame["command"].as_str().unwrap_or_default() {
                        "ping" => {
                            let _ = tx
                                .send(Message::Text(
                                    json!({ "message_id": id, "result": { "pong": true } })
                                        .to_string()
                                        .into(),
                                ))
                                .await;
                        }
                        "chunks" => {
                            for chunk in [json!([1, 2]), json!([3])] {
                                let _ = tx
                                    .send(Message::Text(
                                        json!({
                                            "message_id": id,
                                            "partial": true,
                                            "result": chunk,
                                        })
                                        .to_string()
                                        .into(),
                                    ))
                                    .await;
                            }
                            let _ = tx
                                .send(Message::Text(
                                    json!({ "message_id": id, "result": [4] })
                                        .to_string()
                                        .into(),
                                ))
                                .await;
                        }
                        "die" => {
                            let _ = tx.send(Message::Close(None)).await;
                            return;
                        }
                        other => {
                            let _ = tx
                                .send(Message::Text(
                                    json!({
                                        "message_id": id,
                                        "error_code": format!("unknown command {other}"),
                                    })
                                    .to_string()
                                    .into(),
                                ))
                                .await;
                        }
                    }
                }
            });
        }
    });
    addr
}

#[tokio::test]
async fn correlates_responses_by_message_id() {
    let addr = spawn_mock().await;
    let client = RpcClient::with_options(format!("ws://{addr}"), false);

    let result = client.request("ping", Value::Null).await.unwrap();
    assert_eq!(result["pong"], true);
    client.close();
}

#[tokio::test]
async fn partial_frames_are_merged() {
    let addr = spawn_mock().await;
    let client = RpcClient::with_options(format!("ws://{addr}"), false);

    let result = client.request("chunks", Value::Null).await.unwrap();
    assert_eq!(result, json!([1, 2, 3, 4]));
    client.close();
}

#[tokio::test]
async fn server_errors_propagate() {
    let addr = spawn_mock().await;
    let client = RpcClient::with_options(format!("ws://{addr}"), false);

    let err = client.request("nope", Value::Null).await.unwrap_err();
    assert!(matches!(err, RpcError::Server(_)));
    client.close();
}

#[tokio::test]
async fn dropped_connection_rejects_then_recovers() {
    let addr = spawn_mock().await;
    let client = RpcClient::with_options(format!("ws://{addr}"), false);

    // The server hangs up instead of answering.
    let err = client.request("die", Value::Null).await.unwrap_err();
    assert!(
        matches!(err, RpcError::ConnectionClosed | RpcError::NotConnected),
        "in-flight request rejects on drop, got {err:?}"
    );

    // The next call redials and succeeds.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let result = client.request("ping", Value::Null).await.unwrap();
    assert_eq!(result["pong"], true);
    client.close();
}

#[tokio::test]
async fn pushed_events_reach_subscribers() {
    let addr = spawn_mock().await;
    let client = RpcClient::with_options(format!("ws://{addr}"), false);
    let mut events = client.subscribe_events();

    client.connect().await.unwrap();
    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event["event"], "connected");
    client.close();
}

// tests/transport_websocket.rs

#![cfg(feature = "transport_websocket")]

mod common;

use std::collections::HashMap;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse,
    Request as HandshakeRequest,
    Response as HandshakeResponse,
};
use tokio_tungstenite::tungstenite::Message;

use kv_mux::{ClientConfig, Frame, KvClient, KvError, Request};

use common::{answer, init_logging};

/// Accept one connection, report the request URI and serve it as the
/// key-value service. Stops after `max_requests` requests when given.
async fn serve_one(
    listener: TcpListener,
    uri_tx: oneshot::Sender<String>,
    max_requests: Option<usize>,
) {
    // ---
    let (stream, _) = listener.accept().await.expect("accept failed");

    let callback = move |req: &HandshakeRequest,
                         resp: HandshakeResponse|
          -> Result<HandshakeResponse, ErrorResponse> {
        let _ = uri_tx.send(req.uri().to_string());
        Ok(resp)
    };

    let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
        .await
        .expect("server handshake failed");

    let mut store = HashMap::new();
    let mut served = 0;

    while let Some(Ok(msg)) = ws.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        if max_requests.is_some_and(|max| served >= max) {
            let _ = ws.close(None).await;
            return;
        }
        served += 1;

        let req = match Request::from_frame(&Frame::from(text)) {
            Ok(req) => req,
            Err(_) => continue,
        };

        let out = answer(&mut store, req).to_frame().expect("response encodes");
        let text = String::from_utf8(out.into_bytes().to_vec()).expect("utf-8 response");

        if ws.send(Message::text(text)).await.is_err() {
            break;
        }
    }
}

async fn local_listener() -> (TcpListener, String) {
    // ---
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, format!("http://{addr}"))
}

#[tokio::test]
async fn test_websocket_crud_roundtrip() {
    // ---
    init_logging();

    let (listener, base_url) = local_listener().await;
    let (uri_tx, uri_rx) = oneshot::channel();
    tokio::spawn(serve_one(listener, uri_tx, None));

    let config = ClientConfig::new(base_url)
        .with_api_key("s3cret")
        .with_request_timeout(Duration::from_secs(5));
    let client = KvClient::connect(&config).await.unwrap();

    assert_eq!(uri_rx.await.unwrap(), "/ws?apiKey=s3cret");

    client
        .insert("user:1", json!({"name": "Ada"}))
        .await
        .unwrap();
    assert_eq!(
        client.get("user:1").await.unwrap(),
        Some(json!({"name": "Ada"}))
    );

    let (a, b) = tokio::join!(client.get("user:1"), client.get("missing"));
    assert_eq!(a.unwrap(), Some(json!({"name": "Ada"})));
    assert!(matches!(b, Err(KvError::Remote(_))));

    client.delete("user:1").await.unwrap();
    client.close().await.unwrap();
    assert!(client.is_closed());
}

#[tokio::test]
async fn test_server_close_fails_pending_calls() {
    // ---
    init_logging();

    let (listener, base_url) = local_listener().await;
    let (uri_tx, _uri_rx) = oneshot::channel();
    tokio::spawn(serve_one(listener, uri_tx, Some(1)));

    let config = ClientConfig::new(base_url).with_api_key("k");
    let client = KvClient::connect(&config).await.unwrap();

    client.insert("a", "1").await.unwrap();

    let res = tokio::time::timeout(Duration::from_secs(2), client.get("a"))
        .await
        .expect("pending call was not resolved after server close");
    assert!(matches!(res, Err(KvError::ConnectionClosed)), "{res:?}");
    assert!(client.is_closed());
}

#[tokio::test]
async fn test_connect_to_dead_endpoint_fails() {
    // ---
    init_logging();

    let (listener, base_url) = local_listener().await;
    drop(listener);

    let config = ClientConfig::new(base_url);
    assert!(matches!(
        KvClient::connect(&config).await,
        Err(KvError::Connect(_))
    ));
}

#[tokio::test]
async fn test_connect_rejects_unsupported_scheme() {
    // ---
    let config = ClientConfig::new("ftp://example.com");
    assert!(matches!(
        KvClient::connect(&config).await,
        Err(KvError::InvalidEndpoint(_))
    ));
}

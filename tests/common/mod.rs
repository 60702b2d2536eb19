// tests/common/mod.rs

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Once};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::task::JoinHandle;

use kv_mux::{
    //
    create_memory_transport,
    KvClient,
    KvClientBuilder,
    MemoryPeer,
    Operation,
    Request,
    Response,
};

static INIT: Once = Once::new();

pub fn init_logging() {
    // ---
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Client over a fresh in-memory transport, plus the peer end.
pub async fn memory_client(id: &str) -> (KvClient, Arc<MemoryPeer>) {
    // ---
    init_logging();

    let (transport, peer) = create_memory_transport(id)
        .await
        .expect("failed to create memory transport");

    let client = KvClientBuilder::new(transport)
        .request_timeout(Duration::from_secs(5))
        .build()
        .await
        .expect("failed to build client");

    (client, Arc::new(peer))
}

/// Answer a request the way the key-value service does, against `store`.
pub fn answer(store: &mut HashMap<String, Value>, req: Request) -> Response {
    // ---
    let id = req.message_id;

    match req.op {
        Operation::Get => match store.get(&req.key) {
            Some(value) => Response::ok(id, Some(value.clone())),
            None => Response::error(id, "Record not found"),
        },
        Operation::Insert | Operation::Update => {
            store.insert(req.key, req.value.unwrap_or(Value::Null));
            Response::ok(id, Some(json!({"success": true})))
        }
        Operation::Delete => match store.remove(&req.key) {
            Some(_) => Response::ok(id, Some(json!({"success": true}))),
            None => Response::error(id, "Record not found"),
        },
    }
}

/// Play the key-value service on `peer` until the connection ends.
pub fn spawn_fake_kv(peer: Arc<MemoryPeer>) -> JoinHandle<()> {
    // ---
    tokio::spawn(async move {
        let mut store = HashMap::new();

        while let Some(frame) = peer.recv().await {
            let req = match Request::from_frame(&frame) {
                Ok(req) => req,
                Err(_) => continue,
            };

            let resp = answer(&mut store, req);
            let frame = resp.to_frame().expect("response encodes");

            if peer.push(frame).await.is_err() {
                break;
            }
        }
    })
}

/// Read the next request the client sent.
pub async fn next_request(peer: &MemoryPeer) -> Request {
    // ---
    let frame = tokio::time::timeout(Duration::from_secs(2), peer.recv())
        .await
        .expect("timed out waiting for a request")
        .expect("client transport closed");

    Request::from_frame(&frame).expect("client sent a malformed request")
}

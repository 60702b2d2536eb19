//! In-process walkthrough: a toy key-value service on the memory transport.
//!
//! Run with `RUST_LOG=kv_mux=debug cargo run --example kv_memory`.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use kv_mux::{create_memory_transport, KvClientBuilder, MemoryPeer, Operation, Request, Response};

async fn serve(peer: MemoryPeer) {
    // ---
    let mut store: HashMap<String, Value> = HashMap::new();

    while let Some(frame) = peer.recv().await {
        let Ok(req) = Request::from_frame(&frame) else {
            continue;
        };
        let id = req.message_id;

        let resp = match req.op {
            Operation::Get => match store.get(&req.key) {
                Some(v) => Response::ok(id, Some(v.clone())),
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
        };

        let Ok(frame) = resp.to_frame() else {
            continue;
        };
        if peer.push(frame).await.is_err() {
            break;
        }
    }
}

#[tokio::main]
async fn main() -> kv_mux::Result<()> {
    // ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let (transport, peer) = create_memory_transport("memory-demo").await?;
    tokio::spawn(serve(peer));

    let client = KvClientBuilder::new(transport)
        .request_timeout(Duration::from_secs(2))
        .build()
        .await?;

    // Fire a batch of inserts concurrently over the one session.
    let mut tasks = Vec::new();
    for i in 0..10 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            client
                .insert(&format!("item:{i}"), json!({"index": i}))
                .await
        }));
    }
    for task in tasks {
        task.await.map_err(|e| kv_mux::KvError::Transport(e.to_string()))??;
    }

    client
        .update("item:3", json!({"label": "three"}), true)
        .await?;
    println!("item:3 = {:?}", client.get("item:3").await?);

    client.delete("item:3").await?;
    match client.get("item:3").await {
        Err(err) => println!("after delete: {err}"),
        Ok(value) => println!("after delete: {value:?}"),
    }

    client.close().await
}

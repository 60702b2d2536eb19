//! Create/read/update/delete against a live service.
//!
//! ```text
//! HPKV_BASE_URL=https://api.example.com HPKV_API_KEY=... \
//!     RUST_LOG=kv_mux=debug cargo run --example kv_websocket
//! ```

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use kv_mux::{ClientConfig, KvClient};

#[derive(Debug, Serialize, Deserialize)]
struct Profile {
    name: String,
    email: String,
    visits: u32,
}

#[tokio::main]
async fn main() -> kv_mux::Result<()> {
    // ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = ClientConfig::from_env()?.with_client_id("kv-websocket-demo");
    let client = KvClient::connect(&config).await?;

    let key = "demo:profile";
    let profile = Profile {
        name: "Ada".into(),
        email: "ada@example.com".into(),
        visits: 1,
    };

    client.insert_json(key, &profile).await?;
    let stored: Option<Profile> = client.get_json(key).await?;
    println!("stored:  {stored:?}");

    client.update(key, json!({"visits": 2}), true).await?;
    println!("updated: {:?}", client.get(key).await?);

    let (a, b) = tokio::join!(client.get(key), client.get("demo:missing"));
    println!("concurrent: {a:?} / {b:?}");

    client.delete(key).await?;
    client.close().await
}

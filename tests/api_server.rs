//! Read API and event feed over a real socket.

#![allow(clippy::panic)]

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use common::Rig;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use reward_burner::api;
use reward_burner::app_state::AppState;
use reward_burner::config::RunMode;
use reward_burner::ws::handler::ws_handler;

async fn serve(rig: &Rig) -> SocketAddr {
    let state = AppState {
        records: rig.records.clone(),
        orchestrator: Arc::clone(&rig.services.orchestrator),
        reconciler: Arc::clone(&rig.services.reconciler),
        event_bus: rig.events.clone(),
        run_mode: RunMode::Simulation,
    };
    let app = Router::new()
        .merge(api::build_router())
        .route("/ws", get(ws_handler))
        .with_state(state);

    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind failed");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("no local addr");
    };
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

async fn post_json(client: &reqwest::Client, url: String) -> (u16, serde_json::Value) {
    let Ok(resp) = client.post(url).send().await else {
        panic!("request failed");
    };
    let status = resp.status().as_u16();
    let body = resp.json().await.unwrap_or(serde_json::Value::Null);
    (status, body)
}

#[tokio::test]
async fn manual_run_then_reads() {
    let rig = Rig::in_memory();
    rig.seed_vault(500_000_000);
    let addr = serve(&rig).await;
    let client = reqwest::Client::new();

    let (status, run) = post_json(&client, format!("http://{addr}/api/v1/pipeline/run")).await;
    assert_eq!(status, 200);
    assert_eq!(run["outcome"], "completed");
    assert_eq!(run["lamports"], "500000000");
    let Some(reward_id) = run["reward_id"].as_str() else {
        panic!("no reward id in {run}");
    };

    let Ok(resp) = client
        .get(format!("http://{addr}/api/v1/rewards/{reward_id}"))
        .send()
        .await
    else {
        panic!("request failed");
    };
    assert_eq!(resp.status().as_u16(), 200);
    let Ok(detail) = resp.json::<serde_json::Value>().await else {
        panic!("bad body");
    };
    assert_eq!(detail["reward"]["status"], "burned");
    assert_eq!(detail["burn"]["reward_id"], reward_id);

    let (status, reconcile) = post_json(&client, format!("http://{addr}/api/v1/reconcile")).await;
    assert_eq!(status, 200);
    assert_eq!(reconcile["recovered"], 0);
    assert_eq!(reconcile["metrics"]["result"], "baseline");

    let Ok(resp) = client
        .get(format!("http://{addr}/api/v1/metrics/latest"))
        .send()
        .await
    else {
        panic!("request failed");
    };
    let Ok(metrics) = resp.json::<serde_json::Value>().await else {
        panic!("bad body");
    };
    assert_eq!(metrics["data"]["source"], "reconciler");
}

#[tokio::test]
async fn below_threshold_run_reports_abort() {
    let rig = Rig::in_memory();
    rig.seed_vault(1_000);
    let addr = serve(&rig).await;

    let (status, run) = post_json(
        &reqwest::Client::new(),
        format!("http://{addr}/api/v1/pipeline/run"),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(run["outcome"], "aborted");
    assert!(run.get("tx_refs").is_none());
}

#[tokio::test]
async fn event_feed_delivers_subscribed_types_only() {
    let rig = Rig::in_memory();
    rig.seed_vault(500_000_000);
    let addr = serve(&rig).await;

    let Ok((mut ws, _)) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await else {
        panic!("ws connect failed");
    };
    let subscribe = serde_json::json!({
        "id": "sub-1",
        "type": "command",
        "timestamp": chrono::Utc::now(),
        "payload": { "command": "subscribe", "event_types": ["tokens_burned"] },
    });
    let Ok(()) = ws.send(Message::text(subscribe.to_string())).await else {
        panic!("send failed");
    };

    let reply = next_json(&mut ws).await;
    assert_eq!(reply["type"], "response");
    assert_eq!(reply["id"], "sub-1");

    let Ok(_) = rig.services.orchestrator.run().await else {
        panic!("run lock free");
    };

    let event = next_json(&mut ws).await;
    assert_eq!(event["type"], "event");
    assert_eq!(event["payload"]["event_type"], "tokens_burned");
}

async fn next_json<S>(ws: &mut S) -> serde_json::Value
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let next = tokio::time::timeout(Duration::from_secs(5), ws.next()).await;
        let Ok(Some(Ok(msg))) = next else {
            panic!("no message within timeout");
        };
        if let Message::Text(text) = msg {
            let Ok(value) = serde_json::from_str(text.as_str()) else {
                panic!("non-JSON frame: {text}");
            };
            return value;
        }
    }
}

//! End-to-end protocol tests: boot the real router on a loopback port and
//! drive it with a websocket client, exercising the resume/history/delta/
//! live handshake the way an actual client would.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::WebSocketStream;

use feedrun::feed::{AppState, Payload, Run, RunSlot, SampleInput, SessionConfig};

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn spawn_server_with_config(run_slot: Arc<RunSlot>, session_config: SessionConfig) -> SocketAddr {
    let state = AppState::new(run_slot, session_config);
    let app = feedrun::feed::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn spawn_server(run_slot: Arc<RunSlot>) -> SocketAddr {
    spawn_server_with_config(run_slot, Default::default()).await
}

fn tick(series: &str, t_ms: i64) -> SampleInput {
    SampleInput {
        series_id: series.to_string(),
        t_ms,
        payload: Payload::Tick { price: t_ms as f64, volume: 1.0 },
    }
}

async fn recv_json(ws: &mut Client) -> Value {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), ws.next()).await {
            Ok(Some(Ok(WsMessage::Text(t)))) => return serde_json::from_str(&t).unwrap(),
            Ok(Some(Ok(WsMessage::Ping(_)))) | Ok(Some(Ok(WsMessage::Pong(_)))) => continue,
            other => panic!("expected a text frame, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn fresh_run_replays_full_history_then_completes_init() {
    let run = Arc::new(Run::new(1000));
    for i in 0..10 {
        run.append(tick("x:ticks", i));
    }
    run.mark_done();
    let run_slot = Arc::new(RunSlot::new(run));
    let addr = spawn_server(run_slot).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws.send(WsMessage::Text(json!({"type": "resume", "from_seq": 1}).to_string())).await.unwrap();

    let begin = recv_json(&mut ws).await;
    assert_eq!(begin["type"], "init_begin");
    assert_eq!(begin["min_seq"], 1);
    assert_eq!(begin["wm_seq"], 10);

    let history = recv_json(&mut ws).await;
    assert_eq!(history["type"], "history");
    assert_eq!(history["samples"].as_array().unwrap().len(), 10);

    let complete = recv_json(&mut ws).await;
    assert_eq!(complete["type"], "init_complete");
    assert_eq!(complete["resume_truncated"], false);

    // Run is already done and fully drained: live phase immediately reports completion.
    let done = recv_json(&mut ws).await;
    assert_eq!(done["type"], "test_done");
    assert_eq!(done["final_seq"], 10);
}

#[tokio::test]
async fn truncated_resume_is_reported() {
    let run = Arc::new(Run::new(3));
    for i in 0..10 {
        run.append(tick("x:ticks", i));
    }
    run.mark_done();
    let run_slot = Arc::new(RunSlot::new(run));
    let addr = spawn_server(run_slot).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws.send(WsMessage::Text(json!({"type": "resume", "from_seq": 1}).to_string())).await.unwrap();

    let begin = recv_json(&mut ws).await;
    assert_eq!(begin["min_seq"], 8);

    let history = recv_json(&mut ws).await;
    assert_eq!(history["samples"].as_array().unwrap().len(), 3);

    let complete = recv_json(&mut ws).await;
    assert_eq!(complete["type"], "init_complete");
    assert_eq!(complete["resume_truncated"], true);
}

#[tokio::test]
async fn no_active_run_is_an_error() {
    let run_slot = Arc::new(RunSlot::empty());
    let addr = spawn_server(run_slot).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws.send(WsMessage::Text(json!({"type": "resume", "from_seq": 1}).to_string())).await.unwrap();

    let err = recv_json(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["reason"], "no active run");
}

#[tokio::test]
async fn malformed_first_frame_is_rejected() {
    let run = Arc::new(Run::new(10));
    let run_slot = Arc::new(RunSlot::new(run));
    let addr = spawn_server(run_slot).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws.send(WsMessage::Text("not json".to_string())).await.unwrap();

    let err = recv_json(&mut ws).await;
    assert_eq!(err["type"], "error");
}

#[tokio::test]
async fn live_samples_arrive_after_init_complete() {
    let run = Arc::new(Run::new(1000));
    run.append(tick("x:ticks", 0));
    let run_slot = Arc::new(RunSlot::new(run.clone()));
    let addr = spawn_server(run_slot).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws.send(WsMessage::Text(json!({"type": "resume", "from_seq": 1}).to_string())).await.unwrap();

    let _begin = recv_json(&mut ws).await;
    let _history = recv_json(&mut ws).await;
    let complete = recv_json(&mut ws).await;
    assert_eq!(complete["type"], "init_complete");

    run.append(tick("x:ticks", 100));
    run.mark_done();

    let live = recv_json(&mut ws).await;
    assert_eq!(live["type"], "live");
    assert_eq!(live["samples"].as_array().unwrap().len(), 1);

    let done = recv_json(&mut ws).await;
    assert_eq!(done["type"], "test_done");
}

#[tokio::test]
async fn heartbeat_arrives_before_any_data_on_an_idle_run() {
    let run = Arc::new(Run::new(1000));
    let run_slot = Arc::new(RunSlot::new(run));
    let cfg = SessionConfig { heartbeat_interval: Duration::from_millis(50), ..Default::default() };
    let addr = spawn_server_with_config(run_slot, cfg).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws.send(WsMessage::Text(json!({"type": "resume", "from_seq": 1}).to_string())).await.unwrap();

    let begin = recv_json(&mut ws).await;
    assert_eq!(begin["type"], "init_begin");

    let complete = recv_json(&mut ws).await;
    assert_eq!(complete["type"], "init_complete");

    // Nothing has been appended: the next frame must be a heartbeat, not data.
    let heartbeat = recv_json(&mut ws).await;
    assert_eq!(heartbeat["type"], "heartbeat");
    assert!(heartbeat["ts_ms"].as_i64().is_some());
}

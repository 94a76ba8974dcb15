//! Integration test: the engine client's reconnect policy against a real
//! WebSocket engine that drops or closes its sessions.

mod common;

use common::fake_engine::FakeEngineServer;
use dlc_core::engine::{Engine, EngineClient, EngineClientOptions, EngineState};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records every state the client publishes.
fn record_states(engine: &EngineClient) -> Arc<Mutex<Vec<EngineState>>> {
    let mut rx = engine.subscribe();
    let seen = Arc::new(Mutex::new(vec![rx.borrow_and_update().state]));
    let sink = Arc::clone(&seen);
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().state;
            sink.lock().unwrap().push(state);
        }
    });
    seen
}

/// Settled states: Connecting is transient on loopback, so it is left out,
/// along with repeats and the initial Disconnected.
fn settled(states: &[EngineState]) -> Vec<EngineState> {
    let mut out: Vec<EngineState> = Vec::new();
    for &s in states {
        if s == EngineState::Connecting || out.last() == Some(&s) {
            continue;
        }
        if out.is_empty() && s == EngineState::Disconnected {
            continue;
        }
        out.push(s);
    }
    out
}

async fn connected_to(server: &FakeEngineServer, opts: EngineClientOptions) -> Arc<EngineClient> {
    let (engine, _task) = EngineClient::spawn(opts);
    common::wait_connected(&engine).await;
    assert!(common::eventually(|| async { server.connections() == 1 }).await);
    engine
}

#[tokio::test]
async fn reconnects_after_drop_but_waits_after_normal_close() {
    let server = FakeEngineServer::start().await;
    let (engine, _task) = EngineClient::spawn(common::fast_options(&server.url));
    let states = record_states(&engine);
    common::wait_connected(&engine).await;
    assert!(common::eventually(|| async { server.connections() == 1 }).await);

    server.drop_sessions();
    assert!(
        common::eventually(|| async { server.connections() == 2 }).await,
        "client did not reconnect after the session was dropped"
    );
    common::wait_connected(&engine).await;

    server.close_sessions_normally();
    common::wait_for_state(&engine, EngineState::Disconnected).await;
    // Several backoff periods pass without a new attempt.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(engine.state(), EngineState::Disconnected);
    assert_eq!(server.connections(), 2);
    assert_eq!(engine.status().last_error.as_deref(), Some("closed by engine"));

    engine.request_reconnect();
    common::wait_connected(&engine).await;
    assert_eq!(server.connections(), 3);

    assert_eq!(
        settled(&states.lock().unwrap()),
        vec![
            EngineState::Connected,
            EngineState::Disconnected,
            EngineState::Connected,
            EngineState::Disconnected,
            EngineState::Connected,
        ]
    );
    engine.shutdown();
}

#[tokio::test]
async fn reconnect_request_cuts_backoff_short() {
    let server = FakeEngineServer::start().await;
    let opts = EngineClientOptions {
        reconnect_delay: Duration::from_secs(60),
        ..common::fast_options(&server.url)
    };
    let engine = connected_to(&server, opts).await;

    server.drop_sessions();
    common::wait_for_state(&engine, EngineState::Disconnected).await;
    assert!(engine.status().last_error.is_some());

    engine.request_reconnect();
    common::wait_connected(&engine).await;
    assert_eq!(server.connections(), 2);
    engine.shutdown();
}

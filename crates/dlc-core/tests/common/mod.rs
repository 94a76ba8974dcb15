#![allow(dead_code)]

pub mod fake_engine;

use std::time::Duration;

use dlc_core::engine::{Engine, EngineClient, EngineClientOptions, EngineState};

/// Client options with short timers so tests do not wait on production backoff.
pub fn fast_options(url: &str) -> EngineClientOptions {
    EngineClientOptions {
        url: url.to_string(),
        connect_timeout: Duration::from_secs(1),
        reconnect_delay: Duration::from_millis(100),
        request_timeout: Duration::from_secs(2),
    }
}

pub async fn wait_connected(engine: &EngineClient) {
    wait_for_state(engine, EngineState::Connected).await;
}

pub async fn wait_for_state(engine: &EngineClient, state: EngineState) {
    let mut rx = engine.subscribe();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.state == state))
        .await
        .unwrap_or_else(|_| panic!("engine did not reach {} in time", state.as_str()))
        .expect("status channel closed");
}

/// Polls `cond` until it holds or five seconds pass.
pub async fn eventually<F, Fut>(mut cond: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if cond().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

//! Session lifecycle and cached queries through an assembled runtime.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tradewire_client::{CachedQuery, ClientError, HttpRequest, NetworkRuntime, RequestPipeline};
use tradewire_core::cache::keys;
use tradewire_core::{DurableStore, MemoryStore, TtlCache};
use tradewire_test_utils::{
    bearer, fixtures, json_response, FailingStore, ManualClock, MockConnector, MockTransport,
    RecordingSleeper,
};

async fn runtime_with(
    transport: Arc<MockTransport>,
    durable: Arc<dyn DurableStore>,
) -> NetworkRuntime {
    NetworkRuntime::with_parts(
        fixtures::test_config(),
        transport,
        Arc::new(MockConnector::new()),
        durable,
        Arc::new(RecordingSleeper::new()),
    )
    .await
    .unwrap()
}

fn auth_backend() -> Arc<MockTransport> {
    Arc::new(MockTransport::new(|request| match request.path.as_str() {
        "/api/auth/login" => Ok(json_response(
            200,
            &json!({
                "success": true,
                "message": "Welcome back",
                "data": {
                    "access_token": "login-access",
                    "refresh_token": "login-refresh",
                    "user": {"id": "u1", "email": "deniz@example.com", "full_name": "Deniz K"}
                }
            }),
        )),
        "/api/auth/register" => Ok(json_response(
            400,
            &json!({"detail": "Email already registered"}),
        )),
        "/api/auth/me" if bearer(request) == Some("login-access") => Ok(json_response(
            200,
            &json!({"success": true, "data": {"email": "deniz@example.com", "full_name": "Deniz Kaya"}}),
        )),
        "/api/auth/logout" => Ok(json_response(503, &json!({}))),
        _ => Ok(json_response(401, &json!({"detail": "Not authenticated"}))),
    }))
}

#[tokio::test]
async fn test_login_persists_session_and_profile() {
    let durable = Arc::new(MemoryStore::new());
    let runtime = runtime_with(auth_backend(), durable.clone()).await;
    let mut login_state = runtime.credentials().subscribe_login_state();
    assert!(!*login_state.borrow());

    let response = runtime
        .auth()
        .login("deniz@example.com", "hunter2")
        .await
        .unwrap();

    assert!(response.is_authenticated());
    assert_eq!(response.message, "Welcome back");
    assert!(runtime.credentials().is_logged_in());
    assert_eq!(
        runtime.credentials().user().map(|user| user.name),
        Some("Deniz K".to_string())
    );
    assert!(login_state.has_changed().unwrap());
    assert!(*login_state.borrow_and_update());
    assert_eq!(
        durable.get("auth_token").await.unwrap().as_deref(),
        Some("login-access")
    );
    assert_eq!(
        durable.get("refresh_token").await.unwrap().as_deref(),
        Some("login-refresh")
    );
}

#[tokio::test]
async fn test_login_accepts_null_profile_fields() {
    let transport = Arc::new(MockTransport::always(
        200,
        json!({
            "success": true,
            "message": null,
            "data": {
                "access_token": "a1",
                "refresh_token": "r1",
                "user": {"email": "x@y.z", "full_name": null}
            }
        }),
    ));
    let runtime = runtime_with(transport, Arc::new(MemoryStore::new())).await;

    let response = runtime.auth().login("x@y.z", "hunter2").await.unwrap();

    assert!(response.is_authenticated());
    assert!(runtime.credentials().is_logged_in());
    assert_eq!(runtime.credentials().access_token().as_deref(), Some("a1"));
    assert_eq!(
        runtime.credentials().user().map(|user| user.email),
        Some("x@y.z".to_string())
    );
}

#[tokio::test]
async fn test_session_survives_restart() {
    let durable = Arc::new(MemoryStore::new());
    let first = runtime_with(auth_backend(), durable.clone()).await;
    first.auth().login("deniz@example.com", "hunter2").await.unwrap();

    let second = runtime_with(auth_backend(), durable).await;
    assert!(second.credentials().is_logged_in());
    assert_eq!(
        second.credentials().refresh_token().as_deref(),
        Some("login-refresh")
    );
}

#[tokio::test]
async fn test_register_error_carries_server_detail() {
    let runtime = runtime_with(auth_backend(), Arc::new(MemoryStore::new())).await;

    let err = runtime
        .auth()
        .register("deniz@example.com", "hunter2", "Deniz K")
        .await
        .unwrap_err();

    match err {
        ClientError::Http { status, detail } => {
            assert_eq!(status, 400);
            assert_eq!(detail, "Email already registered");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!runtime.credentials().is_logged_in());
}

#[tokio::test]
async fn test_current_user_updates_profile() {
    let runtime = runtime_with(auth_backend(), Arc::new(MemoryStore::new())).await;
    runtime.auth().login("deniz@example.com", "hunter2").await.unwrap();

    let profile = runtime.auth().current_user().await.unwrap();

    assert_eq!(profile.name, "Deniz Kaya");
    assert_eq!(runtime.credentials().user(), Some(profile));
}

#[tokio::test]
async fn test_logout_clears_session_even_when_server_fails() {
    let transport = auth_backend();
    let durable = Arc::new(MemoryStore::new());
    let runtime = runtime_with(transport.clone(), durable.clone()).await;
    runtime.auth().login("deniz@example.com", "hunter2").await.unwrap();

    runtime.auth().logout().await;

    assert_eq!(transport.calls_to("/api/auth/logout"), 3);
    assert!(!runtime.credentials().is_logged_in());
    assert_eq!(runtime.credentials().user(), None);
    assert_eq!(durable.get("auth_token").await.unwrap(), None);
}

#[tokio::test]
async fn test_broken_durable_store_keeps_in_memory_session() {
    let runtime = runtime_with(auth_backend(), Arc::new(FailingStore)).await;

    runtime.auth().login("deniz@example.com", "hunter2").await.unwrap();

    assert!(runtime.credentials().is_logged_in());
    assert!(runtime.credentials().persistence_failures() > 0);
}

#[derive(Debug, Deserialize, PartialEq)]
struct Pick {
    symbol: String,
    score: f64,
}

#[tokio::test]
async fn test_cached_query_reads_through_and_invalidates() {
    let transport = Arc::new(MockTransport::always(
        200,
        json!([{"symbol": "ASELS", "score": 87.5}]),
    ));
    let runtime = runtime_with(transport.clone(), Arc::new(MemoryStore::new())).await;
    let key = keys::daily_picks("hybrid");
    let request = HttpRequest::get("/api/signals/daily-picks").query("strategy", "hybrid");

    let first: Vec<Pick> = runtime
        .queries()
        .get_json(&key, request.clone(), keys::TTL_DAILY_PICKS)
        .await
        .unwrap();
    let second: Vec<Pick> = runtime
        .queries()
        .get_json(&key, request.clone(), keys::TTL_DAILY_PICKS)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(first[0].symbol, "ASELS");
    assert_eq!(transport.call_count(), 1);

    assert_eq!(runtime.queries().invalidate_prefix(&keys::prefix(keys::DAILY_PICKS)), 1);
    let _: Vec<Pick> = runtime
        .queries()
        .get_json(&key, request, keys::TTL_DAILY_PICKS)
        .await
        .unwrap();
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn test_cached_query_refetches_after_expiry() {
    let transport = Arc::new(MockTransport::always(200, json!({"symbol": "THYAO", "score": 61.0})));
    let clock = Arc::new(ManualClock::new());
    let pipeline = Arc::new(RequestPipeline::new(
        &fixtures::test_config(),
        transport.clone(),
        fixtures::logged_out_store(),
        Arc::new(RecordingSleeper::new()),
    ));
    let queries = CachedQuery::new(pipeline, Arc::new(TtlCache::with_clock(clock.clone())));
    let key = keys::quote("THYAO");
    let ttl = Duration::from_secs(30);

    let _: Pick = queries
        .get_json(&key, HttpRequest::get("/api/stocks/THYAO"), ttl)
        .await
        .unwrap();
    clock.advance(Duration::from_secs(29));
    let _: Pick = queries
        .get_json(&key, HttpRequest::get("/api/stocks/THYAO"), ttl)
        .await
        .unwrap();
    assert_eq!(transport.call_count(), 1);

    clock.advance(Duration::from_secs(1));
    let _: Pick = queries
        .get_json(&key, HttpRequest::get("/api/stocks/THYAO"), ttl)
        .await
        .unwrap();
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn test_failed_query_is_not_cached() {
    let transport = Arc::new(MockTransport::always(404, json!({"detail": "Unknown symbol"})));
    let runtime = runtime_with(transport.clone(), Arc::new(MemoryStore::new())).await;
    let key = keys::quote("NOPE");

    let result: Result<serde_json::Value, _> = runtime
        .queries()
        .get_json(&key, HttpRequest::get("/api/stocks/NOPE"), Duration::from_secs(30))
        .await;

    assert!(matches!(result, Err(ClientError::Http { status: 404, .. })));
    assert!(!runtime.cache().contains_key(&key));
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let mut config = fixtures::test_config();
    config.ws_url = "http://not-a-socket".to_string();

    let result = NetworkRuntime::with_parts(
        config,
        Arc::new(MockTransport::always(200, json!({}))),
        Arc::new(MockConnector::new()),
        Arc::new(MemoryStore::new()),
        Arc::new(RecordingSleeper::new()),
    )
    .await;

    assert!(matches!(result, Err(ClientError::Config(_))));
}

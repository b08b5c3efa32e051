//! Player behavior against a local stub server: status classification,
//! per-actor session isolation, session reset, and conditional caching.

use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use gatecheck_http::{CheckAction, CheckError, Checker, HttpConfig, HttpMethod};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

async fn login() -> (StatusCode, [(header::HeaderName, &'static str); 1], &'static str) {
    (
        StatusCode::OK,
        [(header::SET_COOKIE, "sid=tok-1; Path=/")],
        "{}",
    )
}

async fn private(headers: HeaderMap) -> (StatusCode, &'static str) {
    let authed = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("sid=tok-1"))
        .unwrap_or(false);
    if authed {
        (StatusCode::OK, "{}")
    } else {
        (StatusCode::UNAUTHORIZED, "{\"error\":\"login_required\"}")
    }
}

fn asset_routes(hits: Arc<AtomicU32>) -> Router {
    Router::new().route(
        "/css/app.css",
        get(move |headers: HeaderMap| {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                if headers
                    .get(header::IF_NONE_MATCH)
                    .and_then(|v| v.to_str().ok())
                    == Some("\"v1\"")
                {
                    (StatusCode::NOT_MODIFIED, [(header::ETAG, "\"v1\"")], "")
                } else {
                    (StatusCode::OK, [(header::ETAG, "\"v1\"")], "body { }")
                }
            }
        }),
    )
}

async fn spawn_server(hits: Arc<AtomicU32>) -> SocketAddr {
    let app = Router::new()
        .route("/login", post(login))
        .route("/private", get(private))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        )
        .merge(asset_routes(hits));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn checker_for(addr: SocketAddr) -> Checker {
    let base = Url::parse(&format!("http://{}/", addr)).unwrap();
    Checker::new(base, HttpConfig::default()).unwrap()
}

#[tokio::test]
async fn test_unexpected_status_is_fatal() {
    let addr = spawn_server(Arc::new(AtomicU32::new(0))).await;
    let checker = checker_for(addr);

    let err = checker
        .play(CheckAction {
            method: HttpMethod::Get,
            path: "/private".to_string(),
            expected_status: Some(StatusCode::OK),
            description: "unauthenticated access should have failed",
            ..Default::default()
        })
        .await
        .unwrap_err();

    match err {
        CheckError::UnexpectedStatus {
            expected, actual, ..
        } => {
            assert_eq!(expected, StatusCode::OK);
            assert_eq!(actual, StatusCode::UNAUTHORIZED);
        }
        other => panic!("expected UnexpectedStatus, got {:?}", other),
    }
}

#[tokio::test]
async fn test_sessions_are_isolated_per_checker() {
    let addr = spawn_server(Arc::new(AtomicU32::new(0))).await;
    let mut alice = checker_for(addr);
    let bob = checker_for(addr);

    alice
        .play(CheckAction {
            method: HttpMethod::Post,
            path: "/login".to_string(),
            expected_status: Some(StatusCode::OK),
            ..Default::default()
        })
        .await
        .unwrap();

    // Alice's cookie opens the door; Bob's fresh session does not.
    alice
        .play(CheckAction {
            path: "/private".to_string(),
            expected_status: Some(StatusCode::OK),
            ..Default::default()
        })
        .await
        .unwrap();
    bob.play(CheckAction {
        path: "/private".to_string(),
        expected_status: Some(StatusCode::UNAUTHORIZED),
        ..Default::default()
    })
    .await
    .unwrap();

    // Resetting Alice's session drops her cookie.
    alice.reset_session().unwrap();
    alice
        .play(CheckAction {
            path: "/private".to_string(),
            expected_status: Some(StatusCode::UNAUTHORIZED),
            ..Default::default()
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_conditional_cache_round_trip() {
    let hits = Arc::new(AtomicU32::new(0));
    let addr = spawn_server(hits.clone()).await;
    let checker = checker_for(addr);
    let seen: Arc<Mutex<Vec<u16>>> = Arc::new(Mutex::new(Vec::new()));

    for _ in 0..2 {
        let seen = seen.clone();
        checker
            .play(CheckAction {
                path: "/css/app.css".to_string(),
                expected_status: Some(StatusCode::OK),
                enable_cache: true,
                check: Some(Box::new(move |res| {
                    seen.lock().unwrap().push(res.status.as_u16());
                    Ok(())
                })),
                ..Default::default()
            })
            .await
            .unwrap();
    }

    // First fetch is a full 200; the replayed validator turns the second into
    // a 304, which still satisfies the expected 200.
    assert_eq!(*seen.lock().unwrap(), vec![200, 304]);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_check_func_error_propagates() {
    let addr = spawn_server(Arc::new(AtomicU32::new(0))).await;
    let checker = checker_for(addr);

    let err = checker
        .play(CheckAction {
            method: HttpMethod::Post,
            path: "/login".to_string(),
            expected_status: Some(StatusCode::OK),
            check: Some(Box::new(|_res| {
                Err(gatecheck_http::fatal!("wrong user information returned"))
            })),
            ..Default::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, CheckError::Fatal(_)));
}

#[tokio::test]
async fn test_per_call_timeout_is_fatal() {
    let addr = spawn_server(Arc::new(AtomicU32::new(0))).await;
    let checker = checker_for(addr);

    let err = checker
        .play(CheckAction {
            path: "/slow".to_string(),
            timeout: Some(Duration::from_millis(100)),
            ..Default::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, CheckError::Timeout { .. }));
}

//! Guard-chain tests over the HTTP surface. The pool is lazy and points at
//! an unreachable address, so any route that passes these assertions did so
//! without running a single query.

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use lectern::{admin_routes, auth_routes, common_routes, AppState, Session, TableRegistry};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tower::ServiceExt;

fn lazy_state() -> AppState {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .acquire_timeout(Duration::from_secs(1))
        .connect_lazy("postgres://nobody@127.0.0.1:1/nowhere")
        .unwrap();
    let mut tables = BTreeMap::new();
    tables.insert("book".to_string(), "Books".to_string());
    let registry = TableRegistry::from_entries(tables).unwrap();
    AppState::new(pool, registry)
}

fn superadmin() -> Session {
    Session {
        user_id: 1,
        username: "root".into(),
        role_id: 1,
        is_superadmin: true,
    }
}

fn reader() -> Session {
    Session {
        user_id: 2,
        username: "amy".into(),
        role_id: 2,
        is_superadmin: false,
    }
}

async fn body_json(res: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_and_version_respond() {
    let res = common_routes()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = common_routes()
        .oneshot(Request::builder().uri("/version").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["name"], "lectern");
}

#[tokio::test]
async fn missing_session_is_401_with_error_envelope() {
    let res = admin_routes(lazy_state())
        .oneshot(Request::builder().uri("/tables").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(res).await;
    assert_eq!(body["error"]["code"], "unauthenticated");
    assert!(body["error"]["message"].is_string());

    let res = admin_routes(lazy_state())
        .oneshot(
            Request::builder()
                .uri("/tables/book/rows")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn table_listing_is_superadmin_only() {
    let res = admin_routes(lazy_state())
        .oneshot(
            Request::builder()
                .uri("/tables")
                .extension(reader())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body = body_json(res).await;
    assert_eq!(body["error"]["code"], "forbidden");
}

#[tokio::test]
async fn superadmin_sees_registered_tables() {
    let res = admin_routes(lazy_state())
        .oneshot(
            Request::builder()
                .uri("/tables")
                .extension(superadmin())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["meta"]["count"], 1);
    assert_eq!(body["data"][0]["name"], "book");
    assert_eq!(body["data"][0]["label"], "Books");
}

/// Unregistered tables 404 on every operation. The superadmin session skips
/// the permission query and the pool is unreachable, so a 404 here proves
/// the allow-list is checked before any SQL.
#[tokio::test]
async fn unregistered_table_is_404_on_every_operation() {
    let get = |uri: &str| {
        Request::builder()
            .uri(uri)
            .extension(superadmin())
            .body(Body::empty())
            .unwrap()
    };
    let with_body = |method: Method, uri: &str| {
        Request::builder()
            .method(method)
            .uri(uri)
            .extension(superadmin())
            .header("content-type", "application/json")
            .body(Body::from(r#"{"title": "x"}"#))
            .unwrap()
    };

    let requests = vec![
        get("/tables/widget/rows"),
        get("/tables/widget/form"),
        with_body(Method::POST, "/tables/widget/rows"),
        with_body(Method::PUT, "/tables/widget/rows/1"),
        Request::builder()
            .method(Method::DELETE)
            .uri("/tables/widget/rows/1")
            .extension(superadmin())
            .body(Body::empty())
            .unwrap(),
    ];
    for req in requests {
        let uri = req.uri().clone();
        let method = req.method().clone();
        let res = admin_routes(lazy_state()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND, "{} {}", method, uri);
        let body = body_json(res).await;
        assert_eq!(body["error"]["code"], "not_found");
    }
}

/// Plain roles cannot skip the permission query; with the pool unreachable
/// that query fails and surfaces as a sanitized 500, never a DB message.
#[tokio::test]
async fn database_errors_are_sanitized() {
    let res = admin_routes(lazy_state())
        .oneshot(
            Request::builder()
                .uri("/tables/book/rows")
                .extension(reader())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(res).await;
    assert_eq!(body["error"]["code"], "database_error");
    assert_eq!(body["error"]["message"], "query failed");
}

#[tokio::test]
async fn register_rejects_bad_credentials_before_any_query() {
    let res = auth_routes(lazy_state())
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/auth/register")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"username": "amy", "password": "short"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(res).await;
    assert_eq!(body["error"]["code"], "validation_error");

    let res = auth_routes(lazy_state())
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/auth/register")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"username": "   ", "password": "long enough pw"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn me_echoes_the_attached_session() {
    let res = auth_routes(lazy_state())
        .oneshot(
            Request::builder()
                .uri("/auth/me")
                .extension(reader())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["data"]["username"], "amy");
    assert_eq!(body["data"]["is_superadmin"], false);

    let res = auth_routes(lazy_state())
        .oneshot(Request::builder().uri("/auth/me").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn insert_body_must_be_a_json_object() {
    let res = admin_routes(lazy_state())
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/tables/book/rows")
                .extension(superadmin())
                .header("content-type", "application/json")
                .body(Body::from(r#"["not", "an", "object"]"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = body_json(res).await;
    assert_eq!(body["error"]["code"], "bad_request");
}

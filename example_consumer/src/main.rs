//! Example consumer: a library server wiring lectern with bearer-token
//! sessions held in process memory.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Or from this directory: `cargo run`

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::post;
use axum::{Json, Router, ServiceExt};
use lectern::{
    admin_routes, auth_routes, common_routes_with_ready, ensure_core_tables,
    ensure_database_exists, ensure_superadmin, registry_path, sync_permissions, AppError,
    AppState, AuthService, PgCatalog, Session, TableRegistry,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower::Layer;
use tower_http::normalize_path::NormalizePathLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use uuid::Uuid;

type SessionMap = Arc<RwLock<HashMap<Uuid, Session>>>;

#[derive(Clone)]
struct ConsumerState {
    app: AppState,
    sessions: SessionMap,
}

/// Demo catalog tables so the generic admin surface has something to chew
/// on: an enum-typed status column and a foreign key into author.
const DEMO_STATUS_ENUM: &str =
    "CREATE TYPE book_status_enum AS ENUM ('available', 'loaned', 'lost')";

const DEMO_TABLE_DDL: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS author (
        id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
        name VARCHAR(128) NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS book (
        id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
        title VARCHAR(255) NOT NULL,
        author_id BIGINT REFERENCES author (id),
        status book_status_enum NOT NULL DEFAULT 'available',
        published_on DATE
    )
    "#,
];

async fn ensure_demo_tables(pool: &sqlx::PgPool) -> Result<(), AppError> {
    let _ = sqlx::query(DEMO_STATUS_ENUM).execute(pool).await;
    for ddl in DEMO_TABLE_DDL {
        sqlx::query(ddl).execute(pool).await?;
    }
    Ok(())
}

fn bearer_token(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .and_then(|t| Uuid::parse_str(t.trim()).ok())
}

/// Resolve the bearer token to a session and attach it to the request.
/// Requests without a valid token pass through bare; the session extractor
/// turns that into a 401 on guarded routes.
async fn attach_session(
    State(sessions): State<SessionMap>,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(token) = bearer_token(req.headers()) {
        if let Some(session) = sessions.read().await.get(&token).cloned() {
            req.extensions_mut().insert(session);
        }
    }
    next.run(req).await
}

#[derive(Deserialize)]
struct LoginBody {
    username: String,
    password: String,
}

async fn login(
    State(consumer): State<ConsumerState>,
    Json(body): Json<LoginBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let session = AuthService::login(&consumer.app.pool, &body.username, &body.password).await?;
    let token = Uuid::new_v4();
    consumer.sessions.write().await.insert(token, session.clone());
    Ok(Json(json!({ "data": { "token": token, "session": session } })))
}

async fn logout(
    State(consumer): State<ConsumerState>,
    headers: HeaderMap,
) -> Json<serde_json::Value> {
    if let Some(token) = bearer_token(&headers) {
        consumer.sessions.write().await.remove(&token);
    }
    Json(json!({ "data": { "message": "logged out" } }))
}

fn session_routes(consumer: ConsumerState) -> Router {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .with_state(consumer)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("lectern=info,example_consumer=info")),
        )
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/library".into());
    ensure_database_exists(&database_url).await?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    ensure_core_tables(&pool).await?;
    ensure_demo_tables(&pool).await?;
    if let (Ok(user), Ok(password)) = (
        std::env::var("APP_SUPERADMIN_USER"),
        std::env::var("APP_SUPERADMIN_PASSWORD"),
    ) {
        ensure_superadmin(&pool, &user, &password).await?;
    }

    let registry = TableRegistry::load(registry_path())?;
    let catalog = PgCatalog::new(pool.clone());
    sync_permissions(&pool, &catalog, &registry).await?;

    let state = AppState::new(pool.clone(), registry);
    let sessions: SessionMap = Arc::new(RwLock::new(HashMap::new()));
    let consumer = ConsumerState {
        app: state.clone(),
        sessions: sessions.clone(),
    };

    let app = common_routes_with_ready(state.clone())
        .merge(auth_routes(state.clone()))
        .merge(session_routes(consumer))
        .nest("/superadmin", admin_routes(state))
        .layer(middleware::from_fn_with_state(sessions, attach_session))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ));
    let app = NormalizePathLayer::trim_trailing_slash().layer(app);

    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    let port = listener.local_addr()?.port();
    tracing::info!("library server listening on http://127.0.0.1:{}", port);
    axum::serve(listener, ServiceExt::<Request>::into_make_service(app)).await?;
    Ok(())
}

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Duration, Utc};
use reqwest::Client;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use postpilot::config::Config;

pub const CRON_SECRET: &str = "test-cron-secret";
pub const ENCRYPTION_KEY: &str = "test-encryption-key-32-chars-ok!";

/// A running test server with a dedicated test database and a stub LinkedIn
/// API the service is pointed at.
pub struct TestApp {
    pub addr: SocketAddr,
    pub pool: PgPool,
    pub client: Client,
    pub db_name: String,
    pub linkedin: Arc<StubLinkedIn>,
}

/// In-memory double for the LinkedIn v2 API: serves the registerUpload /
/// binary upload / ugcPosts sequence plus an image host, counts calls, and
/// can be told to fail specific steps.
pub struct StubLinkedIn {
    pub base_url: std::sync::OnceLock<String>,
    pub register_calls: AtomicUsize,
    pub upload_calls: AtomicUsize,
    pub share_calls: AtomicUsize,
    pub fail_register: AtomicBool,
    pub fail_share: AtomicBool,
    /// Artificial latency on the share endpoint, for timeout tests.
    pub share_delay_ms: AtomicU64,
}

impl StubLinkedIn {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            base_url: std::sync::OnceLock::new(),
            register_calls: AtomicUsize::new(0),
            upload_calls: AtomicUsize::new(0),
            share_calls: AtomicUsize::new(0),
            fail_register: AtomicBool::new(false),
            fail_share: AtomicBool::new(false),
            share_delay_ms: AtomicU64::new(0),
        })
    }

    pub fn base(&self) -> &str {
        self.base_url.get().expect("stub not started")
    }

    pub fn image_url(&self) -> String {
        format!("{}/image.png", self.base())
    }
}

async fn stub_register(State(stub): State<Arc<StubLinkedIn>>) -> Response {
    stub.register_calls.fetch_add(1, Ordering::SeqCst);
    if stub.fail_register.load(Ordering::SeqCst) {
        return (StatusCode::UNPROCESSABLE_ENTITY, "registration rejected").into_response();
    }
    Json(json!({
        "value": {
            "uploadMechanism": {
                "com.linkedin.digitalmedia.uploading.MediaUploadHttpRequest": {
                    "uploadUrl": format!("{}/mediaUpload", stub.base())
                }
            },
            "asset": "urn:li:digitalmediaAsset:stub-asset-1"
        }
    }))
    .into_response()
}

async fn stub_upload(State(stub): State<Arc<StubLinkedIn>>) -> Response {
    stub.upload_calls.fetch_add(1, Ordering::SeqCst);
    StatusCode::CREATED.into_response()
}

async fn stub_share(State(stub): State<Arc<StubLinkedIn>>) -> Response {
    let n = stub.share_calls.fetch_add(1, Ordering::SeqCst) + 1;
    let delay = stub.share_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
    }
    if stub.fail_share.load(Ordering::SeqCst) {
        return (StatusCode::UNAUTHORIZED, "token revoked").into_response();
    }
    (
        [("x-restli-id", format!("urn:li:share:{n}"))],
        StatusCode::CREATED,
    )
        .into_response()
}

async fn stub_image() -> Response {
    ([("content-type", "image/png")], vec![0x89u8, 0x50, 0x4e, 0x47]).into_response()
}

async fn start_stub() -> Arc<StubLinkedIn> {
    let stub = StubLinkedIn::new();

    let router = Router::new()
        .route("/v2/assets", post(stub_register))
        .route("/mediaUpload", post(stub_upload))
        .route("/v2/ugcPosts", post(stub_share))
        .route("/image.png", get(stub_image))
        .with_state(stub.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind stub LinkedIn server");
    let addr = listener.local_addr().unwrap();
    stub.base_url
        .set(format!("http://{addr}"))
        .expect("stub base set twice");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Stub server failed");
    });

    stub
}

/// Spawn the service against a fresh temporary database and a stub LinkedIn
/// server. Returns None (test should just return) when DATABASE_URL is not
/// set, so the suite is skippable on machines without Postgres.
pub async fn spawn_app() -> Option<TestApp> {
    spawn_app_with(|_| {}).await
}

/// Like spawn_app, but lets a test tweak the config (tighter timeouts etc.)
/// before the server starts.
pub async fn spawn_app_with(tweak: impl FnOnce(&mut Config)) -> Option<TestApp> {
    let _ = dotenvy::dotenv();

    let Ok(base_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping DB-backed test");
        return None;
    };

    let db_name = format!(
        "postpilot_test_{}",
        Uuid::now_v7().to_string().replace('-', "")
    );

    let admin_url = base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/postgres"))
        .unwrap_or_else(|| base_url.clone());

    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&admin_url)
        .await
        .expect("Failed to connect to postgres for test DB creation");

    sqlx::query(&format!("CREATE DATABASE \"{db_name}\""))
        .execute(&admin_pool)
        .await
        .expect("Failed to create test database");

    admin_pool.close().await;

    let test_url = base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/{db_name}"))
        .unwrap_or_else(|| base_url.clone());

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&test_url)
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations on test database");

    let linkedin = start_stub().await;

    let mut config = Config {
        database_url: test_url,
        cron_secret: CRON_SECRET.to_string(),
        encryption_key: ENCRYPTION_KEY.to_string(),
        host: "127.0.0.1".parse().unwrap(),
        port: 0, // unused, we bind to random port
        linkedin_api_base: linkedin.base().to_string(),
        due_buffer_secs: 60,
        min_run_interval_secs: 60,
        run_lease_secs: 300,
        claim_ttl_secs: 600,
        per_post_timeout_secs: 10,
        run_deadline_secs: 60,
        default_max_attempts: 3,
        allow_manual_trigger: false,
        log_level: "warn".to_string(),
    };
    tweak(&mut config);

    let app = postpilot::build_app(pool.clone(), config);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server failed");
    });

    let client = Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    Some(TestApp {
        addr,
        pool,
        client,
        db_name,
        linkedin,
    })
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Call the trigger endpoint with the cron secret.
    pub async fn trigger(&self) -> (Value, reqwest::StatusCode) {
        let resp = self
            .client
            .get(self.url("/api/v1/cron/run"))
            .bearer_auth(CRON_SECRET)
            .send()
            .await
            .expect("trigger request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Insert a LinkedIn credential for a user; token expiry relative to now.
    pub async fn insert_credential(&self, user_id: Uuid, expires_in_secs: i64) {
        let token_enc =
            postpilot::crypto::encrypt("stub-access-token", ENCRYPTION_KEY).unwrap();
        sqlx::query(
            "INSERT INTO user_credentials (user_id, access_token_enc, token_expires_at, linkedin_person_id)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(user_id)
        .bind(token_enc)
        .bind(Utc::now() + Duration::seconds(expires_in_secs))
        .bind("AbC123")
        .execute(&self.pool)
        .await
        .expect("insert credential failed");
    }

    /// Insert a scheduled post due `offset_secs` from now. Returns its id.
    pub async fn insert_post(&self, post: &NewPost) -> Uuid {
        let row: (Uuid,) = sqlx::query_as(
            "INSERT INTO scheduled_posts
                 (user_id, content, image_url, scheduled_at, status, attempts,
                  max_attempts, linkedin_post_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING id",
        )
        .bind(post.user_id)
        .bind(&post.content)
        .bind(&post.image_url)
        .bind(Utc::now() + Duration::seconds(post.offset_secs))
        .bind(&post.status)
        .bind(post.attempts)
        .bind(post.max_attempts)
        .bind(&post.linkedin_post_id)
        .fetch_one(&self.pool)
        .await
        .expect("insert post failed");
        row.0
    }

    /// Read back (status, attempts, linkedin_post_id, last_error).
    pub async fn post_row(&self, id: Uuid) -> (String, i32, Option<String>, Option<String>) {
        sqlx::query_as(
            "SELECT status, attempts, linkedin_post_id, last_error
             FROM scheduled_posts WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .expect("post row fetch failed")
    }

    /// Clear run spacing and any lease so the next trigger runs immediately.
    pub async fn reset_run_spacing(&self) {
        sqlx::query("UPDATE cron_locks SET last_run_at = NULL, locked_until = NULL")
            .execute(&self.pool)
            .await
            .expect("reset spacing failed");
    }
}

/// Fixture for a scheduled post row; defaults are a plain due text post.
pub struct NewPost {
    pub user_id: Uuid,
    pub content: String,
    pub image_url: Option<String>,
    pub offset_secs: i64,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub linkedin_post_id: Option<String>,
}

impl NewPost {
    pub fn due(user_id: Uuid) -> Self {
        Self {
            user_id,
            content: "Consistency beats intensity. Post #42.".into(),
            image_url: None,
            offset_secs: -5,
            status: "pending".into(),
            attempts: 0,
            max_attempts: 3,
            linkedin_post_id: None,
        }
    }
}

/// Drop the test database after tests complete.
pub async fn cleanup(app: TestApp) {
    let db_name = app.db_name.clone();
    app.pool.close().await;

    let base_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");
    let admin_url = base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/postgres"))
        .unwrap_or_else(|| base_url.clone());

    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&admin_url)
        .await
        .expect("Failed to connect for cleanup");

    let _ = sqlx::query(&format!("DROP DATABASE IF EXISTS \"{db_name}\" WITH (FORCE)"))
        .execute(&admin_pool)
        .await;
    admin_pool.close().await;
}

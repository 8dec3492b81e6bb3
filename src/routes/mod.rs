pub mod cron;
pub mod posts;

use axum::routing::{get, post};
use axum::Router;

use crate::state::SharedState;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        // External schedulers hit this on a fixed cadence; GET and POST both
        // accepted because cron services differ.
        .route("/api/v1/cron/run", get(cron::run).post(cron::run))
        .route("/api/v1/cron/status", get(cron::status))
        .route("/api/v1/posts/import", post(posts::import))
}

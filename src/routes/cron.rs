use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

use crate::clock;
use crate::config::Config;
use crate::db;
use crate::db::cron_lock::AUTO_POST_JOB;
use crate::error::AppError;
use crate::runner::{self, RunOutcome};
use crate::state::SharedState;

/// User agents of schedulers we accept without a bearer token.
const AUTOMATION_AGENTS: &[&str] = &["vercel-cron", "cron-job.org", "uptimerobot", "better uptime"];

/// Trigger-call authentication. Any one suffices: the shared cron secret as
/// a bearer token, a known automation user-agent, or (only when the
/// allow_manual_trigger flag is set) a completely header-less local call.
fn authorize_trigger(
    auth_header: Option<&str>,
    user_agent: Option<&str>,
    config: &Config,
) -> bool {
    if let Some(value) = auth_header {
        if value
            .strip_prefix("Bearer ")
            .is_some_and(|token| token == config.cron_secret)
        {
            return true;
        }
    }

    if let Some(agent) = user_agent {
        let agent = agent.to_ascii_lowercase();
        if AUTOMATION_AGENTS.iter().any(|known| agent.contains(known)) {
            return true;
        }
    }

    config.allow_manual_trigger && auth_header.is_none() && user_agent.is_none()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// The cron trigger endpoint: authenticate, then hand off to the
/// lease-guarded runner. Skips (lease held, spacing not elapsed) are normal
/// 200 outcomes so the calling scheduler doesn't alert on them.
pub async fn run(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    if !authorize_trigger(
        header_str(&headers, "authorization"),
        header_str(&headers, "user-agent"),
        &state.config,
    ) {
        return Err(AppError::Unauthorized("cron trigger rejected".into()));
    }

    let now = Utc::now();
    let outcome = runner::trigger(&state).await?;

    let body = match &outcome {
        RunOutcome::Completed(report) => json!({
            "success": true,
            "message": report.summary(),
            "results": report,
            "timestamp": now.to_rfc3339(),
            "istTime": clock::ist_time(now),
        }),
        RunOutcome::AlreadyRunning | RunOutcome::TooSoon { .. } => json!({
            "success": true,
            "message": outcome.skip_message(),
            "results": RunOutcome::empty_results(),
            "timestamp": now.to_rfc3339(),
            "istTime": clock::ist_time(now),
        }),
    };

    Ok(Json(body))
}

/// Operator-facing snapshot: lock state, last run, backlog counts.
pub async fn status(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    require_secret(&headers, &state.config)?;

    let now = Utc::now();
    let lock = db::cron_lock::find(&state.pool, AUTO_POST_JOB)
        .await?
        .ok_or_else(|| AppError::Internal("cron lock row missing".into()))?;

    let boundary = clock::due_boundary(now, state.config.due_buffer_secs);
    let pending = db::scheduled_posts::count_pending(&state.pool).await?;
    let due = db::scheduled_posts::count_due(&state.pool, boundary).await?;

    Ok(Json(json!({
        "running": lock.is_locked(now),
        "lastRunAt": lock.last_run_at.map(|t| t.to_rfc3339()),
        "pendingPosts": pending,
        "duePosts": due,
        "timestamp": now.to_rfc3339(),
        "istTime": clock::ist_time(now),
    })))
}

/// Bearer-secret check for non-trigger operational endpoints. The automation
/// user-agent shortcut deliberately doesn't apply here.
pub fn require_secret(headers: &HeaderMap, config: &Config) -> Result<(), AppError> {
    let ok = header_str(headers, "authorization")
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == config.cron_secret);
    if ok {
        Ok(())
    } else {
        Err(AppError::Unauthorized("missing or wrong secret".into()))
    }
}

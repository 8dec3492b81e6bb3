use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::clock;
use crate::db;
use crate::db::cron_lock::AUTO_POST_JOB;
use crate::error::AppError;
use crate::linkedin::{PublishRequest, PublishedPost};
use crate::models::{PostStatus, ScheduledPost, UserCredential};
use crate::state::AppState;
use crate::{crypto, state::SharedState};

/// Aggregate result of one pipeline run, returned to the trigger caller.
#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    pub processed: u32,
    pub posted: u32,
    pub errors: u32,
    pub details: Vec<PostDetail>,
}

#[derive(Debug, Serialize)]
pub struct PostDetail {
    pub post_id: Uuid,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkedin_post_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What happened to a trigger invocation that authenticated successfully.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(RunReport),
    /// Another instance holds the lease.
    AlreadyRunning,
    /// Minimum inter-run spacing hasn't elapsed yet.
    TooSoon { seconds_remaining: i64 },
}

/// Lease-guarded entry point: check the persisted cron lock, acquire it,
/// run the pipeline, and always release. The lease (not an in-memory flag)
/// is what keeps two instances from running the pipeline concurrently.
pub async fn trigger(state: &SharedState) -> Result<RunOutcome, AppError> {
    let now = Utc::now();

    let lock = db::cron_lock::find(&state.pool, AUTO_POST_JOB)
        .await?
        .ok_or_else(|| AppError::Internal("cron lock row missing (migrations not run?)".into()))?;

    if lock.is_locked(now) {
        return Ok(RunOutcome::AlreadyRunning);
    }
    if let Some(seconds_remaining) =
        lock.seconds_until_eligible(now, state.config.min_run_interval_secs)
    {
        return Ok(RunOutcome::TooSoon { seconds_remaining });
    }

    let acquired = db::cron_lock::try_acquire(
        &state.pool,
        AUTO_POST_JOB,
        state.config.run_lease_secs,
        state.config.min_run_interval_secs,
    )
    .await?;
    if !acquired {
        // Lost the race to another instance between the read and the UPDATE.
        return Ok(RunOutcome::AlreadyRunning);
    }

    let result = run_pipeline(state).await;

    // Release happens on both paths; a failed release only delays the next
    // run until the lease expires.
    if let Err(e) = db::cron_lock::release(&state.pool, AUTO_POST_JOB).await {
        tracing::error!("Failed to release cron lock: {e}");
    }

    result.map(RunOutcome::Completed)
}

/// Claim due posts and process them sequentially. Sequential keeps LinkedIn
/// rate-limit exposure and error attribution simple; the claim query already
/// guarantees no other run holds these rows.
async fn run_pipeline(state: &SharedState) -> Result<RunReport, AppError> {
    let now = Utc::now();
    let boundary = clock::due_boundary(now, state.config.due_buffer_secs);

    let posts =
        db::scheduled_posts::claim_due(&state.pool, boundary, state.config.claim_ttl_secs).await?;

    tracing::info!(
        "Auto-post run at {}: {} due post(s)",
        clock::ist_time(now),
        posts.len()
    );

    let mut report = RunReport::default();
    let deadline = tokio::time::Instant::now()
        + std::time::Duration::from_secs(state.config.run_deadline_secs);

    for (index, post) in posts.iter().enumerate() {
        if tokio::time::Instant::now() >= deadline {
            // Out of time: hand the claim back without consuming an attempt.
            if let Err(e) = db::scheduled_posts::release_claim(&state.pool, post.id).await {
                release_remaining(state, &posts[index + 1..]).await;
                return Err(e.into());
            }
            report.details.push(PostDetail {
                post_id: post.id,
                status: "deferred".into(),
                linkedin_post_id: None,
                error: Some("Run deadline reached before this post was attempted".into()),
            });
            continue;
        }

        // An internal error aborts the run; the posts this run never got to
        // must not sit in 'processing' until the claim TTL expires.
        if let Err(e) = handle_post(state, post, &mut report).await {
            release_remaining(state, &posts[index + 1..]).await;
            return Err(e);
        }
    }

    Ok(report)
}

/// Process one claimed post: load the credential, publish, record the
/// outcome. A returned error is database trouble and aborts the run.
async fn handle_post(
    state: &SharedState,
    post: &ScheduledPost,
    report: &mut RunReport,
) -> Result<(), AppError> {
    report.processed += 1;

    // A credential lookup error is database trouble; this post was never
    // attempted, so its claim goes back with it.
    let credential = match db::credentials::find_by_user(&state.pool, post.user_id).await {
        Ok(c) => c,
        Err(e) => {
            if let Err(release_err) = db::scheduled_posts::release_claim(&state.pool, post.id).await
            {
                tracing::error!("Failed to release claim on {}: {release_err}", post.id);
            }
            return Err(e.into());
        }
    };

    let outcome = match credential {
        Some(c) => publish_with_credential(state, post, &c).await,
        None => Err("No LinkedIn account connected for this user".to_string()),
    };

    match outcome {
        Ok(published) => {
            // Recorded immediately, before anything else can fail, and
            // guarded on linkedin_post_id IS NULL so a replay is a no-op.
            db::scheduled_posts::mark_posted(&state.pool, post.id, &published.post_id).await?;
            tracing::info!("Posted {} as {}", post.id, published.post_id);
            report.posted += 1;
            report.details.push(PostDetail {
                post_id: post.id,
                status: "posted".into(),
                linkedin_post_id: Some(published.post_id),
                error: None,
            });
        }
        Err(reason) => {
            db::scheduled_posts::mark_failed(
                &state.pool,
                post.id,
                post.attempts,
                post.max_attempts,
                &reason,
            )
            .await?;
            let (new_attempts, end_state) =
                db::scheduled_posts::failure_state(post.attempts, post.max_attempts);
            let terminal = end_state == PostStatus::Failed;
            tracing::warn!(
                "Publish failed for {} (attempt {new_attempts}/{}{}): {reason}",
                post.id,
                post.max_attempts,
                if terminal { ", giving up" } else { "" },
            );
            report.errors += 1;
            report.details.push(PostDetail {
                post_id: post.id,
                status: if terminal { "failed" } else { "retrying" }.into(),
                linkedin_post_id: None,
                error: Some(reason),
            });
        }
    }

    Ok(())
}

/// Best-effort release of claims the aborted run never attempted. Release
/// failures are logged, not propagated; the claim TTL is the backstop.
async fn release_remaining(state: &SharedState, posts: &[ScheduledPost]) {
    for post in posts {
        if let Err(e) = db::scheduled_posts::release_claim(&state.pool, post.id).await {
            tracing::error!("Failed to release claim on {}: {e}", post.id);
        }
    }
}

/// One publish attempt for one claimed post. Returns the external post id or
/// a failure reason destined for last_error.
async fn publish_with_credential(
    state: &AppState,
    post: &ScheduledPost,
    credential: &UserCredential,
) -> Result<PublishedPost, String> {
    let token = crypto::decrypt(&credential.access_token_enc, &state.config.encryption_key)
        .map_err(|e| format!("Stored token unreadable: {e}"))?;

    let person_urn = credential.person_urn();
    let req = PublishRequest {
        text: &post.content,
        image_url: post.image_url.as_deref(),
        person_urn: &person_urn,
        access_token: &token,
        token_expires_at: credential.token_expires_at,
    };

    let timeout = std::time::Duration::from_secs(state.config.per_post_timeout_secs);
    match tokio::time::timeout(timeout, state.publisher.publish(req)).await {
        Ok(Ok(published)) => Ok(published),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!(
            "Publish timed out after {}s",
            state.config.per_post_timeout_secs
        )),
    }
}

impl RunReport {
    pub fn summary(&self) -> String {
        format!(
            "Processed {} post(s): {} posted, {} errored",
            self.processed, self.posted, self.errors
        )
    }
}

impl RunOutcome {
    /// Message shown to the trigger caller for skip outcomes.
    pub fn skip_message(&self) -> Option<String> {
        match self {
            RunOutcome::Completed(_) => None,
            RunOutcome::AlreadyRunning => {
                Some("A run is already in progress, skipping".to_string())
            }
            RunOutcome::TooSoon { seconds_remaining } => Some(format!(
                "Too soon since last run; next check in ~{seconds_remaining} seconds"
            )),
        }
    }

    pub fn empty_results() -> serde_json::Value {
        json!({ "processed": 0, "posted": 0, "errors": 0, "details": [] })
    }
}

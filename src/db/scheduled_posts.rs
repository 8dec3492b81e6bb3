use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::legacy::LegacyPost;
use crate::models::{PostStatus, ScheduledPost};

/// Atomically claim every due post in one statement. A claimed row moves to
/// 'processing' so an overlapping run cannot pick it up; claims older than
/// the TTL belong to a crashed run and are taken over.
///
/// `linkedin_post_id IS NULL` is the idempotency guard: a post that was
/// published but whose status write never landed is still excluded.
/// 'scheduled' is the pre-rename status value still present on old rows.
pub async fn claim_due(
    pool: &PgPool,
    boundary: DateTime<Utc>,
    claim_ttl_secs: i64,
) -> Result<Vec<ScheduledPost>, sqlx::Error> {
    sqlx::query_as::<_, ScheduledPost>(
        "UPDATE scheduled_posts SET status = 'processing', claimed_at = now()
         WHERE id IN (
             SELECT id FROM scheduled_posts
             WHERE (status IN ('pending', 'scheduled')
                    OR (status = 'processing'
                        AND claimed_at < now() - make_interval(secs => $2::double precision)))
               AND scheduled_at <= $1
               AND linkedin_post_id IS NULL
             ORDER BY scheduled_at ASC
             FOR UPDATE SKIP LOCKED
         )
         RETURNING *",
    )
    .bind(boundary)
    .bind(claim_ttl_secs as f64)
    .fetch_all(pool)
    .await
}

/// Record a successful publish. Guarded by `linkedin_post_id IS NULL` so a
/// replay of the recorder is a no-op.
pub async fn mark_posted(
    pool: &PgPool,
    id: Uuid,
    linkedin_post_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE scheduled_posts
         SET status = 'posted', linkedin_post_id = $2, posted_at = now(),
             claimed_at = NULL, last_error = NULL
         WHERE id = $1 AND linkedin_post_id IS NULL",
    )
    .bind(id)
    .bind(linkedin_post_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Record a failed attempt. The new attempt count is computed from the
/// claimed row's value, so a replay writes the same end state instead of
/// double-incrementing. At the ceiling the post turns terminal; below it the
/// post goes back to 'pending' for the next run.
pub async fn mark_failed(
    pool: &PgPool,
    id: Uuid,
    attempts: i32,
    max_attempts: i32,
    error: &str,
) -> Result<(), sqlx::Error> {
    let (new_attempts, status) = failure_state(attempts, max_attempts);
    let status = status.as_str();
    sqlx::query(
        "UPDATE scheduled_posts
         SET status = $2, attempts = $3, last_error = $4, claimed_at = NULL
         WHERE id = $1 AND linkedin_post_id IS NULL",
    )
    .bind(id)
    .bind(status)
    .bind(new_attempts)
    .bind(error)
    .execute(pool)
    .await?;
    Ok(())
}

/// End state after a failed attempt, from the claimed row's counter. At the
/// ceiling the post is terminal; below it, back to pending for the next run.
pub fn failure_state(attempts: i32, max_attempts: i32) -> (i32, PostStatus) {
    let new_attempts = attempts + 1;
    if new_attempts >= max_attempts {
        (new_attempts, PostStatus::Failed)
    } else {
        (new_attempts, PostStatus::Pending)
    }
}

/// Return a claimed post to 'pending' without consuming an attempt. Used for
/// posts the run never got to (deadline) or abandoned on an internal abort.
pub async fn release_claim(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE scheduled_posts SET status = 'pending', claimed_at = NULL
         WHERE id = $1 AND status = 'processing'",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Insert a normalized legacy record. max_attempts falls back to the service
/// default when the old document carried none.
pub async fn insert_legacy(
    pool: &PgPool,
    post: &LegacyPost,
    default_max_attempts: i32,
) -> Result<ScheduledPost, sqlx::Error> {
    sqlx::query_as::<_, ScheduledPost>(
        "INSERT INTO scheduled_posts
             (user_id, content, image_url, scheduled_at, status, attempts,
              max_attempts, last_error, linkedin_post_id, posted_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
         RETURNING *",
    )
    .bind(post.user_id)
    .bind(&post.content)
    .bind(&post.image_url)
    .bind(post.scheduled_at)
    .bind(&post.status)
    .bind(post.attempts)
    .bind(post.max_attempts.unwrap_or(default_max_attempts))
    .bind(&post.last_error)
    .bind(&post.linkedin_post_id)
    .bind(post.posted_at)
    .fetch_one(pool)
    .await
}

pub async fn count_pending(pool: &PgPool) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM scheduled_posts
         WHERE status IN ('pending', 'scheduled') AND linkedin_post_id IS NULL",
    )
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

pub async fn count_due(
    pool: &PgPool,
    boundary: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM scheduled_posts
         WHERE status IN ('pending', 'scheduled')
           AND scheduled_at <= $1
           AND linkedin_post_id IS NULL",
    )
    .bind(boundary)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

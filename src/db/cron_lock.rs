use chrono::{DateTime, Utc};
use sqlx::PgPool;

pub const AUTO_POST_JOB: &str = "auto_post";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CronLock {
    pub name: String,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl CronLock {
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }

    /// Seconds until the minimum inter-run spacing has elapsed, if it hasn't.
    pub fn seconds_until_eligible(&self, now: DateTime<Utc>, min_interval_secs: i64) -> Option<i64> {
        let last = self.last_run_at?;
        let remaining = min_interval_secs - (now - last).num_seconds();
        (remaining > 0).then_some(remaining)
    }
}

pub async fn find(pool: &PgPool, name: &str) -> Result<Option<CronLock>, sqlx::Error> {
    sqlx::query_as::<_, CronLock>("SELECT * FROM cron_locks WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await
}

/// Take the lease with a single conditional UPDATE. Exactly one caller wins
/// when several race; an expired lease (crashed holder) is reacquirable.
/// Returns false when the lease is held or the spacing interval hasn't
/// elapsed.
pub async fn try_acquire(
    pool: &PgPool,
    name: &str,
    lease_secs: i64,
    min_interval_secs: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE cron_locks
         SET locked_until = now() + make_interval(secs => $2::double precision)
         WHERE name = $1
           AND (locked_until IS NULL OR locked_until < now())
           AND (last_run_at IS NULL
                OR last_run_at <= now() - make_interval(secs => $3::double precision))",
    )
    .bind(name)
    .bind(lease_secs as f64)
    .bind(min_interval_secs as f64)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Drop the lease and stamp the run, success or failure alike, so the
/// spacing check has something to measure from.
pub async fn release(pool: &PgPool, name: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE cron_locks SET locked_until = NULL, last_run_at = now()
         WHERE name = $1",
    )
    .bind(name)
    .execute(pool)
    .await?;
    Ok(())
}

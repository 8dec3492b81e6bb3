use chrono::{DateTime, Duration, FixedOffset, Utc};

/// Scheduled times are entered and displayed in IST regardless of where the
/// service runs.
const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

pub fn ist_offset() -> FixedOffset {
    FixedOffset::east_opt(IST_OFFSET_SECS).expect("+05:30 is a valid offset")
}

/// Render an instant as IST wall-clock time for logs and trigger responses.
pub fn ist_time(now: DateTime<Utc>) -> String {
    now.with_timezone(&ist_offset())
        .format("%Y-%m-%d %H:%M:%S IST")
        .to_string()
}

/// Upper bound on scheduled_at for this run. The buffer lets a post scheduled
/// a few seconds past the trigger instant go out on this poll instead of
/// waiting a whole cycle.
pub fn due_boundary(now: DateTime<Utc>, buffer_secs: i64) -> DateTime<Utc> {
    now + Duration::seconds(buffer_secs)
}

//! Normalization for scheduled-post records exported from the previous
//! document store. Several generations of the old writer used different
//! field names for the same thing; everything is mapped into one canonical
//! shape here so the rest of the pipeline never sees the drift.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Canonical form of an imported record, ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyPost {
    pub user_id: Uuid,
    pub content: String,
    pub image_url: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: Option<i32>,
    pub last_error: Option<String>,
    pub linkedin_post_id: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
}

const STATUS_FIELDS: &[&str] = &["status", "postStatus", "state"];
const SCHEDULED_FIELDS: &[&str] = &["scheduledTime", "scheduledAt", "scheduled_for", "postTime"];
const POSTED_AT_FIELDS: &[&str] = &["postedAt", "posted_at", "publishedAt"];
const ATTEMPT_FIELDS: &[&str] = &["attempts", "attemptCount"];
const MAX_ATTEMPT_FIELDS: &[&str] = &["maxAttempts", "max_attempts"];
const EXTERNAL_ID_FIELDS: &[&str] = &["linkedinPostId", "postId", "externalPostId"];
const CONTENT_FIELDS: &[&str] = &["text", "content", "postContent"];
const IMAGE_FIELDS: &[&str] = &["imageUrl", "image", "mediaUrl"];
const OWNER_FIELDS: &[&str] = &["userId", "user", "owner"];
const ERROR_FIELDS: &[&str] = &["lastError", "error"];

pub fn normalize(doc: &serde_json::Value) -> Result<LegacyPost, String> {
    let user_id = first_str(doc, OWNER_FIELDS)
        .ok_or("missing owner field")?
        .parse::<Uuid>()
        .map_err(|e| format!("invalid owner id: {e}"))?;

    let content = first_str(doc, CONTENT_FIELDS)
        .filter(|s| !s.is_empty())
        .ok_or("missing content field")?
        .to_string();

    let scheduled_at = first_str(doc, SCHEDULED_FIELDS)
        .ok_or("missing scheduled time field")
        .and_then(|s| parse_timestamp(s).ok_or("unparseable scheduled time"))?;

    let linkedin_post_id =
        first_str(doc, EXTERNAL_ID_FIELDS).filter(|s| !s.is_empty()).map(String::from);

    // Published evidence wins over whatever the status field says.
    let status = if linkedin_post_id.is_some() {
        "posted".to_string()
    } else {
        match first_str(doc, STATUS_FIELDS) {
            // "scheduled" was the pre-rename spelling of pending.
            Some("scheduled") | Some("pending") | None => "pending".to_string(),
            Some("posted") => "posted".to_string(),
            Some("failed") => "failed".to_string(),
            Some("cancelled") | Some("canceled") => "cancelled".to_string(),
            Some(other) => return Err(format!("unknown status value: {other}")),
        }
    };

    let attempts = first_i64(doc, ATTEMPT_FIELDS).unwrap_or(0) as i32;
    let max_attempts = first_i64(doc, MAX_ATTEMPT_FIELDS).map(|n| n as i32);

    Ok(LegacyPost {
        user_id,
        content,
        image_url: first_str(doc, IMAGE_FIELDS).filter(|s| !s.is_empty()).map(String::from),
        scheduled_at,
        status,
        attempts,
        max_attempts,
        last_error: first_str(doc, ERROR_FIELDS).map(String::from),
        linkedin_post_id,
        posted_at: first_str(doc, POSTED_AT_FIELDS).and_then(parse_timestamp),
    })
}

fn first_str<'a>(doc: &'a serde_json::Value, fields: &[&str]) -> Option<&'a str> {
    fields.iter().find_map(|f| doc.get(f).and_then(|v| v.as_str()))
}

fn first_i64(doc: &serde_json::Value, fields: &[&str]) -> Option<i64> {
    fields.iter().find_map(|f| doc.get(f).and_then(|v| v.as_i64()))
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

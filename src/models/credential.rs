use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Per-user LinkedIn connection, written by the account-connection flow in
/// the main web app. Read-only from this service; the token is AES-GCM
/// encrypted at rest.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserCredential {
    pub user_id: Uuid,
    pub access_token_enc: Vec<u8>,
    pub token_expires_at: DateTime<Utc>,
    /// Member id portion of the person URN (urn:li:person:<id>).
    pub linkedin_person_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserCredential {
    pub fn person_urn(&self) -> String {
        format!("urn:li:person:{}", self.linkedin_person_id)
    }
}

pub mod client;

use async_trait::async_trait;

pub use client::LinkedInClient;

/// Outcome of a successful publish: the platform-assigned post id.
#[derive(Debug, Clone)]
pub struct PublishedPost {
    pub post_id: String,
}

/// Why a publish attempt failed. Each variant carries enough detail for the
/// stored last_error and operator logs; none is retried inside the publisher
/// itself (retry is a property of subsequent cron runs).
#[derive(Debug)]
pub enum PublishError {
    /// Stored token expired before we made any call.
    TokenExpired,
    /// v2/assets registerUpload failed.
    Registration(String),
    /// Fetching the source image from its host failed.
    ImageFetch(String),
    /// Binary upload to the issued upload URL failed.
    Upload(String),
    /// ugcPosts share creation failed.
    Share(String),
    /// A response didn't contain what the protocol promises.
    MalformedResponse(String),
}

impl std::fmt::Display for PublishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublishError::TokenExpired => write!(f, "LinkedIn access token expired"),
            PublishError::Registration(msg) => write!(f, "Media registration failed: {msg}"),
            PublishError::ImageFetch(msg) => write!(f, "Image download failed: {msg}"),
            PublishError::Upload(msg) => write!(f, "Media upload failed: {msg}"),
            PublishError::Share(msg) => write!(f, "Share creation failed: {msg}"),
            PublishError::MalformedResponse(msg) => {
                write!(f, "Malformed LinkedIn response: {msg}")
            }
        }
    }
}

impl std::error::Error for PublishError {}

/// Content to publish, already decoupled from the row shape.
#[derive(Debug, Clone)]
pub struct PublishRequest<'a> {
    pub text: &'a str,
    pub image_url: Option<&'a str>,
    pub person_urn: &'a str,
    pub access_token: &'a str,
    /// Expiry of the stored token; the publisher rejects an expired one
    /// before making any API call.
    pub token_expires_at: chrono::DateTime<chrono::Utc>,
}

/// Seam between the run pipeline and the live API, so the pipeline is
/// testable against a stub.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, req: PublishRequest<'_>) -> Result<PublishedPost, PublishError>;
}

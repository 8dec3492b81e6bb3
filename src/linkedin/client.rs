use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde_json::json;

use super::{PublishError, PublishRequest, PublishedPost, Publisher};

/// Live LinkedIn v2 client. The publish protocol is three calls when the
/// post carries an image (registerUpload, binary upload, ugcPosts) and one
/// when it doesn't, all under the user's bearer token.
pub struct LinkedInClient {
    client: reqwest::Client,
    api_base: String,
}

impl LinkedInClient {
    pub fn new(api_base: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build reqwest client"),
            api_base,
        }
    }

    /// Register an upload session. Returns (upload_url, asset_urn).
    async fn register_upload(
        &self,
        token: &str,
        person_urn: &str,
    ) -> Result<(String, String), PublishError> {
        let body = json!({
            "registerUploadRequest": {
                "recipes": ["urn:li:digitalmediaRecipe:feedshare-image"],
                "owner": person_urn,
                "serviceRelationships": [{
                    "relationshipType": "OWNER",
                    "identifier": "urn:li:userGeneratedContent"
                }]
            }
        });

        let resp = self
            .client
            .post(format!("{}/v2/assets?action=registerUpload", self.api_base))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| PublishError::Registration(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(PublishError::Registration(http_failure(resp).await));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| PublishError::MalformedResponse(e.to_string()))?;

        let upload_url = body["value"]["uploadMechanism"]
            ["com.linkedin.digitalmedia.uploading.MediaUploadHttpRequest"]["uploadUrl"]
            .as_str()
            .ok_or_else(|| PublishError::MalformedResponse("no uploadUrl in registration".into()))?
            .to_string();

        let asset = body["value"]["asset"]
            .as_str()
            .ok_or_else(|| PublishError::MalformedResponse("no asset in registration".into()))?
            .to_string();

        Ok((upload_url, asset))
    }

    async fn fetch_image(&self, url: &str) -> Result<Bytes, PublishError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PublishError::ImageFetch(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(PublishError::ImageFetch(http_failure(resp).await));
        }

        resp.bytes()
            .await
            .map_err(|e| PublishError::ImageFetch(e.to_string()))
    }

    async fn upload_image(
        &self,
        upload_url: &str,
        token: &str,
        image: Bytes,
    ) -> Result<(), PublishError> {
        let resp = self
            .client
            .post(upload_url)
            .bearer_auth(token)
            .header("Content-Type", "application/octet-stream")
            .body(image)
            .send()
            .await
            .map_err(|e| PublishError::Upload(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(PublishError::Upload(http_failure(resp).await));
        }
        Ok(())
    }

    async fn create_share(
        &self,
        req: &PublishRequest<'_>,
        asset: Option<&str>,
    ) -> Result<String, PublishError> {
        let share_content = match asset {
            Some(asset) => json!({
                "shareCommentary": { "text": req.text },
                "shareMediaCategory": "IMAGE",
                "media": [{ "status": "READY", "media": asset }]
            }),
            None => json!({
                "shareCommentary": { "text": req.text },
                "shareMediaCategory": "NONE"
            }),
        };

        let body = json!({
            "author": req.person_urn,
            "lifecycleState": "PUBLISHED",
            "specificContent": { "com.linkedin.ugc.ShareContent": share_content },
            "visibility": { "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC" }
        });

        let resp = self
            .client
            .post(format!("{}/v2/ugcPosts", self.api_base))
            .bearer_auth(req.access_token)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&body)
            .send()
            .await
            .map_err(|e| PublishError::Share(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(PublishError::Share(http_failure(resp).await));
        }

        // The created post id arrives in the X-RestLi-Id header; some
        // responses carry it in the body instead.
        if let Some(id) = resp
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
        {
            return Ok(id.to_string());
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| PublishError::MalformedResponse(e.to_string()))?;

        body["id"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| PublishError::MalformedResponse("no post id in share response".into()))
    }
}

#[async_trait]
impl Publisher for LinkedInClient {
    async fn publish(&self, req: PublishRequest<'_>) -> Result<PublishedPost, PublishError> {
        if req.token_expires_at <= Utc::now() {
            return Err(PublishError::TokenExpired);
        }

        // All-or-nothing image policy: any media failure fails the whole
        // attempt rather than degrading to a text-only post.
        let asset = match req.image_url {
            Some(url) => {
                let (upload_url, asset) =
                    self.register_upload(req.access_token, req.person_urn).await?;
                let image = self.fetch_image(url).await?;
                self.upload_image(&upload_url, req.access_token, image).await?;
                Some(asset)
            }
            None => None,
        };

        let post_id = self.create_share(&req, asset.as_deref()).await?;
        Ok(PublishedPost { post_id })
    }
}

/// Status line plus a bounded body excerpt for stored errors.
async fn http_failure(resp: reqwest::Response) -> String {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(256)
        .collect::<String>();
    format!("HTTP {status}: {body}")
}

use crate::domain::ports::Mailer;
use crate::utils::error::{InvoiceError, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;

/// Gmail REST client bound to one OAuth access token.
#[derive(Debug, Clone)]
pub struct GmailClient {
    client: Client,
    api_base: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Profile {
    email_address: String,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

impl GmailClient {
    pub fn new(api_base: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/gmail/v1/users/me/{}", self.api_base, path)
    }

    async fn check(response: Response, action: &str) -> Result<Response> {
        let status = response.status();
        tracing::debug!("Gmail {} response status: {}", action, status);
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(InvoiceError::auth(format!(
                "Gmail rejected the access token while trying to {} ({}): {}",
                action, status, body
            )));
        }
        Err(InvoiceError::email(format!(
            "Gmail failed to {} ({}): {}",
            action, status, body
        )))
    }
}

#[async_trait]
impl Mailer for GmailClient {
    async fn sender_address(&self) -> Result<String> {
        let response = self
            .client
            .get(self.endpoint("profile"))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let profile: Profile = Self::check(response, "read the account profile")
            .await?
            .json()
            .await?;
        Ok(profile.email_address)
    }

    async fn create_draft(&self, raw: &str) -> Result<String> {
        let response = self
            .client
            .post(self.endpoint("drafts"))
            .bearer_auth(&self.access_token)
            .json(&json!({ "message": { "raw": raw } }))
            .send()
            .await?;
        let created: Created = Self::check(response, "create a draft").await?.json().await?;
        Ok(created.id)
    }

    async fn send(&self, raw: &str) -> Result<String> {
        let response = self
            .client
            .post(self.endpoint("messages/send"))
            .bearer_auth(&self.access_token)
            .json(&json!({ "raw": raw }))
            .send()
            .await?;
        let created: Created = Self::check(response, "send a message").await?.json().await?;
        Ok(created.id)
    }
}

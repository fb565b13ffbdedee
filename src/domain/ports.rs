use crate::utils::error::Result;
use async_trait::async_trait;

/// Where generated invoice files go.
pub trait Storage: Send + Sync {
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Outbound mail service. `raw` is a complete RFC 822 message, URL-safe base64 encoded.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Address of the authenticated account.
    async fn sender_address(&self) -> Result<String>;
    /// Saves the message as a draft and returns the draft id.
    async fn create_draft(&self, raw: &str) -> Result<String>;
    /// Sends the message and returns the message id.
    async fn send(&self, raw: &str) -> Result<String>;
}

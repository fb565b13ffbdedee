use crate::config::toml_config::GmailConfig;
use crate::utils::error::{InvoiceError, Result};
use crate::utils::validation::{validate_non_empty_string, validate_required_field};
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

pub const GMAIL_COMPOSE_SCOPE: &str = "https://www.googleapis.com/auth/gmail.compose";

/// Tokens are refreshed this long before they actually expire.
const EXPIRY_MARGIN_SECS: i64 = 60;

const CALLBACK_PAGE: &str = "<html><body><p>Authorization complete. You can close this window.</p></body></html>";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl StoredToken {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) > now
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    refresh_token: Option<String>,
}

impl TokenResponse {
    /// Google omits the refresh token on refresh responses; keep the previous one.
    fn into_stored(self, previous_refresh: Option<String>) -> StoredToken {
        StoredToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at: Utc::now() + Duration::seconds(self.expires_in),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OAuthClient {
    client: Client,
    client_id: String,
    client_secret: String,
    auth_uri: String,
    token_uri: String,
    token_file: PathBuf,
}

impl OAuthClient {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        auth_uri: impl Into<String>,
        token_uri: impl Into<String>,
        token_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client: Client::new(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_uri: auth_uri.into(),
            token_uri: token_uri.into(),
            token_file: token_file.into(),
        }
    }

    pub fn from_config(config: &GmailConfig, token_file: &Path) -> Result<Self> {
        let client_id = validate_required_field("gmail.client_id", &config.client_id)?;
        let client_secret = validate_required_field("gmail.client_secret", &config.client_secret)?;
        validate_non_empty_string("gmail.client_id", client_id)?;
        Ok(Self::new(
            client_id.as_str(),
            client_secret.as_str(),
            config.auth_uri.clone(),
            config.token_uri.clone(),
            token_file,
        ))
    }

    pub fn token_file(&self) -> &Path {
        &self.token_file
    }

    pub fn load_token(&self) -> Result<Option<StoredToken>> {
        if !self.token_file.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.token_file)?;
        match serde_json::from_str(&content) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                tracing::warn!(
                    "Ignoring unreadable token file {}: {}",
                    self.token_file.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    fn save_token(&self, token: &StoredToken) -> Result<()> {
        if let Some(parent) = self.token_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(token)?;
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
            options.mode(0o600);
            // mode() only applies to new files
            if self.token_file.exists() {
                std::fs::set_permissions(&self.token_file, std::fs::Permissions::from_mode(0o600))?;
            }
        }
        options.open(&self.token_file)?.write_all(content.as_bytes())?;
        tracing::debug!("Stored Gmail token in {}", self.token_file.display());
        Ok(())
    }

    /// Returns a usable access token. Tries the stored token, then a refresh,
    /// then the interactive flow. `force_new` skips straight to the interactive flow.
    pub async fn access_token(&self, force_new: bool) -> Result<String> {
        if !force_new {
            if let Some(token) = self.load_token()? {
                if token.is_fresh(Utc::now()) {
                    return Ok(token.access_token);
                }
                if let Some(refresh_token) = &token.refresh_token {
                    match self.refresh(refresh_token).await {
                        Ok(token) => return Ok(token.access_token),
                        Err(e) => tracing::warn!("Token refresh failed, re-authorizing: {}", e),
                    }
                }
            }
        }
        Ok(self.authorize().await?.access_token)
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<StoredToken> {
        tracing::debug!("Refreshing Gmail access token");
        let response = self
            .client
            .post(&self.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;
        let token = Self::token_from(response)
            .await?
            .into_stored(Some(refresh_token.to_string()));
        self.save_token(&token)?;
        Ok(token)
    }

    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<StoredToken> {
        let response = self
            .client
            .post(&self.token_uri)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;
        let token = Self::token_from(response).await?.into_stored(None);
        self.save_token(&token)?;
        Ok(token)
    }

    async fn token_from(response: reqwest::Response) -> Result<TokenResponse> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InvoiceError::auth(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }
        Ok(response.json().await?)
    }

    pub fn authorization_url(&self, redirect_uri: &str, state: &str) -> Result<String> {
        let mut url = url::Url::parse(&self.auth_uri).map_err(|e| {
            InvoiceError::InvalidConfigValueError {
                field: "gmail.auth_uri".to_string(),
                value: self.auth_uri.clone(),
                reason: e.to_string(),
            }
        })?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", GMAIL_COMPOSE_SCOPE)
            .append_pair("state", state)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");
        Ok(url.to_string())
    }

    /// Installed-app flow: the user opens the printed URL, Google redirects
    /// back to a one-shot listener on 127.0.0.1.
    pub async fn authorize(&self) -> Result<StoredToken> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let redirect_uri = format!("http://127.0.0.1:{}", port);
        let state = format!("{:x}", Utc::now().timestamp_nanos_opt().unwrap_or_default());

        let url = self.authorization_url(&redirect_uri, &state)?;
        tracing::info!("🔑 Waiting for Google authorization on {}", redirect_uri);
        println!("Open this URL in a browser to allow access to Gmail:\n\n{}\n", url);

        let code = listen_for_code(&listener, &state).await?;
        let token = self.exchange_code(&code, &redirect_uri).await?;
        tracing::info!("✅ Gmail authorization stored in {}", self.token_file.display());
        Ok(token)
    }
}

/// Query of the redirect Google sends back.
#[derive(Debug, Default)]
struct Redirect {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

impl Redirect {
    fn is_empty(&self) -> bool {
        self.code.is_none() && self.state.is_none() && self.error.is_none()
    }
}

/// Reads one request and answers it. Returns `None` for anything that is not
/// the authorization redirect (favicon, preconnect, empty connection).
async fn read_redirect(stream: tokio::net::TcpStream) -> Result<Option<Redirect>> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).await? == 0 || header.trim().is_empty() {
            break;
        }
    }

    let redirect = request_line
        .split_whitespace()
        .nth(1)
        .and_then(|target| url::Url::parse(&format!("http://127.0.0.1{}", target)).ok())
        .map(|url| {
            let mut redirect = Redirect::default();
            for (key, value) in url.query_pairs() {
                match key.as_ref() {
                    "code" => redirect.code = Some(value.into_owned()),
                    "state" => redirect.state = Some(value.into_owned()),
                    "error" => redirect.error = Some(value.into_owned()),
                    _ => {}
                }
            }
            redirect
        })
        .filter(|redirect| !redirect.is_empty());

    let response = match &redirect {
        Some(_) => format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            CALLBACK_PAGE.len(),
            CALLBACK_PAGE
        ),
        None => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
    };
    // the browser may already have dropped a preconnect
    if writer.write_all(response.as_bytes()).await.is_ok() {
        let _ = writer.shutdown().await;
    }
    Ok(redirect)
}

/// Serves connections until the redirect arrives, then returns its `code`
/// after checking `state`.
pub async fn listen_for_code(listener: &TcpListener, expected_state: &str) -> Result<String> {
    let redirect = loop {
        let (stream, _) = listener.accept().await?;
        match read_redirect(stream).await {
            Ok(Some(redirect)) => break redirect,
            Ok(None) => tracing::debug!("Ignoring request without authorization parameters"),
            Err(e) => tracing::debug!("Ignoring broken connection on redirect listener: {}", e),
        }
    };

    if let Some(error) = redirect.error {
        return Err(InvoiceError::auth(format!("authorization denied: {}", error)));
    }
    if redirect.state.as_deref() != Some(expected_state) {
        return Err(InvoiceError::auth("authorization state mismatch"));
    }
    redirect
        .code
        .ok_or_else(|| InvoiceError::auth("authorization redirect had no code"))
}

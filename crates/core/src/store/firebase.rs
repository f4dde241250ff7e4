use crate::config::Settings;
use crate::store::RemoteStore;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRIES: u32 = 3;
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const SCOPES: &str = "https://www.googleapis.com/auth/firebase.database \
                      https://www.googleapis.com/auth/userinfo.email";
const ASSERTION_TTL_SECS: i64 = 3600;

/// Where the service-account key comes from. The inline blob wins over the file.
#[derive(Clone)]
pub enum CredentialSource {
    Inline(String),
    File(PathBuf),
}

impl CredentialSource {
    pub fn from_settings(settings: &Settings) -> Self {
        match &settings.firebase_credentials_json {
            Some(blob) => Self::Inline(blob.clone()),
            None => Self::File(settings.firebase_credentials_path.clone()),
        }
    }

    async fn load(&self) -> Result<ServiceAccountKey> {
        let text = match self {
            Self::Inline(blob) => blob.clone(),
            Self::File(path) => tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read credentials file {}", path.display()))?,
        };
        ServiceAccountKey::parse(&text)
    }
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline(_) => f.write_str("Inline(<redacted>)"),
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
        }
    }
}

/// The fields of a Google service-account key file that the token exchange needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl ServiceAccountKey {
    pub fn parse(text: &str) -> Result<Self> {
        let key = serde_json::from_str::<Self>(text)
            .context("failed to parse service account credentials")?;
        anyhow::ensure!(
            !key.client_email.trim().is_empty(),
            "service account client_email must be non-empty"
        );
        anyhow::ensure!(
            !key.private_key.trim().is_empty(),
            "service account private_key must be non-empty"
        );
        Ok(key)
    }
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

struct Session {
    client_email: String,
    key_id: Option<String>,
    token_uri: String,
    encoding_key: EncodingKey,
}

impl Session {
    fn new(key: ServiceAccountKey) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .context("service account private_key is not a valid RSA PEM key")?;
        let token_uri = key
            .token_uri
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string());

        Ok(Self {
            client_email: key.client_email,
            key_id: key.private_key_id,
            token_uri,
            encoding_key,
        })
    }

    fn assertion(&self, now: DateTime<Utc>) -> Result<String> {
        let iat = now.timestamp();
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: SCOPES,
            aud: &self.token_uri,
            iat,
            exp: iat + ASSERTION_TTL_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key_id.clone();
        jsonwebtoken::encode(&header, &claims, &self.encoding_key)
            .context("failed to sign service account assertion")
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Clone, Deserialize)]
struct AccessToken {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Clone)]
struct CachedToken {
    token: AccessToken,
    fetched_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_expired_or_stale(&self, now: DateTime<Utc>) -> bool {
        if self.token.expires_in == 0 {
            return true;
        }
        // Refresh a bit early so a request never goes out with a token about to lapse.
        let exp = self.fetched_at + chrono::Duration::seconds(self.token.expires_in as i64);
        now + chrono::Duration::minutes(2) >= exp
    }
}

/// Firebase Realtime Database over its REST API, authenticated with a service account.
///
/// Credentials are loaded on the first [`RemoteStore::connect`] and kept for the life of the
/// client; the OAuth access token is cached and refreshed shortly before it expires.
pub struct FirebaseClient {
    http: reqwest::Client,
    database_url: String,
    base_path: String,
    credentials: CredentialSource,
    retries: u32,
    /// First retry delay; doubles on each further attempt.
    retry_backoff: Duration,
    session: tokio::sync::OnceCell<Session>,
    token_cache: tokio::sync::Mutex<Option<CachedToken>>,
}

impl fmt::Debug for FirebaseClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirebaseClient")
            .field("database_url", &self.database_url)
            .field("base_path", &self.base_path)
            .field("credentials", &self.credentials)
            .field("retries", &self.retries)
            .field("connected", &self.session.initialized())
            .finish()
    }
}

impl FirebaseClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let timeout_secs = settings.firebase_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let retries = settings.firebase_retries.unwrap_or(DEFAULT_RETRIES).max(1);

        Url::parse(&settings.firebase_database_url).with_context(|| {
            format!(
                "FIREBASE_DATABASE_URL is not a valid URL: {}",
                settings.firebase_database_url
            )
        })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build firebase http client")?;

        Ok(Self {
            http,
            database_url: settings.firebase_database_url.clone(),
            base_path: settings.firebase_base_path.clone(),
            credentials: CredentialSource::from_settings(settings),
            retries,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            session: tokio::sync::OnceCell::new(),
            token_cache: tokio::sync::Mutex::new(None),
        })
    }

    /// REST URL of the node at `path`, relative to the configured base path.
    pub fn node_url(&self, path: &str) -> Result<Url> {
        let mut segments: Vec<String> = self
            .base_path
            .split('/')
            .chain(path.split('/'))
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        match segments.last_mut() {
            Some(last) => last.push_str(".json"),
            None => segments.push(".json".to_string()),
        }

        let mut url = Url::parse(&self.database_url).context("invalid firebase database URL")?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("firebase database URL cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn session(&self) -> Result<&Session> {
        self.session
            .get_or_try_init(|| async {
                let key = self.credentials.load().await?;
                let session = Session::new(key)?;
                tracing::info!(
                    client_email = %session.client_email,
                    database_url = %self.database_url,
                    "firebase client initialized"
                );
                Ok::<_, anyhow::Error>(session)
            })
            .await
    }

    async fn access_token(&self) -> Result<String> {
        let session = self.session().await?;

        let mut guard = self.token_cache.lock().await;
        if let Some(cached) = guard.as_ref() {
            if !cached.is_expired_or_stale(Utc::now()) {
                return Ok(cached.token.access_token.clone());
            }
        }

        let fetched_at = Utc::now();
        let token = self.fetch_access_token(session, fetched_at).await?;
        let access_token = token.access_token.clone();
        *guard = Some(CachedToken { token, fetched_at });
        Ok(access_token)
    }

    async fn fetch_access_token(
        &self,
        session: &Session,
        now: DateTime<Utc>,
    ) -> Result<AccessToken> {
        let assertion = session.assertion(now)?;

        let res = self
            .http
            .post(&session.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .context("firebase token request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read firebase token response")?;
        if !status.is_success() {
            anyhow::bail!("firebase token HTTP {status}: {text}");
        }

        serde_json::from_str::<AccessToken>(&text).context("failed to parse firebase token response")
    }

    fn headers(&self, access_token: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {access_token}"))?,
        );
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[async_trait::async_trait]
impl RemoteStore for FirebaseClient {
    fn store_name(&self) -> &'static str {
        "firebase_rtdb"
    }

    async fn connect(&self) -> Result<()> {
        self.session().await?;
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Value>> {
        let url = self.node_url(path)?;
        let headers = self.headers(&self.access_token().await?)?;

        let mut attempt: u32 = 0;
        let text = loop {
            attempt += 1;

            let res = self.http.get(url.clone()).headers(headers.clone()).send().await;
            let res = match res {
                Ok(r) => r,
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err).context("firebase read request failed");
                    }
                    let backoff = self.retry_backoff * (1 << (attempt - 1));
                    tracing::warn!(attempt, ?backoff, %path, error = %err, "firebase read failed; retrying");
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            };

            let status = res.status();
            let text = res
                .text()
                .await
                .context("failed to read firebase response")?;

            if !status.is_success() {
                let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                if retryable && attempt < self.retries {
                    let backoff = self.retry_backoff * (1 << (attempt - 1));
                    tracing::warn!(
                        attempt,
                        ?backoff,
                        %path,
                        http_status = %status,
                        "firebase HTTP error; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    continue;
                }
                anyhow::bail!("firebase read HTTP {status} for {path}: {text}");
            }

            break text;
        };

        let value = serde_json::from_str::<Value>(&text)
            .with_context(|| format!("firebase response for {path} is not valid JSON: {text}"))?;
        Ok(match value {
            Value::Null => None,
            v => Some(v),
        })
    }
}

//! Access token providers for the Google Drive API.
//!
//! Three sources are supported:
//! - installed-app OAuth user credentials, cached through a [`CredentialStore`]
//! - a service account key (JWT bearer grant)
//! - a pre-issued bearer token

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::consent::{obtain_code, AuthorizationCode, ConsentMode};
use crate::credential_store::{CredentialStore, StoredToken, TokenState};
use crate::error::{DriveError, Result};
use crate::models::{
    default_auth_uri, default_token_uri, ClientSecrets, ClientSecretsFile,
    ServiceAccountCredentials, TokenResponse,
};

/// Read-only access to file metadata is all a report needs.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive.metadata.readonly";

/// Source of bearer tokens for Drive requests.
#[derive(Clone)]
pub enum Authenticator {
    ServiceAccount(ServiceAccountAuth),
    User(UserAuth),
    Static(String),
}

impl Authenticator {
    /// Create a service account authenticator from a JSON key file.
    pub fn from_service_account_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::ServiceAccount(ServiceAccountAuth::from_file(path)?))
    }

    /// Create a user authenticator backed by `store`.
    pub fn user(
        secrets: ClientSecrets,
        store: Arc<dyn CredentialStore>,
        consent: ConsentMode,
    ) -> Self {
        Self::User(UserAuth::new(secrets, store, consent))
    }

    /// Use a token obtained elsewhere, as is.
    pub fn from_token(token: impl Into<String>) -> Self {
        Self::Static(token.into())
    }

    /// Get a valid access token, refreshing or re-authorizing if necessary.
    pub async fn get_access_token(&self) -> Result<String> {
        match self {
            Self::ServiceAccount(auth) => auth.get_access_token().await,
            Self::User(auth) => auth.get_access_token().await,
            Self::Static(token) => Ok(token.clone()),
        }
    }
}

/// Load OAuth client registration from `path`, or build it from an explicit
/// client id and secret when the file does not exist.
pub fn load_client_secrets<P: AsRef<Path>>(
    path: P,
    client_id: Option<String>,
    client_secret: Option<String>,
) -> Result<ClientSecrets> {
    let path = path.as_ref();
    if path.exists() {
        let content = fs::read_to_string(path)?;
        let file: ClientSecretsFile = serde_json::from_str(&content)?;
        return Ok(file.installed);
    }

    match (client_id, client_secret) {
        (Some(client_id), Some(client_secret)) => Ok(ClientSecrets {
            client_id,
            client_secret,
            auth_uri: default_auth_uri(),
            token_uri: default_token_uri(),
        }),
        (None, _) => Err(DriveError::MissingEnvVar("GOOGLE_CLIENT_ID".to_string())),
        (_, None) => Err(DriveError::MissingEnvVar("GOOGLE_CLIENT_SECRET".to_string())),
    }
}

/// JWT claims for service account authentication.
#[derive(Debug, Serialize)]
struct Claims {
    iss: String,
    scope: String,
    aud: String,
    exp: u64,
    iat: u64,
}

/// Cached access token with expiration.
#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: SystemTime,
}

/// Authenticator using service account credentials.
#[derive(Clone)]
pub struct ServiceAccountAuth {
    credentials: Arc<ServiceAccountCredentials>,
    client: Client,
    cached_token: Arc<RwLock<Option<CachedToken>>>,
}

impl ServiceAccountAuth {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let credentials: ServiceAccountCredentials = serde_json::from_str(&content)?;
        Ok(Self::new(credentials))
    }

    pub fn new(credentials: ServiceAccountCredentials) -> Self {
        Self {
            credentials: Arc::new(credentials),
            client: Client::new(),
            cached_token: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn get_access_token(&self) -> Result<String> {
        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                // 60 second buffer before expiration
                if token.expires_at > SystemTime::now() + Duration::from_secs(60) {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let new_token = self.request_token().await?;
        *self.cached_token.write().await = Some(new_token.clone());

        Ok(new_token.access_token)
    }

    fn token_uri(&self) -> String {
        self.credentials
            .token_uri
            .clone()
            .unwrap_or_else(default_token_uri)
    }

    async fn request_token(&self) -> Result<CachedToken> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| DriveError::AuthenticationError(format!("System clock error: {}", e)))?
            .as_secs();
        let token_uri = self.token_uri();

        let claims = Claims {
            iss: self.credentials.client_email.clone(),
            scope: DRIVE_SCOPE.to_string(),
            aud: token_uri.clone(),
            iat: now,
            exp: now + 3600,
        };

        let header = Header::new(Algorithm::RS256);
        let key = EncodingKey::from_rsa_pem(self.credentials.private_key.as_bytes())?;
        let jwt = encode(&header, &claims, &key)?;

        let params = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", &jwt),
        ];

        debug!(client_email = %self.credentials.client_email, "requesting service account token");
        let response = self.client.post(&token_uri).form(&params).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::AuthenticationError(format!(
                "Status {}: {}",
                status, body
            )));
        }

        let token_response: TokenResponse = response.json().await?;

        Ok(CachedToken {
            access_token: token_response.access_token,
            expires_at: SystemTime::now() + Duration::from_secs(token_response.expires_in),
        })
    }
}

/// Authenticator for an end user of an installed application.
///
/// Each call walks the [`TokenState`] machine: a valid token is used as is,
/// an expired token with a refresh token is refreshed, and anything else
/// sends the user through the consent flow. Every new token is written back
/// to the credential store.
#[derive(Clone)]
pub struct UserAuth {
    secrets: Arc<ClientSecrets>,
    store: Arc<dyn CredentialStore>,
    consent: ConsentMode,
    client: Client,
    current: Arc<RwLock<Option<StoredToken>>>,
}

impl UserAuth {
    pub fn new(
        secrets: ClientSecrets,
        store: Arc<dyn CredentialStore>,
        consent: ConsentMode,
    ) -> Self {
        Self {
            secrets: Arc::new(secrets),
            store,
            consent,
            client: Client::new(),
            current: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn get_access_token(&self) -> Result<String> {
        {
            let current = self.current.read().await;
            if let Some(token) = current.as_ref() {
                if TokenState::classify(Some(token), Utc::now()) == TokenState::ValidToken {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let mut current = self.current.write().await;
        let stored = match current.take() {
            Some(token) => Some(token),
            None => self.store.load()?,
        };

        let token = self.resolve(stored).await?;
        let access_token = token.access_token.clone();
        *current = Some(token);

        Ok(access_token)
    }

    async fn resolve(&self, stored: Option<StoredToken>) -> Result<StoredToken> {
        let state = TokenState::classify(stored.as_ref(), Utc::now());
        debug!(?state, "resolving user token");

        match (state, stored) {
            (TokenState::ValidToken, Some(token)) => Ok(token),
            (TokenState::ExpiredRefreshable, Some(token)) => match self.refresh(&token).await {
                Ok(fresh) => {
                    self.store.save(&fresh)?;
                    Ok(fresh)
                }
                Err(DriveError::TokenRefreshError(reason)) => {
                    warn!(%reason, "refresh token rejected, asking for consent again");
                    self.store.clear()?;
                    self.authorize().await
                }
                Err(e) => Err(e),
            },
            _ => self.authorize().await,
        }
    }

    async fn authorize(&self) -> Result<StoredToken> {
        let code = obtain_code(&self.consent, &self.secrets, DRIVE_SCOPE).await?;
        let token = self.exchange_code(&code).await?;
        self.store.save(&token)?;
        info!("authorization granted");
        Ok(token)
    }

    /// Trade an authorization code for tokens.
    pub async fn exchange_code(&self, code: &AuthorizationCode) -> Result<StoredToken> {
        let params = [
            ("code", code.code.as_str()),
            ("client_id", self.secrets.client_id.as_str()),
            ("client_secret", self.secrets.client_secret.as_str()),
            ("redirect_uri", code.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .client
            .post(&self.secrets.token_uri)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::AuthenticationError(format!(
                "Token exchange failed with status {}: {}",
                status, body
            )));
        }

        let token_response: TokenResponse = response.json().await?;
        Ok(stored_token(token_response, None))
    }

    /// Use the refresh token to obtain a new access token.
    ///
    /// A rejection by the token endpoint is reported as
    /// [`DriveError::TokenRefreshError`]; transport failures keep their own
    /// variants.
    pub async fn refresh(&self, token: &StoredToken) -> Result<StoredToken> {
        let refresh_token = token
            .refresh_token
            .as_deref()
            .ok_or_else(|| DriveError::TokenRefreshError("No refresh token".to_string()))?;

        let params = [
            ("client_id", self.secrets.client_id.as_str()),
            ("client_secret", self.secrets.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        info!("refreshing expired access token");
        let response = self
            .client
            .post(&self.secrets.token_uri)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::TokenRefreshError(format!(
                "Status {}: {}",
                status, body
            )));
        }

        let token_response: TokenResponse = response.json().await?;
        Ok(stored_token(token_response, Some(refresh_token)))
    }
}

/// Convert a token response, keeping `previous_refresh` when Google does not
/// issue a new refresh token.
fn stored_token(response: TokenResponse, previous_refresh: Option<&str>) -> StoredToken {
    StoredToken {
        access_token: response.access_token,
        refresh_token: response
            .refresh_token
            .or_else(|| previous_refresh.map(str::to_string)),
        expires_at: Utc::now() + chrono::Duration::seconds(response.expires_in as i64),
        scope: response.scope,
    }
}

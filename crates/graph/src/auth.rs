use async_trait::async_trait;
use exn::ResultExt;
use quire_remote::error::{ErrorKind, Result};
use quire_remote::{AuthProvider, Credential};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::env::{EnvCredentials, persist_refresh_token};
use crate::models::{TokenError, TokenResponse};

/// Refresh this long before the reported expiry so a token never runs out
/// in the middle of a listing.
const EXPIRY_MARGIN: Duration = Duration::from_secs(120);
const DEFAULT_LIFETIME: Duration = Duration::from_secs(3600);
const TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

/// Hands out one pre-acquired access token. It is never refreshed.
pub struct StaticToken(Credential);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Credential::bearer(token))
    }
}

#[async_trait]
impl AuthProvider for StaticToken {
    async fn credential(&self) -> Result<Credential> {
        Ok(self.0.clone())
    }
}

struct TokenState {
    refresh_token: String,
    access: Option<(Credential, Instant)>,
}

/// OAuth 2.0 refresh-token grant against the Microsoft identity platform.
///
/// The access token is cached until shortly before it expires. When the
/// token endpoint rotates the refresh token, the new one replaces the old
/// one in memory and, if an env file was given, on disk.
pub struct RefreshTokenAuth {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    scopes: Vec<String>,
    env_file: Option<PathBuf>,
    state: Mutex<TokenState>,
}

impl RefreshTokenAuth {
    pub fn new(
        authority: &str,
        client_id: impl Into<String>,
        refresh_token: impl Into<String>,
        scopes: Vec<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(TOKEN_TIMEOUT)
            .build()
            .or_raise(|| ErrorKind::Network("could not initialise HTTP client".to_string()))?;
        Ok(Self {
            http,
            token_url: format!("{}/oauth2/v2.0/token", authority.trim_end_matches('/')),
            client_id: client_id.into(),
            scopes,
            env_file: None,
            state: Mutex::new(TokenState {
                refresh_token: refresh_token.into(),
                access: None,
            }),
        })
    }

    /// Write rotated refresh tokens back into this file.
    pub fn persist_to(mut self, env_file: impl Into<PathBuf>) -> Self {
        self.env_file = Some(env_file.into());
        self
    }

    fn scope(&self) -> String {
        let mut scopes = self.scopes.clone();
        if !scopes.iter().any(|scope| scope == "offline_access") {
            scopes.push("offline_access".to_string());
        }
        scopes.join(" ")
    }

    #[instrument(skip_all)]
    async fn redeem(&self, refresh_token: &str) -> Result<TokenResponse> {
        let scope = self.scope();
        let form = [
            ("client_id", self.client_id.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("scope", scope.as_str()),
        ];
        let response = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .or_raise(|| ErrorKind::Auth(format!("token endpoint unreachable: {}", self.token_url)))?;
        let status = response.status();
        if !status.is_success() {
            let error: TokenError = response.json().await.unwrap_or_default();
            exn::bail!(ErrorKind::Auth(error.describe(status.as_u16())));
        }
        response.json().await.or_raise(|| ErrorKind::Auth("malformed token response".to_string()))
    }
}

#[async_trait]
impl AuthProvider for RefreshTokenAuth {
    async fn credential(&self) -> Result<Credential> {
        let mut state = self.state.lock().await;
        if let Some((credential, expires_at)) = &state.access
            && Instant::now() + EXPIRY_MARGIN < *expires_at
        {
            return Ok(credential.clone());
        }

        debug!("refreshing access token");
        let token = self.redeem(&state.refresh_token).await?;
        let lifetime = token.expires_in.map(Duration::from_secs).unwrap_or(DEFAULT_LIFETIME);
        let credential = Credential::bearer(token.access_token);
        state.access = Some((credential.clone(), Instant::now() + lifetime));

        if let Some(rotated) = token.refresh_token
            && rotated != state.refresh_token
        {
            if let Some(path) = &self.env_file {
                match persist_refresh_token(path, &rotated).await {
                    Ok(true) => info!(path = %path.display(), "saved rotated refresh token"),
                    Ok(false) => debug!(path = %path.display(), "no credentials file, rotated refresh token kept for this run"),
                    // The new token is still usable for this run.
                    Err(e) => warn!(path = %path.display(), error = %*e, "could not save rotated refresh token"),
                }
            }
            state.refresh_token = rotated;
        }
        Ok(credential)
    }
}

/// Choose a provider from the credentials available in `env_file` (or the
/// environment): a refresh token plus client id is preferred, a bare access
/// token is accepted as a fallback.
pub fn provider_from_env(env_file: impl Into<PathBuf>, scopes: Vec<String>) -> Result<Box<dyn AuthProvider>> {
    let env_file = env_file.into();
    let creds = EnvCredentials::load(&env_file)?;
    match &creds {
        EnvCredentials {
            client_id: Some(client_id),
            refresh_token: Some(refresh_token),
            ..
        } => {
            let auth = RefreshTokenAuth::new(creds.authority(), client_id.clone(), refresh_token.clone(), scopes)?
                .persist_to(env_file);
            Ok(Box::new(auth))
        },
        EnvCredentials {
            access_token: Some(token),
            ..
        } => Ok(Box::new(StaticToken::new(token.clone()))),
        _ => exn::bail!(ErrorKind::Auth(format!(
            "no credentials found; set MICROSOFT_CLIENT_ID and MICROSOFT_REFRESH_TOKEN (or MICROSOFT_ACCESS_TOKEN) in {}",
            env_file.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scopes() -> Vec<String> {
        vec!["Notes.Read.All".to_string(), "Sites.Read.All".to_string()]
    }

    #[tokio::test]
    async fn test_static_token() {
        let auth = StaticToken::new("abc");
        assert_eq!(auth.credential().await.unwrap().token(), "abc");
    }

    #[test]
    fn test_token_url_and_scope() {
        let auth = RefreshTokenAuth::new("https://login.example.com/tenant/", "client", "refresh", scopes()).unwrap();
        assert_eq!(auth.token_url, "https://login.example.com/tenant/oauth2/v2.0/token");
        assert_eq!(auth.scope(), "Notes.Read.All Sites.Read.All offline_access");
    }

    #[tokio::test]
    async fn test_cached_access_token_is_reused() {
        let auth = RefreshTokenAuth::new("http://127.0.0.1:9", "client", "refresh", scopes()).unwrap();
        auth.state.lock().await.access =
            Some((Credential::bearer("cached"), Instant::now() + Duration::from_secs(3600)));
        // No request is made: the endpoint above is unreachable.
        assert_eq!(auth.credential().await.unwrap().token(), "cached");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_auth_error() {
        let auth = RefreshTokenAuth::new("http://127.0.0.1:9", "client", "refresh", scopes()).unwrap();
        let err = auth.credential().await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_provider_accepts_access_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "MICROSOFT_ACCESS_TOKEN=token-from-file\n").unwrap();
        assert!(provider_from_env(&path, scopes()).is_ok());
    }
}

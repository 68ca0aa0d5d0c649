//! Connect, authorize, exchange and refresh for authorization-code providers.
//!
//! A row moves from "credentials saved" (`is_connected = false`, a pending
//! CSRF state in the blob) to "authorized" (`is_connected = true`, tokens in
//! the blob). Refresh replaces tokens without changing that state.

pub mod endpoints;

use std::future::Future;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::errors::AppError;
use crate::metrics;
use crate::models::credentials::{CredentialBlob, PendingAuthorization, Secret};
use crate::models::credentials::ConnectParams;
use crate::models::integration::{Integration, Provider};
use crate::providers::calendly::CalendlyClient;
use crate::providers::{ProviderError, VendorEndpoints, VendorHttp};
use crate::registry::{IntegrationRegistry, LoadedIntegration};

use self::endpoints::{exchange_code, refresh_grant, OAuthEndpoint, TokenGrant, MAX_EXPIRES_IN_SECS};

/// Refresh proactively when the stored token expires within this window.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// 32 random bytes, URL-safe base64.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Debug, Clone)]
pub struct ConnectOutcome {
    pub integration: Integration,
    /// Set for authorization-code providers only.
    pub authorization_url: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompletedAuthorization {
    pub integration_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct OAuthService {
    registry: IntegrationRegistry,
    http: VendorHttp,
    endpoints: VendorEndpoints,
    redirect_uri: String,
}

impl OAuthService {
    pub fn new(
        registry: IntegrationRegistry,
        http: VendorHttp,
        endpoints: VendorEndpoints,
        redirect_uri: String,
    ) -> Self {
        Self {
            registry,
            http,
            endpoints,
            redirect_uri,
        }
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Save credentials for `provider`.
    ///
    /// API-key providers are connected immediately. Authorization-code
    /// providers are stored with a fresh CSRF state and the caller gets the
    /// URL to send the user to.
    pub async fn connect(
        &self,
        org_id: Uuid,
        user_id: Option<String>,
        provider: Provider,
        mut params: ConnectParams,
    ) -> Result<ConnectOutcome, AppError> {
        let name = params.name.take();

        if !provider.uses_oauth() {
            let blob = params.into_blob(provider, None)?;
            let integration = self
                .registry
                .connect_or_update(org_id, name, &blob, true)
                .await?;
            return Ok(ConnectOutcome {
                integration,
                authorization_url: None,
                state: None,
            });
        }

        let state = generate_state();
        let pending = PendingAuthorization {
            oauth_state: state.clone(),
            oauth_initiated_at: Utc::now(),
            oauth_user_id: user_id,
        };
        let blob = params.into_blob(provider, Some(pending))?;
        let endpoint = OAuthEndpoint::for_blob(&blob, &self.endpoints).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("{} has no authorization endpoint", provider))
        })?;
        let client_id = blob
            .oauth()
            .map(|o| o.client_id.clone())
            .unwrap_or_default();
        let authorization_url = endpoint
            .authorization_url(&client_id, &self.redirect_uri, &state)
            .map_err(anyhow::Error::from)?;

        let integration = self
            .registry
            .connect_or_update(org_id, name, &blob, false)
            .await?;
        tracing::info!(
            org_id = %org_id,
            provider = %provider,
            integration_id = %integration.id,
            "OAuth flow started"
        );

        Ok(ConnectOutcome {
            integration,
            authorization_url: Some(authorization_url),
            state: Some(state),
        })
    }

    /// Finish the authorization-code grant.
    ///
    /// The supplied state is checked against the pending one before the code
    /// is exchanged. On success the pending state is removed, so a replay of
    /// the same callback fails.
    pub async fn complete(
        &self,
        org_id: Uuid,
        provider: Provider,
        code: &str,
        state: &str,
    ) -> Result<CompletedAuthorization, AppError> {
        if !provider.uses_oauth() {
            return Err(AppError::Validation {
                field: "provider".into(),
                message: format!("{} does not use OAuth authorization", provider),
            });
        }
        if code.trim().is_empty() {
            return Err(AppError::Validation {
                field: "code".into(),
                message: "code is required".into(),
            });
        }

        let integration = self.registry.find(org_id, provider).await?.ok_or_else(|| {
            AppError::NotFound(format!(
                "{} integration not found. Please connect it first.",
                provider.display_name()
            ))
        })?;
        let mut blob = self.registry.open(&integration)?;

        let oauth = blob
            .oauth()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("{} blob has no OAuth section", provider)))?;
        let pending = oauth.pending.as_ref().ok_or_else(|| {
            AppError::Authorization(
                "no authorization is pending for this integration; start the connect flow again"
                    .into(),
            )
        })?;
        let matches: bool = pending.oauth_state.as_bytes().ct_eq(state.as_bytes()).into();
        if !matches {
            tracing::warn!(
                org_id = %org_id,
                provider = %provider,
                integration_id = %integration.id,
                "OAuth state mismatch, rejecting callback"
            );
            return Err(AppError::Authorization("invalid OAuth state".into()));
        }

        let endpoint = OAuthEndpoint::for_blob(&blob, &self.endpoints).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("{} has no authorization endpoint", provider))
        })?;
        let grant = exchange_code(
            &self.http,
            &endpoint,
            &oauth.client_id,
            oauth.client_secret.expose(),
            code,
            &self.redirect_uri,
        )
        .await
        .map_err(|e| AppError::provider(provider, e))?;

        if let CredentialBlob::Calendly(calendly) = &mut blob {
            let client = CalendlyClient::new(self.http.clone(), self.endpoints.clone());
            match client.current_user(&grant.access_token).await {
                Ok(user) => {
                    calendly.user_uri = Some(user.uri);
                    calendly.user_name = Some(user.name);
                    calendly.scheduling_url = user.scheduling_url;
                }
                Err(e) => tracing::warn!(
                    integration_id = %integration.id,
                    "Could not read Calendly profile after authorization: {}",
                    e
                ),
            }
        }

        let expires_at = apply_grant(&mut blob, grant);
        if let Some(oauth) = blob.oauth_mut() {
            oauth.pending = None;
            oauth.oauth_completed_at = Some(Utc::now());
        }

        let saved = self
            .registry
            .save_credentials(
                integration.id,
                &blob,
                Some(integration.config_version),
                Some(true),
            )
            .await?;
        if saved.is_none() {
            return Err(AppError::Authorization(
                "authorization was completed or restarted concurrently; start the connect flow again"
                    .into(),
            ));
        }

        tracing::info!(
            org_id = %org_id,
            provider = %provider,
            integration_id = %integration.id,
            "OAuth flow completed"
        );
        Ok(CompletedAuthorization {
            integration_id: integration.id,
            expires_at,
        })
    }

    /// Run `call` with a valid access token for the loaded integration.
    ///
    /// An expired token is refreshed before the first attempt; otherwise a 401
    /// triggers one refresh and one retry. Refresh happens at most once per
    /// invocation either way.
    pub async fn with_access_token<T, F, Fut>(
        &self,
        loaded: &mut LoadedIntegration,
        call: F,
    ) -> Result<T, AppError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let provider = loaded.integration.provider;
        let oauth = loaded
            .credentials
            .oauth()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("{} does not use OAuth", provider)))?;

        let margin = Duration::seconds(EXPIRY_MARGIN_SECS);
        let (token, refreshed) = match &oauth.access_token {
            Some(token) if !oauth.needs_refresh(Utc::now(), margin) => {
                (token.expose().to_string(), false)
            }
            _ => (self.refresh(loaded).await?, true),
        };

        match call(token).await {
            Err(ProviderError::Unauthorized) if !refreshed => {
                tracing::info!(
                    provider = %provider,
                    integration_id = %loaded.integration.id,
                    "Access token rejected, refreshing once"
                );
                let token = self.refresh(loaded).await?;
                call(token).await.map_err(|e| AppError::provider(provider, e))
            }
            other => other.map_err(|e| AppError::provider(provider, e)),
        }
    }

    /// Refresh and persist. Returns the access token to use.
    async fn refresh(&self, loaded: &mut LoadedIntegration) -> Result<String, AppError> {
        let provider = loaded.integration.provider;
        let result = self.refresh_inner(loaded).await;
        metrics::record_token_refresh(provider, result.is_ok());
        result
    }

    async fn refresh_inner(&self, loaded: &mut LoadedIntegration) -> Result<String, AppError> {
        let provider = loaded.integration.provider;
        let integration_id = loaded.integration.id;
        let oauth = loaded
            .credentials
            .oauth()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("{} does not use OAuth", provider)))?;
        let previous_token = oauth.access_token.clone();
        let refresh_token = oauth
            .refresh_token
            .as_ref()
            .ok_or_else(|| AppError::provider(provider, ProviderError::Unauthorized))?;

        let endpoint = OAuthEndpoint::for_blob(&loaded.credentials, &self.endpoints).ok_or_else(
            || AppError::Internal(anyhow::anyhow!("{} has no token endpoint", provider)),
        )?;
        let grant = refresh_grant(
            &self.http,
            &endpoint,
            &oauth.client_id,
            oauth.client_secret.expose(),
            refresh_token.expose(),
        )
        .await
        .map_err(|e| {
            tracing::warn!(
                provider = %provider,
                integration_id = %integration_id,
                "Token refresh failed: {}",
                e
            );
            match e {
                ProviderError::Transient(_) => AppError::provider(provider, e),
                _ => AppError::provider(provider, ProviderError::Unauthorized),
            }
        })?;

        let mut updated = loaded.credentials.clone();
        apply_grant(&mut updated, grant);
        let token = current_token(&updated)?;

        let saved = self
            .registry
            .save_credentials(
                integration_id,
                &updated,
                Some(loaded.integration.config_version),
                None,
            )
            .await?;
        if let Some(version) = saved {
            loaded.integration.config_version = version;
            loaded.credentials = updated;
            tracing::debug!(provider = %provider, integration_id = %integration_id, "Refreshed token persisted");
            return Ok(token);
        }

        // Another request wrote the row first. Prefer its token when it
        // differs from the one we started with.
        let Some(current) = self
            .registry
            .find(loaded.integration.organization_id, provider)
            .await?
            .filter(|row| row.id == integration_id)
        else {
            return Err(AppError::not_connected(provider));
        };
        let winner = self.registry.open(&current)?;
        let winner_token = winner.oauth().and_then(|o| o.access_token.clone());
        if winner_token.is_some() && winner_token != previous_token {
            let token = current_token(&winner)?;
            loaded.integration = current;
            loaded.credentials = winner;
            tracing::debug!(provider = %provider, integration_id = %integration_id, "Using concurrently refreshed token");
            return Ok(token);
        }

        tracing::warn!(
            provider = %provider,
            integration_id = %integration_id,
            "Concurrent credential write detected, storing refreshed token last-write-wins"
        );
        if let Some(version) = self
            .registry
            .save_credentials(integration_id, &updated, None, None)
            .await?
        {
            loaded.integration.config_version = version;
        }
        loaded.credentials = updated;
        Ok(token)
    }
}

/// Merge a grant into the blob's OAuth section. Returns the new expiry.
fn apply_grant(blob: &mut CredentialBlob, grant: TokenGrant) -> DateTime<Utc> {
    let expires_at = Utc::now() + Duration::seconds(grant.expires_in.clamp(0, MAX_EXPIRES_IN_SECS));
    if let CredentialBlob::Zoho(crm) = blob {
        if let Some(domain) = &grant.api_domain {
            crm.api_domain = Some(domain.clone());
        }
    }
    if let Some(oauth) = blob.oauth_mut() {
        oauth.apply_grant(grant.access_token, grant.refresh_token, expires_at);
    }
    expires_at
}

fn current_token(blob: &CredentialBlob) -> Result<String, AppError> {
    blob.oauth()
        .and_then(|o| o.access_token.as_ref())
        .map(|t: &Secret| t.expose().to_string())
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("credentials hold no access token")))
}

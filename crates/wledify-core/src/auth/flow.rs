//! PKCE authorization-code flow
//!
//! `Idle -> AuthorizationRequested -> CallbackReceived -> Exchanging -> Authenticated | Failed`
//!
//! The flow is split so the network exchange can run on a background task:
//! [`AuthFlow::prepare_exchange`] validates the callback and hands out an
//! [`ExchangeRequest`], [`exchange_code`] talks to the token endpoint, and
//! [`AuthFlow::finish`] applies the result to the [`TokenStore`].

use serde::Deserialize;
use url::Url;

use super::pkce::PkceVerifier;
use super::token::{now_ms, Token, TokenStore};
use crate::config::SpotifyConfig;
use crate::constants::keys;
use crate::error::AuthError;
use crate::storage::SharedStore;

/// Where the flow currently is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Idle,
    AuthorizationRequested,
    CallbackReceived,
    Exchanging,
    Authenticated,
    Failed(AuthError),
}

/// One-time parameters the authorization server appends to the redirect URI
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub error: Option<String>,
}

impl CallbackParams {
    /// Parse from a raw query string (`code=...&state=...`)
    pub fn from_query(query: &str) -> Self {
        let mut params = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            match key.as_ref() {
                "code" if !value.is_empty() => params.code = Some(value.into_owned()),
                "error" if !value.is_empty() => params.error = Some(value.into_owned()),
                _ => {}
            }
        }
        params
    }

    /// Parse from a request target such as `/callback?code=...`
    pub fn from_request_target(target: &str) -> Self {
        match target.split_once('?') {
            Some((_, query)) => Self::from_query(query),
            None => Self::default(),
        }
    }

    /// True if the redirect carried either outcome
    pub fn is_present(&self) -> bool {
        self.code.is_some() || self.error.is_some()
    }
}

/// Everything the token endpoint needs. Owned so it can move into a task.
#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    pub token_url: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub code: String,
    pub verifier: PkceVerifier,
}

/// Successful token endpoint response
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: u64,
}

#[derive(Deserialize)]
struct TokenErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// POST the authorization code and verifier to the token endpoint
pub async fn exchange_code(
    client: &reqwest::Client,
    request: ExchangeRequest,
) -> Result<TokenGrant, AuthError> {
    let response = client
        .post(&request.token_url)
        .form(&[
            ("client_id", request.client_id.as_str()),
            ("grant_type", "authorization_code"),
            ("code", request.code.as_str()),
            ("redirect_uri", request.redirect_uri.as_str()),
            ("code_verifier", request.verifier.as_str()),
        ])
        .send()
        .await
        .map_err(|e| AuthError::ExchangeFailed(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let reason = match response.json::<TokenErrorBody>().await {
            Ok(TokenErrorBody {
                error_description: Some(description),
                ..
            }) if !description.is_empty() => description,
            Ok(TokenErrorBody {
                error: Some(error), ..
            }) if !error.is_empty() => format!("{} ({})", status, error),
            _ => status.to_string(),
        };
        tracing::warn!(status = %status, "Token exchange rejected");
        return Err(AuthError::ExchangeFailed(reason));
    }

    response
        .json::<TokenGrant>()
        .await
        .map_err(|e| AuthError::ExchangeFailed(format!("invalid token response: {}", e)))
}

/// Drives one login attempt at a time
pub struct AuthFlow {
    settings: SpotifyConfig,
    storage: SharedStore,
    state: AuthState,
}

impl AuthFlow {
    pub fn new(settings: SpotifyConfig, storage: SharedStore) -> Self {
        Self {
            settings,
            storage,
            state: AuthState::Idle,
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn settings(&self) -> &SpotifyConfig {
        &self.settings
    }

    /// Whether a verifier from an earlier `begin` is still stored
    pub fn has_pending_request(&self) -> bool {
        self.storage.get(keys::CODE_VERIFIER).is_some()
    }

    /// Start a fresh attempt: store a new verifier and build the authorization URL.
    ///
    /// Allowed from any state; a previous pending request is superseded.
    pub fn begin(&mut self) -> Result<Url, AuthError> {
        if self.settings.client_id.trim().is_empty() {
            let err = AuthError::NotConfigured(
                "set spotify.client_id in config.toml or WLEDIFY_CLIENT_ID".to_string(),
            );
            self.state = AuthState::Failed(err.clone());
            return Err(err);
        }

        let verifier = PkceVerifier::generate();
        let challenge = verifier.challenge();

        let url = Url::parse_with_params(
            &self.settings.auth_url,
            &[
                ("client_id", self.settings.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
                ("scope", self.settings.scopes.as_str()),
                ("code_challenge_method", challenge.method()),
                ("code_challenge", challenge.as_str()),
            ],
        )
        .map_err(|e| {
            let err = AuthError::NotConfigured(format!("invalid auth_url: {}", e));
            self.state = AuthState::Failed(err.clone());
            err
        })?;

        let created_at = now_ms().to_string();
        if let Err(e) = self.storage.set_many(&[
            (keys::CODE_VERIFIER, verifier.as_str()),
            (keys::CODE_VERIFIER_CREATED_AT, created_at.as_str()),
        ]) {
            let err = AuthError::Storage(format!("{:#}", e));
            self.state = AuthState::Failed(err.clone());
            return Err(err);
        }

        tracing::info!("Authorization requested");
        self.state = AuthState::AuthorizationRequested;
        Ok(url)
    }

    /// Validate a callback and produce the exchange request.
    ///
    /// An `error` parameter or a missing verifier fails the attempt here,
    /// before any network call.
    pub fn prepare_exchange(&mut self, params: &CallbackParams) -> Result<ExchangeRequest, AuthError> {
        if let Some(error) = &params.error {
            tracing::warn!(error = %error, "Spotify authorization denied");
            return Err(self.fail(AuthError::Denied(error.clone())));
        }
        let Some(code) = params.code.clone() else {
            return Err(self.fail(AuthError::MissingCode));
        };
        self.state = AuthState::CallbackReceived;

        let Some(verifier) = self.storage.get(keys::CODE_VERIFIER) else {
            tracing::warn!("Callback received without a pending verifier");
            return Err(self.fail(AuthError::SessionLost));
        };

        self.state = AuthState::Exchanging;
        Ok(ExchangeRequest {
            token_url: self.settings.token_url.clone(),
            client_id: self.settings.client_id.clone(),
            redirect_uri: self.settings.redirect_uri.clone(),
            code,
            verifier: PkceVerifier::from_string(verifier),
        })
    }

    /// Apply the exchange result. On success the token is stored and the
    /// pending request destroyed.
    pub fn finish(
        &mut self,
        result: Result<TokenGrant, AuthError>,
        tokens: &mut TokenStore,
    ) -> Result<(), AuthError> {
        let grant = result.map_err(|e| self.fail(e))?;

        let token = Token::from_expires_in(grant.access_token, grant.expires_in, now_ms());
        tokens
            .set(token)
            .map_err(|e| self.fail(AuthError::Storage(format!("{:#}", e))))?;

        if let Err(e) = self.discard_pending() {
            // The token is stored; a leftover verifier is harmless and replaced on next login
            tracing::warn!("Failed to remove code verifier: {:#}", e);
        }

        tracing::info!("Spotify authentication complete");
        self.state = AuthState::Authenticated;
        Ok(())
    }

    /// Run the whole callback -> exchange -> store sequence inline
    pub async fn complete(
        &mut self,
        client: &reqwest::Client,
        params: &CallbackParams,
        tokens: &mut TokenStore,
    ) -> Result<(), AuthError> {
        let request = self.prepare_exchange(params)?;
        let result = exchange_code(client, request).await;
        self.finish(result, tokens)
    }

    /// Abandon any attempt and return to `Idle`
    pub fn reset(&mut self) -> anyhow::Result<()> {
        self.state = AuthState::Idle;
        self.discard_pending()
    }

    fn discard_pending(&self) -> anyhow::Result<()> {
        self.storage
            .remove_many(&[keys::CODE_VERIFIER, keys::CODE_VERIFIER_CREATED_AT])
    }

    fn fail(&mut self, err: AuthError) -> AuthError {
        self.state = AuthState::Failed(err.clone());
        err
    }
}

/// Strip one-time auth parameters from a redirect URL. Idempotent.
pub fn clean_redirect_url(url: &Url) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !matches!(key.as_ref(), "code" | "error" | "state"))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut cleaned = url.clone();
    if kept.is_empty() {
        cleaned.set_query(None);
    } else {
        cleaned.query_pairs_mut().clear().extend_pairs(kept);
    }
    cleaned
}

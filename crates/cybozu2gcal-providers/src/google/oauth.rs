//! OAuth 2.0 PKCE flow for Google APIs.
//!
//! The flow is split so the caller owns the terminal:
//!
//! 1. [`OAuthClient::begin_authorization`] builds the consent URL with a
//!    fresh PKCE challenge and state
//! 2. the caller shows the URL and reads back what the user pastes: either
//!    the bare code or the whole redirected address
//! 3. [`OAuthClient::complete_authorization`] checks the state and exchanges
//!    the code (with the verifier) for access and refresh tokens

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};

use super::config::GoogleConfig;
use super::tokens::TokenInfo;

/// Google OAuth endpoints.
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// The PKCE code verifier length (in bytes, before base64 encoding).
const CODE_VERIFIER_LENGTH: usize = 32;

/// OAuth client for Google APIs.
#[derive(Debug)]
pub struct OAuthClient {
    config: GoogleConfig,
    http_client: reqwest::Client,
}

/// A consent request waiting for the user's answer.
#[derive(Debug)]
pub struct PendingAuthorization {
    /// URL to open in a browser.
    pub url: String,
    pkce: PkceFlow,
}

impl OAuthClient {
    /// Creates a new OAuth client.
    pub fn new(config: GoogleConfig) -> ProviderResult<Self> {
        let http_client = build_http_client(config.timeout)?;
        Ok(Self {
            config,
            http_client,
        })
    }

    /// Starts an authorization: returns the consent URL to show the user.
    pub fn begin_authorization(&self) -> PendingAuthorization {
        let pkce = PkceFlow::new();
        let url = pkce.build_auth_url(
            &self.config.credentials.client_id,
            &self.config.redirect_uri,
            &self.config.scopes,
        );
        debug!("authorization URL: {}", url);
        PendingAuthorization { url, pkce }
    }

    /// Finishes an authorization with whatever the user pasted.
    ///
    /// # Errors
    ///
    /// Returns an authentication error if the answer carries an `error`,
    /// has no code, carries a state that does not match, or if the token
    /// exchange is refused.
    pub async fn complete_authorization(
        &self,
        pending: &PendingAuthorization,
        answer: &str,
    ) -> ProviderResult<TokenInfo> {
        let code = parse_authorization_answer(answer, &pending.pkce.state)?;
        info!("received authorization code, exchanging for tokens...");
        self.exchange_code(&code, &pending.pkce.verifier).await
    }

    /// Refreshes an expired access token using the refresh token.
    ///
    /// Returns the new access token and its lifetime in seconds.
    pub async fn refresh_token(
        &self,
        refresh_token: &str,
    ) -> ProviderResult<(String, Option<i64>)> {
        let params = [
            ("client_id", self.config.credentials.client_id.as_str()),
            ("client_secret", self.config.credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let token_response = self.token_request(&params, "token refresh").await?;
        info!("refreshed access token");
        Ok((token_response.access_token, token_response.expires_in))
    }

    async fn exchange_code(&self, code: &str, verifier: &str) -> ProviderResult<TokenInfo> {
        let params = [
            ("client_id", self.config.credentials.client_id.as_str()),
            ("client_secret", self.config.credentials.client_secret.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];

        let token_response = self.token_request(&params, "token exchange").await?;
        if token_response.refresh_token.is_none() {
            return Err(ProviderError::authentication(
                "no refresh token returned; revoke the app's access and authorize again",
            ));
        }

        info!("obtained tokens");
        Ok(TokenInfo::new(
            token_response.access_token,
            token_response.refresh_token,
            token_response.expires_in,
            self.config.scopes.clone(),
        ))
    }

    async fn token_request(
        &self,
        params: &[(&str, &str)],
        what: &str,
    ) -> ProviderResult<TokenResponse> {
        let response = self
            .http_client
            .post(GOOGLE_TOKEN_URL)
            .form(params)
            .send()
            .await
            .map_err(|e| ProviderError::authentication(format!("{} request failed: {}", what, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::authentication(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(ProviderError::authentication(format!(
                "{} failed ({}): {}",
                what, status, body
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| ProviderError::invalid_response(format!("invalid token response: {}", e)))
    }
}

pub(crate) fn build_http_client(timeout: Duration) -> ProviderResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("cybozu2gcal/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ProviderError::internal(format!("failed to create HTTP client: {}", e)))
}

/// Extracts the authorization code from a pasted answer.
///
/// The answer is either the bare code or a redirected URL / query string
/// carrying `code`, `state` and possibly `error`.
pub fn parse_authorization_answer(answer: &str, expected_state: &str) -> ProviderResult<String> {
    let answer = answer.trim();
    if answer.is_empty() {
        return Err(ProviderError::authentication("no authorization code entered"));
    }

    if !answer.contains('=') {
        return Ok(answer.to_string());
    }

    let query = answer
        .split_once('?')
        .map_or(answer, |(_, query)| query)
        .split('#')
        .next()
        .unwrap_or_default();

    let mut code = None;
    let mut state = None;
    let mut error = None;

    for param in query.split('&') {
        if let Some((key, value)) = param.split_once('=') {
            let value = urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string());
            match key {
                "code" => code = Some(value),
                "state" => state = Some(value),
                "error" => error = Some(value),
                _ => {}
            }
        }
    }

    if let Some(error) = error {
        return Err(ProviderError::authentication(format!(
            "authorization denied: {}",
            error
        )));
    }

    if let Some(state) = state
        && state != expected_state
    {
        return Err(ProviderError::authentication(
            "OAuth state mismatch - the answer belongs to another authorization",
        ));
    }

    code.filter(|c| !c.is_empty())
        .ok_or_else(|| ProviderError::authentication("missing authorization code in answer"))
}

/// PKCE flow state and utilities.
///
/// Implements RFC 7636 (Proof Key for Code Exchange).
#[derive(Debug)]
pub struct PkceFlow {
    /// The code verifier (high-entropy random string).
    pub verifier: String,
    /// The code challenge (SHA-256 hash of verifier, base64url encoded).
    pub challenge: String,
    /// Random state for CSRF protection.
    pub state: String,
}

impl PkceFlow {
    /// Creates a new PKCE flow with random verifier and state.
    pub fn new() -> Self {
        let verifier = Self::generate_verifier();
        let challenge = Self::compute_challenge(&verifier);
        let state = Self::generate_state();

        Self {
            verifier,
            challenge,
            state,
        }
    }

    fn generate_verifier() -> String {
        let mut rng = rand::rng();
        let bytes: Vec<u8> = (0..CODE_VERIFIER_LENGTH).map(|_| rng.random()).collect();
        URL_SAFE_NO_PAD.encode(&bytes)
    }

    fn compute_challenge(verifier: &str) -> String {
        let digest = Sha256::digest(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }

    fn generate_state() -> String {
        let mut rng = rand::rng();
        let bytes: Vec<u8> = (0..16).map(|_| rng.random()).collect();
        URL_SAFE_NO_PAD.encode(&bytes)
    }

    /// Builds the Google OAuth authorization URL.
    pub fn build_auth_url(&self, client_id: &str, redirect_uri: &str, scopes: &[String]) -> String {
        let scope = scopes.join(" ");

        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&\
            code_challenge={}&code_challenge_method=S256&state={}&\
            access_type=offline&prompt=consent",
            GOOGLE_AUTH_URL,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scope),
            urlencoding::encode(&self.challenge),
            urlencoding::encode(&self.state),
        )
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

/// Response from Google's token endpoint.
#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;
    use crate::google::config::OAuthCredentials;

    #[test]
    fn pkce_verifier_length() {
        let flow = PkceFlow::new();
        // Base64 encoding of 32 bytes = 43 characters (no padding)
        assert_eq!(flow.verifier.len(), 43);
    }

    #[test]
    fn pkce_challenge_is_deterministic() {
        let verifier = "test-verifier-string";
        assert_eq!(
            PkceFlow::compute_challenge(verifier),
            PkceFlow::compute_challenge(verifier)
        );
    }

    #[test]
    fn pkce_challenge_matches_rfc7636_example() {
        assert_eq!(
            PkceFlow::compute_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn pkce_state_is_random() {
        assert_ne!(PkceFlow::new().state, PkceFlow::new().state);
    }

    #[test]
    fn auth_url_format() {
        let flow = PkceFlow::new();
        let url = flow.build_auth_url(
            "test-client.apps.googleusercontent.com",
            "http://localhost",
            &[GoogleConfig::DEFAULT_SCOPE.to_string()],
        );

        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains("scope=https%3A%2F%2Fwww.googleapis.com%2Fauth%2Fcalendar&"));
    }

    #[test]
    fn begin_authorization_uses_config() {
        let config = GoogleConfig::new(
            OAuthCredentials::new("id.apps.googleusercontent.com", "s"),
            "/tmp/token.json",
        );
        let client = OAuthClient::new(config).unwrap();
        let pending = client.begin_authorization();
        assert!(pending.url.contains("client_id=id.apps.googleusercontent.com"));
        assert!(pending.url.contains(&format!("state={}", pending.pkce.state)));
    }

    #[test]
    fn answer_bare_code() {
        assert_eq!(parse_authorization_answer("  4/0Abc-xyz \n", "s").unwrap(), "4/0Abc-xyz");
    }

    #[test]
    fn answer_redirected_url() {
        let code = parse_authorization_answer(
            "http://localhost/?state=st8&code=4%2F0Abc&scope=https://www.googleapis.com/auth/calendar",
            "st8",
        )
        .unwrap();
        assert_eq!(code, "4/0Abc");
    }

    #[test]
    fn answer_query_only() {
        assert_eq!(parse_authorization_answer("code=abc&state=s", "s").unwrap(), "abc");
    }

    #[test]
    fn answer_state_mismatch() {
        let err =
            parse_authorization_answer("http://localhost/?code=abc&state=evil", "good").unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::Authentication);
        assert!(err.message().contains("state"));
    }

    #[test]
    fn answer_error_and_missing_code() {
        let err =
            parse_authorization_answer("http://localhost/?error=access_denied", "s").unwrap_err();
        assert!(err.message().contains("access_denied"));

        assert!(parse_authorization_answer("http://localhost/?state=s", "s").is_err());
        assert!(parse_authorization_answer("   ", "s").is_err());
    }
}

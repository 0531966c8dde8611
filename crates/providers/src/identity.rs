//! Identity exchange against the SSO provider.
//!
//! The authorization-code dance itself happens in the browser; this side
//! only swaps the returned code (plus the stashed PKCE verifier) for an ID
//! token and reads the claims we care about out of its payload.

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;
use url::Url;

static SHARED_HTTP: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(1)
        .build()
        .expect("failed to build HTTP client")
});

/// Regions login is refused from.
const DISALLOWED_REGIONS: &[&str] = &["china"];

/// The identity facts the rest of the system consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub subject: String,
    pub country: Option<String>,
}

impl Identity {
    /// Reject identities resolving to a disallowed region.
    pub fn ensure_region_allowed(&self) -> Result<()> {
        if let Some(country) = &self.country {
            if DISALLOWED_REGIONS.contains(&country.to_lowercase().as_str()) {
                bail!("Access is not allowed from your current location.");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: String,
}

#[derive(Debug, Deserialize)]
struct IdClaims {
    sub: String,
    #[serde(default)]
    country: Option<String>,
}

/// Parsed outcome of the provider redirect back into the extension.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthRedirect {
    pub code: String,
    pub state: Option<String>,
}

/// Extract the authorization code (and state) from the redirect URL, or the
/// provider's error description when the user was bounced.
pub fn parse_redirect(redirect_url: &str) -> Result<AuthRedirect> {
    let url = Url::parse(redirect_url).context("invalid redirect URL")?;
    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.to_string()),
            "state" => state = Some(value.to_string()),
            "error" | "error_description" => error = Some(value.to_string()),
            _ => {}
        }
    }
    if let Some(error) = error {
        bail!("authorization failed: {error}");
    }
    let code = code.ok_or_else(|| anyhow!("no authorization code in redirect"))?;
    Ok(AuthRedirect { code, state })
}

/// Decode a JWT's payload claims without signature verification. The token
/// comes straight from the provider over TLS; we only read claims from it.
pub fn decode_jwt_claims(token: &str) -> Result<serde_json::Value> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        bail!("invalid JWT format");
    }
    let payload = URL_SAFE_NO_PAD
        .decode(parts[1])
        .context("JWT payload is not valid base64url")?;
    serde_json::from_slice(&payload).context("JWT payload is not valid JSON")
}

pub struct IdentityClient {
    http: Client,
    token_url: String,
    client_id: String,
    redirect_uri: String,
}

impl IdentityClient {
    pub fn new(token_url: &str, client_id: &str, redirect_uri: &str) -> Self {
        Self {
            http: SHARED_HTTP.clone(),
            token_url: token_url.to_string(),
            client_id: client_id.to_string(),
            redirect_uri: redirect_uri.to_string(),
        }
    }

    /// Exchange an authorization code (plus the PKCE verifier from the start
    /// of the flow) for the identity embedded in the ID token.
    pub async fn exchange(&self, authorization_code: &str, pkce_verifier: &str) -> Result<Identity> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", authorization_code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
            ("code_verifier", pkce_verifier),
            ("code_challenge_method", "S256"),
        ];

        let resp = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "token request failed: {} - {}",
                status,
                body.chars().take(800).collect::<String>()
            );
        }

        let token: TokenResponse = resp.json().await.context("malformed token response")?;
        let claims: IdClaims = serde_json::from_value(decode_jwt_claims(&token.id_token)?)
            .context("ID token missing expected claims")?;

        Ok(Identity {
            subject: claims.sub,
            country: claims.country,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_jwt(payload: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap());
        format!("{header}.{body}.signature")
    }

    #[test]
    fn decodes_jwt_payload_claims() {
        let token = make_jwt(serde_json::json!({"sub": "jdoe", "country": "Canada"}));
        let claims = decode_jwt_claims(&token).unwrap();
        assert_eq!(claims["sub"], "jdoe");
        assert_eq!(claims["country"], "Canada");
    }

    #[test]
    fn rejects_malformed_tokens() {
        assert!(decode_jwt_claims("only.two").is_err());
        assert!(decode_jwt_claims("a.!!!not-base64!!!.c").is_err());
    }

    #[test]
    fn region_gate_is_case_insensitive() {
        let blocked = Identity {
            subject: "u".into(),
            country: Some("China".into()),
        };
        let allowed = Identity {
            subject: "u".into(),
            country: Some("Portugal".into()),
        };
        let unknown = Identity {
            subject: "u".into(),
            country: None,
        };
        assert!(blocked.ensure_region_allowed().is_err());
        assert!(allowed.ensure_region_allowed().is_ok());
        assert!(unknown.ensure_region_allowed().is_ok());
    }

    #[test]
    fn parses_redirect_with_code_and_state() {
        let got =
            parse_redirect("https://ext.invalid/redirect.html?code=abc123&state=xyz").unwrap();
        assert_eq!(
            got,
            AuthRedirect {
                code: "abc123".into(),
                state: Some("xyz".into())
            }
        );
    }

    #[test]
    fn redirect_error_param_wins() {
        let err = parse_redirect("https://ext.invalid/redirect.html?error=access_denied")
            .unwrap_err();
        assert!(err.to_string().contains("access_denied"));
        assert!(parse_redirect("https://ext.invalid/redirect.html?state=xyz").is_err());
    }
}

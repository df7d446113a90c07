//! Auth-flow manager boundary.

use crate::error::AuthError;
use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};
use std::fmt;
use tether_types::{BindingId, Credential, OAUTH1_CREDENTIAL_TAG, OAUTH2_CREDENTIAL_TAG};

/// Which OAuth variant a flow manager implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    #[serde(rename = "oauth1")]
    OAuth1,
    #[serde(rename = "oauth2")]
    OAuth2,
}

impl AuthKind {
    /// Singleton tag the access credential is persisted under.
    pub fn credential_tag(&self) -> &'static str {
        match self {
            Self::OAuth1 => OAUTH1_CREDENTIAL_TAG,
            Self::OAuth2 => OAUTH2_CREDENTIAL_TAG,
        }
    }
}

impl fmt::Display for AuthKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OAuth1 => f.write_str("oauth1"),
            Self::OAuth2 => f.write_str("oauth2"),
        }
    }
}

/// Query parameters delivered to the redirect callback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub oauth_token: Option<String>,
    #[serde(default)]
    pub oauth_verifier: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl CallbackParams {
    /// Parses a raw query string (with or without the leading `?`).
    /// Unknown keys are ignored.
    pub fn from_query(query: &str) -> Self {
        let mut params = Self::default();
        for (key, value) in parse_form(query.trim_start_matches('?')) {
            let slot = match key.as_str() {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "oauth_token" => &mut params.oauth_token,
                "oauth_verifier" => &mut params.oauth_verifier,
                "error" => &mut params.error,
                _ => continue,
            };
            *slot = Some(value);
        }
        params
    }
}

/// Decodes an `application/x-www-form-urlencoded` body into key/value pairs.
pub fn parse_form(body: &str) -> Vec<(String, String)> {
    body.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    urlencoding::decode(&raw)
        .map(|s| s.into_owned())
        .unwrap_or(raw)
}

/// One OAuth variant's authorization-URL generation, callback handling and
/// request signing.
#[async_trait]
pub trait AuthFlow: Send + Sync {
    fn kind(&self) -> AuthKind;

    /// URL the user must visit to grant access for `binding_id`.
    async fn authorization_url(&self, binding_id: BindingId) -> Result<String, AuthError>;

    /// Exchanges the callback's grant for an access credential.
    async fn handle_callback(
        &self,
        binding_id: BindingId,
        params: &CallbackParams,
    ) -> Result<Credential, AuthError>;

    /// Attaches `credential` to an outgoing provider request.
    fn sign_request(
        &self,
        request: RequestBuilder,
        credential: &Credential,
    ) -> Result<RequestBuilder, AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_query_parsing() {
        let params = CallbackParams::from_query("?code=a%2Fb&state=xyz&extra=1");
        assert_eq!(params.code.as_deref(), Some("a/b"));
        assert_eq!(params.state.as_deref(), Some("xyz"));
        assert!(params.oauth_verifier.is_none());
    }

    #[test]
    fn form_decoding_handles_plus_and_bare_keys() {
        let pairs = parse_form("oauth_token=hello+world&flag&oauth_token_secret=s%26t");
        assert_eq!(
            pairs,
            vec![
                ("oauth_token".to_string(), "hello world".to_string()),
                ("flag".to_string(), String::new()),
                ("oauth_token_secret".to_string(), "s&t".to_string()),
            ]
        );
    }
}

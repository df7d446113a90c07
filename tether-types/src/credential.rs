//! Access credentials produced by an auth-flow exchange.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Singleton type tag under which an OAuth1 access token is stored.
pub const OAUTH1_CREDENTIAL_TAG: &str = "tether.auth.oauth1";
/// Singleton type tag under which an OAuth2 access token is stored.
pub const OAUTH2_CREDENTIAL_TAG: &str = "tether.auth.oauth2";
/// Singleton type tag for an OAuth1 request token awaiting the callback.
pub const OAUTH1_REQUEST_TOKEN_TAG: &str = "tether.auth.oauth1.request_token";

/// An access credential for one service binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Credential {
    #[serde(rename = "oauth1")]
    OAuth1 { token: String, token_secret: String },
    #[serde(rename = "oauth2")]
    OAuth2 {
        access_token: String,
        #[serde(default)]
        refresh_token: Option<String>,
        #[serde(default)]
        expires_at: Option<DateTime<Utc>>,
    },
}

impl Credential {
    /// The singleton type tag used to persist this credential.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::OAuth1 { .. } => OAUTH1_CREDENTIAL_TAG,
            Self::OAuth2 { .. } => OAUTH2_CREDENTIAL_TAG,
        }
    }

    /// The bearer/access token string.
    pub fn access_token(&self) -> &str {
        match self {
            Self::OAuth1 { token, .. } => token,
            Self::OAuth2 { access_token, .. } => access_token,
        }
    }

    /// A credential is usable when it carries a non-empty token that has
    /// not expired.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        if self.access_token().is_empty() {
            return false;
        }
        match self {
            Self::OAuth2 {
                expires_at: Some(expires_at),
                ..
            } => *expires_at > now,
            _ => true,
        }
    }
}

/// An OAuth1 request token held between the redirect and the callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequestToken {
    pub token: String,
    pub token_secret: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn empty_token_is_not_usable() {
        let credential = Credential::OAuth1 {
            token: String::new(),
            token_secret: "s".into(),
        };
        assert!(!credential.is_usable(Utc::now()));
    }

    #[test]
    fn expired_oauth2_token_is_not_usable() {
        let now = Utc::now();
        let credential = Credential::OAuth2 {
            access_token: "abc".into(),
            refresh_token: None,
            expires_at: Some(now - Duration::seconds(1)),
        };
        assert!(!credential.is_usable(now));
    }

    #[test]
    fn tags_follow_variant() {
        let credential = Credential::OAuth2 {
            access_token: "abc".into(),
            refresh_token: None,
            expires_at: None,
        };
        assert_eq!(credential.type_tag(), OAUTH2_CREDENTIAL_TAG);
        assert!(credential.is_usable(Utc::now()));
    }
}

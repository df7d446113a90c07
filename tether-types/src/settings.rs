//! Authorization settings carried by each service consumer.
//!
//! Settings are a tagged variant so the auth-flow manager can be chosen with
//! a single `match`. Persisted settings are checked against a consumer's
//! defaults by variant only; field values never take part in the comparison.

use serde::{Deserialize, Serialize};
use std::mem;

/// Endpoints and client credentials for a three-legged OAuth 1.0a flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuth1Settings {
    pub request_token_endpoint: String,
    pub authorization_endpoint: String,
    pub access_token_endpoint: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    #[serde(default)]
    pub callback_url: String,
}

/// Endpoints and client credentials for an OAuth 2.0 authorization-code flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuth2Settings {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub redirect_uri: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
}

/// Per-consumer authorization settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthSettings {
    #[serde(rename = "oauth1")]
    OAuth1(OAuth1Settings),
    #[serde(rename = "oauth2")]
    OAuth2(OAuth2Settings),
}

impl AuthSettings {
    /// The declared variant name, as stored in the `kind` tag.
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::OAuth1(_) => "oauth1",
            Self::OAuth2(_) => "oauth2",
        }
    }

    /// True when both values are the same declared variant.
    pub fn same_variant(&self, other: &AuthSettings) -> bool {
        mem::discriminant(self) == mem::discriminant(other)
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

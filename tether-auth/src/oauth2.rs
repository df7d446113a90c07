//! OAuth 2.0 authorization-code flow.

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tether_consumer::{AuthError, AuthFlow, AuthKind, CallbackParams};
use tether_types::{BindingId, Credential, OAuth2Settings};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

/// Authorization-code flow with bearer request signing.
pub struct OAuth2Flow {
    settings: OAuth2Settings,
    client: Client,
}

impl OAuth2Flow {
    pub fn new(settings: OAuth2Settings, client: Client) -> Self {
        Self { settings, client }
    }

    pub fn settings(&self) -> &OAuth2Settings {
        &self.settings
    }
}

#[async_trait]
impl AuthFlow for OAuth2Flow {
    fn kind(&self) -> AuthKind {
        AuthKind::OAuth2
    }

    async fn authorization_url(&self, binding_id: BindingId) -> Result<String, AuthError> {
        let mut url = format!(
            "{}{}client_id={}&redirect_uri={}&response_type=code",
            self.settings.authorization_endpoint,
            query_separator(&self.settings.authorization_endpoint),
            urlencoding::encode(&self.settings.client_id),
            urlencoding::encode(&self.settings.redirect_uri),
        );
        if !self.settings.scopes.is_empty() {
            url.push_str("&scope=");
            url.push_str(&urlencoding::encode(&self.settings.scopes.join(" ")));
        }
        url.push_str("&state=");
        url.push_str(&binding_id.to_string());
        Ok(url)
    }

    async fn handle_callback(
        &self,
        binding_id: BindingId,
        params: &CallbackParams,
    ) -> Result<Credential, AuthError> {
        if let Some(error) = &params.error {
            return Err(AuthError::Denied(error.clone()));
        }
        let state = params
            .state
            .as_deref()
            .ok_or(AuthError::MissingParameter("state"))?;
        if state != binding_id.to_string() {
            return Err(AuthError::Denied("state does not match binding".to_string()));
        }
        let code = params
            .code
            .as_deref()
            .ok_or(AuthError::MissingParameter("code"))?;

        debug!(%binding_id, "Exchanging OAuth2 authorization code");

        let response = self
            .client
            .post(&self.settings.token_endpoint)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
                ("client_id", self.settings.client_id.as_str()),
                ("client_secret", self.settings.client_secret.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Endpoint {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::MalformedResponse(format!("token response: {e}")))?;

        let expires_at = token
            .expires_in
            .and_then(TimeDelta::try_seconds)
            .map(|ttl| Utc::now() + ttl);

        info!(%binding_id, "OAuth2 access token obtained");
        Ok(Credential::OAuth2 {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
        })
    }

    fn sign_request(
        &self,
        request: RequestBuilder,
        credential: &Credential,
    ) -> Result<RequestBuilder, AuthError> {
        match credential {
            Credential::OAuth2 { access_token, .. } => Ok(request.bearer_auth(access_token)),
            _ => Err(AuthError::CredentialMismatch("oauth2")),
        }
    }
}

pub(crate) fn query_separator(endpoint: &str) -> char {
    if endpoint.contains('?') { '&' } else { '?' }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow(scopes: Vec<String>) -> OAuth2Flow {
        OAuth2Flow::new(
            OAuth2Settings {
                authorization_endpoint: "https://provider.test/authorize".into(),
                token_endpoint: "https://provider.test/token".into(),
                client_id: "my id".into(),
                client_secret: "secret".into(),
                redirect_uri: "http://localhost/callback".into(),
                scopes,
            },
            Client::new(),
        )
    }

    #[tokio::test]
    async fn authorization_url_encodes_parameters() {
        let binding = BindingId::new();
        let url = flow(vec!["user.read".into(), "scrobbles".into()])
            .authorization_url(binding)
            .await
            .unwrap();

        assert!(url.starts_with("https://provider.test/authorize?client_id=my%20id"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%2Fcallback"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("scope=user.read%20scrobbles"));
        assert!(url.ends_with(&format!("state={binding}")));
    }

    #[tokio::test]
    async fn scope_omitted_when_empty() {
        let url = flow(Vec::new()).authorization_url(BindingId::new()).await.unwrap();
        assert!(!url.contains("scope="));
    }

    #[test]
    fn rejects_oauth1_credential() {
        let credential = Credential::OAuth1 {
            token: "t".into(),
            token_secret: "s".into(),
        };
        let request = Client::new().get("https://provider.test/");
        assert!(matches!(
            flow(Vec::new()).sign_request(request, &credential),
            Err(AuthError::CredentialMismatch("oauth2"))
        ));
    }
}

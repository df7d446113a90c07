//! Three-legged OAuth 1.0a flow with PLAINTEXT signatures (RFC 5849 §3.4.4).
//!
//! The request token secret is needed again on the callback leg, so it is
//! parked in the data store under the binding until the exchange completes.

use crate::oauth2::query_separator;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder};
use std::sync::Arc;
use tether_consumer::{AuthError, AuthFlow, AuthKind, CallbackParams, DataClient, parse_form};
use tether_types::{
    BindingId, Credential, OAUTH1_REQUEST_TOKEN_TAG, OAuth1Settings, PendingRequestToken,
};
use tracing::{debug, info};
use uuid::Uuid;

/// OAuth 1.0a flow manager.
pub struct OAuth1Flow {
    settings: OAuth1Settings,
    client: Client,
    data: Arc<dyn DataClient>,
}

impl OAuth1Flow {
    pub fn new(settings: OAuth1Settings, client: Client, data: Arc<dyn DataClient>) -> Self {
        Self {
            settings,
            client,
            data,
        }
    }

    pub fn settings(&self) -> &OAuth1Settings {
        &self.settings
    }

    /// `Authorization` header value for a request signed with `token`.
    fn authorization_header(&self, extra: &[(&str, &str)], token_secret: &str) -> String {
        let signature = format!(
            "{}&{}",
            urlencoding::encode(&self.settings.consumer_secret),
            urlencoding::encode(token_secret)
        );
        let timestamp = Utc::now().timestamp().to_string();
        let nonce = Uuid::new_v4().simple().to_string();

        let mut params: Vec<(&str, &str)> = vec![
            ("oauth_consumer_key", self.settings.consumer_key.as_str()),
            ("oauth_signature_method", "PLAINTEXT"),
            ("oauth_timestamp", timestamp.as_str()),
            ("oauth_nonce", nonce.as_str()),
            ("oauth_version", "1.0"),
        ];
        params.extend_from_slice(extra);
        params.push(("oauth_signature", signature.as_str()));

        let fields: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{k}=\"{}\"", urlencoding::encode(v)))
            .collect();
        format!("OAuth {}", fields.join(", "))
    }

    async fn post_for_token(
        &self,
        endpoint: &str,
        header: String,
    ) -> Result<PendingRequestToken, AuthError> {
        let response = self
            .client
            .post(endpoint)
            .header(reqwest::header::AUTHORIZATION, header)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AuthError::Endpoint {
                status: status.as_u16(),
                body,
            });
        }

        let mut token = None;
        let mut token_secret = None;
        for (key, value) in parse_form(&body) {
            match key.as_str() {
                "oauth_token" => token = Some(value),
                "oauth_token_secret" => token_secret = Some(value),
                _ => {}
            }
        }
        match (token, token_secret) {
            (Some(token), Some(token_secret)) => Ok(PendingRequestToken { token, token_secret }),
            _ => Err(AuthError::MalformedResponse(
                "missing oauth_token or oauth_token_secret".to_string(),
            )),
        }
    }
}

#[async_trait]
impl AuthFlow for OAuth1Flow {
    fn kind(&self) -> AuthKind {
        AuthKind::OAuth1
    }

    async fn authorization_url(&self, binding_id: BindingId) -> Result<String, AuthError> {
        let callback = if self.settings.callback_url.is_empty() {
            "oob"
        } else {
            self.settings.callback_url.as_str()
        };
        let header = self.authorization_header(&[("oauth_callback", callback)], "");

        debug!(%binding_id, "Requesting OAuth1 request token");
        let pending = self
            .post_for_token(&self.settings.request_token_endpoint, header)
            .await?;

        let value = serde_json::to_value(&pending).map_err(tether_consumer::DataError::from)?;
        self.data
            .update_singleton(binding_id, OAUTH1_REQUEST_TOKEN_TAG, "", value)
            .await?;

        Ok(format!(
            "{}{}oauth_token={}",
            self.settings.authorization_endpoint,
            query_separator(&self.settings.authorization_endpoint),
            urlencoding::encode(&pending.token)
        ))
    }

    async fn handle_callback(
        &self,
        binding_id: BindingId,
        params: &CallbackParams,
    ) -> Result<Credential, AuthError> {
        if let Some(error) = &params.error {
            return Err(AuthError::Denied(error.clone()));
        }
        let verifier = params
            .oauth_verifier
            .as_deref()
            .ok_or(AuthError::MissingParameter("oauth_verifier"))?;

        let stored = self
            .data
            .get_singleton(binding_id, OAUTH1_REQUEST_TOKEN_TAG)
            .await?
            .ok_or(AuthError::RequestTokenMissing)?;
        let pending: PendingRequestToken = serde_json::from_value(stored)
            .map_err(|e| AuthError::MalformedResponse(format!("pending request token: {e}")))?;

        if params
            .oauth_token
            .as_deref()
            .is_some_and(|token| token != pending.token)
        {
            return Err(AuthError::Denied("request token does not match".to_string()));
        }

        let header = self.authorization_header(
            &[("oauth_token", pending.token.as_str()), ("oauth_verifier", verifier)],
            &pending.token_secret,
        );
        let access = self
            .post_for_token(&self.settings.access_token_endpoint, header)
            .await?;

        info!(%binding_id, "OAuth1 access token obtained");
        Ok(Credential::OAuth1 {
            token: access.token,
            token_secret: access.token_secret,
        })
    }

    fn sign_request(
        &self,
        request: RequestBuilder,
        credential: &Credential,
    ) -> Result<RequestBuilder, AuthError> {
        match credential {
            Credential::OAuth1 {
                token,
                token_secret,
            } => {
                let header = self.authorization_header(&[("oauth_token", token.as_str())], token_secret);
                Ok(request.header(reqwest::header::AUTHORIZATION, header))
            }
            _ => Err(AuthError::CredentialMismatch("oauth1")),
        }
    }
}

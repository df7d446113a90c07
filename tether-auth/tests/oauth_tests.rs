use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tether_auth::{AuthFlowFactory, DefaultAuthFlowFactory, OAuth1Flow, OAuth2Flow};
use tether_consumer::{
    AuthError, AuthFlow, AuthKind, CallbackParams, DataClient, DataError, DataQuery, DataRecord,
};
use tether_types::{
    AuthSettings, BindingId, Credential, OAUTH1_REQUEST_TOKEN_TAG, OAuth1Settings, OAuth2Settings,
};
use wiremock::matchers::{body_string_contains, header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct MapData {
    values: Mutex<HashMap<(BindingId, String), Value>>,
}

#[async_trait]
impl DataClient for MapData {
    async fn get_singleton(&self, scope: BindingId, type_tag: &str) -> Result<Option<Value>, DataError> {
        Ok(self.values.lock().get(&(scope, type_tag.to_string())).cloned())
    }

    async fn update_singleton(
        &self,
        scope: BindingId,
        type_tag: &str,
        _timestamp_key: &str,
        value: Value,
    ) -> Result<(), DataError> {
        self.values.lock().insert((scope, type_tag.to_string()), value);
        Ok(())
    }

    async fn filter(&self, _: &DataQuery, _: usize, _: usize) -> Result<Vec<DataRecord>, DataError> {
        Ok(Vec::new())
    }
}

fn oauth1_settings(base: &str) -> OAuth1Settings {
    OAuth1Settings {
        request_token_endpoint: format!("{base}/oauth/request_token"),
        authorization_endpoint: format!("{base}/oauth/authorize"),
        access_token_endpoint: format!("{base}/oauth/access_token"),
        consumer_key: "ck".into(),
        consumer_secret: "cs".into(),
        callback_url: "http://localhost/cb".into(),
    }
}

fn oauth2_settings(base: &str) -> OAuth2Settings {
    OAuth2Settings {
        authorization_endpoint: format!("{base}/authorize"),
        token_endpoint: format!("{base}/token"),
        client_id: "cid".into(),
        client_secret: "csecret".into(),
        redirect_uri: "http://localhost/cb".into(),
        scopes: vec!["read".into()],
    }
}

// ── OAuth2 ──────────────────────────────────────────────────────

#[tokio::test]
async fn oauth2_code_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=the-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "at-1",
            "refresh_token": "rt-1",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let flow = OAuth2Flow::new(oauth2_settings(&server.uri()), reqwest::Client::new());
    let binding = BindingId::new();
    let params = CallbackParams {
        code: Some("the-code".into()),
        state: Some(binding.to_string()),
        ..Default::default()
    };

    let credential = flow.handle_callback(binding, &params).await.unwrap();
    match credential {
        Credential::OAuth2 {
            access_token,
            refresh_token,
            expires_at,
        } => {
            assert_eq!(access_token, "at-1");
            assert_eq!(refresh_token.as_deref(), Some("rt-1"));
            assert!(expires_at.is_some());
        }
        other => panic!("unexpected credential {other:?}"),
    }
}

#[tokio::test]
async fn oauth2_token_endpoint_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
        .mount(&server)
        .await;

    let flow = OAuth2Flow::new(oauth2_settings(&server.uri()), reqwest::Client::new());
    let binding = BindingId::new();
    let params = CallbackParams {
        code: Some("stale".into()),
        state: Some(binding.to_string()),
        ..Default::default()
    };
    let err = flow.handle_callback(binding, &params).await.unwrap_err();
    assert!(matches!(err, AuthError::Endpoint { status: 400, .. }));
}

#[tokio::test]
async fn oauth2_callback_errors() {
    let flow = OAuth2Flow::new(oauth2_settings("http://127.0.0.1:9"), reqwest::Client::new());
    let binding = BindingId::new();

    let denied = CallbackParams {
        error: Some("access_denied".into()),
        ..Default::default()
    };
    assert!(matches!(
        flow.handle_callback(binding, &denied).await,
        Err(AuthError::Denied(_))
    ));

    let wrong_state = CallbackParams {
        code: Some("c".into()),
        state: Some(BindingId::new().to_string()),
        ..Default::default()
    };
    assert!(matches!(
        flow.handle_callback(binding, &wrong_state).await,
        Err(AuthError::Denied(_))
    ));

    let missing_state = CallbackParams {
        code: Some("c".into()),
        ..Default::default()
    };
    assert!(matches!(
        flow.handle_callback(binding, &missing_state).await,
        Err(AuthError::MissingParameter("state"))
    ));

    let missing_code = CallbackParams {
        state: Some(binding.to_string()),
        ..Default::default()
    };
    assert!(matches!(
        flow.handle_callback(binding, &missing_code).await,
        Err(AuthError::MissingParameter("code"))
    ));
}

// ── OAuth1 ──────────────────────────────────────────────────────

#[tokio::test]
async fn oauth1_three_legged_flow() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/request_token"))
        .and(header_regex("authorization", r#"oauth_signature_method="PLAINTEXT""#))
        .and(header_regex("authorization", r#"oauth_callback="http%3A%2F%2Flocalhost%2Fcb""#))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("oauth_token=req-tok&oauth_token_secret=req-sec&oauth_callback_confirmed=true"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/access_token"))
        .and(header_regex("authorization", r#"oauth_verifier="v-123""#))
        .and(header_regex("authorization", r#"oauth_signature="cs%26req-sec""#))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("oauth_token=acc-tok&oauth_token_secret=acc-sec"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let data = Arc::new(MapData::default());
    let flow = OAuth1Flow::new(
        oauth1_settings(&server.uri()),
        reqwest::Client::new(),
        data.clone(),
    );
    let binding = BindingId::new();

    let url = flow.authorization_url(binding).await.unwrap();
    assert_eq!(url, format!("{}/oauth/authorize?oauth_token=req-tok", server.uri()));
    assert!(
        data.get_singleton(binding, OAUTH1_REQUEST_TOKEN_TAG)
            .await
            .unwrap()
            .is_some()
    );

    let params = CallbackParams::from_query("oauth_token=req-tok&oauth_verifier=v-123");
    let credential = flow.handle_callback(binding, &params).await.unwrap();
    assert_eq!(
        credential,
        Credential::OAuth1 {
            token: "acc-tok".into(),
            token_secret: "acc-sec".into(),
        }
    );
}

#[tokio::test]
async fn oauth1_callback_without_pending_token() {
    let flow = OAuth1Flow::new(
        oauth1_settings("http://127.0.0.1:9"),
        reqwest::Client::new(),
        Arc::new(MapData::default()),
    );
    let params = CallbackParams {
        oauth_verifier: Some("v".into()),
        ..Default::default()
    };
    let err = flow.handle_callback(BindingId::new(), &params).await.unwrap_err();
    assert!(matches!(err, AuthError::RequestTokenMissing));
}

#[tokio::test]
async fn oauth1_malformed_request_token_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("unexpected"))
        .mount(&server)
        .await;

    let flow = OAuth1Flow::new(
        oauth1_settings(&server.uri()),
        reqwest::Client::new(),
        Arc::new(MapData::default()),
    );
    let err = flow.authorization_url(BindingId::new()).await.unwrap_err();
    assert!(matches!(err, AuthError::MalformedResponse(_)));
}

// ── Dispatch ────────────────────────────────────────────────────

#[test]
fn factory_dispatches_on_variant() {
    let factory = DefaultAuthFlowFactory::new(reqwest::Client::new(), Arc::new(MapData::default()));
    let one = factory.build(&AuthSettings::OAuth1(oauth1_settings("http://x")));
    let two = factory.build(&AuthSettings::OAuth2(oauth2_settings("http://x")));
    assert_eq!(one.kind(), AuthKind::OAuth1);
    assert_eq!(two.kind(), AuthKind::OAuth2);
}

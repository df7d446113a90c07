//! Settings → flow manager dispatch.

use crate::{OAuth1Flow, OAuth2Flow};
use reqwest::Client;
use std::sync::Arc;
use tether_consumer::{AuthFlow, DataClient};
use tether_types::AuthSettings;

/// Builds the auth-flow manager matching a consumer's settings variant.
pub trait AuthFlowFactory: Send + Sync {
    fn build(&self, settings: &AuthSettings) -> Arc<dyn AuthFlow>;
}

/// Production factory: OAuth1 and OAuth2 flows over a shared HTTP client.
pub struct DefaultAuthFlowFactory {
    client: Client,
    data: Arc<dyn DataClient>,
}

impl DefaultAuthFlowFactory {
    pub fn new(client: Client, data: Arc<dyn DataClient>) -> Self {
        Self { client, data }
    }
}

impl AuthFlowFactory for DefaultAuthFlowFactory {
    fn build(&self, settings: &AuthSettings) -> Arc<dyn AuthFlow> {
        match settings {
            AuthSettings::OAuth1(s) => Arc::new(OAuth1Flow::new(
                s.clone(),
                self.client.clone(),
                Arc::clone(&self.data),
            )),
            AuthSettings::OAuth2(s) => Arc::new(OAuth2Flow::new(s.clone(), self.client.clone())),
        }
    }
}

//! OAuth flow managers for tether.
//!
//! Each consumer's settings variant selects exactly one flow manager via
//! [`AuthFlowFactory::build`]. Signing is PLAINTEXT for OAuth1 and bearer
//! tokens for OAuth2.

mod factory;
mod oauth1;
mod oauth2;

pub use factory::{AuthFlowFactory, DefaultAuthFlowFactory};
pub use oauth1::OAuth1Flow;
pub use oauth2::OAuth2Flow;

//! The service consumer contract.

use crate::context::ServiceContext;
use crate::error::ConsumerError;
use crate::image::ImageData;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tether_types::{AuthSettings, ServiceId};
use tracing::warn;

/// A content-type tag a consumer can produce.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataTypeReference(pub String);

impl DataTypeReference {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Opaque configuration descriptor shown when connecting a service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigData {
    /// Type tag the connect-time configuration payload is stored under.
    #[serde(default)]
    pub config_data_type: Option<String>,
}

/// A pluggable integration with one external provider.
#[async_trait]
pub trait ServiceConsumer: Send + Sync {
    /// Stable self-registered identifier. Never nil for a valid consumer.
    fn identifier(&self) -> ServiceId;

    /// Non-empty display and fallback-uniqueness name.
    fn name(&self) -> &str;

    fn title(&self) -> &str;

    fn description(&self) -> &str;

    fn data_type_references(&self) -> &[DataTypeReference];

    fn config_data(&self) -> ConfigData;

    fn default_settings(&self) -> AuthSettings;

    fn settings(&self) -> AuthSettings;

    /// Assigns settings. A value of the wrong variant is replaced by the
    /// default settings.
    fn set_settings(&self, settings: AuthSettings);

    /// Lightweight authorized call. Every failure collapses to `false`.
    async fn validate_authorization(&self, ctx: &ServiceContext) -> bool;

    /// Pulls data. Fails with [`ConsumerError::Forbidden`] when no usable
    /// credential exists. Must be safe to retry.
    async fn sync(&self, ctx: &ServiceContext, full_sync: bool) -> Result<(), ConsumerError>;

    /// Best-effort icon of roughly `width`×`height`.
    fn service_image(&self, _width: u32, _height: u32) -> ImageData {
        ImageData::empty()
    }
}

/// Settings storage for consumer implementations, enforcing the
/// variant-preserving assignment rule.
#[derive(Debug)]
pub struct SettingsSlot {
    default: AuthSettings,
    current: RwLock<AuthSettings>,
}

impl SettingsSlot {
    pub fn new(default: AuthSettings) -> Self {
        Self {
            current: RwLock::new(default.clone()),
            default,
        }
    }

    pub fn default_settings(&self) -> AuthSettings {
        self.default.clone()
    }

    pub fn get(&self) -> AuthSettings {
        self.current.read().clone()
    }

    /// Stores `settings`, or the default when the variant differs.
    /// Returns whether the value was accepted as given.
    pub fn set(&self, settings: AuthSettings) -> bool {
        let accepted = settings.same_variant(&self.default);
        let value = if accepted {
            settings
        } else {
            warn!(
                expected = self.default.variant_name(),
                got = settings.variant_name(),
                "Rejected settings of the wrong variant, using defaults"
            );
            self.default.clone()
        };
        *self.current.write() = value;
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_types::{OAuth1Settings, OAuth2Settings};

    #[test]
    fn slot_rejects_wrong_variant() {
        let default = AuthSettings::OAuth1(OAuth1Settings {
            consumer_key: "default".into(),
            ..Default::default()
        });
        let slot = SettingsSlot::new(default.clone());

        let custom = AuthSettings::OAuth1(OAuth1Settings {
            consumer_key: "custom".into(),
            ..Default::default()
        });
        assert!(slot.set(custom.clone()));
        assert_eq!(slot.get(), custom);

        assert!(!slot.set(AuthSettings::OAuth2(OAuth2Settings::default())));
        assert_eq!(slot.get(), default);
    }
}

//! Common imports for consumer implementations.

pub use crate::{
    AuthFlow, ConfigData, ConsumerError, DataClient, DataTypeReference, ImageData, ImageInfo,
    ServiceConsumer, ServiceContext, SettingsSlot, select_closest_image,
};
pub use async_trait::async_trait;
pub use tether_types::{AuthSettings, OAuth1Settings, OAuth2Settings, ServiceId};

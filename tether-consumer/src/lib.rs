//! The service consumer contract for tether.
//!
//! A service consumer pulls data from one external provider into the
//! destination store. This crate defines everything a consumer sees:
//! - [`ServiceConsumer`], the capability interface every plugin implements
//! - [`ServiceContext`], the per-run handle to credentials, HTTP and cursor
//! - [`DataClient`] and [`AuthFlow`], the collaborators behind the context
//! - image selection helpers and the variant-checked [`SettingsSlot`]

pub mod auth;
pub mod consumer;
pub mod context;
pub mod data;
pub mod error;
pub mod image;
pub mod prelude;

pub use auth::{AuthFlow, AuthKind, CallbackParams, parse_form};
pub use consumer::{ConfigData, DataTypeReference, ServiceConsumer, SettingsSlot};
pub use context::ServiceContext;
pub use data::{DataClient, DataQuery, DataRecord, extract_timestamp};
pub use error::{AuthError, ConsumerError, DataError};
pub use image::{ImageData, ImageInfo, select_closest_image};

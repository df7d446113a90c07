//! The JSON manifest a consumer module returns from `consumer_manifest`.

use serde::{Deserialize, Serialize};
use tether_consumer::ConfigData;
use tether_types::{AuthSettings, ServiceId};

/// All consumer types exported by one module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumerManifest {
    pub consumers: Vec<ManifestEntry>,
}

impl ConsumerManifest {
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Position and entry of the consumer type named `type_name`.
    pub fn find(&self, type_name: &str) -> Option<(usize, &ManifestEntry)> {
        self.consumers
            .iter()
            .enumerate()
            .find(|(_, entry)| entry.type_name == type_name)
    }
}

/// Metadata for one consumer type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub type_name: String,
    /// Self-registered stable identifier. Left as text so a missing or
    /// malformed value can be reported instead of failing the whole manifest.
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub data_types: Vec<String>,
    #[serde(default)]
    pub config_data: ConfigData,
    pub default_settings: AuthSettings,
    #[serde(default)]
    pub image_mime_type: Option<String>,
}

impl ManifestEntry {
    /// The declared identifier, rejecting empty, malformed and nil values.
    pub fn service_id(&self) -> Result<ServiceId, String> {
        if self.identifier.trim().is_empty() {
            return Err("missing identifier".to_string());
        }
        let id = ServiceId::parse(self.identifier.trim())
            .map_err(|e| format!("invalid identifier {:?}: {e}", self.identifier))?;
        if id.is_nil() {
            return Err("nil identifier".to_string());
        }
        Ok(id)
    }

    /// Title when present, otherwise the name.
    pub fn display_name(&self) -> &str {
        if self.title.is_empty() {
            &self.name
        } else {
            &self.title
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "consumers": [
            {
                "type_name": "LastFm",
                "identifier": "1f0c7e52-5a3b-4d8e-9c61-7b2f3a4d5e6f",
                "name": "lastfm",
                "title": "Last.fm",
                "data_types": ["scrobble"],
                "default_settings": {
                    "kind": "oauth2",
                    "authorization_endpoint": "https://example.com/auth",
                    "token_endpoint": "https://example.com/token",
                    "client_id": "id",
                    "client_secret": "secret"
                }
            },
            {
                "type_name": "Broken",
                "identifier": "00000000-0000-0000-0000-000000000000",
                "default_settings": {
                    "kind": "oauth2",
                    "authorization_endpoint": "",
                    "token_endpoint": "",
                    "client_id": "",
                    "client_secret": ""
                }
            }
        ]
    }"#;

    #[test]
    fn parses_entries_with_defaults() {
        let manifest = ConsumerManifest::parse(MANIFEST.as_bytes()).unwrap();
        let (index, entry) = manifest.find("LastFm").unwrap();
        assert_eq!(index, 0);
        assert_eq!(entry.display_name(), "Last.fm");
        assert!(entry.service_id().is_ok());
        assert_eq!(entry.config_data, ConfigData::default());
        assert!(manifest.find("Missing").is_none());
    }

    #[test]
    fn nil_and_missing_identifiers_are_rejected() {
        let manifest = ConsumerManifest::parse(MANIFEST.as_bytes()).unwrap();
        let (_, broken) = manifest.find("Broken").unwrap();
        assert_eq!(broken.service_id().unwrap_err(), "nil identifier");

        let mut missing = broken.clone();
        missing.identifier = String::new();
        assert_eq!(missing.service_id().unwrap_err(), "missing identifier");
    }
}

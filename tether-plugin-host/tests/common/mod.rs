//! Shared fixtures: WAT consumer modules and in-memory collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::RequestBuilder;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tether_consumer::{
    AuthError, AuthFlow, AuthKind, CallbackParams, DataClient, DataError, DataQuery, DataRecord,
    ServiceContext,
};
use tether_types::{
    AuthSettings, BindingId, Credential, ServiceId, SettingsStore, StoreError, StoreResult,
    SyncCursor,
};

pub const LASTFM_ID: &str = "1f0c7e52-5a3b-4d8e-9c61-7b2f3a4d5e6f";
pub const FEED_ID: &str = "6a1d9b3c-2e4f-4a5b-8c7d-0e1f2a3b4c5d";

/// One consumer type entry in a module manifest.
pub fn entry(type_name: &str, identifier: &str, name: &str) -> Value {
    json!({
        "type_name": type_name,
        "identifier": identifier,
        "name": name,
        "title": format!("{name} title"),
        "data_types": ["scrobble"],
        "config_data": { "config_data_type": "feed.config" },
        "default_settings": {
            "kind": "oauth2",
            "authorization_endpoint": "https://provider.test/auth",
            "token_endpoint": "https://provider.test/token",
            "client_id": "client",
            "client_secret": "secret"
        }
    })
}

pub fn manifest(entries: Vec<Value>) -> String {
    json!({ "consumers": entries }).to_string()
}

fn escape(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("\\{b:02x}")).collect()
}

/// Builds the WAT text of a consumer module.
///
/// Memory layout: manifest at 16, URL at 2048, cursor object at 3072,
/// bump heap from 4096.
pub struct ModuleBuilder {
    manifest: String,
    validate: String,
    sync: String,
    url: String,
    cursor_object: String,
    extra_imports: String,
    skip_sync_export: bool,
}

impl ModuleBuilder {
    pub fn new(manifest: String) -> Self {
        Self {
            manifest,
            validate: "i32.const 1".into(),
            sync: "i32.const 0".into(),
            url: String::new(),
            cursor_object: String::new(),
            extra_imports: String::new(),
            skip_sync_export: false,
        }
    }

    pub fn validate(mut self, body: &str) -> Self {
        self.validate = body.into();
        self
    }

    pub fn sync(mut self, body: &str) -> Self {
        self.sync = body.into();
        self
    }

    /// `sync` fetches `url` and maps -403 to status 1, other failures to 2.
    pub fn sync_fetching(mut self, url: &str) -> Self {
        self.url = url.into();
        self.sync = format!(
            "(local.set $r (call $http_get (i32.const 2048) (i32.const {len})))
             (if (result i32) (i64.eq (local.get $r) (i64.const -403))
               (then (i32.const 1))
               (else (if (result i32) (i64.lt_s (local.get $r) (i64.const 0))
                 (then (i32.const 2))
                 (else (i32.const 0)))))",
            len = url.len()
        );
        self
    }

    /// `sync` records a cursor and then returns `status`.
    pub fn sync_with_cursor(mut self, object: &str, date_ms: i64, status: i32) -> Self {
        self.cursor_object = object.into();
        self.sync = format!(
            "(call $set_cursor (i32.const 3072) (i32.const {len}) (i64.const {date_ms}))
             i32.const {status}",
            len = object.len()
        );
        self
    }

    /// Prefixes the current `sync` body with a busy loop of `iterations`.
    pub fn spin_first(mut self, iterations: u32) -> Self {
        self.sync = format!(
            "(block $done
               (loop $spin
                 (br_if $done (i32.ge_u (local.get $i) (i32.const {iterations})))
                 (local.set $i (i32.add (local.get $i) (i32.const 1)))
                 (br $spin)))
             {}",
            self.sync
        );
        self
    }

    pub fn import_unknown_host_fn(mut self) -> Self {
        self.extra_imports = r#"(import "tether" "teleport" (func $teleport))"#.into();
        self
    }

    pub fn without_sync_export(mut self) -> Self {
        self.skip_sync_export = true;
        self
    }

    pub fn wat(&self) -> String {
        let packed = (16u64 << 32) | self.manifest.len() as u64;
        let sync_export = if self.skip_sync_export {
            String::new()
        } else {
            format!(
                r#"(func (export "sync") (param $index i32) (param $full i32) (result i32)
                     (local $r i64)
                     (local $i i32)
                     {})"#,
                self.sync
            )
        };
        format!(
            r#"(module
  (import "tether" "log" (func $log (param i32 i32 i32)))
  (import "tether" "http_get" (func $http_get (param i32 i32) (result i64)))
  (import "tether" "set_cursor" (func $set_cursor (param i32 i32 i64)))
  {extra}
  (memory (export "memory") 1)
  (global $heap (mut i32) (i32.const 4096))
  (data (i32.const 16) "{manifest}")
  (data (i32.const 2048) "{url}")
  (data (i32.const 3072) "{cursor}")
  (func (export "alloc") (param $len i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $heap))
    (global.set $heap (i32.add (global.get $heap) (local.get $len)))
    (local.get $ptr))
  (func (export "consumer_manifest") (result i64)
    i64.const {packed})
  (func (export "validate_authorization") (param $index i32) (result i32)
    {validate})
  {sync_export}
)"#,
            extra = self.extra_imports,
            manifest = escape(self.manifest.as_bytes()),
            url = escape(self.url.as_bytes()),
            cursor = escape(self.cursor_object.as_bytes()),
            packed = packed,
            validate = self.validate,
            sync_export = sync_export,
        )
    }

    pub fn write_to(&self, dir: &Path, file_name: &str) {
        let bytes = wat::parse_str(self.wat()).unwrap();
        std::fs::write(dir.join(file_name), bytes).unwrap();
    }
}

#[derive(Default)]
pub struct MemoryData {
    pub values: Mutex<HashMap<(BindingId, String), Value>>,
}

#[async_trait]
impl DataClient for MemoryData {
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

pub struct Bearer;

#[async_trait]
impl AuthFlow for Bearer {
    fn kind(&self) -> AuthKind {
        AuthKind::OAuth2
    }

    async fn authorization_url(&self, _: BindingId) -> Result<String, AuthError> {
        Ok("https://provider.test/auth".into())
    }

    async fn handle_callback(&self, _: BindingId, _: &CallbackParams) -> Result<Credential, AuthError> {
        Err(AuthError::Denied("test flow".into()))
    }

    fn sign_request(&self, request: RequestBuilder, credential: &Credential) -> Result<RequestBuilder, AuthError> {
        Ok(request.bearer_auth(credential.access_token()))
    }
}

/// A context for `service_id`, optionally holding an OAuth2 access token.
pub fn context(service_id: ServiceId, token: Option<&str>) -> ServiceContext {
    let data = Arc::new(MemoryData::default());
    let binding = BindingId::new();
    if let Some(token) = token {
        let credential = Credential::OAuth2 {
            access_token: token.to_string(),
            refresh_token: None,
            expires_at: None,
        };
        data.values.lock().insert(
            (binding, credential.type_tag().to_string()),
            serde_json::to_value(&credential).unwrap(),
        );
    }
    ServiceContext::new(
        binding,
        service_id,
        data,
        Arc::new(Bearer),
        reqwest::Client::new(),
        SyncCursor::default(),
    )
}

#[derive(Default)]
pub struct MemorySettings {
    pub values: Mutex<HashMap<ServiceId, AuthSettings>>,
    pub fail_puts: bool,
}

impl MemorySettings {
    pub fn failing() -> Self {
        Self {
            fail_puts: true,
            ..Default::default()
        }
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, id: ServiceId) -> StoreResult<Option<AuthSettings>> {
        Ok(self.values.lock().get(&id).cloned())
    }

    fn put(&self, id: ServiceId, settings: &AuthSettings) -> StoreResult<()> {
        if self.fail_puts {
            return Err(StoreError::Backend("disk full".into()));
        }
        self.values.lock().insert(id, settings.clone());
        Ok(())
    }
}

pub fn service_id(raw: &str) -> ServiceId {
    ServiceId::parse(raw).unwrap()
}

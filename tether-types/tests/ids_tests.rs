use tether_types::{BindingId, ServiceId};
use std::collections::HashSet;
use std::str::FromStr;

// ── ServiceId ─────────────────────────────────────────────────────

#[test]
fn service_id_from_uuid_roundtrip() {
    let uuid = uuid::Uuid::new_v4();
    let id = ServiceId::from_uuid(uuid);
    assert_eq!(id.as_uuid(), uuid);
}

#[test]
fn service_id_display_and_parse() {
    let id = ServiceId::parse("6f1c3d2a-9b7e-4c1f-8a2d-3e4f5a6b7c8d").unwrap();
    assert_eq!(id.to_string(), "6f1c3d2a-9b7e-4c1f-8a2d-3e4f5a6b7c8d");
}

#[test]
fn service_id_nil_is_detected() {
    assert!(ServiceId::from_uuid(uuid::Uuid::nil()).is_nil());
    assert!(!ServiceId::from_uuid(uuid::Uuid::new_v4()).is_nil());
}

#[test]
fn service_id_from_str_invalid() {
    assert!(ServiceId::from_str("lastfm").is_err());
}

#[test]
fn service_id_serde_is_transparent() {
    let id = ServiceId::from_uuid(uuid::Uuid::new_v4());
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{id}\""));
    let back: ServiceId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

// ── BindingId ─────────────────────────────────────────────────────

#[test]
fn binding_id_new_is_unique() {
    let a = BindingId::new();
    let b = BindingId::new();
    assert_ne!(a, b);
}

#[test]
fn binding_id_is_time_ordered() {
    let a = BindingId::new();
    std::thread::sleep(std::time::Duration::from_millis(2));
    let b = BindingId::new();
    assert!(a < b);
}

#[test]
fn binding_id_display_and_parse() {
    let id = BindingId::new();
    let parsed = BindingId::parse(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn binding_id_hash_and_eq() {
    let id = BindingId::new();
    let mut set = HashSet::new();
    set.insert(id);
    set.insert(id);
    assert_eq!(set.len(), 1);
}

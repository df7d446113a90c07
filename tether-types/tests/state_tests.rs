//! Property tests for the persisted forms of sync state and settings.

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use tether_types::{
    AuthSettings, BindingKind, Credential, OAuth1Settings, OAuth2Settings, ServiceState,
    SyncCursor, SyncState,
};

fn sync_state_strategy() -> impl Strategy<Value = SyncState> {
    prop::sample::select(SyncState::ALL.to_vec())
}

fn text_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9:/._-]{0,40}").unwrap()
}

fn settings_strategy() -> impl Strategy<Value = AuthSettings> {
    prop_oneof![
        (text_strategy(), text_strategy(), text_strategy()).prop_map(|(a, b, c)| {
            AuthSettings::OAuth1(OAuth1Settings {
                request_token_endpoint: a.clone(),
                authorization_endpoint: b.clone(),
                access_token_endpoint: c,
                consumer_key: a,
                consumer_secret: b,
                callback_url: String::new(),
            })
        }),
        (text_strategy(), text_strategy(), prop::collection::vec(text_strategy(), 0..4)).prop_map(
            |(a, b, scopes)| {
                AuthSettings::OAuth2(OAuth2Settings {
                    authorization_endpoint: a.clone(),
                    token_endpoint: b.clone(),
                    client_id: a,
                    client_secret: b,
                    redirect_uri: String::new(),
                    scopes,
                })
            }
        ),
    ]
}

proptest! {
    #[test]
    fn sync_state_string_form_is_stable(state in sync_state_strategy()) {
        let parsed: SyncState = state.as_str().parse().unwrap();
        prop_assert_eq!(parsed, state);
        prop_assert_eq!(state.to_string(), state.as_str());
    }

    #[test]
    fn only_off_and_unauthorized_gate(state in sync_state_strategy()) {
        let expected = matches!(state, SyncState::Off | SyncState::Unauthorized);
        prop_assert_eq!(state.is_gating(), expected);
    }

    #[test]
    fn settings_json_preserves_variant(settings in settings_strategy()) {
        let json = settings.to_json().unwrap();
        let back = AuthSettings::from_json(&json).unwrap();
        prop_assert!(back.same_variant(&settings));
        prop_assert_eq!(back, settings);
    }
}

#[test]
fn unknown_sync_state_string_is_rejected() {
    assert!("paused".parse::<SyncState>().is_err());
}

#[test]
fn binding_kind_parse() {
    assert_eq!("service".parse::<BindingKind>().unwrap(), BindingKind::Service);
    assert_eq!("app".parse::<BindingKind>().unwrap(), BindingKind::App);
    assert!("widget".parse::<BindingKind>().is_err());
}

#[test]
fn cursor_is_read_back_from_state() {
    let date = chrono::Utc::now();
    let state = ServiceState {
        sync_state: SyncState::Success,
        sync_current_object: Some("page:4".into()),
        sync_current_date_utc: Some(date),
        ..Default::default()
    };
    assert_eq!(
        state.cursor(),
        SyncCursor::new(Some("page:4".into()), Some(date))
    );
}

#[test]
fn credential_json_uses_kind_tag() {
    let credential = Credential::OAuth1 {
        token: "t".into(),
        token_secret: "s".into(),
    };
    let value = serde_json::to_value(&credential).unwrap();
    assert_eq!(value["kind"], "oauth1");
    let back: Credential = serde_json::from_value(value).unwrap();
    assert_eq!(back, credential);
}

use alloy::primitives::Address;
use rusty_wallet_sdk_core::{Chain, ProviderEventKind, ProviderState};

fn addr(raw: &str) -> Address {
    raw.parse().expect("valid address")
}

#[test]
fn accounts_update_with_equal_list_is_silent() {
    let mut state = ProviderState::default();
    let aa = addr("0x00000000000000000000000000000000000000aa");
    let first = state.apply_accounts(vec![aa]).expect("first update emits");
    assert_eq!(first.kind, ProviderEventKind::AccountsChanged);
    assert_eq!(
        first.value,
        serde_json::json!(["0x00000000000000000000000000000000000000aa"])
    );

    // Mixed-case input parses to the same address.
    let upper = addr("0x00000000000000000000000000000000000000AA");
    assert!(state.apply_accounts(vec![upper]).is_none());
}

#[test]
fn accounts_update_with_different_order_emits() {
    let mut state = ProviderState::default();
    let a = addr("0x1000000000000000000000000000000000000001");
    let b = addr("0x2000000000000000000000000000000000000002");
    state.apply_accounts(vec![a, b]);
    let swapped = state.apply_accounts(vec![b, a]).expect("order change emits");
    assert_eq!(
        swapped.value,
        serde_json::json!([
            "0x2000000000000000000000000000000000000002",
            "0x1000000000000000000000000000000000000001"
        ])
    );
    assert_eq!(state.selected_address(), Some(b));
}

#[test]
fn connected_tracks_account_list() {
    let mut state = ProviderState::default();
    assert!(!state.connected());
    state.apply_accounts(vec![addr("0x1000000000000000000000000000000000000001")]);
    assert!(state.connected());
    state.reset();
    assert!(!state.connected());
    assert_eq!(state.chain, Chain::new(1));
}

#[test]
fn chain_update_emits_hex_id_only_on_change() {
    let mut state = ProviderState::new(Chain::new(8453));
    state.apply_chain(Chain::new(8453));
    assert!(state.apply_chain(Chain::new(8453)).is_none());

    let with_url = state
        .apply_chain(Chain::with_rpc_url(8453, "https://base.example"))
        .expect("rpc url change emits");
    assert_eq!(with_url.kind, ProviderEventKind::ChainChanged);
    assert_eq!(with_url.value, serde_json::json!("0x2105"));

    assert!(state
        .apply_chain(Chain::with_rpc_url(8453, "https://base.example"))
        .is_none());
    let switched = state.apply_chain(Chain::new(1)).expect("id change emits");
    assert_eq!(switched.value, serde_json::json!("0x1"));
}

#[test]
fn first_chain_determination_always_emits() {
    let mut state = ProviderState::default();
    let first = state
        .apply_chain(Chain::new(1))
        .expect("initial chain emits even when unchanged");
    assert_eq!(first.kind, ProviderEventKind::ChainChanged);
    assert_eq!(first.value, serde_json::json!("0x1"));
    assert!(state.apply_chain(Chain::new(1)).is_none());

    state.reset();
    assert!(state.apply_chain(Chain::new(1)).is_some());
}

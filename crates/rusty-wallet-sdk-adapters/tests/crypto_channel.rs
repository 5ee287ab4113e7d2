use std::sync::Arc;

use serde_json::json;

use rusty_wallet_sdk_adapters::crypto::{
    decrypt, decrypt_content, decrypt_with_session_key, derive_session_key, derive_shared_secret,
    encrypt, encrypt_content, encrypt_with_session_key, export_public_key_hex, generate_key_pair,
    import_public_key_hex,
};
use rusty_wallet_sdk_adapters::session::WalletLinkSession;
use rusty_wallet_sdk_adapters::{MemoryStorage, ScopedStorage};
use rusty_wallet_sdk_core::{ErrorPayload, ProviderError, RpcResult, ScwResponse};

#[test]
fn both_sides_agree_on_the_shared_secret() {
    let dapp = generate_key_pair().expect("dapp keys");
    let wallet = generate_key_pair().expect("wallet keys");

    let wallet_pub = import_public_key_hex(&export_public_key_hex(&wallet.public).expect("export"))
        .expect("import");
    let dapp_pub =
        import_public_key_hex(&export_public_key_hex(&dapp.public).expect("export")).expect("import");

    let dapp_secret = derive_shared_secret(&dapp.secret, &wallet_pub);
    let wallet_secret = derive_shared_secret(&wallet.secret, &dapp_pub);
    assert_eq!(dapp_secret, wallet_secret);

    let sealed = encrypt(&dapp_secret, b"hello wallet").expect("encrypt");
    assert_eq!(sealed.iv.len(), 12);
    assert_eq!(decrypt(&wallet_secret, &sealed).expect("decrypt"), b"hello wallet");
}

#[test]
fn error_payloads_survive_the_channel_as_code_and_message() {
    let a = generate_key_pair().expect("keys a");
    let b = generate_key_pair().expect("keys b");
    let secret = derive_shared_secret(&a.secret, &b.public);

    let failure = ProviderError::UserRejected("User rejected the request.".to_owned());
    let response = ScwResponse {
        result: RpcResult::Error(ErrorPayload::from(&failure)),
        data: None,
    };
    let sealed = encrypt_content(&secret, &response).expect("encrypt");
    let opened: ScwResponse = decrypt_content(&secret, &sealed).expect("decrypt");
    assert_eq!(opened, response);

    let RpcResult::Error(payload) = opened.result else {
        panic!("expected an error result");
    };
    assert_eq!(payload.code, Some(4001));
    assert_eq!(ProviderError::from(payload), failure);
}

#[test]
fn a_different_secret_cannot_open_the_payload() {
    let a = generate_key_pair().expect("keys a");
    let b = generate_key_pair().expect("keys b");
    let c = generate_key_pair().expect("keys c");
    let right = derive_shared_secret(&a.secret, &b.public);
    let wrong = derive_shared_secret(&a.secret, &c.public);

    let sealed = encrypt_content(&right, &json!({ "accounts": [] })).expect("encrypt");
    let err = decrypt_content::<serde_json::Value>(&wrong, &sealed).expect_err("wrong key");
    assert!(matches!(err, ProviderError::Internal(_)));
}

#[test]
fn malformed_public_keys_are_rejected() {
    assert!(import_public_key_hex("0xdeadbeef").is_err());
    assert!(import_public_key_hex("not hex").is_err());
}

#[test]
fn session_key_is_deterministic() {
    let key = derive_session_key("c0ffee", "5ecre7");
    assert_eq!(key, derive_session_key("c0ffee", "5ecre7"));
    assert_eq!(key.len(), 64);
    assert_ne!(key, derive_session_key("c0ffee", "other"));
    assert_ne!(key, derive_session_key("other", "5ecre7"));
}

#[test]
fn session_key_cipher_round_trips() {
    let key = derive_session_key("c0ffee", "5ecre7");
    let sealed = encrypt_with_session_key("{\"method\":\"requestEthereumAccounts\"}", &key)
        .expect("encrypt");
    assert!(sealed.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(
        decrypt_with_session_key(&sealed, &key).expect("decrypt"),
        "{\"method\":\"requestEthereumAccounts\"}"
    );

    let other = derive_session_key("c0ffee", "other");
    assert!(decrypt_with_session_key(&sealed, &other).is_err());
}

#[test]
fn persisted_session_reloads_with_the_same_key() {
    let backend = Arc::new(MemoryStorage::new());
    let storage = ScopedStorage::new(backend, "walletlink", "https://www.walletlink.org");

    assert!(WalletLinkSession::load(storage.clone())
        .expect("load empty")
        .is_none());

    let created = WalletLinkSession::create(storage.clone()).expect("create");
    created.save().expect("save");
    created.set_linked(true).expect("link");

    let loaded = WalletLinkSession::load(storage)
        .expect("load")
        .expect("session present");
    assert_eq!(loaded.id(), created.id());
    assert_eq!(loaded.secret(), created.secret());
    assert_eq!(loaded.key(), created.key());
    assert_eq!(loaded.key(), derive_session_key(created.id(), created.secret()));
    assert!(loaded.linked());
}

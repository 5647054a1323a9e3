//! Keystore 与钱包身份往返测试

mod common;

use avacore::{
    domain::chain_config::ChainAlias,
    service::{
        keystore::{self, DecryptedKey, KeyType},
        wallet_core::WalletIdentity,
    },
};
use common::*;
use zeroize::Zeroizing;

#[tokio::test]
async fn test_wallet_survives_keystore_round_trip() {
    let network = MockNetwork::new();
    let original = mnemonic_wallet(&network, None).await;

    let key = DecryptedKey::from_signer(original.signer()).unwrap();
    assert_eq!(key.key_type, KeyType::Mnemonic);
    let file = keystore::encrypt("correct horse", &[key], 0).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keystore.json");
    keystore::write_file(&path, &file).unwrap();

    let loaded = keystore::read_file(&path).unwrap();
    let identity = keystore::with_decrypted(&loaded, "correct horse", |d| {
        assert_eq!(d.version, "6.0");
        d.keys[0].to_identity()
    })
    .unwrap();

    let restored = wallet_with(identity, &network, None).await;
    for chain in ChainAlias::ALL {
        assert_eq!(
            restored.current_address(chain).await.unwrap(),
            original.current_address(chain).await.unwrap()
        );
    }
}

#[tokio::test]
async fn test_singleton_wallet_exports_its_key() {
    let network = MockNetwork::new();
    let original = wallet_with(
        WalletIdentity::Singleton(Zeroizing::new(vec![0x11; 32])),
        &network,
        None,
    )
    .await;

    let key = DecryptedKey::from_signer(original.signer()).unwrap();
    assert_eq!(key.key_type, KeyType::Singleton);
    assert_eq!(key.key.as_str(), "11".repeat(32));

    let file = keystore::encrypt("pw", &[key], 0).unwrap();
    let decrypted = keystore::decrypt(&file, "pw").unwrap();
    let restored = wallet_with(decrypted.keys[0].to_identity().unwrap(), &network, None).await;

    assert_eq!(restored.evm_address(), original.evm_address());
}

#[tokio::test]
async fn test_hardware_wallet_has_nothing_to_export() {
    let network = MockNetwork::new();
    let wallet = wallet_with(
        WalletIdentity::Hardware(MockDevice::new(None)),
        &network,
        None,
    )
    .await;

    let err = DecryptedKey::from_signer(wallet.signer()).unwrap_err();
    assert_eq!(err.code(), "unsupported");
}

#[test]
fn test_wrong_password_and_corrupt_files_are_distinguished() {
    let file = keystore::encrypt("pw", &[DecryptedKey::mnemonic(PHRASE)], 0).unwrap();
    assert_eq!(
        keystore::decrypt(&file, "not-pw").unwrap_err().code(),
        "invalid_password"
    );

    let mut corrupt = file.clone();
    corrupt.salt = "not base58 0OIl".into();
    assert_eq!(
        keystore::decrypt(&corrupt, "pw").unwrap_err().code(),
        "keystore_error"
    );
}

const FIXTURE_PASSWORD: &str = "legacy fixture password";

fn fixture(name: &str) -> keystore::KeystoreFile {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    keystore::read_file(path).unwrap()
}

fn key_set(file: &keystore::KeystoreFile) -> Vec<(String, KeyType)> {
    keystore::decrypt(file, FIXTURE_PASSWORD)
        .unwrap()
        .keys
        .iter()
        .map(|k| (k.key.as_str().to_string(), k.key_type))
        .collect()
}

#[test]
fn test_current_fixture_holds_expected_keys() {
    let file = fixture("keystore_v6.json");
    let decrypted = keystore::decrypt(&file, FIXTURE_PASSWORD).unwrap();
    assert_eq!(decrypted.active_index, 1);
    assert_eq!(
        key_set(&file),
        vec![
            (PHRASE.to_string(), KeyType::Mnemonic),
            (
                "legal winner thank year wave sausage worth useful legal winner thank yellow"
                    .to_string(),
                KeyType::Mnemonic
            ),
        ]
    );
}

#[test]
fn test_every_legacy_fixture_matches_current_fixture() {
    let expected = key_set(&fixture("keystore_v6.json"));

    for name in [
        "keystore_v2.json",
        "keystore_v3.json",
        "keystore_v4.json",
        "keystore_v5.json",
    ] {
        let file = fixture(name);
        assert_eq!(key_set(&file), expected, "{}", name);
        assert_eq!(
            keystore::decrypt(&file, "wrong password").unwrap_err().code(),
            "invalid_password",
            "{}",
            name
        );

        let migrated = keystore::migrate(&file, FIXTURE_PASSWORD).unwrap();
        assert_eq!(migrated.version, "6.0");
        assert!(migrated.pass_hash.is_none());
        assert_eq!(key_set(&migrated), expected, "{} migrated", name);
    }
}

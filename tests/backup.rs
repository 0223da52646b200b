use chrono::{DateTime, TimeZone, Utc};
use semver::Version;
use tokio_util::sync::CancellationToken;
use vaultkeep::error::Error;
use vaultkeep::model::{
    ItemColor, ItemPayload, LockState, NoteFormat, OtpAlgorithm, OtpCode, OtpKind, OtpSecret,
    SearchableLevel, SecretFormat, SecureNote, VaultApplicationPayload, VaultItem, VaultItemTag,
    Visibility,
};
use vaultkeep::store::{Store, VaultStore};
use vaultkeep::{
    BackupExporter, BackupImporter, DecryptionKeySource, EncryptedVault, ImportPolicy,
    ImportResolver, KeyDeriverRegistry, KeyDeriverSignature, format,
};
use zeroize::Zeroizing;

fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
}

fn totp(issuer: &str) -> VaultItem {
    VaultItem::new(ItemPayload::Otp(OtpCode {
        kind: OtpKind::Totp { period: 30 },
        secret: OtpSecret {
            format: SecretFormat::Base32,
            data: Zeroizing::new(b"12345678901234567890".to_vec()),
        },
        algorithm: OtpAlgorithm::Sha1,
        digits: 6,
        issuer: issuer.to_string(),
        account_name: "me@example.com".to_string(),
    }))
}

fn note(title: &str) -> VaultItem {
    VaultItem::new(ItemPayload::Note(SecureNote {
        title: title.to_string(),
        contents: "# heading\nbody".to_string(),
        format: NoteFormat::Markdown,
    }))
}

/// 3 items, 2 tags, every optional field exercised somewhere.
fn three_items_two_tags() -> VaultApplicationPayload {
    let mut work = VaultItemTag::new("Work");
    work.color = Some(ItemColor {
        red: 0.25,
        green: 0.5,
        blue: 1.0,
    });
    work.icon_name = Some("briefcase".to_string());
    let home = VaultItemTag::new("Home");

    let mut github = totp("GitHub");
    github.metadata.tags.insert(work.id);
    github.metadata.color = Some(ItemColor {
        red: 1.0,
        green: 0.0,
        blue: 0.0,
    });

    let mut bank = VaultItem::new(ItemPayload::Otp(OtpCode {
        kind: OtpKind::Hotp { counter: 42 },
        secret: OtpSecret {
            format: SecretFormat::Base64,
            data: Zeroizing::new(vec![0xde, 0xad, 0xbe, 0xef]),
        },
        algorithm: OtpAlgorithm::Sha512,
        digits: 8,
        issuer: "Bank".to_string(),
        account_name: String::new(),
    }));
    bank.metadata.visibility = Visibility::OnlySearch;
    bank.metadata.searchable_level = SearchableLevel::OnlyPassphrase;
    bank.metadata.search_passphrase = Some("money".to_string());
    bank.metadata.lock_state = LockState::LockedWithNativeSecurity;
    bank.metadata.tags.insert(home.id);
    bank.metadata.tags.insert(work.id);

    let mut wifi = note("Wi-Fi");
    wifi.metadata.user_description = "guest network".to_string();

    VaultApplicationPayload {
        user_description: "laptop".to_string(),
        items: vec![github, bank, wifi],
        tags: vec![work, home],
    }
}

fn seal(payload: &VaultApplicationPayload, password: &[u8]) -> (KeyDeriverRegistry, Vec<u8>) {
    let registry = KeyDeriverRegistry::standard();
    let vault = BackupExporter::new(&registry, KeyDeriverSignature::TestingV1)
        .export(payload, password)
        .unwrap();
    let bytes = format::serialize(&vault).unwrap();
    (registry, bytes)
}

#[test]
fn export_import_with_same_password_restores_payload() {
    let original = three_items_two_tags();
    let (registry, bytes) = seal(&original, b"hunter2");

    let container = format::parse(&bytes).unwrap();
    let decoded = BackupImporter::new(&registry)
        .import(&container, DecryptionKeySource::Password(b"hunter2"))
        .unwrap();

    assert_eq!(decoded, original);
}

#[test]
fn import_with_wrong_password_fails_decryption() {
    let (registry, bytes) = seal(&three_items_two_tags(), b"hunter2");
    let container = format::parse(&bytes).unwrap();

    let err = BackupImporter::new(&registry)
        .import(&container, DecryptionKeySource::Password(b"wrong"))
        .unwrap_err();
    assert!(matches!(err, Error::DecryptionFailed));
}

#[test]
fn tampered_ciphertext_fails_decryption() {
    let (registry, mut bytes) = seal(&three_items_two_tags(), b"hunter2");
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;

    let container = format::parse(&bytes).unwrap();
    assert!(matches!(
        BackupImporter::new(&registry).import(&container, DecryptionKeySource::Password(b"hunter2")),
        Err(Error::DecryptionFailed)
    ));
}

#[test]
fn merge_scenario_keeps_the_newer_side() {
    let mut store = Store::new();

    let mut x_local = note("X");
    x_local.updated = day(1);
    let mut y_local = note("Y");
    y_local.updated = day(5);
    store.add_item(x_local.clone()).unwrap();
    store.add_item(y_local.clone()).unwrap();

    let mut x_incoming = x_local.clone();
    x_incoming.updated = day(5);
    let mut y_incoming = y_local.clone();
    y_incoming.updated = day(1);

    let summary = ImportResolver::apply(
        &mut store,
        VaultApplicationPayload {
            user_description: String::new(),
            items: vec![x_incoming, y_incoming],
            tags: vec![],
        },
        ImportPolicy::Merge,
    )
    .unwrap();

    assert_eq!(summary.items_written, 1);
    assert_eq!(summary.items_skipped, 1);
    assert_eq!(store.get_item(&x_local.id).unwrap().updated, day(5));
    assert_eq!(store.get_item(&y_local.id).unwrap().updated, day(5));
}

#[test]
fn override_scenario_leaves_exactly_the_backup() {
    let mut store = Store::new();
    for i in 0..10 {
        store.add_item(note(&format!("local {i}"))).unwrap();
    }

    let backup = VaultApplicationPayload {
        user_description: String::new(),
        items: (0..5).map(|i| totp(&format!("remote {i}"))).collect(),
        tags: vec![],
    };
    let (registry, bytes) = seal(&backup, b"pw");
    let decoded = BackupImporter::new(&registry)
        .import(
            &format::parse(&bytes).unwrap(),
            DecryptionKeySource::Password(b"pw"),
        )
        .unwrap();

    ImportResolver::apply(&mut store, decoded, ImportPolicy::Override).unwrap();

    let after = store.export_payload("").unwrap();
    assert_eq!(after.items.len(), 5);
    for item in &backup.items {
        assert_eq!(store.get_item(&item.id), Some(item));
    }
}

#[test]
fn newer_major_version_is_rejected() {
    let (registry, bytes) = seal(&three_items_two_tags(), b"pw");
    let sealed = format::parse(&bytes).unwrap();
    let future = EncryptedVault::with_version(
        Version::new(2, 0, 0),
        sealed.created(),
        sealed.signature().to_string(),
        sealed.salt().to_vec(),
        sealed.iv().to_vec(),
        sealed.ciphertext().to_vec(),
    );

    assert!(matches!(
        BackupImporter::new(&registry).import(&future, DecryptionKeySource::Password(b"pw")),
        Err(Error::IncompatibleVersion { supported: 1, .. })
    ));
}

#[test]
fn newer_minor_version_is_accepted() {
    let original = three_items_two_tags();
    let (registry, bytes) = seal(&original, b"pw");
    let sealed = format::parse(&bytes).unwrap();
    let newer_minor = EncryptedVault::with_version(
        Version::new(1, 4, 0),
        sealed.created(),
        sealed.signature().to_string(),
        sealed.salt().to_vec(),
        sealed.iv().to_vec(),
        sealed.ciphertext().to_vec(),
    );

    let reparsed = format::parse(&format::serialize(&newer_minor).unwrap()).unwrap();
    assert_eq!(reparsed.version(), &Version::new(1, 4, 0));
    assert_eq!(
        BackupImporter::new(&registry)
            .import(&reparsed, DecryptionKeySource::Password(b"pw"))
            .unwrap(),
        original
    );
}

#[test]
fn unknown_signature_is_reported() {
    let (_, bytes) = seal(&three_items_two_tags(), b"pw");
    let sealed = format::parse(&bytes).unwrap();

    let registry_without_testing = KeyDeriverRegistry::empty();

    assert!(matches!(
        BackupImporter::new(&registry_without_testing)
            .import(&sealed, DecryptionKeySource::Password(b"pw")),
        Err(Error::UnknownKeyDeriverSignature(sig)) if sig == "testing-v1"
    ));
}

#[tokio::test]
async fn background_export_and_import_with_fast_profile() {
    let registry = KeyDeriverRegistry::standard();
    let original = three_items_two_tags();

    let sealed = BackupExporter::new(&registry, KeyDeriverSignature::BackupFastV1)
        .export_in_background(
            &original,
            Zeroizing::new(b"hunter2".to_vec()),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(sealed.signature(), "backup-fast-v1");

    let (decoded, key) = BackupImporter::new(&registry)
        .import_in_background(
            &sealed,
            Zeroizing::new(b"hunter2".to_vec()),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(decoded, original);
    assert_eq!(key.salt(), sealed.salt());
}

#[tokio::test]
async fn cancelled_import_reports_cancelled() {
    let registry = KeyDeriverRegistry::standard();
    let sealed = BackupExporter::new(&registry, KeyDeriverSignature::BackupFastV1)
        .export(&three_items_two_tags(), b"pw")
        .unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let result = BackupImporter::new(&registry)
        .import_in_background(&sealed, Zeroizing::new(b"pw".to_vec()), token)
        .await;
    assert!(matches!(result, Err(Error::Cancelled)));
}

use chrono::{DateTime, Utc};
use proptest::prelude::*;
use vaultkeep::model::{
    ItemColor, ItemPayload, NoteFormat, SecureNote, VaultApplicationPayload, VaultItem,
    VaultItemTag,
};
use vaultkeep::store::{Store, VaultStore};
use vaultkeep::{
    BackupExporter, BackupImporter, DecryptionKeySource, DerivedEncryptionKey, ImportPolicy,
    ImportResolver, KeyDeriverRegistry, KeyDeriverSignature,
};

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

fn note(title: String, contents: String, updated: i64) -> VaultItem {
    let mut item = VaultItem::new(ItemPayload::Note(SecureNote {
        title,
        contents,
        format: NoteFormat::Plain,
    }));
    item.created = at(0);
    item.updated = at(updated);
    item
}

fn arb_color() -> impl Strategy<Value = Option<ItemColor>> {
    proptest::option::of((0.0f64..=1.0, 0.0f64..=1.0, 0.0f64..=1.0).prop_map(
        |(red, green, blue)| ItemColor { red, green, blue },
    ))
}

fn arb_note() -> impl Strategy<Value = VaultItem> {
    (".{0,24}", ".{0,64}", 0i64..1_000_000, arb_color()).prop_map(|(t, c, u, color)| {
        let mut item = note(t, c, u);
        item.metadata.color = color;
        item
    })
}

fn arb_tag() -> impl Strategy<Value = VaultItemTag> {
    (".{1,16}", arb_color()).prop_map(|(name, color)| {
        let mut tag = VaultItemTag::new(name);
        tag.color = color;
        tag
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn derivation_is_deterministic(
        password in proptest::collection::vec(any::<u8>(), 0..64),
        salt in proptest::collection::vec(any::<u8>(), 16),
    ) {
        let deriver = KeyDeriverRegistry::standard()
            .get(KeyDeriverSignature::TestingV1)
            .unwrap();
        let a = DerivedEncryptionKey::derive(&deriver, &password, &salt).unwrap();
        let b = DerivedEncryptionKey::derive(&deriver, &password, &salt).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn any_payload_survives_a_backup(
        items in proptest::collection::vec(arb_note(), 0..6),
        tags in proptest::collection::vec(arb_tag(), 0..4),
        description in ".{0,32}",
        password in proptest::collection::vec(any::<u8>(), 1..32),
    ) {
        let payload = VaultApplicationPayload {
            user_description: description,
            items,
            tags,
        };
        let registry = KeyDeriverRegistry::standard();
        let sealed = BackupExporter::new(&registry, KeyDeriverSignature::TestingV1)
            .export(&payload, &password)
            .unwrap();
        let decoded = BackupImporter::new(&registry)
            .import(&sealed, DecryptionKeySource::Password(&password))
            .unwrap();
        prop_assert_eq!(decoded, payload);
    }

    #[test]
    fn merge_takes_incoming_iff_strictly_newer(
        local_updated in 0i64..1_000,
        incoming_updated in 0i64..1_000,
    ) {
        let local = note("local".into(), "local".into(), local_updated);
        let mut incoming = note("incoming".into(), "incoming".into(), incoming_updated);
        incoming.id = local.id;

        let mut store = Store::new();
        store.add_item(local.clone()).unwrap();
        ImportResolver::apply(
            &mut store,
            VaultApplicationPayload {
                user_description: String::new(),
                items: vec![incoming.clone()],
                tags: vec![],
            },
            ImportPolicy::Merge,
        )
        .unwrap();

        let expected = if incoming_updated > local_updated { &incoming } else { &local };
        prop_assert_eq!(store.get_item(&local.id), Some(expected));
    }

    #[test]
    fn override_leaves_no_survivors(
        before in proptest::collection::vec(arb_note(), 0..8),
        incoming in proptest::collection::vec(arb_note(), 0..8),
    ) {
        let mut store = Store::new();
        for item in before {
            store.add_item(item).unwrap();
        }
        store.add_tag(VaultItemTag::new("stale"));

        ImportResolver::apply(
            &mut store,
            VaultApplicationPayload {
                user_description: String::new(),
                items: incoming.clone(),
                tags: vec![],
            },
            ImportPolicy::Override,
        )
        .unwrap();

        let after = store.export_payload("").unwrap();
        prop_assert!(after.tags.is_empty());
        prop_assert_eq!(after.items.len(), incoming.len());
        for item in &incoming {
            prop_assert_eq!(store.get_item(&item.id), Some(item));
        }
    }
}

//! Applies a decoded payload to the live store.

use tracing::{debug, info};

use crate::error::Result;
use crate::model::VaultApplicationPayload;
use crate::store::{ImportBatch, VaultStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportPolicy {
    /// Per-item last-write-wins on `updated`; tags always written.
    Merge,
    /// Replace the whole store with the payload.
    Override,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub items_written: usize,
    pub items_skipped: usize,
    pub tags_written: usize,
    pub replaced_existing: bool,
}

pub struct ImportResolver;

impl ImportResolver {
    /// Resolves `payload` against `store` and commits the result in a
    /// single all-or-nothing batch.
    pub fn apply<S: VaultStore + ?Sized>(
        store: &mut S,
        payload: VaultApplicationPayload,
        policy: ImportPolicy,
    ) -> Result<ImportSummary> {
        let (batch, summary) = match policy {
            ImportPolicy::Merge => Self::plan_merge(store, payload)?,
            ImportPolicy::Override => Self::plan_override(payload),
        };

        store.commit(batch)?;
        info!(?policy, ?summary, "import applied");
        Ok(summary)
    }

    fn plan_merge<S: VaultStore + ?Sized>(
        store: &S,
        payload: VaultApplicationPayload,
    ) -> Result<(ImportBatch, ImportSummary)> {
        let mut summary = ImportSummary::default();
        let mut items = Vec::with_capacity(payload.items.len());

        for item in payload.items {
            match store.item_updated(&item.id)? {
                Some(local) if item.updated <= local => {
                    debug!(id = %item.id, "keeping local item, incoming is not newer");
                    summary.items_skipped += 1;
                }
                _ => items.push(item),
            }
        }

        // Tags carry no timestamp and are written unconditionally. Whether
        // they should be gated like items is still an open product question.
        summary.items_written = items.len();
        summary.tags_written = payload.tags.len();

        let batch = ImportBatch {
            clear_existing: false,
            items,
            tags: payload.tags,
        };
        Ok((batch, summary))
    }

    fn plan_override(payload: VaultApplicationPayload) -> (ImportBatch, ImportSummary) {
        let summary = ImportSummary {
            items_written: payload.items.len(),
            items_skipped: 0,
            tags_written: payload.tags.len(),
            replaced_existing: true,
        };
        let batch = ImportBatch {
            clear_existing: true,
            items: payload.items,
            tags: payload.tags,
        };
        (batch, summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, StoreError};
    use crate::model::{ItemPayload, NoteFormat, SecureNote, VaultItem, VaultItemTag};
    use crate::store::Store;
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    fn at(day: u32) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(&format!("2024-01-{day:02}T00:00:00Z"))
            .unwrap()
            .with_timezone(&Utc)
    }

    fn note(contents: &str, updated: DateTime<Utc>) -> VaultItem {
        let mut item = VaultItem::new(ItemPayload::Note(SecureNote {
            title: "note".to_string(),
            contents: contents.to_string(),
            format: NoteFormat::Plain,
        }));
        item.created = at(1);
        item.updated = updated;
        item
    }

    fn payload(items: Vec<VaultItem>, tags: Vec<VaultItemTag>) -> VaultApplicationPayload {
        VaultApplicationPayload {
            user_description: String::new(),
            items,
            tags,
        }
    }

    #[test]
    fn merge_takes_strictly_newer_incoming_item() {
        let mut store = Store::new();
        let local = note("local", at(1));
        store.add_item(local.clone()).unwrap();

        let mut incoming = local.clone();
        incoming.updated = at(5);
        if let ItemPayload::Note(n) = &mut incoming.payload {
            n.contents = "incoming".to_string();
        }

        let summary =
            ImportResolver::apply(&mut store, payload(vec![incoming.clone()], vec![]), ImportPolicy::Merge)
                .unwrap();

        assert_eq!(summary.items_written, 1);
        assert_eq!(store.get_item(&local.id).unwrap(), &incoming);
    }

    #[test]
    fn merge_keeps_local_when_incoming_is_older() {
        let mut store = Store::new();
        let local = note("local", at(5));
        store.add_item(local.clone()).unwrap();

        let mut incoming = local.clone();
        incoming.updated = at(1);

        let summary =
            ImportResolver::apply(&mut store, payload(vec![incoming], vec![]), ImportPolicy::Merge)
                .unwrap();

        assert_eq!(summary.items_skipped, 1);
        assert_eq!(store.get_item(&local.id).unwrap(), &local);
    }

    #[test]
    fn merge_keeps_local_on_tie() {
        let mut store = Store::new();
        let local = note("local", at(3));
        store.add_item(local.clone()).unwrap();

        let mut incoming = local.clone();
        if let ItemPayload::Note(n) = &mut incoming.payload {
            n.contents = "same time, different body".to_string();
        }

        ImportResolver::apply(&mut store, payload(vec![incoming], vec![]), ImportPolicy::Merge)
            .unwrap();
        assert_eq!(store.get_item(&local.id).unwrap(), &local);
    }

    #[test]
    fn merge_adds_new_items_and_keeps_unrelated_ones() {
        let mut store = Store::new();
        let existing = note("existing", at(1));
        store.add_item(existing.clone()).unwrap();

        let fresh = note("fresh", at(2));
        ImportResolver::apply(&mut store, payload(vec![fresh.clone()], vec![]), ImportPolicy::Merge)
            .unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.get_item(&existing.id).is_some());
        assert!(store.get_item(&fresh.id).is_some());
    }

    #[test]
    fn merge_always_writes_tags() {
        let mut store = Store::new();
        let mut local_tag = VaultItemTag::new("Old name");
        store.add_tag(local_tag.clone());

        local_tag.name = "New name".to_string();
        let summary =
            ImportResolver::apply(&mut store, payload(vec![], vec![local_tag.clone()]), ImportPolicy::Merge)
                .unwrap();

        assert_eq!(summary.tags_written, 1);
        assert_eq!(store.tags()[0].name, "New name");
    }

    #[test]
    fn override_replaces_everything() {
        let mut store = Store::new();
        for i in 0..10 {
            store.add_item(note(&format!("old {i}"), at(1))).unwrap();
        }
        store.add_tag(VaultItemTag::new("old tag"));

        let incoming: Vec<_> = (0..5).map(|i| note(&format!("new {i}"), at(2))).collect();
        let tag = VaultItemTag::new("new tag");
        let summary = ImportResolver::apply(
            &mut store,
            payload(incoming.clone(), vec![tag.clone()]),
            ImportPolicy::Override,
        )
        .unwrap();

        assert!(summary.replaced_existing);
        assert_eq!(store.len(), 5);
        for item in &incoming {
            assert_eq!(store.get_item(&item.id).unwrap(), item);
        }
        assert_eq!(store.tags(), vec![&tag]);
    }

    #[test]
    fn override_restores_items_whose_tags_are_missing() {
        let mut store = Store::new();
        for i in 0..3 {
            store.add_item(note(&format!("old {i}"), at(1))).unwrap();
        }

        let mut orphan = note("orphan", at(2));
        orphan.metadata.tags.insert(Uuid::new_v4());
        let plain = note("plain", at(2));

        let summary = ImportResolver::apply(
            &mut store,
            payload(vec![orphan.clone(), plain.clone()], vec![]),
            ImportPolicy::Override,
        )
        .unwrap();

        assert_eq!(summary.items_written, 2);
        assert_eq!(store.len(), 2);
        assert!(store.get_item(&orphan.id).unwrap().metadata.tags.is_empty());
        assert_eq!(store.get_item(&plain.id).unwrap(), &plain);
    }

    #[test]
    fn merge_imports_items_whose_tags_are_missing() {
        let mut store = Store::new();
        let local_tag = VaultItemTag::new("local");
        store.add_tag(local_tag.clone());

        let mut incoming = note("incoming", at(2));
        incoming.metadata.tags.insert(local_tag.id);
        incoming.metadata.tags.insert(Uuid::new_v4());

        ImportResolver::apply(
            &mut store,
            payload(vec![incoming.clone()], vec![]),
            ImportPolicy::Merge,
        )
        .unwrap();

        let tags = &store.get_item(&incoming.id).unwrap().metadata.tags;
        assert_eq!(tags.len(), 1);
        assert!(tags.contains(&local_tag.id));
    }

    /// Delegates reads to a real store and refuses every write.
    struct ReadOnly(Store);

    impl VaultStore for ReadOnly {
        fn export_payload(
            &self,
            user_description: &str,
        ) -> Result<VaultApplicationPayload, StoreError> {
            self.0.export_payload(user_description)
        }

        fn item_updated(&self, id: &Uuid) -> Result<Option<DateTime<Utc>>, StoreError> {
            self.0.item_updated(id)
        }

        fn commit(&mut self, _batch: ImportBatch) -> Result<(), StoreError> {
            Err(StoreError::ItemNotFound(Uuid::nil()))
        }
    }

    #[test]
    fn rejected_commit_surfaces_as_store_error() {
        let mut inner = Store::new();
        inner.add_item(note("survivor", at(1))).unwrap();
        let before = inner.export_payload("").unwrap();
        let mut store = ReadOnly(inner);

        let err = ImportResolver::apply(
            &mut store,
            payload(vec![note("new", at(2))], vec![]),
            ImportPolicy::Override,
        )
        .unwrap_err();

        assert!(matches!(err, Error::Store(StoreError::ItemNotFound(_))));
        assert_eq!(store.export_payload("").unwrap(), before);
    }
}

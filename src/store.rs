use crate::error::StoreError;
use crate::model::{VaultApplicationPayload, VaultItem, VaultItemTag};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

/// The slice of a vault store the backup pipeline needs.
pub trait VaultStore {
    /// A consistent snapshot of every item and tag.
    fn export_payload(&self, user_description: &str) -> Result<VaultApplicationPayload, StoreError>;

    /// `updated` timestamp of the local item with this id, if any.
    fn item_updated(&self, id: &Uuid) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Applies a batch of writes all-or-nothing.
    fn commit(&mut self, batch: ImportBatch) -> Result<(), StoreError>;
}

/// Writes produced by an import, applied in one go.
#[derive(Debug, Clone, Default)]
pub struct ImportBatch {
    /// Delete every existing item and tag before writing.
    pub clear_existing: bool,
    pub items: Vec<VaultItem>,
    pub tags: Vec<VaultItemTag>,
}

/// In-memory vault store.
#[derive(Debug, Clone)]
pub struct Store {
    items: HashMap<Uuid, VaultItem>,
    tags: HashMap<Uuid, VaultItemTag>,
    creation_date: DateTime<Utc>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Store {
            items: HashMap::new(),
            tags: HashMap::new(),
            creation_date: Utc::now(),
        }
    }

    pub fn add_item(&mut self, item: VaultItem) -> Result<(), StoreError> {
        if self.items.contains_key(&item.id) {
            return Err(StoreError::ItemAlreadyExists(item.id));
        }
        self.check_tags(&item)?;
        self.items.insert(item.id, item);
        Ok(())
    }

    pub fn get_item(&self, id: &Uuid) -> Option<&VaultItem> {
        self.items.get(id)
    }

    /// Replaces an item and bumps its `updated` timestamp.
    pub fn update_item(&mut self, mut item: VaultItem) -> Result<(), StoreError> {
        if !self.items.contains_key(&item.id) {
            return Err(StoreError::ItemNotFound(item.id));
        }
        self.check_tags(&item)?;
        item.updated = Utc::now();
        self.items.insert(item.id, item);
        Ok(())
    }

    pub fn remove_item(&mut self, id: &Uuid) -> Result<VaultItem, StoreError> {
        self.items.remove(id).ok_or(StoreError::ItemNotFound(*id))
    }

    pub fn add_tag(&mut self, tag: VaultItemTag) {
        self.tags.insert(tag.id, tag);
    }

    /// Removes a tag and detaches it from every item that carried it.
    pub fn remove_tag(&mut self, id: &Uuid) -> Result<VaultItemTag, StoreError> {
        let tag = self.tags.remove(id).ok_or(StoreError::TagNotFound(*id))?;
        for item in self.items.values_mut() {
            item.metadata.tags.remove(id);
        }
        Ok(tag)
    }

    /// Items ordered by creation time, then id.
    pub fn items(&self) -> Vec<&VaultItem> {
        let mut items: Vec<_> = self.items.values().collect();
        items.sort_by(|a, b| a.created.cmp(&b.created).then(a.id.cmp(&b.id)));
        items
    }

    /// Tags ordered by name, then id.
    pub fn tags(&self) -> Vec<&VaultItemTag> {
        let mut tags: Vec<_> = self.tags.values().collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        tags
    }

    pub fn creation_date(&self) -> DateTime<Utc> {
        self.creation_date
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn check_tags(&self, item: &VaultItem) -> Result<(), StoreError> {
        match item.metadata.tags.iter().find(|tag| !self.tags.contains_key(*tag)) {
            Some(tag) => Err(StoreError::UnknownTag {
                item: item.id,
                tag: *tag,
            }),
            None => Ok(()),
        }
    }
}

impl VaultStore for Store {
    fn export_payload(&self, user_description: &str) -> Result<VaultApplicationPayload, StoreError> {
        Ok(VaultApplicationPayload {
            user_description: user_description.to_string(),
            items: self.items().into_iter().cloned().collect(),
            tags: self.tags().into_iter().cloned().collect(),
        })
    }

    fn item_updated(&self, id: &Uuid) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.items.get(id).map(|item| item.updated))
    }

    fn commit(&mut self, batch: ImportBatch) -> Result<(), StoreError> {
        // nothing below can fail, so the batch lands whole
        if batch.clear_existing {
            self.items.clear();
            self.tags.clear();
        }

        for tag in batch.tags {
            self.tags.insert(tag.id, tag);
        }

        let mut dangling = 0usize;
        for mut item in batch.items {
            let before = item.metadata.tags.len();
            item.metadata.tags.retain(|tag| self.tags.contains_key(tag));
            dangling += before - item.metadata.tags.len();
            self.items.insert(item.id, item);
        }
        if dangling > 0 {
            warn!(dangling, "dropped tag references with no matching tag");
        }

        debug!(
            items = self.items.len(),
            tags = self.tags.len(),
            "committed import batch"
        );
        Ok(())
    }
}

use platelog_types::{
    food::{FoodItem, NutriGrade, Preference},
    Result,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{items_key, store_error, KeyValueStore};

/// Simple predicate filter for the item list. Empty fields match anything.
#[derive(Debug, Clone, Default)]
pub struct ItemQuery {
    /// Case-insensitive substring over name, notes and tags.
    pub search: Option<String>,
    pub tag: Option<String>,
    pub grade: Option<NutriGrade>,
    pub min_rating: Option<u8>,
    pub preference: Preference,
}

impl ItemQuery {
    pub fn matches(&self, item: &FoodItem) -> bool {
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let needle = search.to_lowercase();
            let hit = item.name.to_lowercase().contains(&needle)
                || item
                    .notes
                    .as_deref()
                    .is_some_and(|n| n.to_lowercase().contains(&needle))
                || item.tags.iter().any(|t| t.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !item.has_tag(tag) {
                return false;
            }
        }
        if let Some(grade) = self.grade {
            if item.nutri_score != Some(grade) {
                return false;
            }
        }
        if let Some(min) = self.min_rating {
            if item.rating < min {
                return false;
            }
        }
        self.preference.admits(item.rating)
    }
}

/// The item collection of one user. Every write replaces the whole list.
pub struct ItemStore<'a, S: KeyValueStore + ?Sized> {
    store: &'a S,
    username: String,
}

impl<'a, S: KeyValueStore + ?Sized> ItemStore<'a, S> {
    pub fn new(store: &'a S, username: impl Into<String>) -> Self {
        Self {
            store,
            username: username.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn load(&self) -> Result<Vec<FoodItem>> {
        match self.store.get(&items_key(&self.username))? {
            Some(raw) => serde_json::from_str(&raw).map_err(|err| {
                store_error(format!("corrupt item list for {}: {err}", self.username))
            }),
            None => Ok(Vec::new()),
        }
    }

    pub fn save(&self, items: &[FoodItem]) -> Result<()> {
        let raw = serde_json::to_string(items)
            .map_err(|err| store_error(format!("failed to serialize items: {err}")))?;
        self.store.set(&items_key(&self.username), &raw)?;
        debug!(user = %self.username, count = items.len(), "items saved");
        Ok(())
    }

    /// Append `item` and persist.
    pub fn add(&self, item: FoodItem) -> Result<FoodItem> {
        let mut items = self.load()?;
        items.push(item.clone());
        self.save(&items)?;
        info!(user = %self.username, id = %item.id, name = %item.name, "item added");
        Ok(item)
    }

    /// Remove the item with `id`. Returns whether anything was removed.
    pub fn delete(&self, id: Uuid) -> Result<bool> {
        let mut items = self.load()?;
        let Some(index) = items.iter().position(|item| item.id == id) else {
            return Ok(false);
        };
        let removed = items.remove(index);
        self.save(&items)?;
        info!(user = %self.username, id = %id, name = %removed.name, "item deleted");
        Ok(true)
    }

    pub fn get(&self, id: Uuid) -> Result<Option<FoodItem>> {
        Ok(self.load()?.into_iter().find(|item| item.id == id))
    }

    pub fn find(&self, query: &ItemQuery) -> Result<Vec<FoodItem>> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|item| query.matches(item))
            .collect())
    }
}

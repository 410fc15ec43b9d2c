//! In-memory item bank.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CatError;
use crate::model::Item;

/// An immutable set of calibrated items, ordered by id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Item>", into = "Vec<Item>")]
pub struct ItemBank {
    items: Vec<Item>,
    index: HashMap<String, usize>,
}

impl ItemBank {
    /// Build a bank, rejecting duplicate ids and invalid parameters.
    pub fn new(mut items: Vec<Item>) -> Result<Self, CatError> {
        items.sort_by(|a, b| a.id.cmp(&b.id));
        let mut index = HashMap::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            item.params.validate(&item.id)?;
            if index.insert(item.id.clone(), i).is_some() {
                return Err(CatError::InvalidParameters {
                    item_id: item.id.clone(),
                    reason: "duplicate item id".into(),
                });
            }
        }
        Ok(Self { items, index })
    }

    pub fn get(&self, id: &str) -> Option<&Item> {
        self.index.get(id).map(|&i| &self.items[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// All items, ordered by id.
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items not in `used`, ordered by id.
    pub fn available<'a>(&'a self, used: &'a [String]) -> impl Iterator<Item = &'a Item> + 'a {
        self.items
            .iter()
            .filter(move |item| !used.iter().any(|u| u == &item.id))
    }

    pub fn available_count(&self, used: &[String]) -> usize {
        let used_in_bank = used
            .iter()
            .filter(|id| self.contains(id))
            .collect::<std::collections::HashSet<_>>()
            .len();
        self.items.len() - used_in_bank
    }
}

impl TryFrom<Vec<Item>> for ItemBank {
    type Error = CatError;

    fn try_from(items: Vec<Item>) -> Result<Self, Self::Error> {
        ItemBank::new(items)
    }
}

impl From<ItemBank> for Vec<Item> {
    fn from(bank: ItemBank) -> Self {
        bank.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemParams;

    fn bank() -> ItemBank {
        ItemBank::new(vec![
            Item::new("I03", ItemParams::new(1.0, 0.5, 0.2)),
            Item::new("I01", ItemParams::new(1.2, -1.0, 0.1)),
            Item::new("I02", ItemParams::new(0.8, 0.0, 0.25)),
        ])
        .unwrap()
    }

    #[test]
    fn items_are_sorted_by_id() {
        let ids: Vec<_> = bank().items().iter().map(|i| i.id.clone()).collect();
        assert_eq!(ids, vec!["I01", "I02", "I03"]);
    }

    #[test]
    fn lookup_by_id() {
        let bank = bank();
        assert_eq!(bank.get("I02").unwrap().params.b, 0.0);
        assert!(bank.get("missing").is_none());
    }

    #[test]
    fn availability_excludes_used() {
        let bank = bank();
        let used = vec!["I01".to_string(), "I03".to_string(), "ghost".to_string()];
        let ids: Vec<_> = bank.available(&used).map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["I02"]);
        assert_eq!(bank.available_count(&used), 1);
        assert_eq!(bank.available_count(&[]), 3);
    }

    #[test]
    fn rejects_duplicates_and_bad_params() {
        let dup = ItemBank::new(vec![
            Item::new("X", ItemParams::new(1.0, 0.0, 0.0)),
            Item::new("X", ItemParams::new(1.0, 1.0, 0.0)),
        ]);
        assert!(matches!(dup, Err(CatError::InvalidParameters { .. })));

        let bad = ItemBank::new(vec![Item::new("Y", ItemParams::new(1.0, 0.0, 1.5))]);
        assert!(bad.is_err());
    }

    #[test]
    fn json_roundtrip_keeps_index() {
        let json = serde_json::to_string(&bank()).unwrap();
        let back: ItemBank = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), 3);
        assert!(back.contains("I03"));
    }
}

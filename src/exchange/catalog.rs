//! Item Catalog — read-only template registry.
//!
//! Resolves an instance to its template through `instance.vnum` and builds
//! new instances. The coordinator only ever asks it `is_tradeable`.

use std::collections::HashMap;

use thiserror::Error;

use super::types::{Item, ItemInstance, PocketType, VNum};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("Unknown item template: {0}")]
    UnknownItem(VNum),

    #[error("Invalid amount {amount} for item {vnum}")]
    InvalidAmount { vnum: VNum, amount: u16 },
}

#[derive(Debug, Clone, Default)]
pub struct ItemCatalog {
    items: HashMap<VNum, Item>,
}

impl ItemCatalog {
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            items: items.into_iter().map(|i| (i.vnum, i)).collect(),
        }
    }

    pub fn item(&self, vnum: VNum) -> Option<&Item> {
        self.items.get(&vnum)
    }

    /// Unknown templates are never tradeable.
    pub fn is_tradeable(&self, vnum: VNum) -> bool {
        self.items.get(&vnum).map(|i| i.is_droppable).unwrap_or(false)
    }

    pub fn pocket_of(&self, vnum: VNum) -> Option<PocketType> {
        self.items.get(&vnum).map(|i| i.pocket)
    }

    /// Build a fresh instance. Non-stackable templates only come one at a time.
    pub fn create(&self, vnum: VNum, amount: u16) -> Result<ItemInstance, CatalogError> {
        let item = self.items.get(&vnum).ok_or(CatalogError::UnknownItem(vnum))?;
        if amount == 0 || (!item.pocket.is_stackable() && amount > 1) {
            return Err(CatalogError::InvalidAmount { vnum, amount });
        }
        Ok(ItemInstance::new(vnum, amount))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ItemCatalog {
        ItemCatalog::new(vec![
            Item::new(1012, PocketType::Main),
            Item::new(1, PocketType::Equipment),
            Item::bound(2, PocketType::Main),
        ])
    }

    #[test]
    fn test_tradeable_follows_droppable() {
        let c = catalog();
        assert!(c.is_tradeable(1012));
        assert!(!c.is_tradeable(2));
        assert!(!c.is_tradeable(9999));
    }

    #[test]
    fn test_create_stack() {
        let c = catalog();
        let i = c.create(1012, 50).unwrap();
        assert_eq!(i.vnum, 1012);
        assert_eq!(i.amount, 50);
    }

    #[test]
    fn test_create_rejects_bad_amounts() {
        let c = catalog();
        assert_eq!(c.create(1012, 0), Err(CatalogError::InvalidAmount { vnum: 1012, amount: 0 }));
        assert_eq!(c.create(1, 2), Err(CatalogError::InvalidAmount { vnum: 1, amount: 2 }));
        assert_eq!(c.create(77, 1), Err(CatalogError::UnknownItem(77)));
    }
}

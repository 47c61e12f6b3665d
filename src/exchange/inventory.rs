//! Inventory — the holdings the coordinator moves at commit time.
//!
//! `Inventory` is the contract the exchange core relies on: every call is
//! a single indivisible mutation that either applies fully or leaves the
//! inventory untouched. `PocketInventory` is the slot-based implementation
//! used by the world server.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::catalog::ItemCatalog;
use super::types::{ItemInstance, ItemInstanceId, PocketChange, PocketType, VNum};
use crate::WorldConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    #[error("Item instance {0} not found")]
    ItemNotFound(ItemInstanceId),

    #[error("Insufficient amount of {id}: requested {requested}, held {held}")]
    InsufficientAmount { id: ItemInstanceId, requested: u16, held: u16 },

    #[error("Amount must be positive")]
    ZeroAmount,

    #[error("No room left in pocket {0:?}")]
    InventoryFull(PocketType),

    #[error("Insufficient gold: requested {requested}, held {held}")]
    InsufficientGold { requested: u64, held: u64 },

    #[error("Gold ceiling {max} would be exceeded")]
    GoldLimit { max: u64 },

    #[error("Unknown item template: {0}")]
    UnknownItem(VNum),
}

/// Holdings of one character, as seen by the exchange core.
pub trait Inventory {
    fn gold(&self) -> u64;

    fn bank_gold(&self) -> u64;

    /// Current state of a held instance.
    fn item(&self, id: ItemInstanceId) -> Option<&ItemInstance>;

    /// Take `amount` out of instance `id`. Returns the removed part and the
    /// post-state of the slot it came from.
    fn remove_item(
        &mut self,
        id: ItemInstanceId,
        amount: u16,
    ) -> Result<(ItemInstance, PocketChange), InventoryError>;

    /// Store an instance, merging into existing stacks where the pocket
    /// allows it. Returns every slot touched, in order.
    fn add_item(&mut self, item: ItemInstance) -> Result<Vec<PocketChange>, InventoryError>;

    fn remove_gold(&mut self, gold: u64, bank_gold: u64) -> Result<(), InventoryError>;

    fn add_gold(&mut self, gold: u64, bank_gold: u64) -> Result<(), InventoryError>;
}

#[derive(Debug, Clone)]
pub struct PocketInventory {
    catalog: Arc<ItemCatalog>,
    backpack_size: u16,
    max_item_amount: u16,
    max_gold: u64,
    max_bank_gold: u64,
    gold: u64,
    bank_gold: u64,
    slots: BTreeMap<(PocketType, u16), ItemInstance>,
}

impl PocketInventory {
    pub fn new(catalog: Arc<ItemCatalog>, cfg: &WorldConfig) -> Self {
        Self {
            catalog,
            backpack_size: cfg.backpack_size,
            max_item_amount: cfg.max_item_amount,
            max_gold: cfg.max_gold_amount,
            max_bank_gold: cfg.max_bank_gold_amount,
            gold: 0,
            bank_gold: 0,
            slots: BTreeMap::new(),
        }
    }

    pub fn with_gold(mut self, gold: u64, bank_gold: u64) -> Self {
        self.gold = gold.min(self.max_gold);
        self.bank_gold = bank_gold.min(self.max_bank_gold);
        self
    }

    pub fn slot(&self, pocket: PocketType, slot: u16) -> Option<&ItemInstance> {
        self.slots.get(&(pocket, slot))
    }

    pub fn items(&self) -> impl Iterator<Item = &ItemInstance> {
        self.slots.values()
    }

    pub fn items_in(&self, pocket: PocketType) -> impl Iterator<Item = &ItemInstance> {
        self.slots
            .range((pocket, 0)..=(pocket, u16::MAX))
            .map(|(_, item)| item)
    }

    /// Sum of all stacks of one template.
    pub fn total_amount(&self, vnum: VNum) -> u32 {
        self.slots
            .values()
            .filter(|i| i.vnum == vnum)
            .map(|i| i.amount as u32)
            .sum()
    }

    fn locate(&self, id: ItemInstanceId) -> Option<(PocketType, u16)> {
        self.slots
            .iter()
            .find(|(_, item)| item.id == id)
            .map(|(key, _)| *key)
    }

    fn free_slots(&self, pocket: PocketType) -> Vec<u16> {
        (0..self.backpack_size)
            .filter(|s| !self.slots.contains_key(&(pocket, *s)))
            .collect()
    }
}

impl Inventory for PocketInventory {
    fn gold(&self) -> u64 {
        self.gold
    }

    fn bank_gold(&self) -> u64 {
        self.bank_gold
    }

    fn item(&self, id: ItemInstanceId) -> Option<&ItemInstance> {
        self.locate(id).and_then(|key| self.slots.get(&key))
    }

    fn remove_item(
        &mut self,
        id: ItemInstanceId,
        amount: u16,
    ) -> Result<(ItemInstance, PocketChange), InventoryError> {
        if amount == 0 {
            return Err(InventoryError::ZeroAmount);
        }
        let key = self.locate(id).ok_or(InventoryError::ItemNotFound(id))?;
        let (pocket, slot) = key;
        let Some(stack) = self.slots.get_mut(&key) else {
            return Err(InventoryError::ItemNotFound(id));
        };
        if stack.amount < amount {
            return Err(InventoryError::InsufficientAmount {
                id,
                requested: amount,
                held: stack.amount,
            });
        }

        let removed = stack.split(amount);
        let remaining = if stack.amount == 0 {
            self.slots.remove(&key);
            None
        } else {
            Some(stack.clone())
        };
        debug!("📦 remove {}x{} from {:?}#{}", removed.vnum, removed.amount, pocket, slot);

        Ok((removed, PocketChange { pocket, slot, item: remaining }))
    }

    fn add_item(&mut self, item: ItemInstance) -> Result<Vec<PocketChange>, InventoryError> {
        if item.amount == 0 {
            return Err(InventoryError::ZeroAmount);
        }
        let pocket = self
            .catalog
            .pocket_of(item.vnum)
            .ok_or(InventoryError::UnknownItem(item.vnum))?;
        let max = self.max_item_amount.max(1);

        // Plan first, mutate after: a plan that does not fit changes nothing.
        let mut merges: Vec<(u16, u16)> = Vec::new();
        let mut left = item.amount;
        if pocket.is_stackable() {
            for ((_, slot), stack) in self.slots.range((pocket, 0)..=(pocket, u16::MAX)) {
                if left == 0 {
                    break;
                }
                if stack.vnum == item.vnum && stack.amount < max {
                    let moved = left.min(max - stack.amount);
                    merges.push((*slot, moved));
                    left -= moved;
                }
            }
        }

        let per_stack = if pocket.is_stackable() { max } else { left.max(1) };
        let stacks_needed = left.div_ceil(per_stack) as usize;
        let free = self.free_slots(pocket);
        if free.len() < stacks_needed {
            return Err(InventoryError::InventoryFull(pocket));
        }

        let mut changes = Vec::with_capacity(merges.len() + stacks_needed);
        for (slot, moved) in merges {
            if let Some(stack) = self.slots.get_mut(&(pocket, slot)) {
                stack.amount += moved;
                changes.push(PocketChange { pocket, slot, item: Some(stack.clone()) });
            }
        }

        let mut original_id = Some(item.id);
        for slot in free.into_iter().take(stacks_needed) {
            let amount = left.min(per_stack);
            left -= amount;
            let stack = ItemInstance {
                id: original_id.take().unwrap_or_else(uuid::Uuid::new_v4),
                vnum: item.vnum,
                amount,
            };
            changes.push(PocketChange { pocket, slot, item: Some(stack.clone()) });
            self.slots.insert((pocket, slot), stack);
        }

        debug!("📦 add {}x{} → {} slot(s) in {:?}", item.vnum, item.amount, changes.len(), pocket);
        Ok(changes)
    }

    fn remove_gold(&mut self, gold: u64, bank_gold: u64) -> Result<(), InventoryError> {
        if self.gold < gold {
            return Err(InventoryError::InsufficientGold { requested: gold, held: self.gold });
        }
        if self.bank_gold < bank_gold {
            return Err(InventoryError::InsufficientGold { requested: bank_gold, held: self.bank_gold });
        }
        self.gold -= gold;
        self.bank_gold -= bank_gold;
        Ok(())
    }

    fn add_gold(&mut self, gold: u64, bank_gold: u64) -> Result<(), InventoryError> {
        let new_gold = self.gold.checked_add(gold).filter(|g| *g <= self.max_gold);
        let new_bank = self.bank_gold.checked_add(bank_gold).filter(|g| *g <= self.max_bank_gold);
        match (new_gold, new_bank) {
            (Some(g), Some(b)) => {
                self.gold = g;
                self.bank_gold = b;
                Ok(())
            }
            (None, _) => Err(InventoryError::GoldLimit { max: self.max_gold }),
            (_, None) => Err(InventoryError::GoldLimit { max: self.max_bank_gold }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::types::Item;

    fn cfg() -> WorldConfig {
        WorldConfig { backpack_size: 4, max_item_amount: 999, ..WorldConfig::default() }
    }

    fn make() -> PocketInventory {
        let catalog = Arc::new(ItemCatalog::new(vec![
            Item::new(1012, PocketType::Main),
            Item::new(1013, PocketType::Main),
            Item::new(1, PocketType::Equipment),
        ]));
        PocketInventory::new(catalog, &cfg())
    }

    #[test]
    fn test_add_fills_first_free_slot() {
        let mut inv = make();
        let changes = inv.add_item(ItemInstance::new(1012, 1)).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].slot, 0);
        assert_eq!(changes[0].pocket, PocketType::Main);
        assert!(inv.slot(PocketType::Main, 0).is_some());
    }

    #[test]
    fn test_add_merges_into_existing_stack() {
        let mut inv = make();
        inv.add_item(ItemInstance::new(1012, 990)).unwrap();
        let changes = inv.add_item(ItemInstance::new(1012, 20)).unwrap();
        // 9 topped up into slot 0, 11 spill into slot 1
        assert_eq!(changes.len(), 2);
        assert_eq!(inv.slot(PocketType::Main, 0).unwrap().amount, 999);
        assert_eq!(inv.slot(PocketType::Main, 1).unwrap().amount, 11);
        assert_eq!(inv.total_amount(1012), 1010);
    }

    #[test]
    fn test_equipment_never_stacks() {
        let mut inv = make();
        inv.add_item(ItemInstance::new(1, 1)).unwrap();
        inv.add_item(ItemInstance::new(1, 1)).unwrap();
        assert_eq!(inv.items_in(PocketType::Equipment).count(), 2);
    }

    #[test]
    fn test_full_pocket_rejects_without_mutation() {
        let mut inv = make();
        for _ in 0..4 {
            inv.add_item(ItemInstance::new(1, 1)).unwrap();
        }
        let before = inv.items().count();
        assert_eq!(
            inv.add_item(ItemInstance::new(1, 1)),
            Err(InventoryError::InventoryFull(PocketType::Equipment))
        );
        assert_eq!(inv.items().count(), before);
    }

    #[test]
    fn test_remove_partial_and_whole() {
        let mut inv = make();
        let stack = ItemInstance::new(1012, 10);
        let id = stack.id;
        inv.add_item(stack).unwrap();

        let (part, change) = inv.remove_item(id, 4).unwrap();
        assert_eq!(part.amount, 4);
        assert_eq!(change.item.as_ref().map(|i| i.amount), Some(6));

        let (rest, change) = inv.remove_item(id, 6).unwrap();
        assert_eq!(rest.id, id);
        assert!(change.item.is_none());
        assert!(inv.item(id).is_none());
    }

    #[test]
    fn test_remove_more_than_held() {
        let mut inv = make();
        let stack = ItemInstance::new(1012, 2);
        let id = stack.id;
        inv.add_item(stack).unwrap();
        assert_eq!(
            inv.remove_item(id, 3),
            Err(InventoryError::InsufficientAmount { id, requested: 3, held: 2 })
        );
        assert_eq!(inv.item(id).unwrap().amount, 2);
    }

    #[test]
    fn test_gold_limits() {
        let mut inv = make().with_gold(100, 0);
        assert!(inv.remove_gold(101, 0).is_err());
        assert_eq!(inv.gold(), 100);
        assert!(inv.add_gold(cfg().max_gold_amount, 0).is_err());
        assert_eq!(inv.gold(), 100);
        inv.add_gold(50, 70).unwrap();
        assert_eq!((inv.gold(), inv.bank_gold()), (150, 70));
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Connected character handle, supplied by the session layer.
pub type CharacterId = u64;

/// Item template number.
pub type VNum = u16;

pub type ItemInstanceId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PocketType {
    Equipment,
    Main,
    Etc,
    Specialist,
    Costume,
}

impl PocketType {
    /// Only consumable pockets merge instances of the same template.
    pub fn is_stackable(&self) -> bool {
        matches!(self, PocketType::Main | PocketType::Etc)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PocketType::Equipment => "EQUIPMENT",
            PocketType::Main => "MAIN",
            PocketType::Etc => "ETC",
            PocketType::Specialist => "SPECIALIST",
            PocketType::Costume => "COSTUME",
        }
    }
}

/// Static item template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub vnum: VNum,
    pub pocket: PocketType,
    /// Droppable items are the only ones that may change hands.
    pub is_droppable: bool,
}

impl Item {
    pub fn new(vnum: VNum, pocket: PocketType) -> Self {
        Self { vnum, pocket, is_droppable: true }
    }

    /// Bound to its owner: never droppable, never tradeable.
    pub fn bound(vnum: VNum, pocket: PocketType) -> Self {
        Self { vnum, pocket, is_droppable: false }
    }
}

/// A concrete stack of some template held by a character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInstance {
    pub id: ItemInstanceId,
    pub vnum: VNum,
    pub amount: u16,
}

impl ItemInstance {
    pub fn new(vnum: VNum, amount: u16) -> Self {
        Self { id: Uuid::new_v4(), vnum, amount }
    }

    /// Split `amount` off this stack. The split-off part gets a fresh id;
    /// taking the whole stack hands back the original identity.
    pub(crate) fn split(&mut self, amount: u16) -> ItemInstance {
        if amount >= self.amount {
            let whole = self.clone();
            self.amount = 0;
            return whole;
        }
        self.amount -= amount;
        ItemInstance::new(self.vnum, amount)
    }
}

/// Post-state of one inventory slot touched by a mutation.
/// `item == None` means the slot was emptied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PocketChange {
    pub pocket: PocketType,
    pub slot: u16,
    pub item: Option<ItemInstance>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_partial_allocates_new_id() {
        let mut stack = ItemInstance::new(1012, 10);
        let part = stack.split(3);
        assert_eq!(stack.amount, 7);
        assert_eq!(part.amount, 3);
        assert_eq!(part.vnum, 1012);
        assert_ne!(part.id, stack.id);
    }

    #[test]
    fn test_split_whole_keeps_identity() {
        let mut stack = ItemInstance::new(1012, 5);
        let id = stack.id;
        let part = stack.split(5);
        assert_eq!(part.id, id);
        assert_eq!(part.amount, 5);
        assert_eq!(stack.amount, 0);
    }

    #[test]
    fn test_stackable_pockets() {
        assert!(PocketType::Main.is_stackable());
        assert!(PocketType::Etc.is_stackable());
        assert!(!PocketType::Equipment.is_stackable());
        assert!(!PocketType::Costume.is_stackable());
    }
}

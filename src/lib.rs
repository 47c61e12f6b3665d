pub mod exchange;

use serde::{Deserialize, Serialize};

// --- Configuration Structs ---

/// World-level limits shared by the inventories and the exchange
/// coordinator. Immutable once a coordinator has been built from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Largest amount a single stack may hold.
    pub max_item_amount: u16,
    /// Slots per pocket.
    pub backpack_size: u16,
    /// Ceiling for gold carried by a character.
    pub max_gold_amount: u64,
    /// Ceiling for gold stored in the bank.
    pub max_bank_gold_amount: u64,
    /// Distinct item instances one side may stage in a single exchange.
    pub max_exchange_items: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            max_item_amount: 999,
            backpack_size: 48,
            max_gold_amount: 1_000_000_000,
            max_bank_gold_amount: 100_000_000_000,
            max_exchange_items: 10,
        }
    }
}

impl WorldConfig {
    /// Load overrides from environment variables (if set).
    pub fn from_env() -> Self {
        let mut c = Self::default();
        if let Ok(v) = std::env::var("WORLD_MAX_ITEM_AMOUNT")      { if let Ok(n) = v.parse() { c.max_item_amount = n; } }
        if let Ok(v) = std::env::var("WORLD_BACKPACK_SIZE")        { if let Ok(n) = v.parse() { c.backpack_size = n; } }
        if let Ok(v) = std::env::var("WORLD_MAX_GOLD_AMOUNT")      { if let Ok(n) = v.parse() { c.max_gold_amount = n; } }
        if let Ok(v) = std::env::var("WORLD_MAX_BANK_GOLD_AMOUNT") { if let Ok(n) = v.parse() { c.max_bank_gold_amount = n; } }
        if let Ok(v) = std::env::var("WORLD_MAX_EXCHANGE_ITEMS")   { if let Ok(n) = v.parse() { c.max_exchange_items = n; } }
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_world_limits() {
        let c = WorldConfig::default();
        assert_eq!(c.max_item_amount, 999);
        assert_eq!(c.backpack_size, 48);
        assert_eq!(c.max_gold_amount, 1_000_000_000);
        assert_eq!(c.max_bank_gold_amount, 100_000_000_000);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let c: WorldConfig = serde_json::from_str(r#"{"backpack_size": 12}"#).unwrap();
        assert_eq!(c.backpack_size, 12);
        assert_eq!(c.max_item_amount, 999);
    }
}

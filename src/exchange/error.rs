use thiserror::Error;

use super::inventory::InventoryError;
use super::types::{CharacterId, VNum};

/// Why an offer mutation was refused. The offer is left as it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidOffer {
    #[error("amount must be positive")]
    ZeroAmount,

    #[error("amount {requested} exceeds the {held} held")]
    AmountExceedsHolding { requested: u16, held: u16 },

    #[error("amount {requested} exceeds the stack limit {max}")]
    AmountExceedsStack { requested: u16, max: u16 },

    #[error("item {0} is not in the catalog")]
    UnknownItem(VNum),

    #[error("item {0} cannot be traded")]
    NotTradeable(VNum),

    #[error("no more than {max} items per exchange")]
    TooManyItems { max: usize },

    #[error("gold {requested} exceeds the limit {max}")]
    GoldLimit { requested: u64, max: u64 },

    #[error("bank gold {requested} exceeds the limit {max}")]
    BankGoldLimit { requested: u64, max: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    #[error("No active exchange for character {0}")]
    NoActiveExchange(CharacterId),

    #[error("Character {0} is already trading")]
    AlreadyTrading(CharacterId),

    #[error("Character {0} cannot trade with itself")]
    SelfExchange(CharacterId),

    #[error("Characters {a} and {b} are not trading with each other")]
    NotPartners { a: CharacterId, b: CharacterId },

    #[error("Both sides must confirm before the exchange is processed")]
    NotConfirmed,

    #[error("Invalid offer: {0}")]
    InvalidOffer(#[from] InvalidOffer),

    #[error("Offer of character {id} no longer matches its holdings: {reason}")]
    StaleOffer { id: CharacterId, reason: InventoryError },

    #[error("Character {id} cannot receive the exchanged assets: {source}")]
    PartialTransferFailure {
        id: CharacterId,
        #[source]
        source: InventoryError,
    },
}

impl ExchangeError {
    /// Errors raised while committing: the trade is over, both holdings intact.
    pub fn is_commit_failure(&self) -> bool {
        matches!(
            self,
            ExchangeError::StaleOffer { .. } | ExchangeError::PartialTransferFailure { .. }
        )
    }
}

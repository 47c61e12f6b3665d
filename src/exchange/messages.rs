//! Channel message types between the session layer, the exchange
//! controller, and the broadcast layer.
//!
//! Session layer ──ExchangeCmd──→ ExchangeController ──ExchangeEvent──→ broadcast

use std::collections::HashMap;

use serde::Serialize;

use super::inventory::PocketInventory;
use super::session::ExchangeOffer;
use super::types::{CharacterId, ItemInstanceId, PocketChange};

// ─────────────────────────────────────────────────────────
// Outcomes
// ─────────────────────────────────────────────────────────

/// Why an exchange ended (or never started).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ExchangeResultType {
    Success,
    Failure,
    Cancelled,
    AlreadyTrading,
    Declined,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExchangeResult {
    pub result_type: ExchangeResultType,
    /// Characters to notify.
    pub participants: [CharacterId; 2],
}

/// Slot post-states per participant after a committed exchange.
pub type ProcessedExchange = HashMap<CharacterId, Vec<PocketChange>>;

// ─────────────────────────────────────────────────────────
// Commands (Session layer → ExchangeController)
// ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ExchangeCmd {
    /// A character entered the world with these holdings.
    Connect { id: CharacterId, inventory: Box<PocketInventory> },
    /// Session teardown. Any open trade is cancelled.
    Disconnect { id: CharacterId },
    /// `from` invites `to` to trade.
    Request { from: CharacterId, to: CharacterId },
    /// `from` accepts a pending invite from `to`.
    Accept { from: CharacterId, to: CharacterId },
    /// `from` declines a pending invite from `to`.
    Decline { from: CharacterId, to: CharacterId },
    SetGold { id: CharacterId, gold: u64, bank_gold: u64 },
    /// Stage part of a held instance, referenced by id.
    AddItem { id: CharacterId, instance_id: ItemInstanceId, amount: u16 },
    Confirm { id: CharacterId },
    Cancel { id: CharacterId },
}

// ─────────────────────────────────────────────────────────
// Events (ExchangeController → broadcast layer)
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ExchangeEvent {
    RequestReceived { from: CharacterId, to: CharacterId },
    Opened { participants: [CharacterId; 2] },
    /// `id` changed its offer; `target` should see it.
    OfferUpdated { id: CharacterId, target: CharacterId, offer: ExchangeOffer },
    Confirmed { id: CharacterId, target: CharacterId },
    /// A command was refused; nothing changed.
    Rejected { id: CharacterId, reason: String },
    Closed(ExchangeResult),
    Completed { result: ExchangeResult, changes: ProcessedExchange },
}

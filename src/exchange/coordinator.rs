//! Exchange Coordinator — two-party, dual-confirmation trade core.
//!
//! # Locking
//!
//! The table (arena + id index) sits behind one mutex held only for key
//! lookups and the paired insert/detach. Each session has its own mutex,
//! so unrelated trades never contend. Lock order is always
//! table → session; nothing takes the table lock while holding a session.
//!
//! Offer mutators clone the session handle out of the table, release the
//! table, lock the session and re-check that it is still negotiating. A
//! session detached in the meantime reports `NoActiveExchange`.
//!
//! # Commit
//!
//! `process_exchange` detaches the session while holding its lock, then
//! re-validates both offers against the *live* inventories and applies the
//! transfer to scratch copies. The copies replace the live inventories only
//! when every removal and every insertion succeeded: a failed commit leaves
//! both holdings exactly as they were.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::catalog::ItemCatalog;
use super::error::{ExchangeError, InvalidOffer};
use super::inventory::{Inventory, InventoryError};
use super::messages::{ExchangeResult, ExchangeResultType, ProcessedExchange};
use super::session::{ExchangeOffer, ExchangeSession, ExchangeState, ExchangeTable, StagedItem};
use super::types::{CharacterId, ItemInstance, PocketChange};
use crate::WorldConfig;

pub struct ExchangeCoordinator {
    cfg: WorldConfig,
    catalog: Arc<ItemCatalog>,
    table: Mutex<ExchangeTable>,
}

impl ExchangeCoordinator {
    pub fn new(catalog: Arc<ItemCatalog>, cfg: WorldConfig) -> Self {
        Self {
            cfg,
            catalog,
            table: Mutex::new(ExchangeTable::default()),
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.cfg
    }

    /// Number of exchanges currently negotiating.
    pub fn active_exchanges(&self) -> usize {
        self.table.lock().len()
    }

    // ═════════════════════════════════════════════════
    // Lifecycle
    // ═════════════════════════════════════════════════

    pub fn open_exchange(&self, a: CharacterId, b: CharacterId) -> Result<(), ExchangeError> {
        let session = match self.table.lock().insert(a, b) {
            Ok(s) => s,
            Err(e) => {
                debug!("🚫 open {} ⇄ {} refused: {}", a, b, e);
                return Err(e);
            }
        };
        info!("🤝 Exchange #{} opened: {} ⇄ {}", session.lock().id, a, b);
        Ok(())
    }

    pub fn check_exchange(&self, id: CharacterId) -> bool {
        self.table.lock().contains(id)
    }

    /// Partner of `id` in its open exchange.
    pub fn target_of(&self, id: CharacterId) -> Option<CharacterId> {
        self.with_session(id, |s| Ok(s.partner_of(id))).ok().flatten()
    }

    /// Snapshot of `id`'s own offer.
    pub fn get_data(&self, id: CharacterId) -> Option<ExchangeOffer> {
        self.with_session(id, |s| Ok(s.offer(id).cloned())).ok().flatten()
    }

    /// Mark `id`'s offer as accepted. Returns whether both sides now are.
    pub fn confirm_exchange(&self, id: CharacterId) -> Result<bool, ExchangeError> {
        self.with_session(id, |s| {
            if let Some(offer) = s.offer_mut(id) {
                offer.confirmed = true;
            }
            Ok(s.both_confirmed())
        })
    }

    /// End the exchange without moving anything. `None` if `id` is not trading.
    pub fn close_exchange(
        &self,
        id: CharacterId,
        result_type: ExchangeResultType,
    ) -> Option<ExchangeResult> {
        let mut table = self.table.lock();
        let shared = table.get(id)?;
        let mut session = shared.lock();
        table.detach(session.id, session.participants);
        drop(table);

        session.finish(ExchangeState::Closed);
        info!(
            "🛑 Exchange #{} closed by {} ({:?}) {} ⇄ {}",
            session.id, id, result_type, session.participants[0], session.participants[1],
        );
        Some(ExchangeResult {
            result_type,
            participants: session.participants,
        })
    }

    // ═════════════════════════════════════════════════
    // Offer mutation
    // ═════════════════════════════════════════════════

    pub fn set_gold(&self, id: CharacterId, gold: u64, bank_gold: u64) -> Result<(), ExchangeError> {
        if gold > self.cfg.max_gold_amount {
            return Err(InvalidOffer::GoldLimit { requested: gold, max: self.cfg.max_gold_amount }.into());
        }
        if bank_gold > self.cfg.max_bank_gold_amount {
            return Err(InvalidOffer::BankGoldLimit {
                requested: bank_gold,
                max: self.cfg.max_bank_gold_amount,
            }
            .into());
        }

        self.with_session(id, |s| {
            if let Some(offer) = s.offer_mut(id) {
                offer.gold = gold;
                offer.bank_gold = bank_gold;
            }
            s.reset_confirmations();
            debug!("💰 #{} {} stages gold={} bank={}", s.id, id, gold, bank_gold);
            Ok(())
        })
    }

    /// Stage `amount` of `item`. Re-staging the same instance replaces the
    /// previous amount. The holder's inventory is not touched.
    pub fn add_items(&self, id: CharacterId, item: &ItemInstance, amount: u16) -> Result<(), ExchangeError> {
        self.check_item(item, amount)?;
        let max_items = self.cfg.max_exchange_items;

        self.with_session(id, |s| {
            let sid = s.id;
            if let Some(offer) = s.offer_mut(id) {
                if !offer.items.contains_key(&item.id) && offer.items.len() >= max_items {
                    return Err(InvalidOffer::TooManyItems { max: max_items }.into());
                }
                offer.items.insert(item.id, StagedItem { instance: item.clone(), amount });
            }
            s.reset_confirmations();
            debug!("📦 #{} {} stages {}x{}", sid, id, item.vnum, amount);
            Ok(())
        })
    }

    fn check_item(&self, item: &ItemInstance, amount: u16) -> Result<(), InvalidOffer> {
        if amount == 0 {
            return Err(InvalidOffer::ZeroAmount);
        }
        if amount > item.amount {
            return Err(InvalidOffer::AmountExceedsHolding { requested: amount, held: item.amount });
        }
        if amount > self.cfg.max_item_amount {
            return Err(InvalidOffer::AmountExceedsStack { requested: amount, max: self.cfg.max_item_amount });
        }
        match self.catalog.item(item.vnum) {
            None => Err(InvalidOffer::UnknownItem(item.vnum)),
            Some(template) if !template.is_droppable => Err(InvalidOffer::NotTradeable(item.vnum)),
            Some(_) => Ok(()),
        }
    }

    // ═════════════════════════════════════════════════
    // Commit
    // ═════════════════════════════════════════════════

    /// Swap both confirmed offers between `inv_a` (held by `a`) and `inv_b`.
    ///
    /// Refused without touching the trade when the pair is not trading
    /// together or not both confirmed. Once past those checks the exchange
    /// always ends: Processed on success, Closed when the commit fails.
    pub fn process_exchange<I: Inventory + Clone>(
        &self,
        a: CharacterId,
        b: CharacterId,
        inv_a: &mut I,
        inv_b: &mut I,
    ) -> Result<ProcessedExchange, ExchangeError> {
        let mut table = self.table.lock();
        let shared = table.get(a).ok_or(ExchangeError::NoActiveExchange(a))?;
        let mut session = shared.lock();
        if session.partner_of(a) != Some(b) {
            return Err(ExchangeError::NotPartners { a, b });
        }
        if !session.is_negotiating() {
            return Err(ExchangeError::NoActiveExchange(a));
        }
        if !session.both_confirmed() {
            return Err(ExchangeError::NotConfirmed);
        }
        table.detach(session.id, session.participants);
        drop(table);

        match self.commit(&session, a, inv_a, b, inv_b) {
            Ok(changes) => {
                session.finish(ExchangeState::Processed);
                info!(
                    "✅ Exchange #{} processed: {} ⇄ {} | {} + {} slot update(s)",
                    session.id, a, b,
                    changes.get(&a).map_or(0, Vec::len),
                    changes.get(&b).map_or(0, Vec::len),
                );
                Ok(changes)
            }
            Err(e) => {
                session.finish(ExchangeState::Closed);
                warn!("❌ Exchange #{} aborted, holdings untouched: {}", session.id, e);
                Err(e)
            }
        }
    }

    fn commit<I: Inventory + Clone>(
        &self,
        session: &ExchangeSession,
        a: CharacterId,
        inv_a: &mut I,
        b: CharacterId,
        inv_b: &mut I,
    ) -> Result<ProcessedExchange, ExchangeError> {
        let (Some(offer_a), Some(offer_b)) = (session.offer(a), session.offer(b)) else {
            return Err(ExchangeError::NotPartners { a, b });
        };

        // Phase 1: staged offers against live holdings.
        self.revalidate(a, offer_a, inv_a)?;
        self.revalidate(b, offer_b, inv_b)?;

        // Phase 2: apply on scratch copies.
        let mut next_a = inv_a.clone();
        let mut next_b = inv_b.clone();
        let mut changes_a = Vec::new();
        let mut changes_b = Vec::new();

        let from_a = withdraw(a, offer_a, &mut next_a, &mut changes_a)?;
        let from_b = withdraw(b, offer_b, &mut next_b, &mut changes_b)?;
        deposit(b, from_a, offer_a, &mut next_b, &mut changes_b)?;
        deposit(a, from_b, offer_b, &mut next_a, &mut changes_a)?;

        *inv_a = next_a;
        *inv_b = next_b;

        let mut changes = HashMap::with_capacity(2);
        changes.insert(a, changes_a);
        changes.insert(b, changes_b);
        Ok(changes)
    }

    fn revalidate<I: Inventory>(
        &self,
        id: CharacterId,
        offer: &ExchangeOffer,
        inv: &I,
    ) -> Result<(), ExchangeError> {
        if offer.items.len() > self.cfg.max_exchange_items {
            return Err(InvalidOffer::TooManyItems { max: self.cfg.max_exchange_items }.into());
        }
        for staged in offer.items.values() {
            let staged_id = staged.instance.id;
            if !self.catalog.is_tradeable(staged.instance.vnum) {
                return Err(InvalidOffer::NotTradeable(staged.instance.vnum).into());
            }
            let held = match inv.item(staged_id) {
                Some(h) if h.vnum == staged.instance.vnum => h,
                _ => {
                    return Err(ExchangeError::StaleOffer { id, reason: InventoryError::ItemNotFound(staged_id) });
                }
            };
            if held.amount < staged.amount {
                return Err(ExchangeError::StaleOffer {
                    id,
                    reason: InventoryError::InsufficientAmount {
                        id: staged_id,
                        requested: staged.amount,
                        held: held.amount,
                    },
                });
            }
        }
        if inv.gold() < offer.gold {
            return Err(ExchangeError::StaleOffer {
                id,
                reason: InventoryError::InsufficientGold { requested: offer.gold, held: inv.gold() },
            });
        }
        if inv.bank_gold() < offer.bank_gold {
            return Err(ExchangeError::StaleOffer {
                id,
                reason: InventoryError::InsufficientGold { requested: offer.bank_gold, held: inv.bank_gold() },
            });
        }
        Ok(())
    }

    /// Run `f` on `id`'s session if it is still negotiating.
    fn with_session<R>(
        &self,
        id: CharacterId,
        f: impl FnOnce(&mut ExchangeSession) -> Result<R, ExchangeError>,
    ) -> Result<R, ExchangeError> {
        let shared = self
            .table
            .lock()
            .get(id)
            .ok_or(ExchangeError::NoActiveExchange(id))?;
        let mut session = shared.lock();
        if !session.is_negotiating() {
            return Err(ExchangeError::NoActiveExchange(id));
        }
        f(&mut session)
    }
}

fn withdraw<I: Inventory>(
    id: CharacterId,
    offer: &ExchangeOffer,
    inv: &mut I,
    changes: &mut Vec<PocketChange>,
) -> Result<Vec<ItemInstance>, ExchangeError> {
    let stale = |reason| ExchangeError::StaleOffer { id, reason };
    let mut moved = Vec::with_capacity(offer.items.len());
    for staged in offer.items.values() {
        let (removed, change) = inv.remove_item(staged.instance.id, staged.amount).map_err(stale)?;
        changes.push(change);
        moved.push(removed);
    }
    inv.remove_gold(offer.gold, offer.bank_gold).map_err(stale)?;
    Ok(moved)
}

fn deposit<I: Inventory>(
    id: CharacterId,
    items: Vec<ItemInstance>,
    offer: &ExchangeOffer,
    inv: &mut I,
    changes: &mut Vec<PocketChange>,
) -> Result<(), ExchangeError> {
    let rejected = |source| ExchangeError::PartialTransferFailure { id, source };
    for item in items {
        changes.extend(inv.add_item(item).map_err(rejected)?);
    }
    inv.add_gold(offer.gold, offer.bank_gold).map_err(rejected)?;
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────

//! Exchange Controller — actor between the session layer and the coordinator.
//!
//! Owns the inventories of connected characters and the pending trade
//! invitations. Turns `ExchangeCmd`s into coordinator calls and reports
//! every outcome as an `ExchangeEvent` for the broadcast layer. It is the
//! only place that sequences a commit: once both sides have confirmed, it
//! runs `process_exchange` on the two inventories it holds.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::coordinator::ExchangeCoordinator;
use super::error::ExchangeError;
use super::inventory::{Inventory, PocketInventory};
use super::messages::*;
use super::types::{CharacterId, ItemInstanceId};

// ─────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Capacity of the command channel (session layer → controller).
    pub cmd_buffer: usize,
    /// Capacity of the event channel (controller → broadcast).
    pub event_buffer: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cmd_buffer: 256,
            event_buffer: 256,
        }
    }
}

impl ControllerConfig {
    pub fn from_env() -> Self {
        let mut c = Self::default();
        if let Ok(v) = std::env::var("EXCHANGE_CMD_BUFFER")   { if let Ok(n) = v.parse() { c.cmd_buffer = n; } }
        if let Ok(v) = std::env::var("EXCHANGE_EVENT_BUFFER") { if let Ok(n) = v.parse() { c.event_buffer = n; } }
        c
    }
}

#[derive(Debug, Default)]
struct Stats {
    commands: u64,
    requested: u64,
    opened: u64,
    processed: u64,
    failed: u64,
    cancelled: u64,
    declined: u64,
    rejected: u64,
}

// ─────────────────────────────────────────────────────────
// Actor
// ─────────────────────────────────────────────────────────

pub struct ExchangeController {
    coordinator: Arc<ExchangeCoordinator>,
    inventories: HashMap<CharacterId, PocketInventory>,
    /// Outstanding invitations as (from, to).
    pending: HashSet<(CharacterId, CharacterId)>,
    stats: Stats,

    cmd_rx: mpsc::Receiver<ExchangeCmd>,
    event_tx: mpsc::Sender<ExchangeEvent>,
}

impl ExchangeController {
    pub fn new(
        coordinator: Arc<ExchangeCoordinator>,
        cmd_rx: mpsc::Receiver<ExchangeCmd>,
        event_tx: mpsc::Sender<ExchangeEvent>,
    ) -> Self {
        Self {
            coordinator,
            inventories: HashMap::new(),
            pending: HashSet::new(),
            stats: Stats::default(),
            cmd_rx,
            event_tx,
        }
    }

    /// Actor main loop. Runs until the command channel is closed.
    pub async fn run(mut self) {
        info!("🎮 ExchangeController started");

        while let Some(cmd) = self.cmd_rx.recv().await {
            self.stats.commands += 1;
            self.handle(cmd).await;
        }

        info!(
            "🎮 Shutdown | cmds={} requested={} opened={} processed={} failed={} cancelled={} declined={} rejected={}",
            self.stats.commands, self.stats.requested, self.stats.opened, self.stats.processed,
            self.stats.failed, self.stats.cancelled, self.stats.declined, self.stats.rejected,
        );
    }

    async fn handle(&mut self, cmd: ExchangeCmd) {
        match cmd {
            ExchangeCmd::Connect { id, inventory } => self.connect(id, *inventory),
            ExchangeCmd::Disconnect { id } => self.disconnect(id).await,
            ExchangeCmd::Request { from, to } => self.request(from, to).await,
            ExchangeCmd::Accept { from, to } => self.accept(from, to).await,
            ExchangeCmd::Decline { from, to } => self.decline(from, to).await,
            ExchangeCmd::SetGold { id, gold, bank_gold } => self.set_gold(id, gold, bank_gold).await,
            ExchangeCmd::AddItem { id, instance_id, amount } => self.add_item(id, instance_id, amount).await,
            ExchangeCmd::Confirm { id } => self.confirm(id).await,
            ExchangeCmd::Cancel { id } => self.cancel(id).await,
        }
    }

    // ═════════════════════════════════════════════════
    // Session lifecycle
    // ═════════════════════════════════════════════════

    fn connect(&mut self, id: CharacterId, inventory: PocketInventory) {
        if self.inventories.insert(id, inventory).is_some() {
            warn!("⚠️ {} connected twice, inventory replaced", id);
        }
        debug!("👤 {} connected ({} online)", id, self.inventories.len());
    }

    async fn disconnect(&mut self, id: CharacterId) {
        self.pending.retain(|(from, to)| *from != id && *to != id);
        if let Some(result) = self.coordinator.close_exchange(id, ExchangeResultType::Cancelled) {
            self.stats.cancelled += 1;
            self.emit(ExchangeEvent::Closed(result)).await;
        }
        self.inventories.remove(&id);
        debug!("👤 {} disconnected ({} online)", id, self.inventories.len());
    }

    // ═════════════════════════════════════════════════
    // Invitation handshake
    // ═════════════════════════════════════════════════

    async fn request(&mut self, from: CharacterId, to: CharacterId) {
        if from == to {
            return self.reject(from, "cannot trade with yourself").await;
        }
        if !self.inventories.contains_key(&from) || !self.inventories.contains_key(&to) {
            return self.reject(from, "target is not connected").await;
        }
        if self.coordinator.check_exchange(from) || self.coordinator.check_exchange(to) {
            self.emit(ExchangeEvent::Closed(ExchangeResult {
                result_type: ExchangeResultType::AlreadyTrading,
                participants: [from, to],
            }))
            .await;
            return;
        }

        self.pending.insert((from, to));
        self.stats.requested += 1;
        self.emit(ExchangeEvent::RequestReceived { from, to }).await;
    }

    /// `from` accepts the invitation `to` sent earlier.
    async fn accept(&mut self, from: CharacterId, to: CharacterId) {
        if !self.pending.remove(&(to, from)) {
            return self.reject(from, "no pending request").await;
        }

        match self.coordinator.open_exchange(to, from) {
            Ok(()) => {
                self.stats.opened += 1;
                self.emit(ExchangeEvent::Opened { participants: [to, from] }).await;
            }
            Err(ExchangeError::AlreadyTrading(_)) => {
                self.emit(ExchangeEvent::Closed(ExchangeResult {
                    result_type: ExchangeResultType::AlreadyTrading,
                    participants: [to, from],
                }))
                .await;
            }
            Err(e) => self.reject(from, &e.to_string()).await,
        }
    }

    async fn decline(&mut self, from: CharacterId, to: CharacterId) {
        if !self.pending.remove(&(to, from)) {
            return self.reject(from, "no pending request").await;
        }
        self.stats.declined += 1;
        self.emit(ExchangeEvent::Closed(ExchangeResult {
            result_type: ExchangeResultType::Declined,
            participants: [to, from],
        }))
        .await;
    }

    // ═════════════════════════════════════════════════
    // Negotiation
    // ═════════════════════════════════════════════════

    async fn set_gold(&mut self, id: CharacterId, gold: u64, bank_gold: u64) {
        let Some(inv) = self.inventories.get(&id) else {
            return self.reject(id, "not connected").await;
        };
        // Early feedback only; the commit re-checks live holdings.
        if inv.gold() < gold || inv.bank_gold() < bank_gold {
            return self.reject(id, "not enough gold").await;
        }

        match self.coordinator.set_gold(id, gold, bank_gold) {
            Ok(()) => self.offer_updated(id).await,
            Err(e) => self.reject(id, &e.to_string()).await,
        }
    }

    async fn add_item(&mut self, id: CharacterId, instance_id: ItemInstanceId, amount: u16) {
        let Some(item) = self.inventories.get(&id).and_then(|inv| inv.item(instance_id)).cloned() else {
            return self.reject(id, "item not held").await;
        };

        match self.coordinator.add_items(id, &item, amount) {
            Ok(()) => self.offer_updated(id).await,
            Err(e) => self.reject(id, &e.to_string()).await,
        }
    }

    async fn confirm(&mut self, id: CharacterId) {
        let both = match self.coordinator.confirm_exchange(id) {
            Ok(both) => both,
            Err(e) => return self.reject(id, &e.to_string()).await,
        };
        let Some(target) = self.coordinator.target_of(id) else {
            return;
        };
        self.emit(ExchangeEvent::Confirmed { id, target }).await;

        if both {
            self.process(id, target).await;
        }
    }

    async fn cancel(&mut self, id: CharacterId) {
        match self.coordinator.close_exchange(id, ExchangeResultType::Cancelled) {
            Some(result) => {
                self.stats.cancelled += 1;
                self.emit(ExchangeEvent::Closed(result)).await;
            }
            None => self.reject(id, "no active exchange").await,
        }
    }

    // ═════════════════════════════════════════════════
    // Commit
    // ═════════════════════════════════════════════════

    async fn process(&mut self, a: CharacterId, b: CharacterId) {
        let inv_a = self.inventories.remove(&a);
        let inv_b = self.inventories.remove(&b);

        let outcome = match (inv_a, inv_b) {
            (Some(mut inv_a), Some(mut inv_b)) => {
                let outcome = self.coordinator.process_exchange(a, b, &mut inv_a, &mut inv_b);
                self.inventories.insert(a, inv_a);
                self.inventories.insert(b, inv_b);
                outcome.map_err(|e| e.to_string())
            }
            (inv_a, inv_b) => {
                if let Some(inv) = inv_a { self.inventories.insert(a, inv); }
                if let Some(inv) = inv_b { self.inventories.insert(b, inv); }
                Err("participant inventory missing".to_string())
            }
        };

        match outcome {
            Ok(changes) => {
                self.stats.processed += 1;
                self.emit(ExchangeEvent::Completed {
                    result: ExchangeResult {
                        result_type: ExchangeResultType::Success,
                        participants: [a, b],
                    },
                    changes,
                })
                .await;
            }
            Err(reason) => {
                self.stats.failed += 1;
                warn!("❌ Exchange {} ⇄ {} failed: {}", a, b, reason);
                // a refused precondition leaves the trade open; a failed commit already closed it
                let result = self
                    .coordinator
                    .close_exchange(a, ExchangeResultType::Failure)
                    .unwrap_or(ExchangeResult {
                        result_type: ExchangeResultType::Failure,
                        participants: [a, b],
                    });
                self.emit(ExchangeEvent::Closed(result)).await;
            }
        }
    }

    // ═════════════════════════════════════════════════
    // Plumbing
    // ═════════════════════════════════════════════════

    async fn offer_updated(&mut self, id: CharacterId) {
        let (Some(target), Some(offer)) = (self.coordinator.target_of(id), self.coordinator.get_data(id)) else {
            return;
        };
        self.emit(ExchangeEvent::OfferUpdated { id, target, offer }).await;
    }

    async fn reject(&mut self, id: CharacterId, reason: &str) {
        self.stats.rejected += 1;
        debug!("🚫 {} rejected: {}", id, reason);
        self.emit(ExchangeEvent::Rejected { id, reason: reason.to_string() }).await;
    }

    async fn emit(&self, event: ExchangeEvent) {
        let _ = self.event_tx.send(event).await;
    }
}

// ─────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::catalog::ItemCatalog;
    use crate::exchange::types::{Item, ItemInstance, PocketType};
    use crate::WorldConfig;
    use std::time::Duration;

    fn catalog() -> Arc<ItemCatalog> {
        Arc::new(ItemCatalog::new(vec![
            Item::new(1012, PocketType::Main),
            Item::new(1013, PocketType::Main),
        ]))
    }

    fn make() -> (
        mpsc::Sender<ExchangeCmd>,
        mpsc::Receiver<ExchangeEvent>,
        Arc<ItemCatalog>,
        tokio::task::JoinHandle<()>,
    ) {
        let cat = catalog();
        let coord = Arc::new(ExchangeCoordinator::new(cat.clone(), WorldConfig::default()));
        let (c, cr) = mpsc::channel(16);
        let (e, er) = mpsc::channel(16);
        let h = tokio::spawn(ExchangeController::new(coord, cr, e).run());
        (c, er, cat, h)
    }

    fn inventory(cat: &Arc<ItemCatalog>, vnum: u16, gold: u64) -> (Box<PocketInventory>, ItemInstance) {
        let mut inv = PocketInventory::new(cat.clone(), &WorldConfig::default()).with_gold(gold, 0);
        let item = cat.create(vnum, 1).unwrap();
        inv.add_item(item.clone()).unwrap();
        (Box::new(inv), item)
    }

    async fn next(rx: &mut mpsc::Receiver<ExchangeEvent>) -> ExchangeEvent {
        tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .expect("no event")
            .expect("channel closed")
    }

    async fn quiet(rx: &mut mpsc::Receiver<ExchangeEvent>) -> bool {
        tokio::time::timeout(Duration::from_millis(50), rx.recv()).await.is_err()
    }

    async fn open_pair(
        c: &mpsc::Sender<ExchangeCmd>,
        e: &mut mpsc::Receiver<ExchangeEvent>,
        cat: &Arc<ItemCatalog>,
    ) -> (ItemInstance, ItemInstance) {
        let (inv1, item1) = inventory(cat, 1012, 100);
        let (inv2, item2) = inventory(cat, 1013, 100);
        c.send(ExchangeCmd::Connect { id: 1, inventory: inv1 }).await.unwrap();
        c.send(ExchangeCmd::Connect { id: 2, inventory: inv2 }).await.unwrap();
        c.send(ExchangeCmd::Request { from: 1, to: 2 }).await.unwrap();
        assert_eq!(next(e).await, ExchangeEvent::RequestReceived { from: 1, to: 2 });
        c.send(ExchangeCmd::Accept { from: 2, to: 1 }).await.unwrap();
        assert_eq!(next(e).await, ExchangeEvent::Opened { participants: [1, 2] });
        (item1, item2)
    }

    #[tokio::test]
    async fn test_full_trade() {
        let (c, mut e, cat, h) = make();
        let (item1, item2) = open_pair(&c, &mut e, &cat).await;

        c.send(ExchangeCmd::AddItem { id: 1, instance_id: item1.id, amount: 1 }).await.unwrap();
        match next(&mut e).await {
            ExchangeEvent::OfferUpdated { id, target, offer } => {
                assert_eq!((id, target), (1, 2));
                assert!(offer.items.contains_key(&item1.id));
            }
            other => panic!("unexpected {:?}", other),
        }
        c.send(ExchangeCmd::AddItem { id: 2, instance_id: item2.id, amount: 1 }).await.unwrap();
        assert!(matches!(next(&mut e).await, ExchangeEvent::OfferUpdated { id: 2, .. }));

        c.send(ExchangeCmd::Confirm { id: 1 }).await.unwrap();
        assert_eq!(next(&mut e).await, ExchangeEvent::Confirmed { id: 1, target: 2 });
        c.send(ExchangeCmd::Confirm { id: 2 }).await.unwrap();
        assert_eq!(next(&mut e).await, ExchangeEvent::Confirmed { id: 2, target: 1 });

        match next(&mut e).await {
            ExchangeEvent::Completed { result, changes } => {
                assert_eq!(result.result_type, ExchangeResultType::Success);
                assert_eq!(changes[&1].len(), 2);
                assert_eq!(changes[&2].len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }

        drop(c);
        let _ = h.await;
    }

    #[tokio::test]
    async fn test_decline() {
        let (c, mut e, cat, h) = make();
        let (inv1, _) = inventory(&cat, 1012, 0);
        let (inv2, _) = inventory(&cat, 1013, 0);
        c.send(ExchangeCmd::Connect { id: 1, inventory: inv1 }).await.unwrap();
        c.send(ExchangeCmd::Connect { id: 2, inventory: inv2 }).await.unwrap();
        c.send(ExchangeCmd::Request { from: 1, to: 2 }).await.unwrap();
        let _ = next(&mut e).await;
        c.send(ExchangeCmd::Decline { from: 2, to: 1 }).await.unwrap();
        assert_eq!(
            next(&mut e).await,
            ExchangeEvent::Closed(ExchangeResult {
                result_type: ExchangeResultType::Declined,
                participants: [1, 2],
            })
        );
        // the invitation is consumed
        c.send(ExchangeCmd::Accept { from: 2, to: 1 }).await.unwrap();
        assert!(matches!(next(&mut e).await, ExchangeEvent::Rejected { id: 2, .. }));

        drop(c);
        let _ = h.await;
    }

    #[tokio::test]
    async fn test_disconnect_cancels_open_trade() {
        let (c, mut e, cat, h) = make();
        open_pair(&c, &mut e, &cat).await;

        c.send(ExchangeCmd::Disconnect { id: 2 }).await.unwrap();
        assert_eq!(
            next(&mut e).await,
            ExchangeEvent::Closed(ExchangeResult {
                result_type: ExchangeResultType::Cancelled,
                participants: [1, 2],
            })
        );
        c.send(ExchangeCmd::Confirm { id: 1 }).await.unwrap();
        assert!(matches!(next(&mut e).await, ExchangeEvent::Rejected { id: 1, .. }));

        drop(c);
        let _ = h.await;
    }

    #[tokio::test]
    async fn test_busy_target() {
        let (c, mut e, cat, h) = make();
        open_pair(&c, &mut e, &cat).await;
        let (inv3, _) = inventory(&cat, 1012, 0);
        c.send(ExchangeCmd::Connect { id: 3, inventory: inv3 }).await.unwrap();

        c.send(ExchangeCmd::Request { from: 3, to: 1 }).await.unwrap();
        assert_eq!(
            next(&mut e).await,
            ExchangeEvent::Closed(ExchangeResult {
                result_type: ExchangeResultType::AlreadyTrading,
                participants: [3, 1],
            })
        );

        drop(c);
        let _ = h.await;
    }

    #[tokio::test]
    async fn test_foreign_item_rejected() {
        let (c, mut e, cat, h) = make();
        let (_, item2) = open_pair(&c, &mut e, &cat).await;

        // 1 tries to stage the item 2 holds
        c.send(ExchangeCmd::AddItem { id: 1, instance_id: item2.id, amount: 1 }).await.unwrap();
        assert!(matches!(next(&mut e).await, ExchangeEvent::Rejected { id: 1, .. }));

        c.send(ExchangeCmd::SetGold { id: 1, gold: 101, bank_gold: 0 }).await.unwrap();
        assert!(matches!(next(&mut e).await, ExchangeEvent::Rejected { id: 1, .. }));

        drop(c);
        let _ = h.await;
    }

    #[tokio::test]
    async fn test_renegotiation_blocks_commit() {
        let (c, mut e, cat, h) = make();
        open_pair(&c, &mut e, &cat).await;

        c.send(ExchangeCmd::Confirm { id: 1 }).await.unwrap();
        let _ = next(&mut e).await;
        c.send(ExchangeCmd::SetGold { id: 2, gold: 50, bank_gold: 0 }).await.unwrap();
        match next(&mut e).await {
            ExchangeEvent::OfferUpdated { id: 2, offer, .. } => {
                assert_eq!(offer.gold, 50);
                assert!(!offer.confirmed);
            }
            other => panic!("unexpected {:?}", other),
        }

        // 1's consent was reset, so 2 confirming alone does not commit
        c.send(ExchangeCmd::Confirm { id: 2 }).await.unwrap();
        assert_eq!(next(&mut e).await, ExchangeEvent::Confirmed { id: 2, target: 1 });
        assert!(quiet(&mut e).await);

        c.send(ExchangeCmd::Confirm { id: 1 }).await.unwrap();
        let _ = next(&mut e).await;
        assert!(matches!(next(&mut e).await, ExchangeEvent::Completed { .. }));

        drop(c);
        let _ = h.await;
    }

    #[tokio::test]
    async fn test_cancel_without_exchange() {
        let (c, mut e, _cat, h) = make();
        c.send(ExchangeCmd::Cancel { id: 7 }).await.unwrap();
        assert!(matches!(next(&mut e).await, ExchangeEvent::Rejected { id: 7, .. }));
        drop(c);
        let _ = h.await;
    }
}

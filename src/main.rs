//! Exchange demo — scripted trade between two characters.
//!
//! Actor layout:
//!   session script ──ExchangeCmd──→ ExchangeController ──ExchangeEvent──→ broadcast printer
//!
//! The controller owns both inventories and the shared coordinator; the
//! printer renders every event as JSON, the way a packet layer would
//! fan it out to the two clients.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use nos_exchange::exchange::catalog::ItemCatalog;
use nos_exchange::exchange::controller::{ControllerConfig, ExchangeController};
use nos_exchange::exchange::coordinator::ExchangeCoordinator;
use nos_exchange::exchange::inventory::{Inventory, PocketInventory};
use nos_exchange::exchange::messages::*;
use nos_exchange::exchange::types::{CharacterId, Item, PocketType};
use nos_exchange::WorldConfig;

const ALICE: CharacterId = 1001;
const BOB: CharacterId = 1002;

fn demo_catalog() -> ItemCatalog {
    ItemCatalog::new(vec![
        Item::new(1, PocketType::Equipment),      // wooden stick
        Item::new(1012, PocketType::Main),        // small hp potion
        Item::new(2024, PocketType::Etc),         // wing of angel
        Item::bound(9000, PocketType::Costume),   // event costume
    ])
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("═══════════════════════════════════════════════════");
    info!("  Exchange demo — two-party trade");
    info!("═══════════════════════════════════════════════════");

    let world = WorldConfig::from_env();
    let ctrl_cfg = ControllerConfig::from_env();
    info!(
        "📊 Config: stack={} backpack={} gold_max={} bank_max={} items_max={}",
        world.max_item_amount, world.backpack_size, world.max_gold_amount,
        world.max_bank_gold_amount, world.max_exchange_items,
    );

    let catalog = Arc::new(demo_catalog());
    let coordinator = Arc::new(ExchangeCoordinator::new(catalog.clone(), world.clone()));

    // ── Holdings ──
    let mut alice = PocketInventory::new(catalog.clone(), &world).with_gold(50_000, 0);
    let potions = catalog.create(1012, 40)?;
    alice.add_item(potions.clone())?;
    let costume = catalog.create(9000, 1)?;
    alice.add_item(costume.clone())?;

    let mut bob = PocketInventory::new(catalog.clone(), &world).with_gold(1_000, 2_000_000);
    let stick = catalog.create(1, 1)?;
    bob.add_item(stick.clone())?;

    // ── Actors ──
    let (cmd_tx, cmd_rx) = mpsc::channel::<ExchangeCmd>(ctrl_cfg.cmd_buffer);
    let (event_tx, mut event_rx) = mpsc::channel::<ExchangeEvent>(ctrl_cfg.event_buffer);

    let controller = tokio::spawn(ExchangeController::new(coordinator.clone(), cmd_rx, event_tx).run());
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => info!("📣 {}", line),
                Err(e) => warn!("⚠️ Cannot render event: {}", e),
            }
        }
    });

    // ── Script ──
    let script = vec![
        ExchangeCmd::Connect { id: ALICE, inventory: Box::new(alice) },
        ExchangeCmd::Connect { id: BOB, inventory: Box::new(bob) },
        ExchangeCmd::Request { from: ALICE, to: BOB },
        ExchangeCmd::Accept { from: BOB, to: ALICE },
        ExchangeCmd::AddItem { id: ALICE, instance_id: potions.id, amount: 15 },
        // bound items never leave their owner
        ExchangeCmd::AddItem { id: ALICE, instance_id: costume.id, amount: 1 },
        ExchangeCmd::AddItem { id: BOB, instance_id: stick.id, amount: 1 },
        ExchangeCmd::SetGold { id: BOB, gold: 500, bank_gold: 1_000_000 },
        ExchangeCmd::Confirm { id: ALICE },
        // renegotiation: Alice's consent is reset
        ExchangeCmd::SetGold { id: BOB, gold: 800, bank_gold: 1_000_000 },
        ExchangeCmd::Confirm { id: BOB },
        ExchangeCmd::Confirm { id: ALICE },
        ExchangeCmd::Disconnect { id: ALICE },
        ExchangeCmd::Disconnect { id: BOB },
    ];

    for cmd in script {
        if cmd_tx.send(cmd).await.is_err() {
            anyhow::bail!("exchange controller stopped early");
        }
    }

    // Drop channels to finalize
    drop(cmd_tx);
    controller.await?;
    printer.await?;

    info!("🏁 Done: {} exchanges still open", coordinator.active_exchanges());
    Ok(())
}

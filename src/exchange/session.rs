//! Exchange Session Record and the table that aliases it under both ids.
//!
//! Sessions live in an arena keyed by `SessionId`; the index maps each
//! trading character to its session. Insert and detach always touch both
//! index slots together, so a half-registered pair is never observable.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use super::error::ExchangeError;
use super::types::{CharacterId, ItemInstance, ItemInstanceId};

pub type SessionId = u64;

/// One staged instance: a snapshot of the instance when it was offered,
/// plus how much of it is up for trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedItem {
    pub instance: ItemInstance,
    pub amount: u16,
}

/// One side's staged contribution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExchangeOffer {
    pub gold: u64,
    pub bank_gold: u64,
    pub items: HashMap<ItemInstanceId, StagedItem>,
    pub confirmed: bool,
}

impl ExchangeOffer {
    /// Sum of staged amounts across all instances.
    pub fn staged_amount(&self) -> u32 {
        self.items.values().map(|s| s.amount as u32).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.gold == 0 && self.bank_gold == 0 && self.items.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExchangeState {
    Negotiating,
    Processed,
    Closed,
}

#[derive(Debug)]
pub struct ExchangeSession {
    pub id: SessionId,
    pub participants: [CharacterId; 2],
    pub offers: [ExchangeOffer; 2],
    pub state: ExchangeState,
    pub opened_at: DateTime<Utc>,
}

impl ExchangeSession {
    fn new(id: SessionId, a: CharacterId, b: CharacterId) -> Self {
        Self {
            id,
            participants: [a, b],
            offers: [ExchangeOffer::default(), ExchangeOffer::default()],
            state: ExchangeState::Negotiating,
            opened_at: Utc::now(),
        }
    }

    pub fn side_of(&self, id: CharacterId) -> Option<usize> {
        self.participants.iter().position(|p| *p == id)
    }

    pub fn partner_of(&self, id: CharacterId) -> Option<CharacterId> {
        self.side_of(id).map(|s| self.participants[1 - s])
    }

    pub fn offer(&self, id: CharacterId) -> Option<&ExchangeOffer> {
        self.side_of(id).map(|s| &self.offers[s])
    }

    pub fn offer_mut(&mut self, id: CharacterId) -> Option<&mut ExchangeOffer> {
        self.side_of(id).map(move |s| &mut self.offers[s])
    }

    pub fn is_negotiating(&self) -> bool {
        self.state == ExchangeState::Negotiating
    }

    pub fn both_confirmed(&self) -> bool {
        self.offers.iter().all(|o| o.confirmed)
    }

    /// Renegotiation invalidates both consents.
    pub fn reset_confirmations(&mut self) {
        for offer in &mut self.offers {
            offer.confirmed = false;
        }
    }

    /// Move to a terminal state. Only a negotiating session can finish, once.
    pub fn finish(&mut self, state: ExchangeState) -> bool {
        if self.state != ExchangeState::Negotiating || state == ExchangeState::Negotiating {
            return false;
        }
        self.state = state;
        true
    }
}

pub type SharedSession = Arc<Mutex<ExchangeSession>>;

#[derive(Debug, Default)]
pub struct ExchangeTable {
    next_id: SessionId,
    sessions: HashMap<SessionId, SharedSession>,
    index: HashMap<CharacterId, SessionId>,
}

impl ExchangeTable {
    pub fn contains(&self, id: CharacterId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn get(&self, id: CharacterId) -> Option<SharedSession> {
        self.index
            .get(&id)
            .and_then(|sid| self.sessions.get(sid))
            .cloned()
    }

    /// Register a new pair under both ids.
    pub fn insert(&mut self, a: CharacterId, b: CharacterId) -> Result<SharedSession, ExchangeError> {
        if a == b {
            return Err(ExchangeError::SelfExchange(a));
        }
        for id in [a, b] {
            if self.index.contains_key(&id) {
                return Err(ExchangeError::AlreadyTrading(id));
            }
        }

        self.next_id += 1;
        let sid = self.next_id;
        let session = Arc::new(Mutex::new(ExchangeSession::new(sid, a, b)));
        self.sessions.insert(sid, session.clone());
        self.index.insert(a, sid);
        self.index.insert(b, sid);
        Ok(session)
    }

    /// Unregister a session under both of its ids.
    pub fn detach(&mut self, sid: SessionId, participants: [CharacterId; 2]) {
        self.sessions.remove(&sid);
        for id in participants {
            if self.index.get(&id) == Some(&sid) {
                self.index.remove(&id);
            }
        }
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

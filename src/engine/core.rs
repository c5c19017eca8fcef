// 8.1 engine/core.rs: engine state and the concurrency discipline.
//
// single-writer-per-position: each position sits behind its own Mutex, and an
// update admission holds that lock for the entire raw-mutation + recompute +
// snapshot cycle, so a half-updated position (raw fields moved, derived fields
// stale) is never observable. positions on different symbols or accounts share
// nothing and proceed in parallel. funding contexts are read through an owned
// snapshot taken under one read lock, so mark price and funding rate cannot
// tear within a recompute call.

use super::config::EngineConfig;
use crate::contract::{ContractDescriptor, MarginMode};
use crate::errors::RiskError;
use crate::events::{Event, EventId, EventPayload};
use crate::funding::{FundingContext, FundingSnapshot};
use crate::position::{Position, PositionDelta};
use crate::snapshot::PositionSnapshot;
use crate::types::{AccountId, Leverage, Symbol, Timestamp};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

/// Identity of one position in the book. Margin mode is part of the key: an
/// account can hold an isolated and a cross position on the same symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PositionKey {
    pub account: AccountId,
    pub symbol: Symbol,
    pub margin_mode: MarginMode,
}

pub(super) struct EventLog {
    entries: Vec<Event>,
    next_id: u64,
    cap: usize,
}

#[derive(Debug)]
pub struct RiskEngine {
    pub(super) config: EngineConfig,
    pub(super) contracts: RwLock<HashMap<Symbol, Arc<ContractDescriptor>>>,
    pub(super) markets: RwLock<HashMap<Symbol, Arc<RwLock<FundingContext>>>>,
    pub(super) positions: RwLock<HashMap<PositionKey, Arc<Mutex<Position>>>>,
    pub(super) events: Mutex<EventLog>,
}

// lock helpers: a poisoned lock means a panic elsewhere already broke the
// process invariant; recover the guard rather than cascading the panic.
pub(super) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(super) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

pub(super) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RiskEngine {
    pub fn new(config: EngineConfig) -> Self {
        let cap = config.max_events;
        Self {
            config,
            contracts: RwLock::new(HashMap::new()),
            markets: RwLock::new(HashMap::new()),
            positions: RwLock::new(HashMap::new()),
            events: Mutex::new(EventLog {
                entries: Vec::new(),
                next_id: 1,
                cap,
            }),
        }
    }

    /// Register a contract descriptor and seed its funding context.
    pub fn register_contract(&self, descriptor: ContractDescriptor) {
        let symbol = descriptor.symbol.clone();
        write(&self.contracts).insert(symbol.clone(), Arc::new(descriptor));
        write(&self.markets)
            .entry(symbol)
            .or_insert_with(|| Arc::new(RwLock::new(FundingContext::new())));
    }

    /// Wholesale descriptor replacement on exchange metadata refresh. Every
    /// open position must fit its new descriptor (a symbol still present, a
    /// leverage cap it does not exceed); the first misfit aborts the swap
    /// and leaves the previous descriptors in place.
    pub fn refresh_contracts(
        &self,
        descriptors: Vec<ContractDescriptor>,
    ) -> Result<(), RiskError> {
        let mut replacement: HashMap<Symbol, Arc<ContractDescriptor>> = HashMap::new();
        for descriptor in descriptors {
            replacement.insert(descriptor.symbol.clone(), Arc::new(descriptor));
        }

        // hold the book read lock across validate + apply so no position is
        // created or releveraged mid-swap
        let book = read(&self.positions);
        for (key, slot) in book.iter() {
            let position = lock(slot);
            let descriptor = replacement
                .get(&key.symbol)
                .ok_or_else(|| RiskError::UnknownSymbol(key.symbol.clone()))?;
            if position.leverage > descriptor.max_leverage {
                warn!(symbol = %key.symbol, "descriptor refresh rejected: leverage above new cap");
                return Err(RiskError::LeverageOutOfBounds {
                    symbol: key.symbol.clone(),
                    requested: position.leverage,
                    max: descriptor.max_leverage,
                });
            }
        }
        for (key, slot) in book.iter() {
            let mut position = lock(slot);
            // validated above; descriptor presence and cap both hold
            position.set_contract(Arc::clone(&replacement[&key.symbol]))?;
        }
        drop(book);

        let mut markets = write(&self.markets);
        for symbol in replacement.keys() {
            markets
                .entry(symbol.clone())
                .or_insert_with(|| Arc::new(RwLock::new(FundingContext::new())));
        }
        drop(markets);

        *write(&self.contracts) = replacement;
        Ok(())
    }

    pub fn contract(&self, symbol: &Symbol) -> Result<Arc<ContractDescriptor>, RiskError> {
        read(&self.contracts)
            .get(symbol)
            .cloned()
            .ok_or_else(|| RiskError::UnknownSymbol(symbol.clone()))
    }

    pub(super) fn market(&self, symbol: &Symbol) -> Result<Arc<RwLock<FundingContext>>, RiskError> {
        read(&self.markets)
            .get(symbol)
            .cloned()
            .ok_or_else(|| RiskError::UnknownSymbol(symbol.clone()))
    }

    /// Consistent funding view for one recompute call.
    pub fn funding_snapshot(&self, symbol: &Symbol) -> Result<FundingSnapshot, RiskError> {
        let market = self.market(symbol)?;
        let guard = read(&market);
        Ok(guard.snapshot())
    }

    /// Open a flat position slot. The first fill gives it exposure.
    pub fn open_position(
        &self,
        account: AccountId,
        symbol: &Symbol,
        margin_mode: MarginMode,
        leverage: Leverage,
    ) -> Result<PositionKey, RiskError> {
        let contract = self.contract(symbol)?;
        if leverage > contract.max_leverage {
            return Err(RiskError::LeverageOutOfBounds {
                symbol: symbol.clone(),
                requested: leverage,
                max: contract.max_leverage,
            });
        }

        let mark = self.funding_snapshot(symbol)?.mark_price;
        let mut position = Position::new(contract, margin_mode, leverage);
        position.update(PositionDelta::mark(mark))?;

        let key = PositionKey {
            account,
            symbol: symbol.clone(),
            margin_mode,
        };
        write(&self.positions)
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(position)));
        Ok(key)
    }

    pub fn position(&self, key: &PositionKey) -> Option<Arc<Mutex<Position>>> {
        read(&self.positions).get(key).cloned()
    }

    /// Find an account's position on a symbol in either margin mode.
    pub(super) fn find_position(
        &self,
        account: AccountId,
        symbol: &Symbol,
    ) -> Option<(PositionKey, Arc<Mutex<Position>>)> {
        let book = read(&self.positions);
        for mode in [MarginMode::Isolated, MarginMode::Cross] {
            let key = PositionKey {
                account,
                symbol: symbol.clone(),
                margin_mode: mode,
            };
            if let Some(slot) = book.get(&key) {
                return Some((key, Arc::clone(slot)));
            }
        }
        None
    }

    /// All positions currently tracked for a symbol.
    pub(super) fn positions_for(
        &self,
        symbol: &Symbol,
    ) -> Vec<(PositionKey, Arc<Mutex<Position>>)> {
        read(&self.positions)
            .iter()
            .filter(|(key, _)| &key.symbol == symbol)
            .map(|(key, slot)| (key.clone(), Arc::clone(slot)))
            .collect()
    }

    pub fn snapshot(&self, key: &PositionKey) -> Result<PositionSnapshot, RiskError> {
        let slot = self.position(key).ok_or_else(|| RiskError::NoPosition {
            account: key.account,
            symbol: key.symbol.clone(),
        })?;
        let position = lock(&slot);
        Ok(position.snapshot())
    }

    pub fn snapshots(&self) -> Vec<PositionSnapshot> {
        let slots: Vec<_> = read(&self.positions).values().cloned().collect();
        slots.iter().map(|slot| lock(slot).snapshot()).collect()
    }

    /// Drop a flat position from the book. Open positions are kept.
    pub fn remove_if_flat(&self, key: &PositionKey) -> bool {
        let mut book = write(&self.positions);
        if let Some(slot) = book.get(key) {
            if !lock(slot).is_open() {
                book.remove(key);
                return true;
            }
        }
        false
    }

    /// Switch a position's margin mode. An explicit external operation: mode
    /// never transitions from price or quantity updates. Re-keys the book
    /// entry and refreshes the derived fields under the new mode.
    pub fn set_margin_mode(
        &self,
        account: AccountId,
        symbol: &Symbol,
        mode: MarginMode,
    ) -> Result<PositionKey, RiskError> {
        let funding = self.funding_snapshot(symbol)?;
        let mut book = write(&self.positions);

        let old_key = [MarginMode::Isolated, MarginMode::Cross]
            .into_iter()
            .map(|m| PositionKey {
                account,
                symbol: symbol.clone(),
                margin_mode: m,
            })
            .find(|k| book.contains_key(k))
            .ok_or_else(|| RiskError::NoPosition {
                account,
                symbol: symbol.clone(),
            })?;

        if old_key.margin_mode == mode {
            return Ok(old_key);
        }

        let Some(slot) = book.remove(&old_key) else {
            return Err(RiskError::NoPosition {
                account,
                symbol: symbol.clone(),
            });
        };
        {
            let mut position = lock(&slot);
            position.set_margin_mode(mode);
            position.refresh(&funding)?;
        }
        let new_key = PositionKey {
            account,
            symbol: symbol.clone(),
            margin_mode: mode,
        };
        book.insert(new_key.clone(), slot);
        Ok(new_key)
    }

    pub(super) fn emit(&self, timestamp: Timestamp, payload: EventPayload) {
        let mut log = lock(&self.events);
        let id = EventId(log.next_id);
        log.next_id += 1;
        log.entries.push(Event::new(id, timestamp, payload));
        if log.entries.len() > log.cap {
            let overflow = log.entries.len() - log.cap;
            log.entries.drain(0..overflow);
        }
    }

    pub fn events(&self) -> Vec<Event> {
        lock(&self.events).entries.clone()
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("entries", &self.entries.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

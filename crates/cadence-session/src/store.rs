//! The shared session store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use cadence_types::{CadenceError, Interval};
use chrono::NaiveDate;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info};

use crate::{ExportMode, Registration, SessionSnapshot, SymbolSession, SymbolSnapshot};

/// Errors raised by the session store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The symbol is already registered.
    #[error("Symbol already registered: {0}")]
    DuplicateSymbol(String),

    /// The symbol is not registered.
    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),
}

impl From<SessionError> for CadenceError {
    fn from(err: SessionError) -> Self {
        Self::Configuration(err.to_string())
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    symbols: BTreeMap<String, SymbolSession>,
    trading_date: Option<NaiveDate>,
}

/// In-memory state for every symbol in the session.
///
/// One `RwLock` guards all symbol data. Access goes through closures so the
/// hot path reads bars by reference under the lock instead of cloning them.
///
/// The `internal_*` methods ignore the `active` flag and are used by the
/// coordinator and its consumers. The `external_*` methods and
/// [`export`](Self::export) return nothing while the store is inactive, which
/// is how consumers outside the engine are held off while replay catches up.
#[derive(Debug)]
pub struct SessionStore {
    inner: RwLock<StoreInner>,
    active: AtomicBool,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Creates an empty, active store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            active: AtomicBool::new(true),
        }
    }

    /// Returns true if external reads are served.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Sets the active flag and returns the previous value.
    pub fn set_active(&self, active: bool) -> bool {
        self.active.swap(active, Ordering::AcqRel)
    }

    /// Returns the trading date of the current session.
    #[must_use]
    pub fn trading_date(&self) -> Option<NaiveDate> {
        self.inner.read().trading_date
    }

    /// Drops every symbol and starts a session for `trading_date`.
    pub fn clear(&self, trading_date: Option<NaiveDate>) {
        let mut inner = self.inner.write();
        let dropped = inner.symbols.len();
        inner.symbols.clear();
        inner.trading_date = trading_date;
        debug!(dropped, trading_date = ?trading_date, "Cleared session store");
    }

    /// Registers a symbol session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::DuplicateSymbol`] if the symbol is already
    /// registered.
    pub fn register(&self, session: SymbolSession) -> Result<(), SessionError> {
        let mut inner = self.inner.write();
        if inner.symbols.contains_key(session.symbol()) {
            return Err(SessionError::DuplicateSymbol(session.symbol().to_string()));
        }
        info!(
            symbol = %session.symbol(),
            base = %session.base_interval(),
            intervals = session.intervals().len(),
            "Registered symbol"
        );
        inner.symbols.insert(session.symbol().to_string(), session);
        Ok(())
    }

    /// Creates a minimal session for `symbol` streaming only `interval`.
    ///
    /// Returns false if the symbol is already registered.
    pub fn auto_provision(&self, symbol: &str, interval: Interval) -> bool {
        let mut inner = self.inner.write();
        if inner.symbols.contains_key(symbol) {
            return false;
        }
        inner.symbols.insert(
            symbol.to_string(),
            SymbolSession::new(symbol, interval, Registration::AutoProvisioned),
        );
        info!(symbol, %interval, "Auto-provisioned symbol");
        true
    }

    /// Removes a symbol and everything it owns.
    pub fn remove_symbol(&self, symbol: &str) -> Option<SymbolSession> {
        let removed = self.inner.write().symbols.remove(symbol);
        if removed.is_some() {
            info!(symbol, "Removed symbol");
        }
        removed
    }

    /// Returns true if `symbol` is registered.
    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        self.inner.read().symbols.contains_key(symbol)
    }

    /// Returns the registered symbols in order.
    #[must_use]
    pub fn symbols(&self) -> Vec<String> {
        self.inner.read().symbols.keys().cloned().collect()
    }

    /// Returns the number of registered symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().symbols.len()
    }

    /// Returns true if no symbol is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().symbols.is_empty()
    }

    /// Reads a symbol's session under the read lock, regardless of the
    /// active flag.
    pub fn internal_read<R>(
        &self,
        symbol: &str,
        f: impl FnOnce(&SymbolSession) -> R,
    ) -> Option<R> {
        self.inner.read().symbols.get(symbol).map(f)
    }

    /// Mutates a symbol's session under the write lock, regardless of the
    /// active flag.
    pub fn internal_write<R>(
        &self,
        symbol: &str,
        f: impl FnOnce(&mut SymbolSession) -> R,
    ) -> Option<R> {
        self.inner.write().symbols.get_mut(symbol).map(f)
    }

    /// Reads a symbol's session for a caller outside the engine.
    ///
    /// Returns `None` while the store is inactive.
    pub fn external_read<R>(
        &self,
        symbol: &str,
        f: impl FnOnce(&SymbolSession) -> R,
    ) -> Option<R> {
        if !self.is_active() {
            return None;
        }
        self.internal_read(symbol, f)
    }

    /// Exports the session.
    ///
    /// An inactive store yields an empty snapshot with `active = false` and
    /// leaves delta indices untouched.
    #[must_use]
    pub fn export(&self, mode: ExportMode) -> SessionSnapshot {
        if !self.is_active() {
            return SessionSnapshot::inactive(self.trading_date(), mode);
        }
        let symbols = match mode {
            ExportMode::Complete => {
                let inner = self.inner.read();
                inner.symbols.values().map(SymbolSnapshot::complete).collect()
            }
            ExportMode::Delta => {
                let mut inner = self.inner.write();
                inner.symbols.values_mut().map(SymbolSnapshot::delta).collect()
            }
        };
        SessionSnapshot {
            active: true,
            trading_date: self.trading_date(),
            mode,
            symbols,
        }
    }
}

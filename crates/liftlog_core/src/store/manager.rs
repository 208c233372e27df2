//! Connection lifecycle.
//!
//! There is one live [`Store`] per process. [`StoreManager`] opens it on
//! first use, hands out shared handles, and drops the handle when the
//! connection dies or an upgrade elsewhere asks for it to be released.

use super::Store;
use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use liftlog_storage::InMemoryBackend;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Where the managed store lives.
#[derive(Debug, Clone)]
pub enum StoreLocation {
    /// Shared in-memory bytes. A terminated connection is replaced by a
    /// fresh connection onto the same bytes on the next open.
    Memory(InMemoryBackend),
    /// A store directory.
    Directory(PathBuf),
}

/// What the startup hook shows while the store comes up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreStatus {
    /// Not open yet, or opening.
    Loading,
    /// Open and usable.
    Ready,
    /// Opening failed.
    Error(String),
}

enum Lifecycle {
    Closed,
    Opening,
    Open(Arc<Store>),
    Invalidated,
    Failed(String),
}

impl Lifecycle {
    fn name(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Opening => "opening",
            Self::Open(_) => "open",
            Self::Invalidated => "invalidated",
            Self::Failed(_) => "failed",
        }
    }
}

/// Owns the single store connection of the process.
///
/// # Example
///
/// ```rust
/// use liftlog_core::{Collection, StoreConfig, StoreLocation, StoreManager, StoreStatus};
/// use liftlog_storage::InMemoryBackend;
///
/// let manager = StoreManager::new(StoreLocation::Memory(InMemoryBackend::new()), StoreConfig::default());
/// assert_eq!(manager.status(), StoreStatus::Loading);
/// let count = manager.run(|store| store.read(|txn| txn.count(Collection::Sessions))).unwrap();
/// assert_eq!(count, 0);
/// assert_eq!(manager.status(), StoreStatus::Ready);
/// ```
pub struct StoreManager {
    location: StoreLocation,
    config: StoreConfig,
    state: Mutex<Lifecycle>,
    changed: Condvar,
}

impl StoreManager {
    /// A manager for the store at `location`. Nothing is opened yet.
    #[must_use]
    pub fn new(location: StoreLocation, config: StoreConfig) -> Self {
        Self {
            location,
            config,
            state: Mutex::new(Lifecycle::Closed),
            changed: Condvar::new(),
        }
    }

    /// Tri-state status for the startup hook.
    #[must_use]
    pub fn status(&self) -> StoreStatus {
        match &*self.state.lock() {
            Lifecycle::Open(store) if store.is_open() => StoreStatus::Ready,
            Lifecycle::Failed(message) => StoreStatus::Error(message.clone()),
            _ => StoreStatus::Loading,
        }
    }

    /// Returns the open store, opening it if needed.
    ///
    /// Idempotent: while open, every call returns the same handle. Callers
    /// arriving while another caller is opening wait for that open.
    ///
    /// # Errors
    ///
    /// Returns the open error; `status()` then reports it until the next
    /// successful open. A failed open is retried by the next call.
    pub fn open(&self) -> CoreResult<Arc<Store>> {
        let mut state = self.state.lock();
        loop {
            match &*state {
                Lifecycle::Open(store) if store.is_open() => return Ok(Arc::clone(store)),
                Lifecycle::Open(_) => {
                    warn!("cached store handle is dead; reopening");
                    *state = Lifecycle::Invalidated;
                }
                Lifecycle::Opening => self.changed.wait(&mut state),
                Lifecycle::Closed | Lifecycle::Invalidated | Lifecycle::Failed(_) => break,
            }
        }
        let previous = state.name();
        *state = Lifecycle::Opening;
        drop(state);

        let guard = OpeningGuard::new(self);
        let opened = self.open_store();
        guard.disarm();

        let mut state = self.state.lock();
        let result = match opened {
            Ok(store) => {
                let store = Arc::new(store);
                info!(from = previous, version = store.version(), "store ready");
                *state = Lifecycle::Open(Arc::clone(&store));
                Ok(store)
            }
            Err(e) => {
                error!(error = %e, "store failed to open");
                *state = Lifecycle::Failed(e.to_string());
                Err(e)
            }
        };
        self.changed.notify_all();
        result
    }

    fn open_store(&self) -> CoreResult<Store> {
        match &self.location {
            StoreLocation::Memory(backend) => {
                let connection = if backend.is_terminated() {
                    backend.reconnect()
                } else {
                    backend.clone()
                };
                Store::open_in_memory(connection, self.config.clone())
            }
            StoreLocation::Directory(path) => Store::open(path, self.config.clone()),
        }
    }

    /// Drops the cached handle so the next operation reopens.
    ///
    /// Handles already given out keep working until they are dropped.
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        if matches!(*state, Lifecycle::Open(_)) {
            *state = Lifecycle::Invalidated;
            info!("store handle invalidated");
        }
    }

    /// Closes the live connection so that an upgrade elsewhere can take
    /// the store. The next operation reopens it.
    pub fn handle_version_change(&self) -> CoreResult<()> {
        let mut state = self.state.lock();
        let Lifecycle::Open(store) = std::mem::replace(&mut *state, Lifecycle::Invalidated) else {
            return Ok(());
        };
        info!("version change requested elsewhere; closing store");
        store.close()
    }

    /// Closes the store; the manager can open it again later.
    pub fn close(&self) -> CoreResult<()> {
        let mut state = self.state.lock();
        let previous = std::mem::replace(&mut *state, Lifecycle::Closed);
        if let Lifecycle::Open(store) = previous {
            store.close()?;
        }
        Ok(())
    }

    /// Runs `f` against the open store.
    ///
    /// If `f` reports a lost connection the handle is invalidated so the
    /// next call reopens; the error is still returned.
    pub fn run<T, F>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&Store) -> CoreResult<T>,
    {
        let store = self.open()?;
        let result = f(&store);
        if let Err(e) = &result {
            if e.is_connection_lost() || matches!(e, CoreError::StoreClosed) {
                let mut state = self.state.lock();
                if let Lifecycle::Open(current) = &*state {
                    if Arc::ptr_eq(current, &store) {
                        *state = Lifecycle::Invalidated;
                        warn!(error = %e, "store connection dropped; handle invalidated");
                    }
                }
            }
        }
        result
    }
}

/// Moves an interrupted open from `Opening` to `Failed` so waiters wake.
struct OpeningGuard<'m> {
    manager: &'m StoreManager,
    armed: bool,
}

impl<'m> OpeningGuard<'m> {
    fn new(manager: &'m StoreManager) -> Self {
        Self { manager, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for OpeningGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.manager.state.lock();
        if matches!(*state, Lifecycle::Opening) {
            error!("store open was interrupted");
            *state = Lifecycle::Failed("store open was interrupted".to_string());
        }
        self.manager.changed.notify_all();
    }
}

impl fmt::Debug for StoreManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreManager")
            .field("location", &self.location)
            .field("state", &self.state.lock().name())
            .finish()
    }
}

//! Favorites synchronizer.
//!
//! Keeps two projections of the signed-in user's favorites in the query
//! cache: the id set used for membership tests and the full quote list,
//! newest favorite first. Toggling is optimistic: the id set flips before
//! the store is written, and a failed write restores the toggled quote's
//! membership from the snapshot taken when the toggle began.

use crate::cache::{QueryCache, QueryKey};
use crate::models::{Quote, QuoteId};
use crate::session::Session;
use crate::store::RemoteStore;
use crate::{Error, Result};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Root of every favorites cache key
pub fn favorites_key() -> QueryKey {
    QueryKey::new(["favorites"])
}

pub fn favorite_ids_key(user_id: &str) -> QueryKey {
    QueryKey::new(["favorites", "ids", user_id])
}

pub fn favorite_quotes_key(user_id: &str) -> QueryKey {
    QueryKey::new(["favorites", "list", user_id])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleAction {
    Added,
    Removed,
}

/// Coarse phase of a toggle, without its snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutationPhase {
    #[default]
    Idle,
    Pending,
    Committed,
    RolledBack,
}

/// The favorite ids as they were when a toggle began
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    ids: Vec<QuoteId>,
}

impl Snapshot {
    pub fn new(ids: Vec<QuoteId>) -> Self {
        Self { ids }
    }

    pub fn ids(&self) -> &[QuoteId] {
        &self.ids
    }

    pub fn contains(&self, quote_id: &str) -> bool {
        self.ids.iter().any(|id| id == quote_id)
    }

    /// Put `quote_id` back where the snapshot had it (or take it out again),
    /// leaving every other id in `current` untouched.
    ///
    /// When nothing else changed `current` since the snapshot was taken,
    /// the result equals the snapshot.
    pub fn restore_into(&self, quote_id: &str, mut current: Vec<QuoteId>) -> Vec<QuoteId> {
        let was_member = self.ids.iter().position(|id| id == quote_id);
        let is_member = current.iter().position(|id| id == quote_id);

        match (was_member, is_member) {
            (Some(index), None) => current.insert(index.min(current.len()), quote_id.to_string()),
            (None, Some(index)) => {
                current.remove(index);
            }
            _ => {}
        }

        current
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationState {
    Idle,
    Pending(Snapshot),
    Committed,
    RolledBack,
}

/// Lifecycle of one optimistic toggle:
/// `Idle -> Pending(snapshot) -> Committed | RolledBack`
#[derive(Debug)]
pub struct ToggleMutation {
    quote_id: QuoteId,
    state: MutationState,
}

impl ToggleMutation {
    pub fn new(quote_id: impl Into<QuoteId>) -> Self {
        Self {
            quote_id: quote_id.into(),
            state: MutationState::Idle,
        }
    }

    pub fn quote_id(&self) -> &str {
        &self.quote_id
    }

    pub fn state(&self) -> &MutationState {
        &self.state
    }

    pub fn phase(&self) -> MutationPhase {
        match self.state {
            MutationState::Idle => MutationPhase::Idle,
            MutationState::Pending(_) => MutationPhase::Pending,
            MutationState::Committed => MutationPhase::Committed,
            MutationState::RolledBack => MutationPhase::RolledBack,
        }
    }

    /// Enter `Pending` holding `snapshot`; returns the action the toggle implies
    pub fn begin(&mut self, snapshot: Snapshot) -> Result<ToggleAction> {
        if self.state != MutationState::Idle {
            return Err(Error::InvalidInput(format!(
                "Toggle for {} already started",
                self.quote_id
            )));
        }

        let action = if snapshot.contains(&self.quote_id) {
            ToggleAction::Removed
        } else {
            ToggleAction::Added
        };
        self.state = MutationState::Pending(snapshot);
        Ok(action)
    }

    pub fn commit(&mut self) {
        if matches!(self.state, MutationState::Pending(_)) {
            self.state = MutationState::Committed;
        }
    }

    /// Enter `RolledBack`, handing back the snapshot to restore from
    pub fn roll_back(&mut self) -> Option<Snapshot> {
        match std::mem::replace(&mut self.state, MutationState::RolledBack) {
            MutationState::Pending(snapshot) => Some(snapshot),
            previous => {
                self.state = previous;
                None
            }
        }
    }
}

/// Flip membership of `quote_id`; additions go to the end until the next
/// refresh brings the server's order.
fn toggled(mut ids: Vec<QuoteId>, quote_id: &str) -> Vec<QuoteId> {
    match ids.iter().position(|id| id == quote_id) {
        Some(index) => {
            ids.remove(index);
        }
        None => ids.push(quote_id.to_string()),
    }
    ids
}

struct Inner {
    store: Arc<dyn RemoteStore>,
    cache: QueryCache,
    session: Session,
    phases: Mutex<HashMap<QuoteId, MutationPhase>>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
    /// Bumped by every `clear`; toggles started before it must not touch state
    epoch: AtomicU64,
}

/// Owner of the favorites projections; clones share state
#[derive(Clone)]
pub struct FavoritesSynchronizer {
    inner: Arc<Inner>,
}

impl FavoritesSynchronizer {
    pub fn new(store: Arc<dyn RemoteStore>, cache: QueryCache, session: Session) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                cache,
                session,
                phases: Mutex::new(HashMap::new()),
                refresh_task: Mutex::new(None),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    fn read<T: DeserializeOwned + Default>(&self, key: &QueryKey) -> T {
        match self.inner.cache.get_data::<T>(key) {
            Ok(value) => value.unwrap_or_default(),
            Err(err) => {
                warn!(%key, error = %err, "unreadable cache entry");
                T::default()
            }
        }
    }

    /// Best-known favorite ids of the signed-in user
    pub fn favorite_ids(&self) -> HashSet<QuoteId> {
        match self.inner.session.current_user() {
            Some(user) => self
                .read::<Vec<QuoteId>>(&favorite_ids_key(&user.id))
                .into_iter()
                .collect(),
            None => HashSet::new(),
        }
    }

    pub fn is_favorited(&self, quote_id: &str) -> bool {
        self.favorite_ids().contains(quote_id)
    }

    /// Best-known favorite quotes of the signed-in user, newest favorite first
    pub fn favorite_quotes(&self) -> Vec<Quote> {
        match self.inner.session.current_user() {
            Some(user) => self.read(&favorite_quotes_key(&user.id)),
            None => Vec::new(),
        }
    }

    /// True while the first fetch of either projection is outstanding
    pub fn is_loading(&self) -> bool {
        let Some(user) = self.inner.session.current_user() else {
            return false;
        };

        [favorite_ids_key(&user.id), favorite_quotes_key(&user.id)]
            .iter()
            .any(|key| {
                let status = self.inner.cache.status(key);
                !status.has_data && status.is_fetching
            })
    }

    /// Phase of the latest toggle of `quote_id`
    pub fn mutation_state(&self, quote_id: &str) -> MutationPhase {
        self.inner
            .phases
            .lock()
            .get(quote_id)
            .copied()
            .unwrap_or_default()
    }

    fn set_phase(&self, quote_id: &str, phase: MutationPhase) {
        self.inner.phases.lock().insert(quote_id.to_string(), phase);
    }

    /// Populate both projections, served from cache while fresh
    pub async fn load(&self) -> Result<()> {
        self.sync_projections(false).await
    }

    /// Refetch both projections from the store
    pub async fn refresh(&self) -> Result<()> {
        self.sync_projections(true).await
    }

    async fn sync_projections(&self, force: bool) -> Result<()> {
        let Some(user) = self.inner.session.current_user() else {
            return Ok(());
        };

        let ids_key = favorite_ids_key(&user.id);
        let quotes_key = favorite_quotes_key(&user.id);

        let fetch_ids = || {
            let store = self.inner.store.clone();
            let user_id = user.id.clone();
            async move { store.list_favorite_ids(&user_id).await }
        };
        let fetch_quotes = || {
            let store = self.inner.store.clone();
            let user_id = user.id.clone();
            async move { store.list_favorite_quotes(&user_id).await }
        };

        let (ids, quotes) = if force {
            tokio::join!(
                self.inner.cache.refetch(&ids_key, fetch_ids),
                self.inner.cache.refetch(&quotes_key, fetch_quotes),
            )
        } else {
            tokio::join!(
                self.inner.cache.fetch(&ids_key, fetch_ids),
                self.inner.cache.fetch(&quotes_key, fetch_quotes),
            )
        };

        let ids = ids?;
        let quotes = quotes?;
        debug!(user_id = %user.id, ids = ids.len(), quotes = quotes.len(), "favorites synced");
        Ok(())
    }

    /// Favorite `quote_id` if it is not a favorite yet, unfavorite it otherwise.
    ///
    /// The id set changes immediately. On a failed write the change is
    /// undone and [`Error::RemoteWriteFailed`] is returned. Either way the
    /// favorites cache is invalidated and a background refresh scheduled.
    /// If the session changed while the write was in flight, the cleared
    /// projections are left alone.
    pub async fn toggle_favorite(&self, quote_id: &str) -> Result<ToggleAction> {
        let user = self.inner.session.require_user()?;
        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        let ids_key = favorite_ids_key(&user.id);

        // A read already in flight must not land on top of the optimistic value
        self.inner.cache.cancel_queries(&ids_key);

        let mut mutation = ToggleMutation::new(quote_id);
        let previous = self
            .inner
            .cache
            .update_data(&ids_key, |current: Option<Vec<QuoteId>>| {
                toggled(current.unwrap_or_default(), quote_id)
            })?;
        let action = mutation.begin(Snapshot::new(previous.unwrap_or_default()))?;
        self.set_phase(quote_id, mutation.phase());
        debug!(user_id = %user.id, quote_id, ?action, "optimistic toggle applied");

        let written = match action {
            ToggleAction::Added => self.inner.store.insert_favorite(&user.id, quote_id).await,
            ToggleAction::Removed => self.inner.store.delete_favorite(&user.id, quote_id).await,
        };

        // Signed out or switched user while the write was in flight: the
        // projections were cleared and must stay that way
        if !self.is_current(&user.id, epoch) {
            if self.inner.epoch.load(Ordering::SeqCst) == epoch {
                self.inner.phases.lock().remove(quote_id);
            }
            info!(user_id = %user.id, quote_id, ?action, ok = written.is_ok(), "toggle settled after session change");
            return match written {
                Ok(()) => Ok(action),
                Err(Error::RemoteWriteFailed(message)) => Err(Error::RemoteWriteFailed(message)),
                Err(other) => Err(Error::RemoteWriteFailed(other.to_string())),
            };
        }

        let outcome = match written {
            Ok(()) => {
                mutation.commit();
                info!(user_id = %user.id, quote_id, ?action, "favorite toggled");
                Ok(action)
            }
            Err(err) => {
                if let Some(snapshot) = mutation.roll_back() {
                    self.restore(&ids_key, quote_id, &snapshot);
                }
                warn!(user_id = %user.id, quote_id, ?action, error = %err, "favorite toggle rolled back");
                match err {
                    Error::RemoteWriteFailed(_) => Err(err),
                    other => Err(Error::RemoteWriteFailed(other.to_string())),
                }
            }
        };

        self.set_phase(quote_id, mutation.phase());
        self.settle();
        outcome
    }

    fn is_current(&self, user_id: &str, epoch: u64) -> bool {
        self.inner.epoch.load(Ordering::SeqCst) == epoch
            && self
                .inner
                .session
                .current_user()
                .is_some_and(|user| user.id == user_id)
    }

    fn restore(&self, ids_key: &QueryKey, quote_id: &str, snapshot: &Snapshot) {
        let restored = self
            .inner
            .cache
            .update_existing(ids_key, |current: Vec<QuoteId>| {
                snapshot.restore_into(quote_id, current)
            });

        match restored {
            Ok(true) => {}
            Ok(false) => debug!(%ids_key, quote_id, "favorites cleared, nothing to restore"),
            Err(err) => error!(%ids_key, quote_id, error = %err, "failed to restore favorites snapshot"),
        }
    }

    fn settle(&self) {
        self.inner.cache.invalidate(&favorites_key());
        self.spawn_refresh();
    }

    fn spawn_refresh(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no runtime, skipping background favorites refresh");
            return;
        };

        let this = self.clone();
        let task = runtime.spawn(async move {
            if let Err(err) = this.refresh().await {
                warn!(error = %err, "background favorites refresh failed");
            }
        });
        *self.inner.refresh_task.lock() = Some(task);
    }

    /// Wait for the latest background refresh to finish
    pub async fn wait_for_refresh(&self) {
        let task = self.inner.refresh_task.lock().take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                warn!(error = %err, "background favorites refresh panicked or was cancelled");
            }
        }
    }

    /// Drop both projections for every user
    pub fn clear(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.inner.cache.remove(&favorites_key());
        self.inner.phases.lock().clear();
        debug!("favorites cleared");
    }

    /// Clear the projections whenever the signed-in user signs out or changes.
    ///
    /// Runs until the returned handle is aborted. Returns `None` outside a
    /// tokio runtime.
    pub fn watch_session(&self) -> Option<JoinHandle<()>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no runtime, session changes will not clear favorites");
            return None;
        };

        let this = self.clone();
        let mut users = self.inner.session.subscribe();
        let mut current = users.borrow_and_update().as_ref().map(|user| user.id.clone());

        Some(runtime.spawn(async move {
            while users.changed().await.is_ok() {
                let next = users.borrow_and_update().as_ref().map(|user| user.id.clone());
                if current.is_some() && next != current {
                    this.clear();
                }
                current = next;
            }
        }))
    }
}

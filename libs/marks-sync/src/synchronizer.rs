//! The bookmark synchronizer: a local, ordered view of one owner's
//! bookmarks kept consistent with a [`RemoteStore`].
//!
//! State is published through a `watch` channel and only ever mutated with
//! `send_modify`, so no lock is held across a remote call. Results of a
//! fetch that started under a previous session are dropped, keyed by an
//! epoch that [`Synchronizer::switch_session`] bumps.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use marks_common::{bookmark, Bookmark, NewBookmark};
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::confirm::Confirmation;
use crate::error::{RemoteError, SyncError, SyncFailure, ADD_FAILED_MESSAGE};
use crate::session::Session;
use crate::store::{ChangeKind, ChangeNotice, RemoteStore, Subscription};
use crate::validate::{self, FieldError};

/// What to do when a change notification arrives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Re-fetch the whole list.
    #[default]
    Refetch,
    /// Apply the notice's row directly; re-fetch only when it carries none.
    Incremental,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncPhase {
    #[default]
    Uninitialized,
    Loading,
    Ready,
    Submitting,
}

/// The add-bookmark form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookmarkForm {
    pub title: String,
    pub url: String,
    pub title_error: Option<FieldError>,
    pub url_error: Option<FieldError>,
    pub submit_error: Option<String>,
}

/// A bookmark awaiting delete confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteTarget {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Default)]
pub struct SyncState {
    pub phase: SyncPhase,
    /// Newest first.
    pub bookmarks: Vec<Bookmark>,
    pub form: BookmarkForm,
    pub pending_delete: Confirmation<DeleteTarget>,
    pub last_error: Option<SyncFailure>,
}

impl SyncState {
    pub fn is_submitting(&self) -> bool {
        self.phase == SyncPhase::Submitting
    }
}

struct Shared {
    store: Arc<dyn RemoteStore>,
    session: RwLock<Session>,
    epoch: AtomicU64,
    policy: RefreshPolicy,
    state: watch::Sender<SyncState>,
}

impl Shared {
    /// Owner id and epoch, read together.
    fn identity(&self) -> (String, u64) {
        let session = self.session.read();
        (session.user_id.clone(), self.epoch.load(Ordering::SeqCst))
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    fn record_failure(&self, epoch: u64, err: &SyncError, failure: SyncFailure) {
        if !self.is_current(epoch) {
            return;
        }
        let failure = match err {
            SyncError::SessionExpired => SyncFailure::SessionExpired,
            _ => failure,
        };
        self.state.send_modify(|s| s.last_error = Some(failure));
    }

    async fn refresh(&self) -> Result<(), SyncError> {
        let (owner_id, epoch) = self.identity();

        self.state.send_modify(|s| {
            if s.phase != SyncPhase::Submitting {
                s.phase = SyncPhase::Loading;
            }
        });

        let result = self.store.select(&owner_id).await;
        if !self.is_current(epoch) {
            tracing::debug!(%owner_id, "discarding fetch for a previous session");
            return Err(SyncError::Superseded);
        }

        match result {
            Ok(mut bookmarks) => {
                bookmark::sort_newest_first(&mut bookmarks);
                tracing::debug!(%owner_id, count = bookmarks.len(), "bookmarks fetched");
                self.state.send_modify(|s| {
                    s.bookmarks = bookmarks;
                    if s.phase == SyncPhase::Loading {
                        s.phase = SyncPhase::Ready;
                    }
                    if s.last_error == Some(SyncFailure::Fetch) {
                        s.last_error = None;
                    }
                });
                Ok(())
            }
            Err(err) => {
                tracing::warn!(%owner_id, %err, "bookmark fetch failed, keeping cached list");
                let err = SyncError::from(err);
                self.state.send_modify(|s| {
                    if s.phase == SyncPhase::Loading {
                        s.phase = SyncPhase::Ready;
                    }
                });
                self.record_failure(epoch, &err, SyncFailure::Fetch);
                Err(err)
            }
        }
    }

    /// Patch the cache from a notice. Returns false when the notice carries
    /// too little to apply and a full fetch is needed.
    fn apply(&self, notice: ChangeNotice, owner_id: &str) -> bool {
        match (notice.kind, notice.row) {
            (ChangeKind::Delete, _) => {
                self.state
                    .send_modify(|s| s.bookmarks.retain(|b| b.id != notice.bookmark_id));
                true
            }
            (ChangeKind::Insert | ChangeKind::Update, Some(row)) if row.owner_id == owner_id => {
                self.state
                    .send_modify(|s| bookmark::upsert_ordered(&mut s.bookmarks, row));
                true
            }
            _ => false,
        }
    }

    async fn listen(self: Arc<Self>, mut subscription: Subscription, epoch: u64) {
        while let Some(notice) = subscription.next().await {
            if !self.is_current(epoch) {
                break;
            }
            tracing::debug!(kind = ?notice.kind, bookmark_id = %notice.bookmark_id, "change notice");

            let (owner_id, _) = self.identity();
            let applied = self.policy == RefreshPolicy::Incremental && self.apply(notice, &owner_id);
            if !applied {
                // Errors are already recorded on the state.
                let _ = self.refresh().await;
            }
        }
        subscription.unsubscribe();
        tracing::debug!("change listener stopped");
    }
}

/// Keeps one owner's bookmarks in sync with a remote store.
///
/// Dropping the synchronizer releases its subscription.
pub struct Synchronizer {
    shared: Arc<Shared>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Synchronizer {
    pub fn new(store: Arc<dyn RemoteStore>, session: Session) -> Self {
        Self::with_policy(store, session, RefreshPolicy::default())
    }

    pub fn with_policy(store: Arc<dyn RemoteStore>, session: Session, policy: RefreshPolicy) -> Self {
        let (state, _) = watch::channel(SyncState::default());
        Self {
            shared: Arc::new(Shared {
                store,
                session: RwLock::new(session),
                epoch: AtomicU64::new(0),
                policy,
                state,
            }),
            listener: Mutex::new(None),
        }
    }

    /// Receiver that observes every state change.
    pub fn watch(&self) -> watch::Receiver<SyncState> {
        self.shared.state.subscribe()
    }

    pub fn state(&self) -> SyncState {
        self.shared.state.borrow().clone()
    }

    pub fn session(&self) -> Session {
        self.shared.session.read().clone()
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.shared.policy
    }

    /// Replace the cache with a full fetch. On failure the previous cache is
    /// kept and [`SyncFailure::Fetch`] is flagged. Returns
    /// [`SyncError::Superseded`] when the session switched mid-fetch.
    pub async fn initialize(&self) -> Result<(), SyncError> {
        self.shared.refresh().await
    }

    /// Start listening for changes to the owner's bookmarks, replacing any
    /// earlier listener.
    pub async fn subscribe(&self) -> Result<(), SyncError> {
        self.teardown();

        let (owner_id, epoch) = self.shared.identity();
        let subscription = match self.shared.store.subscribe(&owner_id).await {
            Ok(subscription) => subscription,
            Err(err) => {
                tracing::warn!(%owner_id, %err, "change subscription failed");
                let err = SyncError::from(err);
                if err == SyncError::SessionExpired {
                    self.shared.record_failure(epoch, &err, SyncFailure::SessionExpired);
                }
                return Err(err);
            }
        };
        if !self.shared.is_current(epoch) {
            subscription.unsubscribe();
            return Ok(());
        }

        let handle = tokio::spawn(Arc::clone(&self.shared).listen(subscription, epoch));
        if let Some(previous) = self.listener.lock().replace(handle) {
            previous.abort();
        }
        tracing::debug!(%owner_id, "change listener started");
        Ok(())
    }

    pub fn is_subscribed(&self) -> bool {
        self.listener
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Cancel the change listener. Returns whether one was running.
    pub fn teardown(&self) -> bool {
        match self.listener.lock().take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Move to another identity: stop listening, clear the cache and ignore
    /// anything still in flight for the previous one.
    pub fn switch_session(&self, session: Session) {
        self.teardown();
        {
            let mut current = self.shared.session.write();
            tracing::debug!(from = %current.user_id, to = %session.user_id, "switching session");
            *current = session;
            self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        }
        self.shared.state.send_replace(SyncState::default());
    }

    pub fn set_title(&self, title: impl Into<String>) {
        let title = title.into();
        self.shared.state.send_modify(|s| {
            s.form.title = title;
            s.form.title_error = None;
        });
    }

    pub fn set_url(&self, url: impl Into<String>) {
        let url = url.into();
        self.shared.state.send_modify(|s| {
            s.form.url = url;
            s.form.url_error = None;
        });
    }

    /// Fill the form and submit it.
    pub async fn add_bookmark(&self, title: &str, url: &str) -> Result<Bookmark, SyncError> {
        self.shared.state.send_modify(|s| {
            if s.phase != SyncPhase::Submitting {
                s.form.title = title.to_string();
                s.form.url = url.to_string();
            }
        });
        self.submit().await
    }

    /// Validate the form and insert it. On success the form is cleared and
    /// the list re-fetched; on failure the inputs stay put.
    pub async fn submit(&self) -> Result<Bookmark, SyncError> {
        let mut outcome: Result<NewBookmark, SyncError> = Err(SyncError::Busy);
        self.shared.state.send_if_modified(|s| {
            if s.phase == SyncPhase::Submitting {
                return false;
            }
            s.form.submit_error = None;
            match validate::validate(&s.form.title, &s.form.url) {
                Ok(()) => {
                    s.form.title_error = None;
                    s.form.url_error = None;
                    s.phase = SyncPhase::Submitting;
                    outcome = Ok(NewBookmark {
                        title: s.form.title.trim().to_string(),
                        url: s.form.url.trim().to_string(),
                    });
                }
                Err(errors) => {
                    s.form.title_error = errors.title;
                    s.form.url_error = errors.url;
                    outcome = Err(SyncError::Validation(errors));
                }
            }
            true
        });
        let new = outcome?;

        let (owner_id, epoch) = self.shared.identity();
        let result = self.shared.store.insert(new, &owner_id).await;
        if !self.shared.is_current(epoch) {
            return result.map_err(SyncError::from);
        }

        match result {
            Ok(created) => {
                tracing::info!(%owner_id, bookmark_id = %created.id, "bookmark added");
                self.shared.state.send_modify(|s| {
                    s.form = BookmarkForm::default();
                    s.phase = SyncPhase::Ready;
                    if s.last_error == Some(SyncFailure::Add) {
                        s.last_error = None;
                    }
                });
                // A failed re-fetch is flagged on the state; the add itself succeeded.
                let _ = self.shared.refresh().await;
                Ok(created)
            }
            Err(err) => Err(self.fail_submit(err, epoch)),
        }
    }

    fn fail_submit(&self, err: RemoteError, epoch: u64) -> SyncError {
        tracing::warn!(%err, "bookmark insert failed");
        let err = SyncError::from(err);
        self.shared.state.send_modify(|s| {
            s.phase = SyncPhase::Ready;
            if err != SyncError::SessionExpired {
                s.form.submit_error = Some(ADD_FAILED_MESSAGE.to_string());
            }
        });
        self.shared.record_failure(epoch, &err, SyncFailure::Add);
        err
    }

    /// Record the intent to delete `id`. Nothing is sent to the store until
    /// [`confirm_delete`](Self::confirm_delete). Returns `None` when `id` is
    /// not in the cache.
    pub fn request_delete(&self, id: &str) -> Option<DeleteTarget> {
        let mut requested = None;
        self.shared.state.send_if_modified(|s| {
            let Some(found) = s.bookmarks.iter().find(|b| b.id == id) else {
                return false;
            };
            let target = DeleteTarget {
                id: found.id.clone(),
                title: found.title.clone(),
            };
            s.pending_delete.request(target.clone());
            requested = Some(target);
            true
        });
        requested
    }

    pub fn cancel_delete(&self) -> bool {
        let mut cancelled = false;
        self.shared.state.send_if_modified(|s| {
            cancelled = s.pending_delete.cancel();
            cancelled
        });
        cancelled
    }

    /// Delete the pending target, scoped to the current owner. The local
    /// entry is removed only after the store confirms. Returns the deleted
    /// target, or `None` when nothing was pending.
    pub async fn confirm_delete(&self) -> Result<Option<DeleteTarget>, SyncError> {
        let mut taken = None;
        self.shared.state.send_if_modified(|s| {
            taken = s.pending_delete.take();
            taken.is_some()
        });
        let Some(target) = taken else {
            return Ok(None);
        };

        let (owner_id, epoch) = self.shared.identity();
        match self.shared.store.delete(&target.id, &owner_id).await {
            Ok(()) => {
                tracing::info!(%owner_id, bookmark_id = %target.id, "bookmark deleted");
                if self.shared.is_current(epoch) {
                    self.shared.state.send_modify(|s| {
                        s.bookmarks.retain(|b| b.id != target.id);
                        if s.last_error == Some(SyncFailure::Delete) {
                            s.last_error = None;
                        }
                    });
                }
                Ok(Some(target))
            }
            Err(err) => {
                tracing::warn!(%owner_id, bookmark_id = %target.id, %err, "bookmark delete failed");
                let err = SyncError::from(err);
                self.shared.record_failure(epoch, &err, SyncFailure::Delete);
                Err(err)
            }
        }
    }

    /// Clear the error flag once presentation has shown it.
    pub fn dismiss_error(&self) {
        self.shared.state.send_if_modified(|s| s.last_error.take().is_some());
    }
}

impl Drop for Synchronizer {
    fn drop(&mut self) {
        self.teardown();
    }
}

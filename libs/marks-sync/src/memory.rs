//! In-process [`RemoteStore`] and [`SessionProvider`] with failure
//! injection and call counters.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use marks_common::id::{prefix, prefixed_ulid};
use marks_common::{bookmark, Bookmark, NewBookmark};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::RemoteError;
use crate::session::{Session, SessionProvider};
use crate::store::{ChangeNotice, RemoteStore, Subscription};

/// Store operations, for counting calls and injecting failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Select,
    Insert,
    Delete,
    Subscribe,
}

#[derive(Default)]
struct Tables {
    rows: Vec<Bookmark>,
    subscribers: Vec<(String, mpsc::Sender<ChangeNotice>)>,
    last_created: Option<DateTime<Utc>>,
}

impl Tables {
    /// Strictly increasing microsecond timestamps.
    fn next_created_at(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now().trunc_subsecs(6);
        if let Some(prev) = self.last_created {
            if now <= prev {
                now = prev + chrono::Duration::microseconds(1);
            }
        }
        self.last_created = Some(now);
        now
    }

    fn notify(&mut self, owner_id: &str, notice: &ChangeNotice) {
        self.subscribers.retain(|(_, tx)| !tx.is_closed());
        for (owner, tx) in &self.subscribers {
            if owner != owner_id {
                continue;
            }
            if let Err(err) = tx.try_send(notice.clone()) {
                tracing::warn!(%owner_id, %err, "dropping change notice");
            }
        }
    }
}

#[derive(Default)]
pub struct MemoryRemoteStore {
    tables: Mutex<Tables>,
    failures: Mutex<HashMap<StoreOp, RemoteError>>,
    calls: Mutex<HashMap<StoreOp, usize>>,
    latency: Mutex<Option<Duration>>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call to `op` fail with `error` until [`recover`](Self::recover).
    pub fn fail(&self, op: StoreOp, error: RemoteError) {
        self.failures.lock().insert(op, error);
    }

    pub fn recover(&self, op: StoreOp) {
        self.failures.lock().remove(&op);
    }

    /// Delay every call by `latency`, so tests can observe in-flight state.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    pub fn calls(&self, op: StoreOp) -> usize {
        self.calls.lock().get(&op).copied().unwrap_or(0)
    }

    /// Open subscriptions for `owner_id`.
    pub fn subscriber_count(&self, owner_id: &str) -> usize {
        self.tables
            .lock()
            .subscribers
            .iter()
            .filter(|(owner, tx)| owner == owner_id && !tx.is_closed())
            .count()
    }

    /// Deliver `notice` to `owner_id`'s subscribers without changing any row,
    /// as a duplicate or late notification would.
    pub fn notify(&self, owner_id: &str, notice: ChangeNotice) {
        self.tables.lock().notify(owner_id, &notice);
    }

    /// Every stored row, for assertions that bypass owner scoping.
    pub fn rows(&self) -> Vec<Bookmark> {
        self.tables.lock().rows.clone()
    }

    async fn enter(&self, op: StoreOp) -> Result<(), RemoteError> {
        *self.calls.lock().entry(op).or_insert(0) += 1;
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match self.failures.lock().get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn select(&self, owner_id: &str) -> Result<Vec<Bookmark>, RemoteError> {
        self.enter(StoreOp::Select).await?;
        let mut owned: Vec<Bookmark> = self
            .tables
            .lock()
            .rows
            .iter()
            .filter(|b| b.owner_id == owner_id)
            .cloned()
            .collect();
        bookmark::sort_newest_first(&mut owned);
        Ok(owned)
    }

    async fn insert(&self, new: NewBookmark, owner_id: &str) -> Result<Bookmark, RemoteError> {
        self.enter(StoreOp::Insert).await?;
        let mut tables = self.tables.lock();
        let created = Bookmark {
            id: prefixed_ulid(prefix::BOOKMARK),
            title: new.title,
            url: new.url,
            owner_id: owner_id.to_string(),
            created_at: tables.next_created_at(),
        };
        tables.rows.push(created.clone());
        tables.notify(owner_id, &ChangeNotice::inserted(created.clone()));
        Ok(created)
    }

    async fn delete(&self, id: &str, owner_id: &str) -> Result<(), RemoteError> {
        self.enter(StoreOp::Delete).await?;
        let mut tables = self.tables.lock();
        let before = tables.rows.len();
        tables
            .rows
            .retain(|b| !(b.id == id && b.owner_id == owner_id));
        if tables.rows.len() < before {
            tables.notify(owner_id, &ChangeNotice::deleted(id));
        }
        Ok(())
    }

    async fn subscribe(&self, owner_id: &str) -> Result<Subscription, RemoteError> {
        self.enter(StoreOp::Subscribe).await?;
        let (tx, subscription) = Subscription::channel();
        self.tables
            .lock()
            .subscribers
            .push((owner_id.to_string(), tx));
        Ok(subscription)
    }
}

/// A session provider holding one optional session.
#[derive(Default)]
pub struct MemorySessionProvider {
    session: Mutex<Option<Session>>,
    failure: Mutex<Option<RemoteError>>,
    sign_outs: AtomicUsize,
}

impl MemorySessionProvider {
    pub fn signed_in(session: Session) -> Self {
        Self {
            session: Mutex::new(Some(session)),
            ..Self::default()
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn set_session(&self, session: Option<Session>) {
        *self.session.lock() = session;
    }

    /// Fail every call with `error`, or stop failing with `None`.
    pub fn set_failure(&self, error: Option<RemoteError>) {
        *self.failure.lock() = error;
    }

    pub fn sign_out_calls(&self) -> usize {
        self.sign_outs.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), RemoteError> {
        match self.failure.lock().as_ref() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SessionProvider for MemorySessionProvider {
    async fn current_user(&self) -> Result<Option<Session>, RemoteError> {
        self.check()?;
        Ok(self.session.lock().clone())
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        *self.session.lock() = None;
        Ok(())
    }
}

use async_trait::async_trait;
use marks_common::{Bookmark, NewBookmark};
use tokio::sync::mpsc;

use crate::error::RemoteError;

/// Buffered notices per subscription before producers wait.
pub const SUBSCRIPTION_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    /// Changes were lost in transit; the whole list must be refetched.
    Resync,
}

/// One change to the subscribed owner's bookmarks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotice {
    pub kind: ChangeKind,
    pub bookmark_id: String,
    /// The row after the change, when the transport carries it.
    pub row: Option<Bookmark>,
}

impl ChangeNotice {
    pub fn inserted(row: Bookmark) -> Self {
        Self {
            kind: ChangeKind::Insert,
            bookmark_id: row.id.clone(),
            row: Some(row),
        }
    }

    pub fn deleted(bookmark_id: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Delete,
            bookmark_id: bookmark_id.into(),
            row: None,
        }
    }

    /// A notice naming no bookmark, carrying no row.
    pub fn resync() -> Self {
        Self {
            kind: ChangeKind::Resync,
            bookmark_id: String::new(),
            row: None,
        }
    }
}

/// Receiving end of a change stream.
///
/// Producers hold the matching `mpsc::Sender` and stop once it reports
/// closed, which happens on [`unsubscribe`](Self::unsubscribe) or drop.
#[derive(Debug)]
pub struct Subscription {
    changes: mpsc::Receiver<ChangeNotice>,
}

impl Subscription {
    pub fn channel() -> (mpsc::Sender<ChangeNotice>, Subscription) {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        (tx, Subscription { changes: rx })
    }

    /// Next notice, or `None` once the producer has gone away.
    pub async fn next(&mut self) -> Option<ChangeNotice> {
        self.changes.recv().await
    }

    pub fn unsubscribe(mut self) {
        self.changes.close();
    }
}

/// The authoritative bookmark store. Every call is scoped to one owner.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// The owner's bookmarks, newest first.
    async fn select(&self, owner_id: &str) -> Result<Vec<Bookmark>, RemoteError>;

    /// Persist a bookmark; the store assigns id and creation time.
    async fn insert(&self, bookmark: NewBookmark, owner_id: &str) -> Result<Bookmark, RemoteError>;

    /// Delete by id and owner. An absent row is success.
    async fn delete(&self, id: &str, owner_id: &str) -> Result<(), RemoteError>;

    /// Open a change stream filtered to `owner_id`.
    async fn subscribe(&self, owner_id: &str) -> Result<Subscription, RemoteError>;
}

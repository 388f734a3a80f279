//! Bookmark persistence: a PostgreSQL store and an in-memory store behind one trait.

use async_trait::async_trait;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use marks_common::id::{prefix, prefixed_ulid};
use marks_common::{bookmark, Bookmark};
use parking_lot::Mutex;

use crate::db::pool::DbPool;
use crate::db::schema::bookmarks;
use crate::error::ApiError;
use crate::models::bookmark::{BookmarkRow, NewBookmarkRow};

/// Owner-partitioned bookmark storage.
///
/// Every operation is scoped to `owner_id`; no method can read or remove
/// another owner's rows.
#[async_trait]
pub trait BookmarkStore: Send + Sync {
    /// All bookmarks of `owner_id`, newest first.
    async fn list(&self, owner_id: &str) -> Result<Vec<Bookmark>, ApiError>;

    /// Persist a bookmark, assigning its id and creation time.
    async fn insert(&self, owner_id: &str, title: &str, url: &str) -> Result<Bookmark, ApiError>;

    /// Remove the row matching both `id` and `owner_id`. Returns whether a
    /// row was removed; a missing row is not an error.
    async fn delete(&self, id: &str, owner_id: &str) -> Result<bool, ApiError>;
}

/// Hands out strictly increasing timestamps at microsecond precision, which
/// is what `timestamptz` stores.
#[derive(Default)]
struct MonotonicClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        let mut last = self.last.lock();
        let mut now = Utc::now().trunc_subsecs(6);
        if let Some(prev) = *last {
            if now <= prev {
                now = prev + Duration::microseconds(1);
            }
        }
        *last = Some(now);
        now
    }
}

// ---------------------------------------------------------------------------
// PostgreSQL
// ---------------------------------------------------------------------------

pub struct PgBookmarkStore {
    db: DbPool,
    clock: MonotonicClock,
}

impl PgBookmarkStore {
    pub fn new(db: DbPool) -> Self {
        Self {
            db,
            clock: MonotonicClock::default(),
        }
    }
}

#[async_trait]
impl BookmarkStore for PgBookmarkStore {
    async fn list(&self, owner_id: &str) -> Result<Vec<Bookmark>, ApiError> {
        let mut conn = self.db.get().await?;

        let rows: Vec<BookmarkRow> = bookmarks::table
            .filter(bookmarks::owner_id.eq(owner_id))
            .order((bookmarks::created_at.desc(), bookmarks::id.desc()))
            .select(BookmarkRow::as_select())
            .load(&mut conn)
            .await?;

        Ok(rows.into_iter().map(Bookmark::from).collect())
    }

    async fn insert(&self, owner_id: &str, title: &str, url: &str) -> Result<Bookmark, ApiError> {
        let mut conn = self.db.get().await?;
        let id = prefixed_ulid(prefix::BOOKMARK);

        let row: BookmarkRow = diesel::insert_into(bookmarks::table)
            .values(&NewBookmarkRow {
                id: &id,
                owner_id,
                title,
                url,
                created_at: self.clock.now(),
            })
            .returning(BookmarkRow::as_returning())
            .get_result(&mut conn)
            .await?;

        Ok(row.into())
    }

    async fn delete(&self, id: &str, owner_id: &str) -> Result<bool, ApiError> {
        let mut conn = self.db.get().await?;

        let removed = diesel::delete(
            bookmarks::table
                .filter(bookmarks::id.eq(id))
                .filter(bookmarks::owner_id.eq(owner_id)),
        )
        .execute(&mut conn)
        .await?;

        Ok(removed > 0)
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation (no DATABASE_URL / tests)
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryBookmarkStore {
    rows: Mutex<Vec<Bookmark>>,
    clock: MonotonicClock,
}

impl MemoryBookmarkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookmarkStore for MemoryBookmarkStore {
    async fn list(&self, owner_id: &str) -> Result<Vec<Bookmark>, ApiError> {
        let mut owned: Vec<Bookmark> = self
            .rows
            .lock()
            .iter()
            .filter(|b| b.owner_id == owner_id)
            .cloned()
            .collect();
        bookmark::sort_newest_first(&mut owned);
        Ok(owned)
    }

    async fn insert(&self, owner_id: &str, title: &str, url: &str) -> Result<Bookmark, ApiError> {
        let created = Bookmark {
            id: prefixed_ulid(prefix::BOOKMARK),
            title: title.to_string(),
            url: url.to_string(),
            owner_id: owner_id.to_string(),
            created_at: self.clock.now(),
        };
        self.rows.lock().push(created.clone());
        Ok(created)
    }

    async fn delete(&self, id: &str, owner_id: &str) -> Result<bool, ApiError> {
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|b| !(b.id == id && b.owner_id == owner_id));
        Ok(rows.len() < before)
    }
}

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A saved bookmark as it travels over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Bookmark {
    /// `bm_` prefixed ULID, assigned by the store.
    pub id: String,
    pub title: String,
    /// Stored verbatim; not guaranteed to be a valid URL.
    pub url: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
}

/// The caller-supplied half of a bookmark. The store assigns the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct NewBookmark {
    pub title: String,
    pub url: String,
}

/// Newest first, ties broken by id descending.
pub fn newest_first(a: &Bookmark, b: &Bookmark) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.id.cmp(&a.id))
}

/// Sort a list into canonical display order.
pub fn sort_newest_first(bookmarks: &mut [Bookmark]) {
    bookmarks.sort_by(newest_first);
}

/// Insert `bookmark` at its ordered position, replacing any entry with the
/// same id.
pub fn upsert_ordered(bookmarks: &mut Vec<Bookmark>, bookmark: Bookmark) {
    bookmarks.retain(|b| b.id != bookmark.id);
    let pos = bookmarks
        .iter()
        .position(|b| newest_first(&bookmark, b) != Ordering::Greater)
        .unwrap_or(bookmarks.len());
    bookmarks.insert(pos, bookmark);
}

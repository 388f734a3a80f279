use chrono::{DateTime, Utc};
use diesel::prelude::*;
use marks_common::Bookmark;

use crate::db::schema::bookmarks;

/// A bookmark row from the database.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = bookmarks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BookmarkRow {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl From<BookmarkRow> for Bookmark {
    fn from(row: BookmarkRow) -> Self {
        Bookmark {
            id: row.id,
            title: row.title,
            url: row.url,
            owner_id: row.owner_id,
            created_at: row.created_at,
        }
    }
}

/// Insertable struct for creating a new bookmark.
#[derive(Debug, Insertable)]
#[diesel(table_name = bookmarks)]
pub struct NewBookmarkRow<'a> {
    pub id: &'a str,
    pub owner_id: &'a str,
    pub title: &'a str,
    pub url: &'a str,
    pub created_at: DateTime<Utc>,
}

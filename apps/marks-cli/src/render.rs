//! Plain-text views of the synchronizer state.

use std::fmt::{Display, Write};

use chrono::{Local, TimeZone};
use marks_common::Bookmark;
use marks_sync::{BookmarkForm, DeleteTarget, Session, SyncState};

pub const APP_NAME: &str = "BookmarkApp";

pub const SIGN_IN_HINT: &str = "You are not signed in. Run `marks login <id-token>` to continue.";

const EMPTY_TITLE: &str = "No bookmarks yet";
const EMPTY_HINT: &str = "Add your first bookmark with `marks add --title <title> --url <url>`.";

pub fn header(session: &Session) -> String {
    format!("{APP_NAME} | {}", session.label())
}

/// Creation time as e.g. `Mar 4, 2025, 09:05 PM`.
pub fn created_at_in<Tz>(bookmark: &Bookmark, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    bookmark
        .created_at
        .with_timezone(tz)
        .format("%b %-d, %Y, %I:%M %p")
        .to_string()
}

pub fn card_in<Tz>(bookmark: &Bookmark, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!(
        "{}\n  {}\n  {}  [{}]",
        bookmark.title,
        bookmark.url,
        created_at_in(bookmark, tz),
        bookmark.id
    )
}

pub fn card(bookmark: &Bookmark) -> String {
    card_in(bookmark, &Local)
}

pub fn bookmark_list_in<Tz>(bookmarks: &[Bookmark], tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut out = format!("Your Bookmarks ({})\n", bookmarks.len());
    if bookmarks.is_empty() {
        let _ = write!(out, "\n{EMPTY_TITLE}\n{EMPTY_HINT}\n");
        return out;
    }
    for bookmark in bookmarks {
        let _ = write!(out, "\n{}\n", card_in(bookmark, tz));
    }
    out
}

/// The list section plus any error banner.
pub fn dashboard(state: &SyncState) -> String {
    let mut out = bookmark_list_in(&state.bookmarks, &Local);
    if let Some(failure) = state.last_error {
        let _ = write!(out, "\n! {}\n", failure.user_message());
    }
    out
}

pub fn delete_prompt(target: &DeleteTarget) -> String {
    format!("Are you sure you want to delete {} bookmark?", target.title)
}

/// One line per form problem, in field order.
pub fn form_errors(form: &BookmarkForm) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(err) = form.title_error {
        lines.push(format!("Title: {err}"));
    }
    if let Some(err) = form.url_error {
        lines.push(format!("URL: {err}"));
    }
    if let Some(err) = &form.submit_error {
        lines.push(err.clone());
    }
    lines
}

//! Client-side bookmark synchronization.
//!
//! A [`Synchronizer`] keeps a local, ordered view of one owner's bookmarks
//! consistent with a [`RemoteStore`], driven by the store's change
//! notifications. Transports live in [`http`] (the marks REST API and
//! gateway) and [`memory`] (in-process, for tests and demos).

pub mod confirm;
pub mod error;
pub mod http;
pub mod memory;
pub mod session;
pub mod store;
pub mod synchronizer;
pub mod validate;

pub use confirm::Confirmation;
pub use error::{RemoteError, SyncError, SyncFailure};
pub use session::{resolve_entry, Entry, Session, SessionProvider};
pub use store::{ChangeKind, ChangeNotice, RemoteStore, Subscription};
pub use synchronizer::{
    BookmarkForm, DeleteTarget, RefreshPolicy, SyncPhase, SyncState, Synchronizer,
};
pub use validate::{validate, validate_title, validate_url, FieldError, ValidationErrors};

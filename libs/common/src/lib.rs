pub mod api;
pub mod bookmark;
pub mod gateway;
pub mod id;

pub use bookmark::{Bookmark, NewBookmark};
pub use id::PrefixedId;

pub mod bookmarks;
pub mod kv;
pub mod pool;
pub mod schema;

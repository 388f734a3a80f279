//! Change notification gateway: a WebSocket that pushes bookmark events to
//! the sessions of the owner they belong to.

pub mod fanout;
pub mod handler;
pub mod server;
pub mod session;

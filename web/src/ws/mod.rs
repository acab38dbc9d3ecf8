//! WebSocket sessions: room membership and chat over one bidirectional connection.

pub mod handler;
pub(crate) mod protocol;

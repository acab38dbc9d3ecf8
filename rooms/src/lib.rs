//! Room-based sessions for bidirectional messaging.
//!
//! A session (one WebSocket connection) can be in many rooms at once, e.g. an
//! order room, a support chat room and an announcement tier. Broadcasts go to
//! every member of a room; `broadcast_except` leaves out the sender, who gets
//! a separate acknowledgement instead.
//!
//! Membership of a session is changed by the connection that owns it. A
//! failed write to a member is logged and skipped; the member stays until its
//! own connection leaves or disconnects, or until the periodic heartbeat finds
//! the connection gone and disconnects it.

pub mod registry;
pub mod room;
pub mod session;

pub use registry::{RoomMember, RoomRegistry, RoomSweepTask};
pub use room::{announcement_room, chat_room, order_room, room_kind, RoomKind, RoomState};
pub use session::{SessionHandle, SessionId};

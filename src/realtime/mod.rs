//! Push-based invalidation: one WebSocket per identity that tells the client
//! its gig list changed.

pub mod channel;
pub mod frame;

pub use channel::{ChangeCallback, ChannelStatus, RealtimeChannel, ws_url};
pub use frame::PushFrame;

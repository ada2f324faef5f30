//! Domain types for replydash
//!
//! Leaf types shared by the dashboard, the runner and strategies: typed ids,
//! result strengths and masks, events and final replies.

mod event;
mod id;
mod reply;
mod strength;

pub use event::{Event, EventPattern};
pub use id::{PacketId, RequestId, StrategyId, WorkerId};
pub use reply::{Delivered, MainReply, Reply};
pub use strength::{EventKind, ResultMask};

//! Subscription bookkeeping.
//!
//! The registry tracks each subscription through
//! `Initialized`, `Acknowledged` and `Cancelled`, the dispatcher routes
//! inbound frames to subscribers by id, and [`SubscriptionStream`] is what
//! callers hold.

mod dispatch;
mod registry;
mod stream;

pub use registry::SubscriptionState;
pub use stream::SubscriptionStream;

pub(crate) use dispatch::dispatch;
pub(crate) use registry::{SubscriptionHandler, SubscriptionRegistry};
pub(crate) use stream::ChannelHandler;

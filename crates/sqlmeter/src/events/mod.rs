//! Query-execution events and the bus that carries them.

mod bus;
mod event;

pub use bus::{EventBus, SharedEventBus, Subscriber, SubscriptionId};
pub use event::QueryEvent;

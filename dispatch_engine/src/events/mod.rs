//! Simple stateless pub-sub event handler
//!
//! Components of the system subscribe to engine events (an order was paid, a delivery moved, an escrow was released,
//! an alert was raised) and react to them. The handlers only see the event itself, never the engine's internal state.
mod channel;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::*;
pub use hooks::{EventHandlers, EventHooks, EventProducers};

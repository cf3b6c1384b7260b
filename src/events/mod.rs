//! Plan change events
//!
//! This module provides:
//! - `PlanMessage`: the `{operation, plan}` queue envelope
//! - `EventPublisher`: best-effort publishing port
//! - `NatsPublisher`: NATS transport (managed client, queue groups)
//! - `EventBus`: in-process broadcast fallback

mod bus;
pub mod nats;
mod types;

pub use bus::EventBus;
pub use nats::{connect_nats, subscribe_queue, NatsPublisher};
pub use types::{EventPublisher, PlanMessage, PlanOperation, PublishError};

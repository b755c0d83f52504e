//! # Sentinel Bus
//!
//! Typed publish/subscribe with priority delivery.
//!
//! ## Design Goals
//! - Four priority lanes; an event at priority p is delivered strictly
//!   before any queued event at p+1, FIFO within a lane.
//! - One bounded queue (4096 slots shared across lanes). Publishing into
//!   a full queue fails with backpressure unless the event is critical,
//!   in which case the lowest-priority queued event is evicted.
//! - Single cooperative consumer: the pump drains one batch at a time and
//!   invokes handlers sequentially. Slow handlers (> 50 ms) are reported,
//!   never killed.
//! - Registrations made while a batch is being delivered take effect on
//!   the next drain cycle.
//!
//! ## Lane Layout
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │ Lane 0  Critical ← consensus loss, lockdown, failure   │
//! ├────────────────────────────────────────────────────────┤
//! │ Lane 1  High     ← blocks, anomalies, recovery         │
//! ├────────────────────────────────────────────────────────┤
//! │ Lane 2  Normal   ← sensor + fusion traffic             │
//! ├────────────────────────────────────────────────────────┤
//! │ Lane 3  Low      ← diagnostics, housekeeping           │
//! └────────────────────────────────────────────────────────┘
//! ```

mod bus;
mod pump;
mod queue;

pub use bus::{BusError, BusStats, EventBus, StatsSnapshot};
pub use pump::{EventPump, SubscriberHandle, SubscriptionId};
pub use queue::{PriorityQueue, PushOutcome, QUEUE_CAPACITY};

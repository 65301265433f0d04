//! Herald runtime services.
//!
//! - [`AlertScheduler`]: periodic loop evaluating every enabled alert and
//!   handing triggered ones to the [`Notifier`].
//! - [`Notifier`]: turns a triggered alert into one queued delivery per
//!   webhook channel.
//! - [`EventEmitter`]: queues a [`TenantEvent`] for every webhook subscribed
//!   to its type.
//! - [`delivery`]: the HTTP sender and the worker loop draining the queue.

pub mod delivery;
pub mod emitter;
pub mod notifier;
pub mod scheduler;

pub use delivery::webhook::{WebhookError, WebhookSender};
pub use delivery::worker::{DeliveryConfig, DeliveryWorker};
pub use emitter::{EventEmitter, TenantEvent};
pub use notifier::{Notifier, TriggerRecord};
pub use scheduler::AlertScheduler;

//! Outbound webhook delivery.
//!
//! [`webhook::WebhookSender`] performs one signed POST; the
//! [`worker::DeliveryWorker`] drains the delivery queue and decides retries.

pub mod webhook;
pub mod worker;

//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods
//! that accept `&PgPool` as the first argument.

pub mod alert_repo;
pub mod delivery_queue_repo;
pub mod metric_sample_repo;
pub mod webhook_repo;

pub use alert_repo::AlertRepo;
pub use delivery_queue_repo::DeliveryQueueRepo;
pub use metric_sample_repo::MetricSampleRepo;
pub use webhook_repo::WebhookRepo;

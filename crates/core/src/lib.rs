//! Domain logic for the Herald notification pipeline.
//!
//! Nothing in this crate touches the database or the network. The `db`
//! crate maps rows onto these types and the `events` crate drives them.

pub mod alert;
pub mod alert_engine;
pub mod delivery;
pub mod error;
pub mod signing;
pub mod types;

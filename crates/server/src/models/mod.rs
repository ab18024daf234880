//! Domain models for the wallet web service.
//!
//! These are the three persisted entities. Rows decode straight into them via
//! `sqlx::FromRow`; the in-memory store builds them directly.

pub mod device_log;
pub mod pass;
pub mod registration;

pub use device_log::{DeviceLog, NewDeviceLog};
pub use pass::{NewPass, Pass};
pub use registration::{ChangedSerials, Registration, UpsertedRegistration};

//! Core types for the Wallet web service.
//!
//! This module provides type-safe wrappers for the protocol's domain concepts.

pub mod id;
pub mod log_level;
pub mod pass_key;
pub mod push_token;
pub mod unix_time;

pub use id::*;
pub use log_level::{LogLevel, LogLevelError};
pub use pass_key::PassKey;
pub use push_token::{PushToken, PushTokenError};
pub use unix_time::UnixTime;

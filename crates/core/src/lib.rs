//! Wallet Core - Shared types library.
//!
//! This crate provides the domain types used across all Wallet components:
//! - `server` - Apple Wallet web service (device registrations, pass delivery)
//! - `cli` - Command-line tools for migrations and pass management
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. This keeps it lightweight and allows it to be used
//! anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, push tokens, pass keys, timestamps
//! - [`merge`] - Recursive structural merge for pass data payloads

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod merge;
pub mod types;

pub use merge::merge_json;
pub use types::*;

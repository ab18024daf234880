//! Apple Wallet web service library.
//!
//! Implements the `PassKit` web service protocol (device registration,
//! change detection, pass delivery, device logs) plus pass administration
//! endpoints that fan out push wake-ups to registered devices.
//!
//! The binary in `main.rs` wires configuration, storage and telemetry around
//! [`routes::rate_limited_router`]; tests drive [`routes::router`] directly.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

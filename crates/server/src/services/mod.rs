//! Services behind the protocol handlers.
//!
//! # Services
//!
//! - `push` - Wake-up delivery to a single device
//! - `dispatcher` - Fan-out of wake-ups to every device registered for a pass
//! - `outbox` - Background queue that runs broadcasts off the request path
//! - `pass_generator` - Rendering stored passes into the files devices download

pub mod dispatcher;
pub mod outbox;
pub mod pass_generator;
pub mod push;

pub use dispatcher::{BroadcastReport, NotificationDispatcher};
pub use outbox::{NotificationOutbox, RetryPolicy};
pub use pass_generator::{
    CachedPassGenerator, GenerateError, PassGenerator, RemotePassGenerator, UnsignedPassGenerator,
};
pub use push::{LogPushSender, PushError, PushSender, RelayPushSender, sender_for};

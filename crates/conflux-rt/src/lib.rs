// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Conflux runtime library.
//!
//! Thread-backed primitives the pipeline combinators are built from:
//! - cancel: shared, monotonic cancellation tokens with deadlines
//! - channel: rendezvous channels and the `Stream` conduit
//! - spawn: named task threads with panic capture and join-all
//! - config: process-wide thread settings
//! - timeout: deadline and parent watchers behind derived tokens

pub mod cancel;
pub mod channel;
pub mod config;
pub mod spawn;
mod timeout;

pub use cancel::{CancelReason, CancelToken};
pub use channel::{unbuffered, Receiver, RecvError, SendError, Sender, Stream, TryRecvError};
pub use config::{ConfigError, RuntimeConfig};
pub use spawn::{spawn_task, JoinError, TaskHandle, TaskSet};

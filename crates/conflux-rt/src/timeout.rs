// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Deadlines and parent propagation for cancel tokens.
//!
//! One watcher thread per derived or deadline-carrying token races the
//! parent's `done` channel against a one-shot timer. The watcher holds only
//! a weak reference to the token it guards and exits as soon as that token
//! is cancelled or dropped.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{self as channel, select};
use tracing::error;

use crate::cancel::{CancelReason, CancelToken};

pub(crate) fn watch(parent: Option<CancelToken>, token: &CancelToken) {
    let deadline = token.deadline();
    if parent.is_none() && deadline.is_none() {
        return;
    }

    let guarded = Arc::downgrade(&token.inner);
    let own_done = token.done().clone();

    let spawned = thread::Builder::new()
        .name("conflux-watch".to_string())
        .spawn(move || {
            let parent_done = parent
                .as_ref()
                .map(|p| p.done().clone())
                .unwrap_or_else(channel::never);
            let timer = deadline.map(channel::at).unwrap_or_else(channel::never);

            let reason = select! {
                recv(own_done) -> _ => return,
                recv(parent_done) -> _ => parent
                    .as_ref()
                    .and_then(CancelToken::reason)
                    .unwrap_or(CancelReason::Cancelled),
                recv(timer) -> _ => CancelReason::DeadlineExceeded,
            };

            if let Some(inner) = guarded.upgrade() {
                inner.cancel_with(reason);
            }
        });

    if let Err(err) = spawned {
        // Without a watcher the deadline or parent link would never fire.
        error!(%err, "failed to spawn cancel watcher; cancelling token");
        token.cancel_with(CancelReason::TaskFailed);
    }
}

// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Cooperative cancellation.
//!
//! A `CancelToken` is a shared handle: clones observe the same state. The
//! reason is written once and never reverts. Blocking waits race against
//! `done()`, a channel that disconnects at the moment of cancellation.

use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use crossbeam_channel::{self as channel, Receiver, Sender};
use tracing::debug;

use crate::timeout;

/// Why a token was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// `cancel()` was called on this token or an ancestor.
    Cancelled,
    /// The token's (or an ancestor's) deadline passed.
    DeadlineExceeded,
    /// A pipeline task panicked or could not be spawned.
    TaskFailed,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Cancelled => write!(f, "pipeline cancelled"),
            CancelReason::DeadlineExceeded => write!(f, "pipeline deadline exceeded"),
            CancelReason::TaskFailed => write!(f, "pipeline task failed"),
        }
    }
}

pub(crate) struct Inner {
    reason: OnceLock<CancelReason>,
    // Dropped on cancel; every clone of `done_rx` then reports disconnection.
    done_tx: Mutex<Option<Sender<()>>>,
    pub(crate) done_rx: Receiver<()>,
    deadline: Option<Instant>,
}

impl Inner {
    fn new(deadline: Option<Instant>) -> Self {
        let (tx, rx) = channel::bounded(0);
        Self {
            reason: OnceLock::new(),
            done_tx: Mutex::new(Some(tx)),
            done_rx: rx,
            deadline,
        }
    }

    pub(crate) fn cancel_with(&self, reason: CancelReason) -> bool {
        if self.reason.set(reason).is_err() {
            return false;
        }
        debug!(%reason, "token cancelled");
        // A poisoned lock still holds a valid Option; recover it.
        let mut guard = match self.done_tx.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.take();
        true
    }
}

/// Cancellation token shared by every task of one pipeline run.
///
/// Cloning is cheap and yields a handle to the same token.
#[derive(Clone)]
pub struct CancelToken {
    pub(crate) inner: Arc<Inner>,
}

impl CancelToken {
    /// A fresh root token with no deadline.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::new(None)),
        }
    }

    /// A root token that cancels itself with `DeadlineExceeded` at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        let token = Self {
            inner: Arc::new(Inner::new(Some(deadline))),
        };
        timeout::watch(None, &token);
        token
    }

    /// A root token that cancels itself after `duration`.
    pub fn with_timeout(duration: Duration) -> Self {
        Self::with_deadline(Instant::now() + duration)
    }

    /// Derive a token that is cancelled whenever `self` is.
    ///
    /// Cancelling the child never touches the parent.
    pub fn child(&self) -> Self {
        self.derive(self.deadline())
    }

    /// Derive a child whose deadline is the earlier of `deadline` and the
    /// parent's own.
    pub fn child_with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline() {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };
        self.derive(Some(deadline))
    }

    pub fn child_with_timeout(&self, duration: Duration) -> Self {
        self.child_with_deadline(Instant::now() + duration)
    }

    fn derive(&self, deadline: Option<Instant>) -> Self {
        let child = Self {
            inner: Arc::new(Inner::new(deadline)),
        };
        if let Some(reason) = self.reason() {
            child.inner.cancel_with(reason);
        } else {
            timeout::watch(Some(self.clone()), &child);
        }
        child
    }

    /// Set the cancellation flag. Returns `false` if already cancelled.
    pub fn cancel(&self) -> bool {
        self.inner.cancel_with(CancelReason::Cancelled)
    }

    pub(crate) fn cancel_with(&self, reason: CancelReason) -> bool {
        self.inner.cancel_with(reason)
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.reason.get().is_some()
    }

    /// The reason recorded by the first cancellation, if any.
    pub fn reason(&self) -> Option<CancelReason> {
        self.inner.reason.get().copied()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Channel that disconnects once the token is cancelled. Never carries
    /// a value; use it as a `select!` arm.
    pub fn done(&self) -> &Receiver<()> {
        &self.inner.done_rx
    }

    /// Block until the token is cancelled.
    pub fn wait(&self) -> CancelReason {
        let _ = self.inner.done_rx.recv();
        self.reason().unwrap_or(CancelReason::Cancelled)
    }

    /// Block until cancelled or `duration` elapses. Returns the reason if
    /// the token was cancelled in time.
    pub fn wait_timeout(&self, duration: Duration) -> Option<CancelReason> {
        match self.inner.done_rx.recv_timeout(duration) {
            Err(channel::RecvTimeoutError::Timeout) => None,
            _ => self.reason(),
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("reason", &self.reason())
            .field("deadline", &self.inner.deadline)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_sets_flag() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.cancel());
        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some(CancelReason::Cancelled));
    }

    #[test]
    fn cancel_is_idempotent_and_keeps_first_reason() {
        let token = CancelToken::new();
        assert!(token.cancel_with(CancelReason::TaskFailed));
        assert!(!token.cancel());
        assert_eq!(token.reason(), Some(CancelReason::TaskFailed));
    }

    #[test]
    fn clones_share_state() {
        let token = CancelToken::new();
        let other = token.clone();
        other.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn done_disconnects_on_cancel() {
        let token = CancelToken::new();
        assert!(token.done().try_recv().is_err());
        let waiter = {
            let token = token.clone();
            std::thread::spawn(move || token.wait())
        };
        std::thread::sleep(Duration::from_millis(10));
        token.cancel();
        assert_eq!(waiter.join().unwrap(), CancelReason::Cancelled);
    }

    #[test]
    fn wait_timeout_expires_without_cancel() {
        let token = CancelToken::new();
        assert_eq!(token.wait_timeout(Duration::from_millis(10)), None);
    }

    #[test]
    fn deadline_cancels() {
        let token = CancelToken::with_timeout(Duration::from_millis(20));
        assert!(!token.is_cancelled());
        assert_eq!(
            token.wait_timeout(Duration::from_secs(5)),
            Some(CancelReason::DeadlineExceeded)
        );
    }

    #[test]
    fn child_follows_parent() {
        let parent = CancelToken::new();
        let child = parent.child();
        parent.cancel();
        assert_eq!(
            child.wait_timeout(Duration::from_secs(5)),
            Some(CancelReason::Cancelled)
        );
    }

    #[test]
    fn child_cancel_leaves_parent() {
        let parent = CancelToken::new();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn child_of_cancelled_parent_starts_cancelled() {
        let parent = CancelToken::new();
        parent.cancel_with(CancelReason::DeadlineExceeded);
        let child = parent.child();
        assert_eq!(child.reason(), Some(CancelReason::DeadlineExceeded));
    }

    #[test]
    fn child_deadline_never_exceeds_parent() {
        let parent = CancelToken::with_timeout(Duration::from_millis(20));
        let child = parent.child_with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());
        assert_eq!(
            child.wait_timeout(Duration::from_secs(5)),
            Some(CancelReason::DeadlineExceeded)
        );
    }
}

// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Rendezvous channels and the `Stream` conduit.
//!
//! Every channel has capacity zero: a send completes only when a receiver
//! takes the value. Blocking operations that take a token race against its
//! cancellation. A channel closes when its last `Sender` is dropped.

use std::time::Duration;

use crossbeam_channel::{self as cb, select, Select};
use thiserror::Error;

use crate::cancel::CancelToken;
use crate::spawn::{JoinError, TaskHandle, TaskSet};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError<T> {
    /// All receivers dropped.
    #[error("sending on a closed stream")]
    Closed(T),
    /// The token was cancelled before a receiver took the value.
    #[error("send interrupted by cancellation")]
    Cancelled(T),
}

impl<T> SendError<T> {
    pub fn into_inner(self) -> T {
        match self {
            SendError::Closed(v) | SendError::Cancelled(v) => v,
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RecvError {
    /// All senders dropped.
    #[error("stream closed")]
    Closed,
    #[error("receive interrupted by cancellation")]
    Cancelled,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    /// No sender is ready to hand off right now.
    #[error("no value ready")]
    Empty,
    #[error("stream closed")]
    Closed,
}

/// Create an unbuffered (rendezvous) channel.
pub fn unbuffered<T>() -> (Sender<T>, Receiver<T>) {
    let (tx, rx) = cb::bounded(0);
    (Sender { inner: tx }, Receiver { inner: rx })
}

/// Sending half. Cloning adds a producer; the channel closes when the last
/// clone is dropped.
pub struct Sender<T> {
    inner: cb::Sender<T>,
}

impl<T> Sender<T> {
    /// Hand `val` to a receiver, or give it back if the stream closed or
    /// `token` was cancelled first.
    pub fn send(&self, token: &CancelToken, val: T) -> Result<(), SendError<T>> {
        if token.is_cancelled() {
            return Err(SendError::Cancelled(val));
        }

        let mut sel = Select::new();
        let send_idx = sel.send(&self.inner);
        let cancel_idx = sel.recv(token.done());
        let oper = sel.select();

        if oper.index() == send_idx {
            oper.send(&self.inner, val)
                .map_err(|e| SendError::Closed(e.into_inner()))
        } else {
            debug_assert_eq!(oper.index(), cancel_idx);
            let _ = oper.recv(token.done());
            Err(SendError::Cancelled(val))
        }
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Sender {
            inner: self.inner.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender").finish_non_exhaustive()
    }
}

/// Receiving half. Clones share one queue: each value reaches exactly one
/// of them.
pub struct Receiver<T> {
    inner: cb::Receiver<T>,
}

impl<T> Receiver<T> {
    /// Blocking receive, ignoring cancellation.
    pub fn recv(&self) -> Result<T, RecvError> {
        self.inner.recv().map_err(|_| RecvError::Closed)
    }

    /// Blocking receive that gives up once `token` is cancelled.
    pub fn recv_until(&self, token: &CancelToken) -> Result<T, RecvError> {
        if token.is_cancelled() {
            return Err(RecvError::Cancelled);
        }
        select! {
            recv(self.inner) -> msg => msg.map_err(|_| RecvError::Closed),
            recv(token.done()) -> _ => Err(RecvError::Cancelled),
        }
    }

    /// Non-blocking receive attempt.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        self.inner.try_recv().map_err(|e| match e {
            cb::TryRecvError::Empty => TryRecvError::Empty,
            cb::TryRecvError::Disconnected => TryRecvError::Closed,
        })
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, TryRecvError> {
        self.inner.recv_timeout(timeout).map_err(|e| match e {
            cb::RecvTimeoutError::Timeout => TryRecvError::Empty,
            cb::RecvTimeoutError::Disconnected => TryRecvError::Closed,
        })
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Receiver {
            inner: self.inner.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver").finish_non_exhaustive()
    }
}

/// A closable conduit of `T` together with the tasks feeding it.
///
/// Dropping a `Stream` disconnects its producer; the producer's next send
/// fails and it exits. `join` and `drain` also wait for every upstream task.
#[derive(Debug)]
pub struct Stream<T> {
    rx: Receiver<T>,
    tasks: TaskSet,
}

impl<T> Stream<T> {
    pub fn new(rx: Receiver<T>, tasks: TaskSet) -> Self {
        Self { rx, tasks }
    }

    /// An already-closed stream with no producer.
    pub fn empty() -> Self {
        let (_, rx) = unbuffered();
        Self::new(rx, TaskSet::new())
    }

    /// Split into the receiving end and the upstream tasks, for a stage
    /// that consumes this stream and takes over its join duty.
    pub fn into_parts(self) -> (Receiver<T>, TaskSet) {
        (self.rx, self.tasks)
    }

    /// Record a task whose exit this stream's consumer should wait for.
    pub fn attach(&mut self, task: TaskHandle) {
        self.tasks.push(task);
    }

    pub fn adopt(&mut self, tasks: TaskSet) {
        self.tasks.extend(tasks);
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn recv(&self) -> Result<T, RecvError> {
        self.rx.recv()
    }

    pub fn recv_until(&self, token: &CancelToken) -> Result<T, RecvError> {
        self.rx.recv_until(token)
    }

    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        self.rx.try_recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, TryRecvError> {
        self.rx.recv_timeout(timeout)
    }

    /// Stop consuming and wait for every upstream task to exit.
    pub fn join(self) -> Result<(), JoinError> {
        let (rx, tasks) = self.into_parts();
        drop(rx);
        tasks.join_all()
    }

    /// Consume every remaining value, then join.
    pub fn drain(mut self) -> Result<Vec<T>, JoinError> {
        let values: Vec<T> = self.by_ref().collect();
        self.join()?;
        Ok(values)
    }
}

impl<T> Iterator for Stream<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.rx.recv().ok()
    }
}

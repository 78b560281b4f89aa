// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! One-to-one transforms and the bounded `Take` consumer.

use std::sync::Arc;

use conflux_rt::{spawn_task, unbuffered, CancelToken, Receiver, Stream, TaskSet};
use tracing::debug;

use crate::combinator::Combinator;

/// Applies `f` to every element, preserving order.
pub struct Stage<F> {
    f: Arc<F>,
    name: &'static str,
}

pub fn stage<I, O, F>(f: F) -> Stage<F>
where
    F: Fn(&CancelToken, I) -> O + Send + Sync + 'static,
{
    Stage {
        f: Arc::new(f),
        name: "stage",
    }
}

impl<F> Stage<F> {
    /// Name used for the task thread (`{thread_name}-{name}`).
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

impl<F> Clone for Stage<F> {
    fn clone(&self) -> Self {
        Self {
            f: self.f.clone(),
            name: self.name,
        }
    }
}

impl<I, O, F> Combinator<I, O> for Stage<F>
where
    F: Fn(&CancelToken, I) -> O + Send + Sync + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    fn run(&self, token: &CancelToken, input: Stream<I>) -> Stream<O> {
        let (rx, upstream) = input.into_parts();
        let mut out = spawn_transform(self.name, token, rx, self.f.clone());
        out.adopt(upstream);
        out
    }
}

/// Spawn one task that maps `rx` through `f`. Shared by `Stage` and the
/// workers of `FanStage`, which pass clones of one receiver.
pub(crate) fn spawn_transform<I, O, F>(
    name: &str,
    token: &CancelToken,
    rx: Receiver<I>,
    f: Arc<F>,
) -> Stream<O>
where
    F: Fn(&CancelToken, I) -> O + Send + Sync + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    let (tx, out_rx) = unbuffered();
    let t = token.clone();

    let task = spawn_task(name, token, move || {
        let mut forwarded = 0usize;
        while let Ok(item) = rx.recv_until(&t) {
            let result = f(&t, item);
            if tx.send(&t, result).is_err() {
                break;
            }
            forwarded += 1;
        }
        debug!(forwarded, cancelled = t.is_cancelled(), "transform finished");
    });

    let mut out = Stream::new(out_rx, TaskSet::new());
    out.attach(task);
    out
}

/// Forwards the first `n` elements, then closes and abandons its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Take {
    n: usize,
}

pub fn take(n: usize) -> Take {
    Take { n }
}

impl Take {
    pub fn limit(&self) -> usize {
        self.n
    }
}

impl<T> Combinator<T, T> for Take
where
    T: Send + 'static,
{
    fn run(&self, token: &CancelToken, input: Stream<T>) -> Stream<T> {
        let (rx, upstream) = input.into_parts();
        let (tx, out_rx) = unbuffered();
        let t = token.clone();
        let n = self.n;

        let task = spawn_task("take", token, move || {
            let mut forwarded = 0usize;
            while forwarded < n {
                let Ok(item) = rx.recv_until(&t) else {
                    break;
                };
                if tx.send(&t, item).is_err() {
                    break;
                }
                forwarded += 1;
            }
            debug!(forwarded, limit = n, "take finished");
            // Dropping `rx` here disconnects the upstream producer.
        });

        let mut out = Stream::new(out_rx, upstream);
        out.attach(task);
        out
    }
}

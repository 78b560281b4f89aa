// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Finite and cyclic sources.

use std::sync::Arc;

use conflux_rt::{spawn_task, unbuffered, CancelToken, Stream, TaskSet};
use tracing::debug;

use crate::combinator::{Combinator, Source};

/// Emits a fixed list once, then closes.
#[derive(Debug, Clone)]
pub struct Generate<T> {
    values: Arc<[T]>,
}

/// Emits a fixed list over and over until cancelled or abandoned.
#[derive(Debug, Clone)]
pub struct Repeat<T> {
    values: Arc<[T]>,
}

pub fn generate<T>(values: impl IntoIterator<Item = T>) -> Generate<T> {
    Generate {
        values: values.into_iter().collect(),
    }
}

/// An empty list produces a stream that closes immediately.
pub fn repeat<T>(values: impl IntoIterator<Item = T>) -> Repeat<T> {
    Repeat {
        values: values.into_iter().collect(),
    }
}

impl<T> Source<T> for Generate<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, token: &CancelToken) -> Stream<T> {
        emit("generate", token, self.values.clone(), false)
    }
}

impl<T> Source<T> for Repeat<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, token: &CancelToken) -> Stream<T> {
        emit("repeat", token, self.values.clone(), true)
    }
}

// As combinators, sources drop their input and keep its tasks, so they can
// head a chain fed with `Stream::empty()`.
impl<T> Combinator<T, T> for Generate<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn run(&self, token: &CancelToken, input: Stream<T>) -> Stream<T> {
        replace_input(self.open(token), input)
    }
}

impl<T> Combinator<T, T> for Repeat<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn run(&self, token: &CancelToken, input: Stream<T>) -> Stream<T> {
        replace_input(self.open(token), input)
    }
}

fn replace_input<T>(mut output: Stream<T>, input: Stream<T>) -> Stream<T> {
    let (rx, upstream) = input.into_parts();
    drop(rx);
    output.adopt(upstream);
    output
}

fn emit<T>(stage: &str, token: &CancelToken, values: Arc<[T]>, cycle: bool) -> Stream<T>
where
    T: Clone + Send + Sync + 'static,
{
    let (tx, rx) = unbuffered();
    let t = token.clone();

    let task = spawn_task(stage, token, move || {
        let mut sent = 0usize;
        'emit: loop {
            for value in values.iter() {
                if tx.send(&t, value.clone()).is_err() {
                    break 'emit;
                }
                sent += 1;
            }
            if !cycle || values.is_empty() {
                break;
            }
        }
        debug!(sent, cancelled = t.is_cancelled(), "source finished");
    });

    let mut out = Stream::new(rx, TaskSet::new());
    out.attach(task);
    out
}

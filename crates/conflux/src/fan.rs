// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Worker pools and merging.
//!
//! `FanStage` splits one input across `n` transform workers; `fan_in`
//! merges streams as values arrive; `fan_in_ordered` merges by strict
//! round-robin.

use std::num::NonZeroUsize;
use std::sync::Arc;

use conflux_rt::{
    spawn_task, unbuffered, CancelToken, Receiver, RecvError, RuntimeConfig, Sender, Stream,
    TaskSet,
};
use tracing::debug;

use crate::combinator::Combinator;
use crate::stage::spawn_transform;

/// Runs `f` on `workers` concurrent tasks that share one input.
///
/// Each input element is taken by exactly one worker; outputs are merged
/// with [`fan_in`], so their order across workers is unspecified. There is
/// no fairness guarantee between workers: one may process every element
/// while another processes none.
pub struct FanStage<F> {
    workers: NonZeroUsize,
    f: Arc<F>,
    name: &'static str,
}

pub fn fan_stage<I, O, F>(workers: NonZeroUsize, f: F) -> FanStage<F>
where
    F: Fn(&CancelToken, I) -> O + Send + Sync + 'static,
{
    FanStage {
        workers,
        f: Arc::new(f),
        name: "fan-worker",
    }
}

/// A worker pool sized by [`RuntimeConfig::default_workers`].
pub fn fan_stage_auto<I, O, F>(f: F) -> FanStage<F>
where
    F: Fn(&CancelToken, I) -> O + Send + Sync + 'static,
{
    fan_stage(RuntimeConfig::current().default_workers, f)
}

impl<F> FanStage<F> {
    pub fn workers(&self) -> NonZeroUsize {
        self.workers
    }

    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

impl<I, O, F> Combinator<I, O> for FanStage<F>
where
    F: Fn(&CancelToken, I) -> O + Send + Sync + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    fn run(&self, token: &CancelToken, input: Stream<I>) -> Stream<O> {
        let (rx, upstream) = input.into_parts();
        let outputs: Vec<Stream<O>> = (0..self.workers.get())
            .map(|_| spawn_transform(self.name, token, rx.clone(), self.f.clone()))
            .collect();
        drop(rx);

        let mut merged = fan_in(token, outputs);
        merged.adopt(upstream);
        merged
    }
}

/// Merge streams as values arrive.
///
/// One relay task per input. The output closes once every relay has exited,
/// which happens when its input closes or the token is cancelled. Values
/// from one input keep their relative order.
pub fn fan_in<T>(token: &CancelToken, streams: impl IntoIterator<Item = Stream<T>>) -> Stream<T>
where
    T: Send + 'static,
{
    let (tx, rx) = unbuffered();
    let mut tasks = TaskSet::new();

    for stream in streams {
        let (input, upstream) = stream.into_parts();
        tasks.extend(upstream);

        // Each relay owns a sender clone; the last one to exit closes `rx`.
        let tx = tx.clone();
        let t = token.clone();
        tasks.push(spawn_task("fan-in", token, move || relay(&t, &input, &tx)));
    }
    drop(tx);

    Stream::new(rx, tasks)
}

fn relay<T>(token: &CancelToken, input: &Receiver<T>, out: &Sender<T>) {
    let mut forwarded = 0usize;
    while let Ok(item) = input.recv_until(token) {
        if out.send(token, item).is_err() {
            break;
        }
        forwarded += 1;
    }
    debug!(forwarded, "relay finished");
}

/// What the round-robin merge does when the input whose turn it is closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderedClose {
    /// Close the merged output immediately.
    #[default]
    Halt,
    /// Drop the closed input from the rotation and keep going until every
    /// input has closed.
    Skip,
}

/// Round-robin merge with [`OrderedClose::Halt`].
pub fn fan_in_ordered<T>(
    token: &CancelToken,
    streams: impl IntoIterator<Item = Stream<T>>,
) -> Stream<T>
where
    T: Send + 'static,
{
    fan_in_ordered_with(token, streams, OrderedClose::Halt)
}

/// Merge by strict round-robin: one value from input 0, then input 1, and so
/// on, wrapping around.
///
/// A single task blocks on the current input even if others have values
/// ready, so one stalled input stalls the whole merge. An empty input set
/// yields a closed stream.
pub fn fan_in_ordered_with<T>(
    token: &CancelToken,
    streams: impl IntoIterator<Item = Stream<T>>,
    policy: OrderedClose,
) -> Stream<T>
where
    T: Send + 'static,
{
    let mut tasks = TaskSet::new();
    let mut inputs = Vec::new();
    for stream in streams {
        let (input, upstream) = stream.into_parts();
        tasks.extend(upstream);
        inputs.push(input);
    }

    let (tx, rx) = unbuffered();
    if inputs.is_empty() {
        return Stream::new(rx, tasks);
    }

    let t = token.clone();
    tasks.push(spawn_task("fan-in-ordered", token, move || {
        let mut cursor = 0;
        let mut forwarded = 0usize;
        while !inputs.is_empty() {
            match inputs[cursor].recv_until(&t) {
                Ok(item) => {
                    if tx.send(&t, item).is_err() {
                        break;
                    }
                    forwarded += 1;
                    cursor = (cursor + 1) % inputs.len();
                }
                Err(RecvError::Cancelled) => break,
                Err(RecvError::Closed) => match policy {
                    OrderedClose::Halt => break,
                    OrderedClose::Skip => {
                        // The next input slides into `cursor`.
                        inputs.remove(cursor);
                        if cursor >= inputs.len() {
                            cursor = 0;
                        }
                    }
                },
            }
        }
        debug!(
            forwarded,
            ?policy,
            open = inputs.len(),
            "ordered merge finished"
        );
    }));

    Stream::new(rx, tasks)
}

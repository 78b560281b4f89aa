// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The combinator and source traits every pipeline piece implements.

use std::sync::Arc;

use conflux_rt::{CancelToken, Stream};

use crate::compose::Pipe;

/// A pure pipeline builder: running it spawns task(s) that consume `input`
/// and returns their output stream.
///
/// Building a combinator does nothing; only `run` allocates tasks. The
/// returned stream carries every upstream task so the final consumer can
/// `join` the whole pipeline.
pub trait Combinator<I, O>: Send + Sync {
    fn run(&self, token: &CancelToken, input: Stream<I>) -> Stream<O>;
}

/// Something that produces a stream from nothing but a token.
pub trait Source<T>: Send + Sync {
    fn open(&self, token: &CancelToken) -> Stream<T>;
}

pub type BoxCombinator<I, O> = Box<dyn Combinator<I, O>>;

impl<I, O, C> Combinator<I, O> for Box<C>
where
    C: Combinator<I, O> + ?Sized,
{
    fn run(&self, token: &CancelToken, input: Stream<I>) -> Stream<O> {
        (**self).run(token, input)
    }
}

impl<I, O, C> Combinator<I, O> for Arc<C>
where
    C: Combinator<I, O> + ?Sized,
{
    fn run(&self, token: &CancelToken, input: Stream<I>) -> Stream<O> {
        (**self).run(token, input)
    }
}

/// Adapter methods available on every combinator.
pub trait CombinatorExt<I, O>: Combinator<I, O> + Sized {
    /// Feed this combinator's output into `next`, across a type seam.
    fn pipe<P, B>(self, next: B) -> Pipe<Self, B, O>
    where
        B: Combinator<O, P>,
    {
        Pipe::new(self, next)
    }

    fn boxed(self) -> BoxCombinator<I, O>
    where
        Self: 'static,
    {
        Box::new(self)
    }
}

impl<I, O, C> CombinatorExt<I, O> for C where C: Combinator<I, O> {}

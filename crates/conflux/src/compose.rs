// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Sequential composition: same-type chains and type-changing pipes.

use std::marker::PhantomData;

use conflux_rt::{CancelToken, Stream};

use crate::combinator::{BoxCombinator, Combinator};

/// Runs same-type combinators left to right. Spawns nothing itself.
///
/// An empty chain returns its input unchanged.
pub struct Chain<T> {
    links: Vec<BoxCombinator<T, T>>,
}

impl<T> Chain<T> {
    pub fn new() -> Self {
        Self { links: Vec::new() }
    }

    pub fn push<C>(&mut self, link: C)
    where
        C: Combinator<T, T> + 'static,
    {
        self.links.push(Box::new(link));
    }

    /// Builder form of `push`, used by `chain!`.
    pub fn with<C>(mut self, link: C) -> Self
    where
        C: Combinator<T, T> + 'static,
    {
        self.push(link);
        self
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

impl<T> Default for Chain<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<BoxCombinator<T, T>> for Chain<T> {
    fn from_iter<It: IntoIterator<Item = BoxCombinator<T, T>>>(iter: It) -> Self {
        Self {
            links: iter.into_iter().collect(),
        }
    }
}

impl<T> Combinator<T, T> for Chain<T>
where
    T: Send + 'static,
{
    fn run(&self, token: &CancelToken, input: Stream<T>) -> Stream<T> {
        self.links
            .iter()
            .fold(input, |stream, link| link.run(token, stream))
    }
}

/// Build a [`Chain`] from same-type combinators, left to right.
///
/// ```
/// use conflux::{chain, repeat, stage, take, CancelToken, Combinator, Stream};
///
/// let token = CancelToken::new();
/// let pipeline = chain![
///     repeat(1..=10),
///     take(5),
///     stage(|_: &CancelToken, x: i32| x * 2),
/// ];
/// let out = pipeline.run(&token, Stream::empty()).drain().unwrap();
/// assert_eq!(out, vec![2, 4, 6, 8, 10]);
/// ```
#[macro_export]
macro_rules! chain {
    ($($link:expr),* $(,)?) => {
        $crate::Chain::new()$(.with($link))*
    };
}

/// `first` then `second`, across a seam of element type `M`.
pub struct Pipe<A, B, M> {
    first: A,
    second: B,
    _seam: PhantomData<fn(M) -> M>,
}

impl<A, B, M> Pipe<A, B, M> {
    pub fn new(first: A, second: B) -> Self {
        Self {
            first,
            second,
            _seam: PhantomData,
        }
    }
}

pub fn pipe<I, M, O, A, B>(first: A, second: B) -> Pipe<A, B, M>
where
    A: Combinator<I, M>,
    B: Combinator<M, O>,
{
    Pipe::new(first, second)
}

impl<I, M, O, A, B> Combinator<I, O> for Pipe<A, B, M>
where
    A: Combinator<I, M>,
    B: Combinator<M, O>,
{
    fn run(&self, token: &CancelToken, input: Stream<I>) -> Stream<O> {
        self.second.run(token, self.first.run(token, input))
    }
}

// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Composable concurrent pipeline combinators.
//!
//! A source feeds a chain of stages, each running on its own task and
//! handing values over rendezvous streams. Every combinator is a pure
//! builder; `run` spawns its tasks. One [`CancelToken`] is threaded through
//! every call.
//!
//! Components:
//! - source: `generate` (finite) and `repeat` (cyclic)
//! - stage: `stage` (1:1 transform) and `take` (bounded forwarding)
//! - compose: `Chain`/`chain!` (same type) and `pipe` (type seam)
//! - fan: `fan_stage` worker pools, `fan_in` and `fan_in_ordered` merges
//!
//! ```
//! use std::num::NonZeroUsize;
//!
//! use conflux::{chain, fan_stage, repeat, take, CancelToken, Combinator, Stream};
//!
//! let workers = NonZeroUsize::new(4).unwrap();
//! let token = CancelToken::new();
//! let pipeline = chain![
//!     repeat(1..=5),
//!     take(10),
//!     fan_stage(workers, |_: &CancelToken, x: i32| x * 2),
//! ];
//! let mut out = pipeline.run(&token, Stream::empty()).drain().unwrap();
//! out.sort_unstable();
//! assert_eq!(out, vec![2, 2, 4, 4, 6, 6, 8, 8, 10, 10]);
//! ```

pub mod combinator;
pub mod compose;
pub mod fan;
pub mod source;
pub mod stage;

pub use combinator::{BoxCombinator, Combinator, CombinatorExt, Source};
pub use compose::{pipe, Chain, Pipe};
pub use fan::{
    fan_in, fan_in_ordered, fan_in_ordered_with, fan_stage, fan_stage_auto, FanStage, OrderedClose,
};
pub use source::{generate, repeat, Generate, Repeat};
pub use stage::{stage, take, Stage, Take};

pub use conflux_rt::{
    CancelReason, CancelToken, ConfigError, JoinError, RecvError, RuntimeConfig, SendError, Stream,
    TaskSet, TryRecvError,
};

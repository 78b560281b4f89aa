// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! End-to-end pipelines: a cyclic source bounded by `take`, transformed by
//! chains, pipes and worker pools, with and without cancellation.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::time::Duration;

use conflux::{
    chain, fan_in_ordered, fan_stage, generate, pipe, repeat, stage, take, CancelReason,
    CancelToken, Combinator, CombinatorExt, JoinError, Source, Stream,
};
use rand::Rng;
use serde::Serialize;

fn multiplier(n: i32) -> impl Fn(&CancelToken, i32) -> i32 + Send + Sync + 'static {
    move |_: &CancelToken, x: i32| x * n
}

fn add_three(_: &CancelToken, x: i32) -> i32 {
    x + 3
}

fn jittered_double(_: &CancelToken, x: i32) -> i32 {
    let ms = rand::thread_rng().gen_range(0..10);
    std::thread::sleep(Duration::from_millis(ms));
    x * 2
}

/// Passes values through, cancelling the token when `at` goes by.
fn quit_at(at: i32) -> impl Fn(&CancelToken, i32) -> i32 + Send + Sync + 'static {
    move |token: &CancelToken, x: i32| {
        if x == at {
            token.cancel();
        }
        x
    }
}

#[test]
fn take_five_then_double() {
    let token = CancelToken::new();
    let pipeline = chain![repeat(1..=10), take(5), stage(multiplier(2))];
    let out = pipeline.run(&token, Stream::empty()).drain().unwrap();
    assert_eq!(out, vec![2, 4, 6, 8, 10]);
}

#[test]
fn nested_chain() {
    let token = CancelToken::new();
    let pipeline = chain![
        repeat(1..=10),
        take(5),
        stage(multiplier(2)),
        chain![stage(add_three), stage(multiplier(3))],
    ];
    let out = pipeline.run(&token, Stream::empty()).drain().unwrap();
    assert_eq!(out, vec![15, 21, 27, 33, 39]);
}

#[test]
fn quitter_after_take_bound_never_fires() {
    let token = CancelToken::new();
    let pipeline = chain![repeat(1..=10), take(5), stage(multiplier(2)), stage(quit_at(20))];
    let out = pipeline.run(&token, Stream::empty()).drain().unwrap();
    assert_eq!(out, vec![2, 4, 6, 8, 10]);
    assert!(!token.is_cancelled());
}

#[test]
fn cancellation_mid_stream_bounds_output() {
    let token = CancelToken::new();
    let pipeline = chain![repeat(1..=10), take(15), stage(multiplier(2)), stage(quit_at(20))];
    let out = pipeline.run(&token, Stream::empty()).drain().unwrap();

    // Everything before the cancelling element has already been handed off;
    // only a couple of in-flight values may follow.
    let expected: Vec<i32> = (1..=10).cycle().take(15).map(|x| x * 2).collect();
    assert!(out.len() >= 9 && out.len() <= 12, "got {out:?}");
    assert_eq!(out[..], expected[..out.len()]);
    assert_eq!(token.reason(), Some(CancelReason::Cancelled));
}

#[test]
fn deadline_closes_infinite_pipeline() {
    let token = CancelToken::with_timeout(Duration::from_millis(30));
    let pipeline = chain![repeat(1..=10), stage(multiplier(2))];
    let stream = pipeline.run(&token, Stream::empty());
    let seen = stream.count();
    assert!(seen > 0);
    assert_eq!(token.reason(), Some(CancelReason::DeadlineExceeded));
}

#[test]
fn child_token_cancels_only_its_pipeline() {
    let root = CancelToken::new();
    let child = root.child();
    let pipeline = chain![repeat([1]), stage(multiplier(1))];

    let mut doomed = pipeline.run(&child, Stream::empty());
    let survivor = take(3).run(&root, pipeline.run(&root, Stream::empty()));

    assert_eq!(doomed.next(), Some(1));
    child.cancel();
    assert!(doomed.by_ref().count() <= 2);
    doomed.join().unwrap();

    assert_eq!(survivor.drain().unwrap(), vec![1, 1, 1]);
    assert!(!root.is_cancelled());
}

#[test]
fn pipe_to_strings() {
    let token = CancelToken::new();
    let to_str = stage(|_: &CancelToken, x: i32| format!("{x}"));
    let out = pipe(chain![repeat(1..=10), take(5)], to_str)
        .run(&token, Stream::empty())
        .drain()
        .unwrap();
    assert_eq!(out, vec!["1", "2", "3", "4", "5"]);
}

#[derive(Debug, Clone)]
struct Reading {
    value: i32,
    name: &'static str,
    #[allow(dead_code)]
    flagged: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Summary {
    value1: i32,
    value2: i32,
    new_name: String,
}

#[test]
fn pipe_through_custom_types_to_json() {
    let token = CancelToken::new();
    let readings = repeat([
        Reading { value: 1, name: "one", flagged: true },
        Reading { value: 2, name: "two", flagged: false },
        Reading { value: 3, name: "three", flagged: true },
        Reading { value: 4, name: "four", flagged: false },
        Reading { value: 5, name: "five", flagged: true },
    ]);

    let summarize = stage(|_: &CancelToken, r: Reading| Summary {
        value1: r.value,
        value2: r.value * 2,
        new_name: r.name.to_uppercase(),
    });
    let to_json = stage(|_: &CancelToken, s: Summary| {
        serde_json::to_string(&s).unwrap_or_default()
    });

    let pipeline = chain![readings, take(5)].pipe(summarize).pipe(to_json);
    let out = pipeline.run(&token, Stream::empty()).drain().unwrap();
    assert_eq!(
        out,
        vec![
            r#"{"value1":1,"value2":2,"newName":"ONE"}"#,
            r#"{"value1":2,"value2":4,"newName":"TWO"}"#,
            r#"{"value1":3,"value2":6,"newName":"THREE"}"#,
            r#"{"value1":4,"value2":8,"newName":"FOUR"}"#,
            r#"{"value1":5,"value2":10,"newName":"FIVE"}"#,
        ]
    );
}

#[test]
fn fan_stage_with_jitter_yields_every_value_once() {
    let token = CancelToken::new();
    let workers = NonZeroUsize::new(4).unwrap();
    let pipeline = chain![repeat(1..=5), take(10), fan_stage(workers, jittered_double)];
    let out = pipeline.run(&token, Stream::empty()).drain().unwrap();
    assert_eq!(out.len(), 10);

    let mut counts: HashMap<i32, usize> = HashMap::new();
    for v in out {
        *counts.entry(v).or_default() += 1;
    }
    let expected: HashMap<i32, usize> = [(2, 2), (4, 2), (6, 2), (8, 2), (10, 2)].into();
    assert_eq!(counts, expected);
}

#[test]
fn ordered_merge_of_two_jittered_pipelines() {
    let token = CancelToken::new();
    let branch = || chain![repeat(1..=10), take(10), stage(jittered_double)];
    let first = branch().run(&token, Stream::empty());
    let second = branch().run(&token, Stream::empty());

    let out = fan_in_ordered(&token, [first, second]).drain().unwrap();
    let expected: Vec<i32> = (1..=10).flat_map(|x| [x * 2, x * 2]).collect();
    assert_eq!(out, expected);
}

#[test]
fn panicking_stage_cancels_and_surfaces_on_join() {
    let token = CancelToken::new();
    let fragile = stage(|_: &CancelToken, x: i32| {
        if x == 3 {
            panic!("cannot handle {x}");
        }
        x
    })
    .named("fragile");
    let pipeline = chain![repeat(1..=10), fragile, stage(multiplier(10))];

    let mut out = pipeline.run(&token, Stream::empty());
    // 10 is handed off before the panic; 20 races the cancellation.
    let seen: Vec<i32> = out.by_ref().collect();
    assert!(seen == [10] || seen == [10, 20], "got {seen:?}");

    match out.join() {
        Err(JoinError::Panicked { task, message }) => {
            assert!(task.ends_with("-fragile"));
            assert!(message.contains("cannot handle 3"));
        }
        other => panic!("expected a panicked task, got {other:?}"),
    }
    assert_eq!(token.reason(), Some(CancelReason::TaskFailed));
}

#[test]
fn source_opened_directly() {
    let token = CancelToken::new();
    let doubled = stage(multiplier(2)).run(&token, generate([4, 5, 6]).open(&token));
    assert_eq!(doubled.drain().unwrap(), vec![8, 10, 12]);
}

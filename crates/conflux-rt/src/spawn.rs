// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Spawn/join for pipeline tasks.
//!
//! Each task is an OS thread. Panics are caught: the task's output closes,
//! the pipeline token is cancelled with `TaskFailed`, and the panic message
//! is returned from `join()`.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::JoinHandle;

use thiserror::Error;
use tracing::{debug, error};

use crate::cancel::{CancelReason, CancelToken};
use crate::config::RuntimeConfig;

/// Error returned by `join()` when a task failed.
#[derive(Debug, Error)]
pub enum JoinError {
    #[error("task `{task}` panicked: {message}")]
    Panicked { task: String, message: String },
    #[error("task `{task}` could not be spawned: {source}")]
    Spawn {
        task: String,
        #[source]
        source: io::Error,
    },
}

enum State {
    Running(JoinHandle<Result<(), String>>),
    Failed(io::Error),
}

/// Handle to one spawned task. Dropping it detaches the thread.
pub struct TaskHandle {
    name: String,
    state: State,
}

impl TaskHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the task to exit.
    pub fn join(self) -> Result<(), JoinError> {
        let handle = match self.state {
            State::Running(handle) => handle,
            State::Failed(source) => {
                return Err(JoinError::Spawn {
                    task: self.name,
                    source,
                })
            }
        };
        match handle.join() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(JoinError::Panicked {
                task: self.name,
                message,
            }),
            Err(payload) => Err(JoinError::Panicked {
                task: self.name,
                message: panic_message(payload.as_ref()),
            }),
        }
    }

    pub fn is_finished(&self) -> bool {
        match &self.state {
            State::Running(handle) => handle.is_finished(),
            State::Failed(_) => true,
        }
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("name", &self.name)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Every task upstream of a stream, joined together at shutdown.
#[derive(Debug, Default)]
pub struct TaskSet {
    tasks: Vec<TaskHandle>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: TaskHandle) {
        self.tasks.push(task);
    }

    pub fn extend(&mut self, other: TaskSet) {
        self.tasks.extend(other.tasks);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Join every task, returning the first failure after all have exited.
    pub fn join_all(self) -> Result<(), JoinError> {
        let mut first = None;
        for task in self.tasks {
            if let Err(err) = task.join() {
                first.get_or_insert(err);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

/// Spawn `f` as a named pipeline task bound to `token`.
pub fn spawn_task<F>(stage: &str, token: &CancelToken, f: F) -> TaskHandle
where
    F: FnOnce() + Send + 'static,
{
    let config = RuntimeConfig::current();
    let name = format!("{}-{}", config.thread_name, stage);
    let task_token = token.clone();
    let task_name = name.clone();

    let spawned = config.thread_builder(stage).spawn(move || {
        debug!(task = %task_name, "task started");
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(()) => {
                debug!(task = %task_name, "task exited");
                Ok(())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(task = %task_name, %message, "task panicked; cancelling pipeline");
                task_token.cancel_with(CancelReason::TaskFailed);
                Err(message)
            }
        }
    });

    let state = match spawned {
        Ok(handle) => State::Running(handle),
        Err(err) => {
            error!(task = %name, %err, "failed to spawn task; cancelling pipeline");
            token.cancel_with(CancelReason::TaskFailed);
            State::Failed(err)
        }
    };
    TaskHandle { name, state }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// Copyright 2026 the Turnstile Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Central ownership of every scheduled unit of work.
//!
//! The [`ResourceRegistry`] holds delayed ([`TaskKind::Timeout`]), repeating
//! ([`TaskKind::Interval`]) and per-frame ([`TaskKind::Frame`]) callbacks,
//! each filed under a caller-supplied owner id. At most one task exists per
//! `(owner, kind)` pair: scheduling a second one cancels the first, so a
//! component that restarts never leaks its previous task.
//!
//! # Driving
//!
//! The registry has no timer of its own. The frame loop calls
//! [`run_due`](ResourceRegistry::run_due) once per tick with the tick's host
//! time and the context object `C` that callbacks operate on. A new task is
//! armed by the first `run_due` after it was scheduled: its delay or first
//! period counts from that call's host time, so tasks scheduled before the
//! first frame or across a long pause never fire early.
//!
//! # Failure policy
//!
//! Callbacks return `Result<(), TaskError>`. The registry, not the callback,
//! decides what a failure means, using the task's [`RetryPolicy`]:
//!
//! - The failure is logged and the task is suspended for `backoff`, after
//!   which it runs again.
//! - A success resets the consecutive-failure count.
//! - After `max_consecutive_failures` failures in a row the task is dropped
//!   and reported through [`take_failures`](ResourceRegistry::take_failures).
//!
//! # Teardown
//!
//! [`cancel_all`](ResourceRegistry::cancel_all) with an owner prefix removes
//! every kind registered under matching owners in one call and leaves
//! [`stats_for`](ResourceRegistry::stats_for) at zero for them. All
//! cancellation is idempotent.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use log::{debug, warn};

use crate::error::TaskError;
use crate::time::{Duration, HostTime};

/// What kind of work a task is, with its timing parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Run once after the delay, then remove.
    Timeout(Duration),
    /// Run every period.
    Interval(Duration),
    /// Run on every frame tick.
    Frame,
}

impl TaskKind {
    /// The kind without its timing parameter.
    #[must_use]
    pub const fn tag(self) -> TaskTag {
        match self {
            Self::Timeout(_) => TaskTag::Timeout,
            Self::Interval(_) => TaskTag::Interval,
            Self::Frame => TaskTag::Frame,
        }
    }
}

/// Task kind discriminant, used for lookup and cancellation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskTag {
    /// Single-shot delayed call.
    Timeout,
    /// Repeating call.
    Interval,
    /// Per-frame callback.
    Frame,
}

/// How the registry reacts to a failing callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RetryPolicy {
    /// Suspension after each failure before the task runs again.
    pub backoff: Duration,
    /// Consecutive failures after which the task is dropped.
    pub max_consecutive_failures: u32,
}

impl RetryPolicy {
    /// One-second backoff, dropped after three failures in a row.
    #[must_use]
    pub const fn standard() -> Self {
        Self {
            backoff: Duration::from_secs(1),
            max_consecutive_failures: 3,
        }
    }

    /// Resume on the next opportunity instead of waiting out a backoff.
    ///
    /// Animation streams use this so a failed tick costs at most one frame.
    #[must_use]
    pub const fn next_frame() -> Self {
        Self {
            backoff: Duration::ZERO,
            max_consecutive_failures: 3,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

/// Per-task options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TaskOptions {
    /// Failure handling.
    pub retry: RetryPolicy,
    /// Essential repeating tasks survive
    /// [`prune_non_essential`](ResourceRegistry::prune_non_essential).
    pub essential: bool,
}

/// Opaque handle identifying one registration.
///
/// Handles are never reused, so a handle to a replaced task stays invalid.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskHandle(u64);

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskHandle({})", self.0)
    }
}

/// Information handed to a running callback.
#[derive(Clone, Copy, Debug)]
pub struct TaskContext<'a> {
    /// Host time of the current tick.
    pub now: HostTime,
    /// Owner the task is filed under.
    pub owner: &'a str,
    /// The task's handle.
    pub handle: TaskHandle,
    /// Consecutive failures before this run (0 on the happy path).
    pub attempt: u32,
}

/// Callback signature. `C` is the context the registry is driven with.
pub type TaskCallback<C> = Box<dyn FnMut(&mut C, &TaskContext<'_>) -> Result<(), TaskError>>;

/// Outstanding task counts per kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RegistryStats {
    /// Pending timeouts.
    pub timeouts: usize,
    /// Active intervals.
    pub intervals: usize,
    /// Active frame callbacks.
    pub frames: usize,
}

impl RegistryStats {
    /// Sum over all kinds.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.timeouts + self.intervals + self.frames
    }

    fn count(&mut self, tag: TaskTag) {
        match tag {
            TaskTag::Timeout => self.timeouts += 1,
            TaskTag::Interval => self.intervals += 1,
            TaskTag::Frame => self.frames += 1,
        }
    }
}

/// A task that exhausted its retry budget and was dropped.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskFailure {
    /// Owner the task was filed under.
    pub owner: String,
    /// Its kind.
    pub tag: TaskTag,
    /// Its handle.
    pub handle: TaskHandle,
    /// The last error it returned.
    pub error: TaskError,
    /// Consecutive failures, equal to the policy's limit.
    pub attempts: u32,
    /// When it was dropped.
    pub at: HostTime,
}

/// What one [`run_due`](ResourceRegistry::run_due) call did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Callbacks invoked.
    pub ran: usize,
    /// Callbacks that returned an error.
    pub failed: usize,
    /// Tasks dropped after exhausting their retries.
    pub exhausted: usize,
    /// Timeouts that completed and were removed.
    pub completed: usize,
}

struct ScheduledTask<C> {
    owner: String,
    kind: TaskKind,
    options: TaskOptions,
    /// `None` until the first `run_due` after scheduling arms it.
    next_due: Option<HostTime>,
    consecutive_failures: u32,
    callback: TaskCallback<C>,
}

impl<C> fmt::Debug for ScheduledTask<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("owner", &self.owner)
            .field("kind", &self.kind)
            .field("options", &self.options)
            .field("next_due", &self.next_due)
            .field("consecutive_failures", &self.consecutive_failures)
            .finish_non_exhaustive()
    }
}

/// Owner of all scheduled work, driven by the frame clock.
pub struct ResourceRegistry<C> {
    /// Keyed by handle value, which is also registration order.
    tasks: BTreeMap<u64, ScheduledTask<C>>,
    index: BTreeMap<(String, TaskTag), u64>,
    next_handle: u64,
    default_retry: RetryPolicy,
    failures: Vec<TaskFailure>,
    clock: HostTime,
}

impl<C> fmt::Debug for ResourceRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("tasks", &self.tasks)
            .field("default_retry", &self.default_retry)
            .field("pending_failures", &self.failures.len())
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl<C> Default for ResourceRegistry<C> {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl<C> ResourceRegistry<C> {
    /// Creates an empty registry whose tasks default to `retry`.
    #[must_use]
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            tasks: BTreeMap::new(),
            index: BTreeMap::new(),
            next_handle: 1,
            default_retry: retry,
            failures: Vec::new(),
            clock: HostTime::ZERO,
        }
    }

    /// Schedules `callback` under `owner` with the default options.
    ///
    /// Replaces any task of the same kind already filed under `owner`.
    pub fn schedule(
        &mut self,
        owner: impl Into<String>,
        kind: TaskKind,
        callback: impl FnMut(&mut C, &TaskContext<'_>) -> Result<(), TaskError> + 'static,
    ) -> TaskHandle {
        let options = TaskOptions {
            retry: self.default_retry,
            essential: false,
        };
        self.schedule_with(owner, kind, options, callback)
    }

    /// Schedules `callback` under `owner` with explicit options.
    ///
    /// Replaces any task of the same kind already filed under `owner`.
    pub fn schedule_with(
        &mut self,
        owner: impl Into<String>,
        kind: TaskKind,
        options: TaskOptions,
        callback: impl FnMut(&mut C, &TaskContext<'_>) -> Result<(), TaskError> + 'static,
    ) -> TaskHandle {
        let owner = owner.into();
        let tag = kind.tag();
        if self.cancel(&owner, tag) {
            debug!("replaced {tag:?} task for {owner}");
        }

        let id = self.next_handle;
        self.next_handle += 1;
        self.index.insert((owner.clone(), tag), id);
        self.tasks.insert(
            id,
            ScheduledTask {
                owner,
                kind,
                options,
                next_due: None,
                consecutive_failures: 0,
                callback: Box::new(callback),
            },
        );
        TaskHandle(id)
    }

    /// Cancels the task of kind `tag` filed under `owner`.
    ///
    /// Returns whether a task was removed; cancelling twice is a no-op.
    pub fn cancel(&mut self, owner: &str, tag: TaskTag) -> bool {
        // Avoid allocating a key String just for the lookup.
        let found = self
            .index
            .iter()
            .find(|((o, t), _)| o == owner && *t == tag)
            .map(|(key, &id)| (key.clone(), id));
        match found {
            Some((key, id)) => {
                self.index.remove(&key);
                self.tasks.remove(&id);
                true
            }
            None => false,
        }
    }

    /// Cancels the registration identified by `handle`, if it is still live.
    pub fn cancel_handle(&mut self, handle: TaskHandle) -> bool {
        match self.tasks.remove(&handle.0) {
            Some(task) => {
                self.index.remove(&(task.owner, task.kind.tag()));
                true
            }
            None => false,
        }
    }

    /// Cancels every task whose owner starts with `prefix`, or every task if
    /// `prefix` is `None`. Returns the number removed.
    pub fn cancel_all(&mut self, prefix: Option<&str>) -> usize {
        let before = self.tasks.len();
        match prefix {
            None => {
                self.tasks.clear();
                self.index.clear();
            }
            Some(prefix) => {
                self.tasks.retain(|_, task| !task.owner.starts_with(prefix));
                self.index.retain(|(owner, _), _| !owner.starts_with(prefix));
            }
        }
        before - self.tasks.len()
    }

    /// Cancels repeating tasks not marked essential. Returns the number
    /// removed.
    pub fn prune_non_essential(&mut self) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|_, task| {
            task.options.essential || matches!(task.kind, TaskKind::Timeout(_))
        });
        let tasks = &self.tasks;
        self.index.retain(|_, id| tasks.contains_key(id));
        before - self.tasks.len()
    }

    /// Whether a task of kind `tag` is filed under `owner`.
    #[must_use]
    pub fn contains(&self, owner: &str, tag: TaskTag) -> bool {
        self.index.iter().any(|((o, t), _)| o == owner && *t == tag)
    }

    /// Whether `handle` still refers to a live task.
    #[must_use]
    pub fn is_live(&self, handle: TaskHandle) -> bool {
        self.tasks.contains_key(&handle.0)
    }

    /// Outstanding tasks per kind.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        for task in self.tasks.values() {
            stats.count(task.kind.tag());
        }
        stats
    }

    /// Outstanding tasks per kind for owners exactly equal to `owner`.
    #[must_use]
    pub fn stats_for(&self, owner: &str) -> RegistryStats {
        let mut stats = RegistryStats::default();
        for task in self.tasks.values().filter(|t| t.owner == owner) {
            stats.count(task.kind.tag());
        }
        stats
    }

    /// Number of outstanding tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no task is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Host time of the most recent [`run_due`](Self::run_due).
    #[must_use]
    pub fn clock(&self) -> HostTime {
        self.clock
    }

    /// Drains the tasks dropped since the last call.
    pub fn take_failures(&mut self) -> Vec<TaskFailure> {
        core::mem::take(&mut self.failures)
    }

    /// Runs every task due at `now`, in registration order.
    pub fn run_due(&mut self, now: HostTime, cx: &mut C) -> RunSummary {
        if now > self.clock {
            self.clock = now;
        }

        // Delays count from the first tick that sees the task.
        for task in self.tasks.values_mut() {
            if task.next_due.is_none() {
                task.next_due = Some(match task.kind {
                    TaskKind::Timeout(delay) | TaskKind::Interval(delay) => {
                        now.saturating_add(delay)
                    }
                    TaskKind::Frame => now,
                });
            }
        }

        let mut summary = RunSummary::default();
        let due: Vec<u64> = self
            .tasks
            .iter()
            .filter(|(_, task)| task.next_due.is_some_and(|at| at <= now))
            .map(|(&id, _)| id)
            .collect();

        for id in due {
            let Some(task) = self.tasks.get_mut(&id) else {
                continue;
            };
            let ScheduledTask {
                owner,
                kind,
                options,
                next_due,
                consecutive_failures,
                callback,
            } = task;

            let context = TaskContext {
                now,
                owner,
                handle: TaskHandle(id),
                attempt: *consecutive_failures,
            };
            summary.ran += 1;

            match callback(cx, &context) {
                Ok(()) => {
                    *consecutive_failures = 0;
                    match *kind {
                        TaskKind::Timeout(_) => {
                            summary.completed += 1;
                            self.remove(id);
                        }
                        TaskKind::Interval(period) => {
                            let next = next_due.unwrap_or(now).saturating_add(period);
                            // Fell behind: resume from now instead of bursting.
                            *next_due = Some(if next <= now {
                                now.saturating_add(period)
                            } else {
                                next
                            });
                        }
                        TaskKind::Frame => *next_due = Some(now),
                    }
                }
                Err(error) => {
                    summary.failed += 1;
                    *consecutive_failures += 1;
                    let attempts = *consecutive_failures;
                    let limit = options.retry.max_consecutive_failures;
                    warn!(
                        "task {owner} ({:?}) failed, attempt {attempts}/{limit}: {error}",
                        kind.tag()
                    );

                    if attempts >= limit {
                        let failure = TaskFailure {
                            owner: owner.clone(),
                            tag: kind.tag(),
                            handle: TaskHandle(id),
                            error,
                            attempts,
                            at: now,
                        };
                        warn!(
                            "task {} ({:?}) dropped after {attempts} consecutive failures",
                            failure.owner, failure.tag
                        );
                        summary.exhausted += 1;
                        self.failures.push(failure);
                        self.remove(id);
                    } else {
                        *next_due = Some(now.saturating_add(options.retry.backoff));
                    }
                }
            }
        }

        summary
    }

    fn remove(&mut self, id: u64) {
        if let Some(task) = self.tasks.remove(&id) {
            self.index.remove(&(task.owner, task.kind.tag()));
        }
    }
}

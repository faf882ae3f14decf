// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for per-runner lifecycle events.

use std::fmt::{Display, Formatter};

use tracing::Span;

use crate::observability::messages::StructuredLog;

/// A runner completed one job and published its stamp.
pub struct JobCompleted {
    pub runner: usize,
    pub job: usize,
    pub total: usize,
}

impl Display for JobCompleted {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.total != 0 {
            write!(f, "Runner #{} -> {} / {} jobs done", self.runner, self.job + 1, self.total)
        } else {
            write!(f, "Runner #{} -> {} / ? jobs done", self.runner, self.job + 1)
        }
    }
}

impl StructuredLog for JobCompleted {
    fn log(&self) {
        tracing::debug!(runner = self.runner, job = self.job, total = self.total, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("runner_job", otel.name = name, runner = self.runner, job = self.job)
    }
}

/// A runner received a notification kind it does not handle.
pub struct UnhandledNotification<'a> {
    pub runner: usize,
    pub kind: &'a str,
}

impl Display for UnhandledNotification<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Runner #{} -> received unhandled notification type {}",
            self.runner, self.kind
        )
    }
}

impl StructuredLog for UnhandledNotification<'_> {
    fn log(&self) {
        tracing::warn!(runner = self.runner, kind = self.kind, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("runner_notification", otel.name = name, runner = self.runner)
    }
}

/// A runner finished its queue for the current iteration.
pub struct IterationFinished {
    pub runner: usize,
    pub jobs_done: usize,
}

impl Display for IterationFinished {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Runner #{} -> finished all {} jobs", self.runner, self.jobs_done)
    }
}

impl StructuredLog for IterationFinished {
    fn log(&self) {
        tracing::debug!(runner = self.runner, jobs_done = self.jobs_done, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("runner_iteration", otel.name = name, runner = self.runner)
    }
}

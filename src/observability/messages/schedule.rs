// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for mapping and dispatch events.

use std::fmt::{Display, Formatter};

use tracing::Span;

use crate::observability::messages::StructuredLog;

/// A scheduling round placed new tasks on the timeline.
pub struct ScheduleComputed<'a> {
    pub scheduler: &'a str,
    pub task_count: usize,
    pub makespan: u64,
}

impl Display for ScheduleComputed<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Scheduled {} tasks with {} strategy, makespan {}",
            self.task_count, self.scheduler, self.makespan
        )
    }
}

impl StructuredLog for ScheduleComputed<'_> {
    fn log(&self) {
        tracing::info!(
            scheduler = self.scheduler,
            task_count = self.task_count,
            makespan = self.makespan,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "schedule",
            otel.name = name,
            scheduler = self.scheduler,
            task_count = self.task_count,
        )
    }
}

/// Jobs of one round were pushed to the runners.
pub struct JobsDispatched {
    pub job_count: usize,
    pub runner_count: usize,
}

impl Display for JobsDispatched {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Dispatched {} jobs to {} runners",
            self.job_count, self.runner_count
        )
    }
}

impl StructuredLog for JobsDispatched {
    fn log(&self) {
        tracing::info!(job_count = self.job_count, runner_count = self.runner_count, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("dispatch", otel.name = name, job_count = self.job_count)
    }
}

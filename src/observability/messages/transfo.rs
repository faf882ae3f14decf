// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for transformation and repetition-vector events.

use std::fmt::{Display, Formatter};

use tracing::Span;

use crate::observability::messages::StructuredLog;

/// One transformation job finished and emitted follow-up work.
pub struct JobTransformed<'a> {
    pub graph: &'a str,
    pub instance: u32,
    pub ready_jobs: usize,
    pub pending_jobs: usize,
}

impl Display for JobTransformed<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Transformed graph '{}' instance {}: {} ready, {} pending follow-up jobs",
            self.graph, self.instance, self.ready_jobs, self.pending_jobs
        )
    }
}

impl StructuredLog for JobTransformed<'_> {
    fn log(&self) {
        tracing::info!(
            graph = self.graph,
            instance = self.instance,
            ready_jobs = self.ready_jobs,
            pending_jobs = self.pending_jobs,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "transfo_job",
            otel.name = name,
            graph = self.graph,
            instance = self.instance,
        )
    }
}

/// A dynamic parameter value arrived from a configuration actor.
pub struct ParamValueReceived<'a> {
    pub graph: &'a str,
    pub param: &'a str,
    pub value: i64,
}

impl Display for ParamValueReceived<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Parameter '{}' of graph '{}' resolved to {}",
            self.param, self.graph, self.value
        )
    }
}

impl StructuredLog for ParamValueReceived<'_> {
    fn log(&self) {
        tracing::info!(graph = self.graph, param = self.param, value = self.value, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "param_value",
            otel.name = name,
            graph = self.graph,
            param = self.param,
        )
    }
}

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Edges and delays.

use crate::errors::ExpressionError;
use crate::expr::{Expression, ParamScope};
use crate::pisdf::vertex::{EdgeId, VertexId};

/// Token survival policy for a delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    /// Tokens survive every iteration; storage is lifted to the top-level
    /// graph and backed by a stable memory address.
    Persistent,
    /// Tokens survive across the given number of hierarchy levels.
    LocallyPersistent(i32),
    /// Tokens are re-created each iteration through `Init`/`End` actors.
    NonPersistent,
}

/// Setter or getter attachment of a delay.
#[derive(Debug, Clone, PartialEq)]
pub struct DelayEndpoint {
    pub vertex: VertexId,
    pub port: usize,
    pub rate: Expression,
}

/// Tokens present on an edge before any firing.
///
/// The token-count expression must not be dynamic. When a non-persistent
/// delay has no setter/getter, the single-rate transformation synthesizes
/// `Init`/`End` vertices for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Delay {
    pub expression: Expression,
    pub persistence: Persistence,
    pub setter: Option<DelayEndpoint>,
    pub getter: Option<DelayEndpoint>,
    /// Materialized delay vertex when a setter or getter is attached.
    pub delay_vertex: Option<VertexId>,
    /// Stable storage identifier for persistent delays, assigned in
    /// first-creation order during elaboration.
    pub memory_address: Option<u64>,
}

impl Delay {
    pub fn value(&self, scope: &dyn ParamScope) -> Result<i64, ExpressionError> {
        self.expression.evaluate_i64(scope)
    }

    pub fn is_persistent(&self) -> bool {
        matches!(
            self.persistence,
            Persistence::Persistent | Persistence::LocallyPersistent(_)
        )
    }
}

/// Directed, rate-annotated connection between two vertices of one graph.
#[derive(Debug, Clone)]
pub struct Edge {
    pub ix: EdgeId,
    pub source: VertexId,
    pub source_port: usize,
    pub source_rate: Expression,
    pub sink: VertexId,
    pub sink_port: usize,
    pub sink_rate: Expression,
    pub delay: Option<Delay>,
}

impl Edge {
    pub fn source_rate_value(&self, scope: &dyn ParamScope) -> Result<i64, ExpressionError> {
        self.source_rate.evaluate_i64(scope)
    }

    pub fn sink_rate_value(&self, scope: &dyn ParamScope) -> Result<i64, ExpressionError> {
        self.sink_rate.evaluate_i64(scope)
    }

    pub fn delay_value(&self, scope: &dyn ParamScope) -> Result<i64, ExpressionError> {
        match &self.delay {
            Some(delay) => delay.value(scope),
            None => Ok(0),
        }
    }

    pub fn is_self_loop(&self) -> bool {
        self.source == self.sink
    }
}

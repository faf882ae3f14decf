// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors raised by the repetition-vector solver and the single-rate
//! transformation. All of these are recoverable at the iteration boundary.

use thiserror::Error;

use super::ExpressionError;

/// Transformation-phase failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransfoError {
    /// One side of an edge evaluates to zero while the other does not, or
    /// the balance equation `prod * RV(src) == cons * RV(snk)` does not
    /// hold after solving.
    #[error("Inconsistent rates on edge '{edge}': prod {prod} * {src_rv} != cons {cons} * {snk_rv}")]
    InconsistentRates {
        edge: String,
        prod: i64,
        cons: i64,
        src_rv: u32,
        snk_rv: u32,
    },

    /// Two propagation paths assign different repetition counts to the
    /// same vertex.
    #[error("Inconsistent repetition count for vertex '{0}'")]
    Inconsistent(String),

    /// Transformation attempted on a dynamic subgraph whose parameters are
    /// still pending.
    #[error("Parameter '{param}' of graph '{graph}' is not resolved yet")]
    UnresolvedParameter { graph: String, param: String },

    /// A self-edge without a delay cannot be scheduled.
    #[error("Self loop without delay on edge '{0}'")]
    IllegalLoop(String),

    /// A self-edge whose delay does not strictly exceed the consumption of
    /// one firing.
    #[error("Insufficient delay [{delay}] on edge '{edge}' (needs more than {rate})")]
    InsufficientDelay { edge: String, delay: i64, rate: i64 },

    /// A rate expression failed to evaluate during transformation.
    #[error(transparent)]
    Expression(#[from] ExpressionError),

    /// Internal consistency failure; indicates a bug in the transformer.
    #[error("Transformation invariant broken: {0}")]
    Internal(String),
}

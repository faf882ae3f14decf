// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors raised while a host application builds a PiSDF graph.
//!
//! All of these terminate the construction call that produced them; the
//! graph is left untouched.

use thiserror::Error;

use crate::pisdf::VertexKind;

/// Invariant broken at graph build time.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConstructionError {
    /// Operation expected a subgraph or vertex that does not exist.
    #[error("No parent graph for '{0}'")]
    NullParent(String),

    /// A vertex of one subtype was used where another subtype is required.
    #[error("Vertex '{name}' has subtype {actual:?}, expected {expected:?}")]
    SubtypeMismatch {
        name: String,
        expected: VertexKind,
        actual: VertexKind,
    },

    /// Two edges claim the same port of the same vertex.
    #[error("Port {port} ({direction}) of vertex '{vertex}' is already connected")]
    DuplicatePortConnection {
        vertex: String,
        port: usize,
        direction: &'static str,
    },

    /// A port index beyond the vertex's declared edge count.
    #[error("Port {port} ({direction}) out of range for vertex '{vertex}'")]
    PortOutOfRange {
        vertex: String,
        port: usize,
        direction: &'static str,
    },

    /// The subtype pins the number of edges on one side.
    #[error("Vertex '{name}' of subtype {kind:?} requires exactly {expected} {direction} edge(s)")]
    FixedPortCount {
        name: String,
        kind: VertexKind,
        expected: usize,
        direction: &'static str,
    },

    /// Parameter names are unique per graph (lowercase comparison).
    #[error("Parameter '{0}' already exists in graph '{1}'")]
    ParamNameDuplicate(String, String),

    /// A rate expression failed to parse.
    #[error("Invalid rate expression '{text}': {reason}")]
    RateExpressionInvalid { text: String, reason: String },

    /// Source and sink of an edge must belong to the same graph.
    #[error("Edge endpoints '{source_vertex}' and '{sink}' live in different graphs")]
    CrossGraphEdge { source_vertex: String, sink: String },

    /// A delay was given a dynamic token-count expression.
    #[error("Delay expression on edge '{0}' must not depend on dynamic parameters")]
    DynamicDelay(String),

    /// Only dynamic parameters accept value writes.
    #[error("Parameter '{0}' is not dynamic")]
    NotDynamic(String),
}

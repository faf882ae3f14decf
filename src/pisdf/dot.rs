// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! DOT export of a graph, for debugging transformations.

use std::fmt::Write as _;

use crate::expr::ParamScope;
use crate::pisdf::graph::Graph;
use crate::pisdf::vertex::VertexKind;

fn shape(kind: VertexKind) -> &'static str {
    use VertexKind::*;
    match kind {
        Config => "doubleoctagon",
        Fork | Join | Duplicate | Repeat | Head | Tail => "trapezium",
        Init | End => "diamond",
        Graph => "box3d",
        InputInterface | OutputInterface | ExternInputInterface | ExternOutputInterface => "house",
        Delay => "circle",
        Normal => "box",
    }
}

/// Render one graph (not descending into subgraphs) as a DOT digraph.
///
/// Rates are printed with the given scope when they resolve, as raw infix
/// otherwise.
pub fn export(graph: &Graph, scope: &dyn ParamScope) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph \"{}\" {{", graph.name);
    let _ = writeln!(out, "    rankdir = LR;");
    for vertex in graph.vertices() {
        let _ = writeln!(
            out,
            "    \"v{}\" [label = \"{}\", shape = {}];",
            vertex.ix.0,
            vertex.name,
            shape(vertex.kind)
        );
    }
    for edge in graph.edges() {
        let src_rate = edge
            .source_rate_value(scope)
            .map(|v| v.to_string())
            .unwrap_or_else(|_| edge.source_rate.infix_string());
        let snk_rate = edge
            .sink_rate_value(scope)
            .map(|v| v.to_string())
            .unwrap_or_else(|_| edge.sink_rate.infix_string());
        let mut label = format!("{src_rate}:{snk_rate}");
        if let Some(delay) = &edge.delay {
            let _ = write!(label, " (x{})", delay.expression.infix_string());
        }
        let _ = writeln!(
            out,
            "    \"v{}\" -> \"v{}\" [label = \"{}\"];",
            edge.source.0, edge.sink.0, label
        );
    }
    let _ = writeln!(out, "}}");
    out
}

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Single-rate linkage of one PiSDF edge.
//!
//! For an edge with resolved rates, two ordered vectors are built: the
//! producers (source clones, preceded in consumption order by the setter
//! or a synthesized `Init`) and the consumers (sink clones, followed by
//! the getter or a synthesized `End`). Each entry is annotated with the
//! dependency span it touches on the opposite side; the linkage loop then
//! pops entries off both vectors, inserting `Fork`/`Join` glue wherever a
//! span covers more than one counterpart.

use crate::errors::TransfoError;
use crate::expr::Expression;
use crate::pisdf::{DelayInfo, Edge, EdgeId, Graph, VertexId, VertexKind};
use crate::srdag::deps;

/// One producer or consumer port awaiting linkage.
#[derive(Debug, Clone)]
pub struct EdgeLinker {
    pub vertex: VertexId,
    pub rate: i64,
    pub port: usize,
    pub lower: u32,
    pub upper: u32,
}

impl EdgeLinker {
    fn new(vertex: VertexId, rate: i64, port: usize) -> EdgeLinker {
        EdgeLinker {
            vertex,
            rate,
            port,
            lower: u32::MAX,
            upper: 0,
        }
    }
}

/// Everything the linkage needs to know about one resolved edge.
pub struct ResolvedEdge {
    pub edge_name: String,
    pub src_rate: i64,
    pub snk_rate: i64,
    pub delay: i64,
    pub setter_rate: i64,
    pub setter_rv: u32,
    pub getter_rate: i64,
    pub getter_rv: u32,
    pub snk_rv: u32,
}

fn constant(rate: i64) -> Expression {
    Expression::constant(rate)
}

fn create_sr_edge(
    srdag: &mut Graph,
    source: &EdgeLinker,
    sink: &EdgeLinker,
) -> Result<(), TransfoError> {
    srdag
        .add_edge(Edge {
            ix: EdgeId(0),
            source: source.vertex,
            source_port: source.port,
            source_rate: constant(source.rate),
            sink: sink.vertex,
            sink_port: sink.port,
            sink_rate: constant(sink.rate),
            delay: None,
        })
        .map_err(|err| TransfoError::Internal(err.to_string()))?;
    Ok(())
}

/// Insert a fork behind the current producer and connect it to as many
/// consumers as the producer's dependency span covers; the leftover rate
/// is pushed back as a new producer.
fn add_fork_vertex(
    src_vector: &mut Vec<EdgeLinker>,
    snk_vector: &mut Vec<EdgeLinker>,
    srdag: &mut Graph,
) -> Result<(), TransfoError> {
    let source = src_vector.pop().expect("source for fork");
    let out_count = (source.upper - source.lower) as usize + 1;
    let name = format!(
        "fork-{}_out-{}",
        srdag.vertex(source.vertex).name,
        source.port
    );
    let fork = srdag
        .add_vertex(&name, VertexKind::Fork, 1, out_count)
        .map_err(|err| TransfoError::Internal(err.to_string()))?;
    let fork_input = EdgeLinker::new(fork, source.rate, 0);
    create_sr_edge(srdag, &source, &fork_input)?;

    let mut remaining = source.rate;
    for i in 0..out_count - 1 {
        let sink = snk_vector.pop().expect("sink for fork output");
        remaining -= sink.rate;
        let fork_output = EdgeLinker::new(fork, sink.rate, i);
        create_sr_edge(srdag, &fork_output, &sink)?;
    }
    let mut leftover = EdgeLinker::new(fork, remaining, out_count - 1);
    leftover.lower = source.upper;
    leftover.upper = source.upper;
    src_vector.push(leftover);
    Ok(())
}

/// Mirror of [`add_fork_vertex`] for consumers spanning several producers.
fn add_join_vertex(
    src_vector: &mut Vec<EdgeLinker>,
    snk_vector: &mut Vec<EdgeLinker>,
    srdag: &mut Graph,
) -> Result<(), TransfoError> {
    let sink = snk_vector.pop().expect("sink for join");
    let in_count = (sink.upper - sink.lower) as usize + 1;
    let name = format!("join-{}_in-{}", srdag.vertex(sink.vertex).name, sink.port);
    let join = srdag
        .add_vertex(&name, VertexKind::Join, in_count, 1)
        .map_err(|err| TransfoError::Internal(err.to_string()))?;
    let join_output = EdgeLinker::new(join, sink.rate, 0);
    create_sr_edge(srdag, &join_output, &sink)?;

    let mut remaining = sink.rate;
    for i in 0..in_count - 1 {
        let source = src_vector.pop().expect("source for join input");
        remaining -= source.rate;
        let join_input = EdgeLinker::new(join, source.rate, i);
        create_sr_edge(srdag, &source, &join_input)?;
    }
    let mut leftover = EdgeLinker::new(join, remaining, in_count - 1);
    leftover.lower = sink.upper;
    leftover.upper = sink.upper;
    snk_vector.push(leftover);
    Ok(())
}

/// Annotate both vectors with dependency spans.
///
/// Consumers are walked in consumption order (sink firings, then the
/// getter); each gets the producer span supplying its token window, and
/// the touched producers accumulate the consumer span in return. Vector
/// entries are ordered newest-first, so the entry for position `p`
/// (counted from the oldest) lives at `len - 1 - p`.
pub fn compute_edge_dependencies(
    resolved: &ResolvedEdge,
    src_vector: &mut [EdgeLinker],
    snk_vector: &mut [EdgeLinker],
) {
    let consumer_count = snk_vector.len();
    for c in 0..consumer_count {
        let (start, rate) = if c < resolved.snk_rv as usize {
            (resolved.snk_rate * c as i64, resolved.snk_rate)
        } else {
            let g = c as i64 - i64::from(resolved.snk_rv);
            (
                resolved.snk_rate * i64::from(resolved.snk_rv) + resolved.getter_rate * g,
                resolved.getter_rate,
            )
        };
        let end = start + rate - 1;
        let lower = deps::token_dep(
            start,
            resolved.delay,
            resolved.setter_rate,
            resolved.setter_rv,
            resolved.src_rate,
        ) as u32;
        let upper = deps::token_dep(
            end,
            resolved.delay,
            resolved.setter_rate,
            resolved.setter_rv,
            resolved.src_rate,
        ) as u32;
        let entry = &mut snk_vector[consumer_count - 1 - c];
        entry.lower = lower;
        entry.upper = upper;

        let src_len = src_vector.len();
        for d in [lower, upper] {
            let entry = &mut src_vector[src_len - 1 - d as usize];
            entry.lower = entry.lower.min(c as u32);
            entry.upper = entry.upper.max(c as u32);
        }
    }
}

/// Pop producers and consumers until both vectors are drained, creating
/// direct edges where the spans agree and glue vertices elsewhere.
pub fn link_edge(
    resolved: &ResolvedEdge,
    mut src_vector: Vec<EdgeLinker>,
    mut snk_vector: Vec<EdgeLinker>,
    srdag: &mut Graph,
) -> Result<(), TransfoError> {
    compute_edge_dependencies(resolved, &mut src_vector, &mut snk_vector);
    while let Some(sink) = snk_vector.last() {
        let source = src_vector.last().ok_or_else(|| {
            TransfoError::Internal(format!(
                "ran out of producers while linking edge '{}'",
                resolved.edge_name
            ))
        })?;
        if sink.lower == sink.upper {
            if source.lower == source.upper {
                let source = src_vector.pop().expect("checked above");
                let sink = snk_vector.pop().expect("checked above");
                create_sr_edge(srdag, &source, &sink)?;
            } else {
                add_fork_vertex(&mut src_vector, &mut snk_vector, srdag)?;
            }
        } else {
            add_join_vertex(&mut src_vector, &mut snk_vector, srdag)?;
        }
    }
    if !src_vector.is_empty() {
        return Err(TransfoError::Internal(format!(
            "remaining producers after linking edge '{}'",
            resolved.edge_name
        )));
    }
    Ok(())
}

/// Synthesize the `Init` actor standing in for a delay with no setter.
pub fn make_init_vertex(
    srdag: &mut Graph,
    edge_name: &str,
    persistent: bool,
    memory_address: Option<u64>,
    delay_value: i64,
) -> Result<VertexId, TransfoError> {
    let init = srdag
        .add_vertex(&format!("init-{edge_name}"), VertexKind::Init, 0, 1)
        .map_err(|err| TransfoError::Internal(err.to_string()))?;
    srdag.vertex_mut(init).delay_info = Some(DelayInfo {
        persistent,
        memory_address,
        value: delay_value,
    });
    Ok(init)
}

/// Synthesize the matching `End` actor.
pub fn make_end_vertex(
    srdag: &mut Graph,
    edge_name: &str,
    persistent: bool,
    memory_address: Option<u64>,
    delay_value: i64,
) -> Result<VertexId, TransfoError> {
    let end = srdag
        .add_vertex(&format!("end-{edge_name}"), VertexKind::End, 1, 0)
        .map_err(|err| TransfoError::Internal(err.to_string()))?;
    srdag.vertex_mut(end).delay_info = Some(DelayInfo {
        persistent,
        memory_address,
        value: delay_value,
    });
    Ok(end)
}

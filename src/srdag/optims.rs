// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Peephole optimizer for the single-rate graph.
//!
//! Each rule collapses one redundant glue pattern and only fires on
//! vertices that have not been dispatched yet (no schedule task index).
//! The driver runs the unitary-rate pass first, iterates the fork/join
//! family to a fixed point, then applies the remaining rules once.

use tracing::debug;

use crate::pisdf::{Graph, VertexId, VertexKind};

/// Full optimization pipeline.
pub fn optimize(srdag: &mut Graph) {
    reduce_unitary_rate_actors(srdag);
    loop {
        let mut changed = reduce_fork_fork(srdag);
        changed |= reduce_join_join(srdag);
        changed |= reduce_join_fork(srdag);
        if !changed {
            break;
        }
    }
    reduce_repeat_fork(srdag);
    reduce_dup_dup(srdag);
    reduce_join_end(srdag);
    reduce_init_end(srdag);
}

fn unscheduled(graph: &Graph, vertex: VertexId) -> bool {
    graph.vertex(vertex).schedule_task_ix.is_none()
}

fn const_rate(graph: &Graph, edge: crate::pisdf::EdgeId, source_side: bool) -> i64 {
    let edge = graph.edge(edge);
    let expr = if source_side {
        &edge.source_rate
    } else {
        &edge.sink_rate
    };
    expr.value().unwrap_or(0)
}

/// Bypass glue vertices with one input, one output, and matching rates.
pub fn reduce_unitary_rate_actors(srdag: &mut Graph) -> bool {
    let mut optimized = false;
    loop {
        let candidate = srdag.vertices().find_map(|v| {
            if !v.kind.is_glue()
                || matches!(v.kind, VertexKind::Init | VertexKind::End)
                || v.schedule_task_ix.is_some()
            {
                return None;
            }
            if v.connected_inputs() != 1 || v.connected_outputs() != 1 {
                return None;
            }
            let in_edge = v.inputs.iter().flatten().next().copied()?;
            let out_edge = v.outputs.iter().flatten().next().copied()?;
            let in_rate = const_rate(srdag, in_edge, false);
            let out_rate = const_rate(srdag, out_edge, true);
            (in_rate == out_rate).then_some((v.ix, in_edge, out_edge))
        });
        let Some((vertex, in_edge, out_edge)) = candidate else {
            break;
        };
        let (sink, sink_port, sink_rate) = {
            let e = srdag.edge(out_edge);
            (e.sink, e.sink_port, e.sink_rate.clone())
        };
        debug!(vertex = %srdag.vertex(vertex).name, "bypassing unitary-rate actor");
        srdag.remove_edge(out_edge);
        srdag
            .set_edge_sink(in_edge, sink, sink_port, sink_rate)
            .expect("freed port");
        srdag.remove_vertex(vertex);
        optimized = true;
    }
    optimized
}

/// Merge a producer glue vertex into the same-kind consumer it feeds.
///
/// The merged vertex splices the inner vertex's ports in place of the port
/// that connected the pair, preserving token order.
fn reduce_chained(srdag: &mut Graph, kind: VertexKind) -> bool {
    let mut optimized = false;
    loop {
        // For forks/duplicates the chain grows downstream (inner vertex is
        // fed by the outer one); for joins it grows upstream.
        let downstream = matches!(kind, VertexKind::Fork | VertexKind::Duplicate);
        let candidate = srdag.vertices().find_map(|v| {
            if v.kind != kind || v.schedule_task_ix.is_some() {
                return None;
            }
            let bridge = if downstream {
                v.inputs.first().copied().flatten()
            } else {
                v.outputs.first().copied().flatten()
            }?;
            let other = if downstream {
                srdag.edge(bridge).source
            } else {
                srdag.edge(bridge).sink
            };
            (srdag.vertex(other).kind == kind && unscheduled(srdag, other))
                .then_some((v.ix, other, bridge))
        });
        let Some((inner, outer, bridge)) = candidate else {
            break;
        };

        // `outer` keeps its external connection; `inner`'s ports splice in
        // at the bridge port.
        let offset = if downstream {
            srdag.edge(bridge).source_port
        } else {
            srdag.edge(bridge).sink_port
        };
        let (inner_name, outer_name) = (
            srdag.vertex(inner).name.clone(),
            srdag.vertex(outer).name.clone(),
        );
        let name = format!("merged-{outer_name}-{inner_name}");
        let inner_fanout = if downstream {
            srdag.vertex(inner).outputs.len()
        } else {
            srdag.vertex(inner).inputs.len()
        };
        let outer_fanout = if downstream {
            srdag.vertex(outer).outputs.len()
        } else {
            srdag.vertex(outer).inputs.len()
        };
        let merged_count = outer_fanout - 1 + inner_fanout;
        let merged = if downstream {
            srdag.add_vertex(&name, kind, 1, merged_count)
        } else {
            srdag.add_vertex(&name, kind, merged_count, 1)
        }
        .expect("glue vertex");
        debug!(%name, "merging chained glue vertices");

        srdag.remove_edge(bridge);
        // The through edge on the non-fanout side.
        if downstream {
            let through = srdag.vertex(outer).inputs[0].expect("fork has an input");
            let rate = srdag.edge(through).sink_rate.clone();
            srdag.set_edge_sink(through, merged, 0, rate).expect("free port");
        } else {
            let through = srdag.vertex(outer).outputs[0].expect("join has an output");
            let rate = srdag.edge(through).source_rate.clone();
            srdag
                .set_edge_source(through, merged, 0, rate)
                .expect("free port");
        }

        let mut port = 0usize;
        for i in 0..outer_fanout {
            if i == offset {
                for j in 0..inner_fanout {
                    relink_fanout(srdag, inner, j, merged, port, downstream);
                    port += 1;
                }
            } else {
                relink_fanout(srdag, outer, i, merged, port, downstream);
                port += 1;
            }
        }
        srdag.remove_vertex(outer);
        srdag.remove_vertex(inner);
        optimized = true;
    }
    optimized
}

fn relink_fanout(
    srdag: &mut Graph,
    from: VertexId,
    from_port: usize,
    to: VertexId,
    to_port: usize,
    downstream: bool,
) {
    if downstream {
        if let Some(edge) = srdag.vertex(from).outputs[from_port] {
            let rate = srdag.edge(edge).source_rate.clone();
            srdag
                .set_edge_source(edge, to, to_port, rate)
                .expect("free port");
        }
    } else if let Some(edge) = srdag.vertex(from).inputs[from_port] {
        let rate = srdag.edge(edge).sink_rate.clone();
        srdag.set_edge_sink(edge, to, to_port, rate).expect("free port");
    }
}

pub fn reduce_fork_fork(srdag: &mut Graph) -> bool {
    reduce_chained(srdag, VertexKind::Fork)
}

pub fn reduce_join_join(srdag: &mut Graph) -> bool {
    reduce_chained(srdag, VertexKind::Join)
}

pub fn reduce_dup_dup(srdag: &mut Graph) -> bool {
    reduce_chained(srdag, VertexKind::Duplicate)
}

/// Replace a `Join -> Fork` pair by a direct re-linking of the join's
/// producers to the fork's consumers, inserting the minimum set of new
/// glue; both sides are walked port-ascending.
pub fn reduce_join_fork(srdag: &mut Graph) -> bool {
    let mut optimized = false;
    loop {
        let candidate = srdag.vertices().find_map(|v| {
            if v.kind != VertexKind::Join || v.schedule_task_ix.is_some() {
                return None;
            }
            let out_edge = v.outputs.first().copied().flatten()?;
            let fork = srdag.edge(out_edge).sink;
            (srdag.vertex(fork).kind == VertexKind::Fork && unscheduled(srdag, fork))
                .then_some((v.ix, fork, out_edge))
        });
        let Some((join, fork, bridge)) = candidate else {
            break;
        };
        debug!(
            join = %srdag.vertex(join).name,
            fork = %srdag.vertex(fork).name,
            "re-linking join/fork pair"
        );

        #[derive(Clone)]
        struct Linker {
            vertex: VertexId,
            rate: i64,
            port: usize,
        }

        let mut sources: Vec<Linker> = Vec::new();
        for i in 0..srdag.vertex(join).inputs.len() {
            let edge = srdag.vertex(join).inputs[i].expect("join input connected");
            let e = srdag.edge(edge);
            sources.push(Linker {
                vertex: e.source,
                rate: e.source_rate.value().unwrap_or(0),
                port: e.source_port,
            });
            srdag.remove_edge(edge);
        }
        let mut sinks: Vec<Linker> = Vec::new();
        for i in 0..srdag.vertex(fork).outputs.len() {
            let edge = srdag.vertex(fork).outputs[i].expect("fork output connected");
            let e = srdag.edge(edge);
            sinks.push(Linker {
                vertex: e.sink,
                rate: e.sink_rate.value().unwrap_or(0),
                port: e.sink_port,
            });
            srdag.remove_edge(edge);
        }
        srdag.remove_edge(bridge);
        srdag.remove_vertex(join);
        srdag.remove_vertex(fork);

        // Count how many entries starting at `from` are needed to cover
        // `rate` tokens.
        fn edges_to_cover(rate: i64, entries: &[Linker], from: usize) -> usize {
            let mut total = 0;
            let mut count = 0;
            while rate > total {
                total += entries[from + count].rate;
                count += 1;
            }
            count
        }

        fn direct_edge(srdag: &mut Graph, source: &Linker, sink: &Linker) {
            let _ = srdag.add_edge(crate::pisdf::Edge {
                ix: crate::pisdf::EdgeId(0),
                source: source.vertex,
                source_port: source.port,
                source_rate: crate::expr::Expression::constant(source.rate),
                sink: sink.vertex,
                sink_port: sink.port,
                sink_rate: crate::expr::Expression::constant(sink.rate),
                delay: None,
            });
        }

        // Walk both arrays port-ascending; partially consumed entries are
        // replaced in place by the glue vertex carrying the leftover rate.
        let mut src_ix = 0usize;
        let mut snk_ix = 0usize;
        while snk_ix < sinks.len() {
            if sources[src_ix].rate == sinks[snk_ix].rate {
                direct_edge(srdag, &sources[src_ix], &sinks[snk_ix]);
                src_ix += 1;
                snk_ix += 1;
            } else if sources[src_ix].rate > sinks[snk_ix].rate {
                // One producer covers several consumers: new fork.
                let rate = sources[src_ix].rate;
                let count = edges_to_cover(rate, &sinks, snk_ix);
                let name = format!(
                    "fork::{}::out::{}",
                    srdag.vertex(sources[src_ix].vertex).name,
                    sources[src_ix].port
                );
                let added = srdag
                    .add_vertex(&name, VertexKind::Fork, 1, count)
                    .expect("fork vertex");
                direct_edge(
                    srdag,
                    &sources[src_ix],
                    &Linker {
                        vertex: added,
                        rate,
                        port: 0,
                    },
                );
                for fork_port in 0..count - 1 {
                    direct_edge(
                        srdag,
                        &Linker {
                            vertex: added,
                            rate: sinks[snk_ix].rate,
                            port: fork_port,
                        },
                        &sinks[snk_ix],
                    );
                    sources[src_ix].rate -= sinks[snk_ix].rate;
                    snk_ix += 1;
                }
                sources[src_ix].vertex = added;
                sources[src_ix].port = count - 1;
            } else {
                // One consumer gathers several producers: new join.
                let rate = sinks[snk_ix].rate;
                let count = edges_to_cover(rate, &sources, src_ix);
                let name = format!(
                    "join::{}::in::{}",
                    srdag.vertex(sinks[snk_ix].vertex).name,
                    sinks[snk_ix].port
                );
                let added = srdag
                    .add_vertex(&name, VertexKind::Join, count, 1)
                    .expect("join vertex");
                direct_edge(
                    srdag,
                    &Linker {
                        vertex: added,
                        rate,
                        port: 0,
                    },
                    &sinks[snk_ix],
                );
                for join_port in 0..count - 1 {
                    direct_edge(
                        srdag,
                        &sources[src_ix],
                        &Linker {
                            vertex: added,
                            rate: sources[src_ix].rate,
                            port: join_port,
                        },
                    );
                    sinks[snk_ix].rate -= sources[src_ix].rate;
                    src_ix += 1;
                }
                sinks[snk_ix].vertex = added;
                sinks[snk_ix].port = count - 1;
            }
        }
        optimized = true;
    }
    optimized
}

/// A repeat whose output rate is a whole multiple of its input rate,
/// feeding a fork, becomes a duplicate feeding the fork's sinks.
pub fn reduce_repeat_fork(srdag: &mut Graph) -> bool {
    let mut optimized = false;
    loop {
        let candidate = srdag.vertices().find_map(|v| {
            if v.kind != VertexKind::Repeat || v.schedule_task_ix.is_some() {
                return None;
            }
            let in_edge = v.inputs.first().copied().flatten()?;
            let out_edge = v.outputs.first().copied().flatten()?;
            let in_rate = const_rate(srdag, in_edge, false);
            let out_rate = const_rate(srdag, out_edge, true);
            if in_rate == 0 || out_rate % in_rate != 0 {
                return None;
            }
            let fork = srdag.edge(out_edge).sink;
            (srdag.vertex(fork).kind == VertexKind::Fork && unscheduled(srdag, fork))
                .then_some((v.ix, fork, in_edge, out_edge))
        });
        let Some((repeat, fork, in_edge, out_edge)) = candidate else {
            break;
        };
        let name = srdag.vertex(repeat).name.clone();
        let fanout = srdag.vertex(fork).outputs.len();
        let duplicate = srdag
            .add_vertex(&name, VertexKind::Duplicate, 1, fanout)
            .expect("duplicate vertex");
        debug!(repeat = %name, "rewriting repeat/fork as duplicate");
        srdag.remove_edge(out_edge);
        let rate = srdag.edge(in_edge).sink_rate.clone();
        srdag
            .set_edge_sink(in_edge, duplicate, 0, rate)
            .expect("free port");
        for port in 0..fanout {
            if let Some(edge) = srdag.vertex(fork).outputs[port] {
                let rate = srdag.edge(edge).source_rate.clone();
                srdag
                    .set_edge_source(edge, duplicate, port, rate)
                    .expect("free port");
            }
        }
        srdag.remove_vertex(repeat);
        srdag.remove_vertex(fork);
        optimized = true;
    }
    optimized
}

/// A join feeding an `End` that does not terminate a persistent delay is
/// replaced by one `End` per producer, avoiding the gather copy.
pub fn reduce_join_end(srdag: &mut Graph) -> bool {
    let mut optimized = false;
    loop {
        let candidate = srdag.vertices().find_map(|v| {
            if v.kind != VertexKind::Join || v.schedule_task_ix.is_some() {
                return None;
            }
            let out_edge = v.outputs.first().copied().flatten()?;
            let end = srdag.edge(out_edge).sink;
            let end_vertex = srdag.vertex(end);
            if end_vertex.kind != VertexKind::End || end_vertex.schedule_task_ix.is_some() {
                return None;
            }
            if end_vertex
                .delay_info
                .as_ref()
                .map(|info| info.persistent)
                .unwrap_or(false)
            {
                return None;
            }
            Some((v.ix, end, out_edge))
        });
        let Some((join, end, bridge)) = candidate else {
            break;
        };
        debug!(join = %srdag.vertex(join).name, "splitting join/end into parallel ends");
        srdag.remove_edge(bridge);
        let delay_info = srdag.vertex(end).delay_info.clone();
        let inputs: Vec<_> = srdag.vertex(join).inputs.iter().flatten().copied().collect();
        for edge in inputs {
            let source_name = srdag.vertex(srdag.edge(edge).source).name.clone();
            let new_end = srdag
                .add_vertex(&format!("end-{source_name}"), VertexKind::End, 1, 0)
                .expect("end vertex");
            srdag.vertex_mut(new_end).delay_info = delay_info.clone();
            let rate = srdag.edge(edge).sink_rate.clone();
            srdag.set_edge_sink(edge, new_end, 0, rate).expect("free port");
        }
        srdag.remove_vertex(join);
        srdag.remove_vertex(end);
        optimized = true;
    }
    optimized
}

/// Remove direct `Init -> End` pairs entirely.
pub fn reduce_init_end(srdag: &mut Graph) -> bool {
    let mut optimized = false;
    loop {
        let candidate = srdag.vertices().find_map(|v| {
            if v.kind != VertexKind::Init || v.schedule_task_ix.is_some() {
                return None;
            }
            let out_edge = v.outputs.first().copied().flatten()?;
            let end = srdag.edge(out_edge).sink;
            (srdag.vertex(end).kind == VertexKind::End && unscheduled(srdag, end))
                .then_some((v.ix, end, out_edge))
        });
        let Some((init, end, edge)) = candidate else {
            break;
        };
        debug!(init = %srdag.vertex(init).name, "removing init/end pair");
        srdag.remove_edge(edge);
        srdag.remove_vertex(init);
        srdag.remove_vertex(end);
        optimized = true;
    }
    optimized
}

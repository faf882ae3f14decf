// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Dependency solver: which producer firings supply the token range read
//! by one consumer firing.
//!
//! The flat formulas are consumed by the single-rate transformation to
//! annotate its linker vectors. The recursive resolver additionally walks
//! delays (setter/getter regions) and hierarchy boundaries (descending
//! into subgraphs, ascending through input interfaces) and reports an
//! `Unresolved` sentinel when a dynamic subgraph's parameters are still
//! pending.

use crate::errors::TransfoError;
use crate::math::floor_div;
use crate::pisdf::{EdgeId, Graph, JobParams, VertexId, VertexKind};

/// First producer firing supplying consumer firing `k` on an edge with the
/// given rates and delay. Negative values index the delay region.
pub fn cons_lower_dep(snk_rate: i64, src_rate: i64, firing: u32, delay: i64) -> i64 {
    floor_div(snk_rate * i64::from(firing) - delay, src_rate)
}

/// Last producer firing supplying consumer firing `k`.
pub fn cons_upper_dep(snk_rate: i64, src_rate: i64, firing: u32, delay: i64) -> i64 {
    floor_div(snk_rate * (i64::from(firing) + 1) - 1 - delay, src_rate)
}

/// First consumer firing reading producer firing `k`.
pub fn prod_lower_dep(src_rate: i64, snk_rate: i64, firing: u32, delay: i64) -> i64 {
    floor_div(src_rate * i64::from(firing) + delay, snk_rate)
}

/// Last consumer firing reading producer firing `k`.
pub fn prod_upper_dep(src_rate: i64, snk_rate: i64, firing: u32, delay: i64) -> i64 {
    floor_div(src_rate * (i64::from(firing) + 1) - 1 + delay, snk_rate)
}

/// Producer position supplying an absolute token of an edge's stream,
/// counted from the oldest producer: setter (or init) firings first, then
/// source firings.
pub fn token_dep(token: i64, delay: i64, setter_rate: i64, setter_rv: u32, src_rate: i64) -> i64 {
    if token < delay {
        debug_assert!(setter_rate > 0, "delay region with no setter rate");
        token / setter_rate
    } else {
        i64::from(setter_rv) + (token - delay) / src_rate
    }
}

/// One resolved producer range.
#[derive(Debug, Clone, PartialEq)]
pub enum Dependency {
    /// Consecutive firings of a concrete vertex.
    Exec {
        /// Subgraph path of the producing vertex.
        path: Vec<usize>,
        vertex: VertexId,
        port: usize,
        rate: i64,
        firing_start: u32,
        firing_end: u32,
        /// Byte offsets inside the first and last firing's production.
        memory_start: u32,
        memory_end: u32,
    },
    /// Tokens served from a delay with no setter attached.
    Delay {
        path: Vec<usize>,
        edge: EdgeId,
        memory_start: u32,
        memory_end: u32,
    },
    /// The producing subgraph's parameters are still pending; the firing
    /// is not schedulable yet.
    Unresolved,
}

/// Parameter environment per graph path.
pub trait ParamsLookup {
    fn params(&self, path: &[usize]) -> Option<&JobParams>;
}

impl ParamsLookup for std::collections::HashMap<Vec<usize>, JobParams> {
    fn params(&self, path: &[usize]) -> Option<&JobParams> {
        self.get(path)
    }
}

pub struct DependencySolver<'a> {
    root: &'a Graph,
    env: &'a dyn ParamsLookup,
}

impl<'a> DependencySolver<'a> {
    pub fn new(root: &'a Graph, env: &'a dyn ParamsLookup) -> DependencySolver<'a> {
        DependencySolver { root, env }
    }

    /// Enumerate the producers of the token range read by `firing` of the
    /// sink of `edge`.
    pub fn resolve_consumption(
        &self,
        path: &[usize],
        edge: EdgeId,
        firing: u32,
    ) -> Result<Vec<Dependency>, TransfoError> {
        let graph = self.root.descend(path);
        let params = match self.env.params(path) {
            Some(params) => params,
            None => return Ok(vec![Dependency::Unresolved]),
        };
        let snk_rate = graph.edge(edge).sink_rate_value(params)?;
        let lower = snk_rate * i64::from(firing);
        let upper = snk_rate * (i64::from(firing) + 1) - 1;
        let mut result = Vec::new();
        self.exec_deps(path, edge, lower, upper, &mut result)?;
        Ok(result)
    }

    /// Recursive core: producers of tokens `[lower, upper]` of `edge`.
    fn exec_deps(
        &self,
        path: &[usize],
        edge_id: EdgeId,
        lower: i64,
        upper: i64,
        out: &mut Vec<Dependency>,
    ) -> Result<(), TransfoError> {
        if upper < lower {
            return Ok(());
        }
        let graph = self.root.descend(path);
        let params = match self.env.params(path) {
            Some(params) => params,
            None => {
                out.push(Dependency::Unresolved);
                return Ok(());
            }
        };
        let edge = graph.edge(edge_id);
        let source = graph.vertex(edge.source);
        let src_rate = edge.source_rate_value(params)?;
        let delay_value = edge.delay_value(params)?;

        // Getter side of a materialized delay: relocate onto the delay's
        // main edge, past its sink's total consumption.
        if source.kind == VertexKind::Delay {
            let main_edge = graph
                .edges()
                .find(|e| {
                    e.delay
                        .as_ref()
                        .and_then(|d| d.delay_vertex)
                        .map(|v| v == edge.source)
                        .unwrap_or(false)
                })
                .ok_or_else(|| {
                    TransfoError::Internal("delay vertex without owning edge".to_string())
                })?;
            let main_snk_rate = main_edge.sink_rate_value(params)?;
            let total_cons = main_snk_rate * i64::from(graph.vertex(main_edge.sink).rv);
            return self.exec_deps(path, main_edge.ix, lower + total_cons, upper + total_cons, out);
        }

        if upper < delay_value {
            // Entirely inside the delay region.
            return self.delay_deps(path, edge_id, lower, upper, out);
        }
        if lower < delay_value {
            // Straddling: union of the delay region and the source region.
            self.delay_deps(path, edge_id, lower, delay_value - 1, out)?;
            return self.exec_deps(path, edge_id, delay_value, upper, out);
        }

        let firing_start = floor_div(lower - delay_value, src_rate);
        let firing_end = floor_div(upper - delay_value, src_rate);
        let memory_start = ((lower - delay_value) % src_rate) as u32;
        let memory_end = ((upper - delay_value) % src_rate) as u32;

        match source.kind {
            VertexKind::Graph => {
                // Descend: tokens come from the subgraph firing's inner
                // producers through its output interface.
                let sub_ix = source
                    .subgraph
                    .ok_or_else(|| TransfoError::Internal("graph vertex without body".into()))?;
                let mut sub_path = path.to_vec();
                sub_path.push(sub_ix);
                let sub = graph.subgraph(sub_ix);
                let sub_params = match self.env.params(&sub_path) {
                    Some(params) => params,
                    None => {
                        out.push(Dependency::Unresolved);
                        return Ok(());
                    }
                };
                let interface = sub.output_interfaces[edge.source_port];
                let inner_edge_ix = sub.vertex(interface).inputs[0]
                    .ok_or_else(|| TransfoError::Internal("unconnected output interface".into()))?;
                let inner_edge = sub.edge(inner_edge_ix);
                let inner_total = inner_edge.source_rate_value(sub_params)?
                    * i64::from(sub.vertex(inner_edge.source).rv);
                // The interface forwards the last `src_rate` tokens of the
                // inner production of each subgraph firing.
                let offset = inner_total - src_rate;
                for f in firing_start..=firing_end {
                    let local_start = if f == firing_start { i64::from(memory_start) } else { 0 };
                    let local_end = if f == firing_end {
                        i64::from(memory_end)
                    } else {
                        src_rate - 1
                    };
                    self.exec_deps(
                        &sub_path,
                        inner_edge_ix,
                        offset + local_start,
                        offset + local_end,
                        out,
                    )?;
                }
                Ok(())
            }
            VertexKind::InputInterface => {
                // Ascend: the interface repeats the tokens of the outer
                // edge feeding the enclosing graph vertex.
                if path.is_empty() {
                    return Err(TransfoError::Internal(
                        "input interface at root graph".into(),
                    ));
                }
                let parent_path = &path[..path.len() - 1];
                let parent = self.root.descend(parent_path);
                let (outer_edge_ix, outer_snk_rate) = {
                    let params = match self.env.params(parent_path) {
                        Some(p) => p,
                        None => {
                            out.push(Dependency::Unresolved);
                            return Ok(());
                        }
                    };
                    let sub_ix = *path.last().expect("non-empty path");
                    let graph_vertex = parent
                        .vertices()
                        .find(|v| v.subgraph == Some(sub_ix))
                        .ok_or_else(|| {
                            TransfoError::Internal("subgraph without parent vertex".into())
                        })?;
                    let port = graph
                        .input_interfaces
                        .iter()
                        .position(|&v| v == edge.source)
                        .expect("interface is registered");
                    let outer_edge_ix = graph_vertex.inputs[port].ok_or_else(|| {
                        TransfoError::Internal("unconnected graph input".into())
                    })?;
                    let rate = parent.edge(outer_edge_ix).sink_rate_value(params)?;
                    (outer_edge_ix, rate)
                };
                // Tokens repeat modulo the outer consumption window.
                let outer_lower = (lower - delay_value) % outer_snk_rate;
                let outer_upper = (upper - delay_value) % outer_snk_rate;
                if outer_lower <= outer_upper {
                    self.exec_deps(parent_path, outer_edge_ix, outer_lower, outer_upper, out)
                } else {
                    self.exec_deps(parent_path, outer_edge_ix, 0, outer_snk_rate - 1, out)
                }
            }
            _ => {
                out.push(Dependency::Exec {
                    path: path.to_vec(),
                    vertex: edge.source,
                    port: edge.source_port,
                    rate: src_rate,
                    firing_start: firing_start as u32,
                    firing_end: firing_end as u32,
                    memory_start,
                    memory_end,
                });
                Ok(())
            }
        }
    }

    /// Producers of tokens `[lower, upper]` inside the delay region.
    fn delay_deps(
        &self,
        path: &[usize],
        edge_id: EdgeId,
        lower: i64,
        upper: i64,
        out: &mut Vec<Dependency>,
    ) -> Result<(), TransfoError> {
        let graph = self.root.descend(path);
        let params = self.env.params(path).expect("checked by caller");
        let edge = graph.edge(edge_id);
        let delay = edge.delay.as_ref().expect("delay region implies delay");
        match &delay.setter {
            Some(setter) => {
                let setter_rate = setter.rate.evaluate_i64(params)?;
                out.push(Dependency::Exec {
                    path: path.to_vec(),
                    vertex: setter.vertex,
                    port: setter.port,
                    rate: setter_rate,
                    firing_start: (lower / setter_rate) as u32,
                    firing_end: (upper / setter_rate) as u32,
                    memory_start: (lower % setter_rate) as u32,
                    memory_end: (upper % setter_rate) as u32,
                });
            }
            None => {
                out.push(Dependency::Delay {
                    path: path.to_vec(),
                    edge: edge_id,
                    memory_start: lower as u32,
                    memory_end: upper as u32,
                });
            }
        }
        Ok(())
    }
}

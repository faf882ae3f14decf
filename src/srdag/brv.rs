// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Basic repetition vector solver.
//!
//! Works one connected component at a time: propagate rational repetition
//! counts along edges, scale by the LCM of the denominators, then apply the
//! interface/config scaling rules and verify consistency. Repetition values
//! are written onto the vertices of the graph.

use tracing::debug;

use crate::errors::TransfoError;
use crate::expr::ParamScope;
use crate::math::{self, Rational};
use crate::pisdf::{Graph, VertexId, VertexKind};

struct Component {
    vertices: Vec<VertexId>,
    edge_count: usize,
    has_config: bool,
    has_interfaces: bool,
}

struct Solver {
    rationals: Vec<Rational>,
    visited_vertices: Vec<bool>,
    visited_edges: Vec<bool>,
}

/// Pre-evaluate `(source_rate, sink_rate)` for every edge.
fn precompute_rates(
    graph: &Graph,
    params: &dyn ParamScope,
) -> Result<Vec<(i64, i64)>, TransfoError> {
    let mut rates = vec![(0, 0); graph.edge_capacity()];
    for edge in graph.edges() {
        let src = edge.source_rate_value(params)?;
        let snk = edge.sink_rate_value(params)?;
        if (src == 0) != (snk == 0) {
            return Err(TransfoError::InconsistentRates {
                edge: graph.edge_name(edge.ix),
                prod: src,
                cons: snk,
                src_rv: graph.vertex(edge.source).rv,
                snk_rv: graph.vertex(edge.sink).rv,
            });
        }
        rates[edge.ix.0] = (src, snk);
    }
    Ok(rates)
}

/// True for vertices whose repetition value is pinned at 1 and which only
/// participate in rate propagation as fixed anchors.
fn pinned(kind: VertexKind) -> bool {
    kind.locked_repetition() && !kind.is_interface()
}

impl Solver {
    fn update_rational(
        &mut self,
        graph: &Graph,
        edge_ix: usize,
        rates: &[(i64, i64)],
    ) -> Result<(), TransfoError> {
        let edge = graph.edge(crate::pisdf::EdgeId(edge_ix));
        let (source_rate, sink_rate) = rates[edge_ix];
        let source = graph.vertex(edge.source);
        let sink = graph.vertex(edge.sink);

        // Interface endpoints act as free boundaries here; they are handled
        // by the scale factor afterwards.
        let source_is_if = source.kind.is_input_interface();
        let sink_is_if = sink.kind.is_output_interface();

        let source_rational = if source_is_if {
            Rational::one()
        } else {
            self.rationals[edge.source.0]
        };
        let sink_rational = if sink_is_if {
            Rational::one()
        } else {
            self.rationals[edge.sink.0]
        };

        if sink_rate != 0 && !sink_is_if && sink_rational.is_zero() {
            let mut value = Rational::new(source_rate, sink_rate);
            if !source_rational.is_zero() && !source_is_if {
                value = value.mul(source_rational);
            }
            self.rationals[edge.sink.0] = value;
        } else if sink_rate != 0 && !sink_is_if && !source_rational.is_zero() && !source_is_if {
            // Both ends already solved: a second path reached this vertex
            // and the counts must agree.
            let expected = Rational::new(source_rate, sink_rate).mul(source_rational);
            if expected != sink_rational {
                return Err(TransfoError::Inconsistent(sink.name.clone()));
            }
        }

        let source_rational = if source_is_if {
            Rational::one()
        } else {
            self.rationals[edge.source.0]
        };
        let sink_rational = if sink_is_if {
            Rational::one()
        } else {
            self.rationals[edge.sink.0]
        };
        if source_rate != 0 && !source_is_if && source_rational.is_zero() && !sink_rational.is_zero()
        {
            self.rationals[edge.source.0] = Rational::new(sink_rate, source_rate).mul(sink_rational);
        }
        Ok(())
    }

    /// Undirected traversal from a seed vertex, registering every reached
    /// vertex in insertion order and updating rationals along the way.
    fn extract_component(
        &mut self,
        graph: &Graph,
        seed: VertexId,
        rates: &[(i64, i64)],
    ) -> Result<Component, TransfoError> {
        let mut component = Component {
            vertices: vec![seed],
            edge_count: 0,
            has_config: false,
            has_interfaces: false,
        };
        self.visited_vertices[seed.0] = true;
        let mut cursor = 0;
        while cursor != component.vertices.len() {
            let current = graph.vertex(component.vertices[cursor]);
            cursor += 1;
            component.edge_count += current.connected_outputs();
            component.has_config |= current.kind == VertexKind::Config;
            for edge_ix in current.outputs.iter().flatten() {
                if self.visited_edges[edge_ix.0] {
                    continue;
                }
                self.visited_edges[edge_ix.0] = true;
                let edge = graph.edge(*edge_ix);
                let sink = graph.vertex(edge.sink);
                let sink_is_if = sink.kind.is_output_interface();
                component.has_interfaces |= sink_is_if;
                self.update_rational(graph, edge_ix.0, rates)?;
                if !sink_is_if && !self.visited_vertices[edge.sink.0] {
                    self.visited_vertices[edge.sink.0] = true;
                    component.vertices.push(edge.sink);
                }
            }
            for edge_ix in current.inputs.iter().flatten() {
                if self.visited_edges[edge_ix.0] {
                    continue;
                }
                self.visited_edges[edge_ix.0] = true;
                let edge = graph.edge(*edge_ix);
                let source = graph.vertex(edge.source);
                let source_is_if = source.kind.is_input_interface();
                component.has_interfaces |= source_is_if;
                component.edge_count += usize::from(source_is_if);
                self.update_rational(graph, edge_ix.0, rates)?;
                if !source_is_if && !self.visited_vertices[edge.source.0] {
                    self.visited_vertices[edge.source.0] = true;
                    component.vertices.push(edge.source);
                }
            }
        }
        Ok(component)
    }
}

/// Scale the repetition values so that interface and config-actor edges
/// produce at least as much as their counterpart demands.
fn component_scale_factor(
    graph: &Graph,
    component: &Component,
    rates: &[(i64, i64)],
) -> u32 {
    let mut factor: u32 = 1;
    let in_component = |v: VertexId| component.vertices.contains(&v);

    let scale_for_input = |edge_ix: usize, factor: &mut u32| {
        let edge = match graph.edge_opt(crate::pisdf::EdgeId(edge_ix)) {
            Some(e) => e,
            None => return,
        };
        let (source_rate, sink_rate) = rates[edge_ix];
        let total_cons =
            sink_rate * i64::from(graph.vertex(edge.sink).rv) * i64::from(*factor);
        if total_cons != 0 && total_cons < source_rate {
            *factor *= math::ceil_div(source_rate, total_cons) as u32;
        }
    };

    if component.has_config {
        for cfg in graph.config_vertices() {
            if !in_component(cfg.ix) {
                continue;
            }
            for edge_ix in cfg.outputs.iter().flatten() {
                scale_for_input(edge_ix.0, &mut factor);
            }
        }
    }
    if component.has_interfaces {
        for &input in &graph.input_interfaces {
            let vertex = graph.vertex(input);
            if let Some(edge_ix) = vertex.outputs.first().copied().flatten() {
                let edge = graph.edge(edge_ix);
                if in_component(edge.sink) {
                    scale_for_input(edge_ix.0, &mut factor);
                }
            }
        }
        for &output in &graph.output_interfaces {
            let vertex = graph.vertex(output);
            if let Some(edge_ix) = vertex.inputs.first().copied().flatten() {
                let edge = graph.edge(edge_ix);
                if !in_component(edge.source) {
                    continue;
                }
                let (source_rate, sink_rate) = rates[edge_ix.0];
                let total_prod =
                    source_rate * i64::from(graph.vertex(edge.source).rv) * i64::from(factor);
                if total_prod != 0 && total_prod < sink_rate {
                    factor *= math::ceil_div(sink_rate, total_prod) as u32;
                }
            }
        }
    }
    factor
}

fn check_consistency(
    graph: &Graph,
    component: &Component,
    rates: &[(i64, i64)],
) -> Result<(), TransfoError> {
    for &vertex_ix in &component.vertices {
        let vertex = graph.vertex(vertex_ix);
        for edge_ix in vertex.outputs.iter().flatten() {
            let edge = graph.edge(*edge_ix);
            let source = graph.vertex(edge.source);
            let sink = graph.vertex(edge.sink);
            if sink.kind.is_output_interface()
                || source.kind.is_input_interface()
                || pinned(source.kind)
                || pinned(sink.kind)
            {
                continue;
            }
            let (source_rate, sink_rate) = rates[edge_ix.0];
            if source_rate * i64::from(source.rv) != sink_rate * i64::from(sink.rv) {
                return Err(TransfoError::InconsistentRates {
                    edge: graph.edge_name(*edge_ix),
                    prod: source_rate,
                    cons: sink_rate,
                    src_rv: source.rv,
                    snk_rv: sink.rv,
                });
            }
        }
    }
    Ok(())
}

/// Compute and store the repetition value of every vertex of `graph`.
pub fn compute(graph: &mut Graph, params: &dyn ParamScope) -> Result<(), TransfoError> {
    let rates = precompute_rates(graph, params)?;
    let mut solver = Solver {
        rationals: vec![Rational::zero(); graph.vertex_capacity()],
        visited_vertices: vec![false; graph.vertex_capacity()],
        visited_edges: vec![false; graph.edge_capacity()],
    };

    // Pinned vertices propagate as fixed anchors of value 1.
    for vertex in graph.vertices() {
        if pinned(vertex.kind) {
            solver.rationals[vertex.ix.0] = Rational::one();
        }
    }

    let seeds: Vec<VertexId> = graph
        .vertices()
        .filter(|v| !v.kind.is_interface())
        .map(|v| v.ix)
        .collect();
    let mut components = Vec::new();
    for seed in seeds {
        if solver.visited_vertices[seed.0] {
            continue;
        }
        let component = solver.extract_component(graph, seed, &rates)?;
        if component.edge_count == 0 {
            // Isolated vertices fire once.
            continue;
        }
        components.push(component);
    }

    for component in &components {
        // LCM of the rational denominators turns every count integral.
        let mut lcm_factor: i64 = 1;
        for &vertex_ix in &component.vertices {
            lcm_factor = math::lcm(lcm_factor, solver.rationals[vertex_ix.0].denominator());
        }
        for &vertex_ix in &component.vertices {
            if pinned(graph.vertex(vertex_ix).kind) {
                continue;
            }
            let rv = solver.rationals[vertex_ix.0].mul_int(lcm_factor).to_u64() as u32;
            graph.vertex_mut(vertex_ix).rv = rv;
        }

        if component.has_config || component.has_interfaces {
            let factor = component_scale_factor(graph, component, &rates);
            if factor > 1 {
                for &vertex_ix in &component.vertices {
                    if pinned(graph.vertex(vertex_ix).kind) {
                        continue;
                    }
                    let rv = graph.vertex(vertex_ix).rv * factor;
                    graph.vertex_mut(vertex_ix).rv = rv;
                }
            }
        }

        check_consistency(graph, component, &rates)?;
    }

    print_repetition_values(graph);
    Ok(())
}

fn print_repetition_values(graph: &Graph) {
    debug!(graph = %graph.name, "repetition values");
    for vertex in graph.vertices() {
        if !vertex.kind.is_interface() {
            debug!("    >> {:<30} --> [{}]", vertex.name, vertex.rv);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::EmptyScope;
    use crate::pisdf::PisdfApp;

    #[test]
    fn chain_balances_production_and_consumption() {
        // a(4) -> (1)b : RV(a)=1, RV(b)=4.
        let mut app = PisdfApp::new("top");
        let root = app.root_handle();
        let a = app.create_actor(&root, "a", 0, 1).unwrap();
        let b = app.create_actor(&root, "b", 1, 0).unwrap();
        app.create_edge(&root, a, 0, 4, b, 0, 1).unwrap();
        compute(app.root_mut(), &EmptyScope).unwrap();
        assert_eq!(app.root().vertex(a).rv, 1);
        assert_eq!(app.root().vertex(b).rv, 4);
    }

    #[test]
    fn three_stage_chain_uses_lcm() {
        // a(3) -> (2)b(3) -> (2)c : rationals a=1, b=3/2, c=9/4; the LCM
        // of the denominators (4) makes them integral.
        let mut app = PisdfApp::new("top");
        let root = app.root_handle();
        let a = app.create_actor(&root, "a", 0, 1).unwrap();
        let b = app.create_actor(&root, "b", 1, 1).unwrap();
        let c = app.create_actor(&root, "c", 1, 0).unwrap();
        app.create_edge(&root, a, 0, 3, b, 0, 2).unwrap();
        app.create_edge(&root, b, 0, 3, c, 0, 2).unwrap();
        compute(app.root_mut(), &EmptyScope).unwrap();
        let g = app.root();
        assert_eq!(g.vertex(a).rv, 4);
        assert_eq!(g.vertex(b).rv, 6);
        assert_eq!(g.vertex(c).rv, 9);
    }

    #[test]
    fn disconnected_components_solve_independently() {
        let mut app = PisdfApp::new("top");
        let root = app.root_handle();
        let a = app.create_actor(&root, "a", 0, 1).unwrap();
        let b = app.create_actor(&root, "b", 1, 0).unwrap();
        let c = app.create_actor(&root, "c", 0, 1).unwrap();
        let d = app.create_actor(&root, "d", 1, 0).unwrap();
        app.create_edge(&root, a, 0, 2, b, 0, 1).unwrap();
        app.create_edge(&root, c, 0, 1, d, 0, 3).unwrap();
        compute(app.root_mut(), &EmptyScope).unwrap();
        let g = app.root();
        assert_eq!((g.vertex(a).rv, g.vertex(b).rv), (1, 2));
        assert_eq!((g.vertex(c).rv, g.vertex(d).rv), (3, 1));
    }

    #[test]
    fn isolated_vertex_keeps_rv_one() {
        let mut app = PisdfApp::new("top");
        let root = app.root_handle();
        let a = app.create_actor(&root, "a", 0, 0).unwrap();
        compute(app.root_mut(), &EmptyScope).unwrap();
        assert_eq!(app.root().vertex(a).rv, 1);
    }

    #[test]
    fn zero_one_sided_rate_is_inconsistent() {
        let mut app = PisdfApp::new("top");
        let root = app.root_handle();
        let a = app.create_actor(&root, "a", 0, 1).unwrap();
        let b = app.create_actor(&root, "b", 1, 0).unwrap();
        app.create_edge(&root, a, 0, 0, b, 0, 1).unwrap();
        assert!(matches!(
            compute(app.root_mut(), &EmptyScope),
            Err(TransfoError::InconsistentRates { .. })
        ));
    }

    #[test]
    fn contradictory_cycle_is_rejected() {
        // a(1) -> (1)b and a(1) -> (2)b disagree on RV(b).
        let mut app = PisdfApp::new("top");
        let root = app.root_handle();
        let a = app.create_actor(&root, "a", 0, 2).unwrap();
        let b = app.create_actor(&root, "b", 2, 0).unwrap();
        app.create_edge(&root, a, 0, 1, b, 0, 1).unwrap();
        app.create_edge(&root, a, 1, 1, b, 1, 2).unwrap();
        assert!(compute(app.root_mut(), &EmptyScope).is_err());
    }

    #[test]
    fn interface_under_consumption_scales_component() {
        // Subgraph: in(4) -> (2)v ; the interface anchors the component at
        // repetition 1, so v fires 2 times and drains the 4 tokens.
        let mut app = PisdfApp::new("top");
        let root = app.root_handle();
        let (sub, _vertex) = app.create_subgraph(&root, "sub", 1, 0).unwrap();
        let input = app.input_interface(&sub, 0);
        let v = app.create_actor(&sub, "v", 1, 0).unwrap();
        app.create_edge(&sub, input, 0, 4, v, 0, 2).unwrap();
        compute(app.graph_mut(&sub), &EmptyScope).unwrap();
        assert_eq!(app.graph(&sub).vertex(v).rv, 2);
    }

    #[test]
    fn config_actor_keeps_rv_one_and_scales_consumers() {
        // cfg produces 4 per firing, v consumes 1: RV(cfg)=1, RV(v)=4.
        let mut app = PisdfApp::new("top");
        let root = app.root_handle();
        let cfg = app.create_config_actor(&root, "cfg", 0, 1).unwrap();
        let v = app.create_actor(&root, "v", 1, 0).unwrap();
        app.create_edge(&root, cfg, 0, 4, v, 0, 1).unwrap();
        compute(app.root_mut(), &EmptyScope).unwrap();
        assert_eq!(app.root().vertex(cfg).rv, 1);
        assert_eq!(app.root().vertex(v).rv, 4);
    }

    #[test]
    fn parameterized_rates_use_scope() {
        let mut app = PisdfApp::new("top");
        let root = app.root_handle();
        app.create_static_param(&root, "n", 3).unwrap();
        let a = app.create_actor(&root, "a", 0, 1).unwrap();
        let b = app.create_actor(&root, "b", 1, 0).unwrap();
        app.create_edge_expr(&root, a, 0, "n", b, 0, "1").unwrap();
        let scope: std::collections::HashMap<String, f64> =
            [("n".to_string(), 3.0)].into_iter().collect();
        compute(app.root_mut(), &scope).unwrap();
        assert_eq!(app.root().vertex(b).rv, 3);
    }
}

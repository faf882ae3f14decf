// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Arena-backed PiSDF graphs.
//!
//! Vertices, edges and subgraphs live in slot vectors addressed by dense
//! indices; removal leaves a tombstone so indices stay stable. Iteration
//! order is insertion order, which the repetition-vector solver and the
//! single-rate cloning pass rely on.

use crate::errors::ConstructionError;
use crate::pisdf::edge::Edge;
use crate::pisdf::param::Param;
use crate::pisdf::vertex::{EdgeId, Vertex, VertexId, VertexKind};

#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub name: String,
    vertices: Vec<Option<Vertex>>,
    edges: Vec<Option<Edge>>,
    pub params: Vec<Param>,
    pub subgraphs: Vec<Option<Graph>>,
    pub input_interfaces: Vec<VertexId>,
    pub output_interfaces: Vec<VertexId>,
    /// True when any reachable parameter is dynamic.
    pub dynamic: bool,
    /// For the init half of a split dynamic graph: subgraph index of the
    /// run half inside the common parent.
    pub run_counterpart: Option<usize>,
}

impl Graph {
    pub fn new(name: &str) -> Graph {
        Graph {
            name: name.to_string(),
            ..Graph::default()
        }
    }

    // === Vertices ===

    pub fn add_vertex(
        &mut self,
        name: &str,
        kind: VertexKind,
        input_count: usize,
        output_count: usize,
    ) -> Result<VertexId, ConstructionError> {
        let ix = VertexId(self.vertices.len());
        let vertex = Vertex::new(name, kind, ix, input_count, output_count)?;
        if kind.is_input_interface() {
            self.input_interfaces.push(ix);
        } else if kind.is_output_interface() {
            self.output_interfaces.push(ix);
        }
        self.vertices.push(Some(vertex));
        Ok(ix)
    }

    pub fn vertex(&self, id: VertexId) -> &Vertex {
        self.vertices[id.0].as_ref().expect("vertex was removed")
    }

    pub fn vertex_mut(&mut self, id: VertexId) -> &mut Vertex {
        self.vertices[id.0].as_mut().expect("vertex was removed")
    }

    pub fn vertex_opt(&self, id: VertexId) -> Option<&Vertex> {
        self.vertices.get(id.0).and_then(|slot| slot.as_ref())
    }

    /// Live vertices in insertion order.
    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> {
        self.vertices.iter().filter_map(|slot| slot.as_ref())
    }

    pub fn vertex_ids(&self) -> Vec<VertexId> {
        self.vertices().map(|v| v.ix).collect()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices().count()
    }

    /// Upper bound over vertex indices (including tombstones); sizes the
    /// side tables of the solvers.
    pub fn vertex_capacity(&self) -> usize {
        self.vertices.len()
    }

    pub fn config_vertices(&self) -> impl Iterator<Item = &Vertex> {
        self.vertices().filter(|v| v.kind == VertexKind::Config)
    }

    pub fn remove_vertex(&mut self, id: VertexId) {
        if let Some(vertex) = self.vertices[id.0].take() {
            debug_assert!(
                vertex.inputs.iter().all(Option::is_none)
                    && vertex.outputs.iter().all(Option::is_none),
                "removing vertex '{}' with connected edges",
                vertex.name
            );
            self.input_interfaces.retain(|&v| v != id);
            self.output_interfaces.retain(|&v| v != id);
        }
    }

    // === Edges ===

    /// Create an edge and occupy both ports. Endpoints must exist and the
    /// ports must be in range and free.
    pub fn add_edge(&mut self, edge: Edge) -> Result<EdgeId, ConstructionError> {
        let ix = EdgeId(self.edges.len());
        let mut edge = edge;
        edge.ix = ix;
        self.occupy_output(edge.source, edge.source_port, ix)?;
        if let Err(err) = self.occupy_input(edge.sink, edge.sink_port, ix) {
            // Roll back the source port so the graph stays consistent.
            self.vertex_mut(edge.source).outputs[edge.source_port] = None;
            return Err(err);
        }
        self.edges.push(Some(edge));
        Ok(ix)
    }

    fn occupy_output(
        &mut self,
        vertex: VertexId,
        port: usize,
        edge: EdgeId,
    ) -> Result<(), ConstructionError> {
        let v = self
            .vertex_opt(vertex)
            .ok_or_else(|| ConstructionError::NullParent(format!("vertex #{}", vertex.0)))?;
        if port >= v.outputs.len() {
            return Err(ConstructionError::PortOutOfRange {
                vertex: v.name.clone(),
                port,
                direction: "output",
            });
        }
        if v.outputs[port].is_some() {
            return Err(ConstructionError::DuplicatePortConnection {
                vertex: v.name.clone(),
                port,
                direction: "output",
            });
        }
        self.vertex_mut(vertex).outputs[port] = Some(edge);
        Ok(())
    }

    fn occupy_input(
        &mut self,
        vertex: VertexId,
        port: usize,
        edge: EdgeId,
    ) -> Result<(), ConstructionError> {
        let v = self
            .vertex_opt(vertex)
            .ok_or_else(|| ConstructionError::NullParent(format!("vertex #{}", vertex.0)))?;
        if port >= v.inputs.len() {
            return Err(ConstructionError::PortOutOfRange {
                vertex: v.name.clone(),
                port,
                direction: "input",
            });
        }
        if v.inputs[port].is_some() {
            return Err(ConstructionError::DuplicatePortConnection {
                vertex: v.name.clone(),
                port,
                direction: "input",
            });
        }
        self.vertex_mut(vertex).inputs[port] = Some(edge);
        Ok(())
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        self.edges[id.0].as_ref().expect("edge was removed")
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> &mut Edge {
        self.edges[id.0].as_mut().expect("edge was removed")
    }

    pub fn edge_opt(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.0).and_then(|slot| slot.as_ref())
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter_map(|slot| slot.as_ref())
    }

    pub fn edge_ids(&self) -> Vec<EdgeId> {
        self.edges().map(|e| e.ix).collect()
    }

    pub fn edge_count(&self) -> usize {
        self.edges().count()
    }

    pub fn edge_capacity(&self) -> usize {
        self.edges.len()
    }

    pub fn remove_edge(&mut self, id: EdgeId) {
        if let Some(edge) = self.edges[id.0].take() {
            if let Some(v) = self.vertices[edge.source.0].as_mut() {
                if v.outputs.get(edge.source_port).copied().flatten() == Some(id) {
                    v.outputs[edge.source_port] = None;
                }
            }
            if let Some(v) = self.vertices[edge.sink.0].as_mut() {
                if v.inputs.get(edge.sink_port).copied().flatten() == Some(id) {
                    v.inputs[edge.sink_port] = None;
                }
            }
        }
    }

    /// Move an edge's source to another vertex/port; the previous port is
    /// released first. Disconnecting a port that is already free is a
    /// no-op, so the operation is idempotent.
    pub fn set_edge_source(
        &mut self,
        id: EdgeId,
        vertex: VertexId,
        port: usize,
        rate: crate::expr::Expression,
    ) -> Result<(), ConstructionError> {
        let (old_vertex, old_port) = {
            let edge = self.edge(id);
            (edge.source, edge.source_port)
        };
        if let Some(v) = self.vertices[old_vertex.0].as_mut() {
            if v.outputs.get(old_port).copied().flatten() == Some(id) {
                v.outputs[old_port] = None;
            }
        }
        self.occupy_output(vertex, port, id)?;
        let edge = self.edge_mut(id);
        edge.source = vertex;
        edge.source_port = port;
        edge.source_rate = rate;
        Ok(())
    }

    /// Move an edge's sink to another vertex/port; see [`Self::set_edge_source`].
    pub fn set_edge_sink(
        &mut self,
        id: EdgeId,
        vertex: VertexId,
        port: usize,
        rate: crate::expr::Expression,
    ) -> Result<(), ConstructionError> {
        let (old_vertex, old_port) = {
            let edge = self.edge(id);
            (edge.sink, edge.sink_port)
        };
        if let Some(v) = self.vertices[old_vertex.0].as_mut() {
            if v.inputs.get(old_port).copied().flatten() == Some(id) {
                v.inputs[old_port] = None;
            }
        }
        self.occupy_input(vertex, port, id)?;
        let edge = self.edge_mut(id);
        edge.sink = vertex;
        edge.sink_port = port;
        edge.sink_rate = rate;
        Ok(())
    }

    /// Diagnostic edge name in the form `src[p] -> [p]snk`.
    pub fn edge_name(&self, id: EdgeId) -> String {
        match self.edge_opt(id) {
            Some(edge) => format!(
                "{}[{}] -> [{}]{}",
                self.vertex(edge.source).name,
                edge.source_port,
                edge.sink_port,
                self.vertex(edge.sink).name,
            ),
            None => format!("edge #{}", id.0),
        }
    }

    // === Subgraphs ===

    pub fn add_subgraph(&mut self, graph: Graph) -> usize {
        self.subgraphs.push(Some(graph));
        self.subgraphs.len() - 1
    }

    pub fn subgraph(&self, ix: usize) -> &Graph {
        self.subgraphs[ix].as_ref().expect("subgraph was removed")
    }

    pub fn subgraph_mut(&mut self, ix: usize) -> &mut Graph {
        self.subgraphs[ix].as_mut().expect("subgraph was removed")
    }

    pub fn subgraph_opt(&self, ix: usize) -> Option<&Graph> {
        self.subgraphs.get(ix).and_then(|slot| slot.as_ref())
    }

    pub fn remove_subgraph(&mut self, ix: usize) -> Option<Graph> {
        self.subgraphs[ix].take()
    }

    pub fn subgraph_count(&self) -> usize {
        self.subgraphs.iter().filter(|s| s.is_some()).count()
    }

    /// Resolve a subgraph path (chain of subgraph indices from this graph).
    pub fn descend(&self, path: &[usize]) -> &Graph {
        let mut graph = self;
        for &ix in path {
            graph = graph.subgraph(ix);
        }
        graph
    }

    pub fn descend_mut(&mut self, path: &[usize]) -> &mut Graph {
        let mut graph = self;
        for &ix in path {
            graph = graph.subgraph_mut(ix);
        }
        graph
    }

    // === Parameters ===

    pub fn param(&self, name: &str) -> Option<&Param> {
        let lower = name.to_ascii_lowercase();
        self.params.iter().find(|p| p.name == lower)
    }

    pub fn param_mut(&mut self, name: &str) -> Option<&mut Param> {
        let lower = name.to_ascii_lowercase();
        self.params.iter_mut().find(|p| p.name == lower)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expression;

    fn edge(src: VertexId, sp: usize, snk: VertexId, kp: usize, rate: i64) -> Edge {
        Edge {
            ix: EdgeId(0),
            source: src,
            source_port: sp,
            source_rate: Expression::constant(rate),
            sink: snk,
            sink_port: kp,
            sink_rate: Expression::constant(rate),
            delay: None,
        }
    }

    #[test]
    fn connect_rejects_duplicate_ports() {
        let mut g = Graph::new("g");
        let a = g.add_vertex("a", VertexKind::Normal, 0, 1).unwrap();
        let b = g.add_vertex("b", VertexKind::Normal, 2, 0).unwrap();
        g.add_edge(edge(a, 0, b, 0, 1)).unwrap();
        let err = g.add_edge(edge(a, 0, b, 1, 1)).unwrap_err();
        assert!(matches!(err, ConstructionError::DuplicatePortConnection { .. }));
        // The failed edge must not leak a half-connected port.
        assert_eq!(g.vertex(b).inputs[1], None);
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn connect_rejects_out_of_range_ports() {
        let mut g = Graph::new("g");
        let a = g.add_vertex("a", VertexKind::Normal, 0, 1).unwrap();
        let b = g.add_vertex("b", VertexKind::Normal, 1, 0).unwrap();
        let err = g.add_edge(edge(a, 1, b, 0, 1)).unwrap_err();
        assert!(matches!(err, ConstructionError::PortOutOfRange { .. }));
    }

    #[test]
    fn remove_edge_releases_both_ports() {
        let mut g = Graph::new("g");
        let a = g.add_vertex("a", VertexKind::Normal, 0, 1).unwrap();
        let b = g.add_vertex("b", VertexKind::Normal, 1, 0).unwrap();
        let e = g.add_edge(edge(a, 0, b, 0, 4)).unwrap();
        g.remove_edge(e);
        assert_eq!(g.edge_count(), 0);
        assert_eq!(g.vertex(a).outputs[0], None);
        assert_eq!(g.vertex(b).inputs[0], None);
        // Idempotent: removing again is a no-op.
        g.remove_edge(e);
    }

    #[test]
    fn reconnect_moves_an_endpoint() {
        let mut g = Graph::new("g");
        let a = g.add_vertex("a", VertexKind::Normal, 0, 1).unwrap();
        let b = g.add_vertex("b", VertexKind::Normal, 1, 0).unwrap();
        let c = g.add_vertex("c", VertexKind::Normal, 1, 0).unwrap();
        let e = g.add_edge(edge(a, 0, b, 0, 4)).unwrap();
        g.set_edge_sink(e, c, 0, Expression::constant(4)).unwrap();
        assert_eq!(g.vertex(b).inputs[0], None);
        assert_eq!(g.vertex(c).inputs[0], Some(e));
        assert_eq!(g.edge(e).sink, c);
    }

    #[test]
    fn interfaces_register_in_order() {
        let mut g = Graph::new("g");
        g.add_vertex("in0", VertexKind::InputInterface, 0, 1).unwrap();
        g.add_vertex("in1", VertexKind::InputInterface, 0, 1).unwrap();
        g.add_vertex("out0", VertexKind::OutputInterface, 1, 0).unwrap();
        assert_eq!(g.input_interfaces.len(), 2);
        assert_eq!(g.output_interfaces.len(), 1);
    }

    #[test]
    fn insertion_order_iteration_survives_removal() {
        let mut g = Graph::new("g");
        let a = g.add_vertex("a", VertexKind::Normal, 0, 0).unwrap();
        let b = g.add_vertex("b", VertexKind::Normal, 0, 0).unwrap();
        let c = g.add_vertex("c", VertexKind::Normal, 0, 0).unwrap();
        let _ = (a, c);
        g.remove_vertex(b);
        let names: Vec<&str> = g.vertices().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(g.vertex_count(), 2);
        assert_eq!(g.vertex_capacity(), 3);
    }
}

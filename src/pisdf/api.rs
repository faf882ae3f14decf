// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Host-facing construction API.
//!
//! A [`PisdfApp`] owns the root graph of an application plus the external
//! buffer registry and the persistent-delay address counter. Graphs are
//! addressed by [`GraphHandle`] paths (chains of subgraph indices), so the
//! whole hierarchy stays in one arena and handles remain trivially
//! copyable.

use crate::errors::ConstructionError;
use crate::expr::Expression;
use crate::pisdf::edge::{Delay, DelayEndpoint, Edge, Persistence};
use crate::pisdf::graph::Graph;
use crate::pisdf::param::{Param, ParamId, ParamKind, ScopeChain};
use crate::pisdf::vertex::{EdgeId, VertexId, VertexKind};

/// Path to a graph in the hierarchy; the empty path is the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphHandle {
    pub path: Vec<usize>,
}

impl GraphHandle {
    pub fn root() -> GraphHandle {
        GraphHandle { path: Vec::new() }
    }

    pub fn child(&self, subgraph_ix: usize) -> GraphHandle {
        let mut path = self.path.clone();
        path.push(subgraph_ix);
        GraphHandle { path }
    }
}

/// A PiSDF application under construction and across iterations.
pub struct PisdfApp {
    root: Graph,
    external_buffers: Vec<Vec<u8>>,
    next_delay_address: u64,
}

impl PisdfApp {
    pub fn new(name: &str) -> PisdfApp {
        PisdfApp {
            root: Graph::new(name),
            external_buffers: Vec::new(),
            next_delay_address: 0,
        }
    }

    pub fn root_handle(&self) -> GraphHandle {
        GraphHandle::root()
    }

    pub fn graph(&self, handle: &GraphHandle) -> &Graph {
        self.root.descend(&handle.path)
    }

    pub fn graph_mut(&mut self, handle: &GraphHandle) -> &mut Graph {
        self.root.descend_mut(&handle.path)
    }

    pub fn root(&self) -> &Graph {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Graph {
        &mut self.root
    }

    /// Parameter scope of a graph: its own frame plus every ancestor's.
    pub fn scope(&self, handle: &GraphHandle) -> ScopeChain<'_> {
        let mut frames: Vec<&[Param]> = vec![&self.root.params];
        let mut graph = &self.root;
        for &ix in &handle.path {
            graph = graph.subgraph(ix);
            frames.push(&graph.params);
        }
        ScopeChain::new(frames)
    }

    // === Vertices ===

    pub fn create_vertex(
        &mut self,
        graph: &GraphHandle,
        name: &str,
        kind: VertexKind,
        input_count: usize,
        output_count: usize,
    ) -> Result<VertexId, ConstructionError> {
        self.graph_mut(graph).add_vertex(name, kind, input_count, output_count)
    }

    pub fn create_actor(
        &mut self,
        graph: &GraphHandle,
        name: &str,
        input_count: usize,
        output_count: usize,
    ) -> Result<VertexId, ConstructionError> {
        self.create_vertex(graph, name, VertexKind::Normal, input_count, output_count)
    }

    pub fn create_config_actor(
        &mut self,
        graph: &GraphHandle,
        name: &str,
        input_count: usize,
        output_count: usize,
    ) -> Result<VertexId, ConstructionError> {
        self.create_vertex(graph, name, VertexKind::Config, input_count, output_count)
    }

    /// Create a subgraph with fixed interface counts. Returns the handle of
    /// the new graph and the `Graph` vertex representing it in the parent.
    pub fn create_subgraph(
        &mut self,
        parent: &GraphHandle,
        name: &str,
        input_if_count: usize,
        output_if_count: usize,
    ) -> Result<(GraphHandle, VertexId), ConstructionError> {
        let mut sub = Graph::new(name);
        for i in 0..input_if_count {
            sub.add_vertex(&format!("in_{i}"), VertexKind::InputInterface, 0, 1)?;
        }
        for i in 0..output_if_count {
            sub.add_vertex(&format!("out_{i}"), VertexKind::OutputInterface, 1, 0)?;
        }
        let parent_graph = self.graph_mut(parent);
        let sub_ix = parent_graph.add_subgraph(sub);
        let vertex =
            parent_graph.add_vertex(name, VertexKind::Graph, input_if_count, output_if_count)?;
        parent_graph.vertex_mut(vertex).subgraph = Some(sub_ix);
        Ok((parent.child(sub_ix), vertex))
    }

    /// Interface lookup by index.
    pub fn input_interface(&self, graph: &GraphHandle, ix: usize) -> VertexId {
        self.graph(graph).input_interfaces[ix]
    }

    pub fn output_interface(&self, graph: &GraphHandle, ix: usize) -> VertexId {
        self.graph(graph).output_interfaces[ix]
    }

    /// External input interface at the root; reads from a registered buffer.
    pub fn create_extern_input_interface(
        &mut self,
        graph: &GraphHandle,
        name: &str,
        buffer_ix: usize,
    ) -> Result<VertexId, ConstructionError> {
        let vertex =
            self.graph_mut(graph)
                .add_vertex(name, VertexKind::ExternInputInterface, 0, 1)?;
        self.graph_mut(graph).vertex_mut(vertex).external_buffer = Some(buffer_ix);
        Ok(vertex)
    }

    pub fn create_extern_output_interface(
        &mut self,
        graph: &GraphHandle,
        name: &str,
        buffer_ix: usize,
    ) -> Result<VertexId, ConstructionError> {
        let vertex =
            self.graph_mut(graph)
                .add_vertex(name, VertexKind::ExternOutputInterface, 1, 0)?;
        self.graph_mut(graph).vertex_mut(vertex).external_buffer = Some(buffer_ix);
        Ok(vertex)
    }

    /// Register a caller-owned buffer; the runtime never frees it.
    pub fn register_external_buffer(&mut self, data: Vec<u8>) -> usize {
        self.external_buffers.push(data);
        self.external_buffers.len() - 1
    }

    pub fn external_buffers(&self) -> &[Vec<u8>] {
        &self.external_buffers
    }

    pub fn external_buffers_mut(&mut self) -> &mut Vec<Vec<u8>> {
        &mut self.external_buffers
    }

    /// Bind a registered kernel index to an actor.
    pub fn set_kernel(
        &mut self,
        graph: &GraphHandle,
        vertex: VertexId,
        kernel_ix: usize,
    ) {
        self.graph_mut(graph).vertex_mut(vertex).kernel_ix = Some(kernel_ix);
    }

    /// Restrict the set of processing elements a vertex may map to.
    pub fn set_mappable_pes(&mut self, graph: &GraphHandle, vertex: VertexId, pes: Vec<usize>) {
        self.graph_mut(graph).vertex_mut(vertex).mappable_pes = Some(pes);
    }

    // === Edges ===

    pub fn create_edge(
        &mut self,
        graph: &GraphHandle,
        source: VertexId,
        source_port: usize,
        source_rate: i64,
        sink: VertexId,
        sink_port: usize,
        sink_rate: i64,
    ) -> Result<EdgeId, ConstructionError> {
        self.graph_mut(graph).add_edge(Edge {
            ix: EdgeId(0),
            source,
            source_port,
            source_rate: Expression::constant(source_rate),
            sink,
            sink_port,
            sink_rate: Expression::constant(sink_rate),
            delay: None,
        })
    }

    /// Edge with textual rate expressions, parsed against the graph's
    /// parameter scope.
    pub fn create_edge_expr(
        &mut self,
        graph: &GraphHandle,
        source: VertexId,
        source_port: usize,
        source_rate: &str,
        sink: VertexId,
        sink_port: usize,
        sink_rate: &str,
    ) -> Result<EdgeId, ConstructionError> {
        let (src_expr, snk_expr) = {
            let scope = self.scope(graph);
            let src = Expression::parse(source_rate, &scope).map_err(|err| {
                ConstructionError::RateExpressionInvalid {
                    text: source_rate.to_string(),
                    reason: err.to_string(),
                }
            })?;
            let snk = Expression::parse(sink_rate, &scope).map_err(|err| {
                ConstructionError::RateExpressionInvalid {
                    text: sink_rate.to_string(),
                    reason: err.to_string(),
                }
            })?;
            (src, snk)
        };
        self.graph_mut(graph).add_edge(Edge {
            ix: EdgeId(0),
            source,
            source_port,
            source_rate: src_expr,
            sink,
            sink_port,
            sink_rate: snk_expr,
            delay: None,
        })
    }

    // === Parameters ===

    fn insert_param(
        &mut self,
        graph: &GraphHandle,
        name: &str,
        kind: ParamKind,
    ) -> Result<ParamId, ConstructionError> {
        let g = self.graph_mut(graph);
        let lower = name.to_ascii_lowercase();
        if g.params.iter().any(|p| p.name == lower) {
            return Err(ConstructionError::ParamNameDuplicate(lower, g.name.clone()));
        }
        g.params.push(Param::new(&lower, kind));
        Ok(ParamId(g.params.len() - 1))
    }

    pub fn create_static_param(
        &mut self,
        graph: &GraphHandle,
        name: &str,
        value: i64,
    ) -> Result<ParamId, ConstructionError> {
        self.insert_param(graph, name, ParamKind::Static { value })
    }

    pub fn create_dynamic_param(
        &mut self,
        graph: &GraphHandle,
        name: &str,
    ) -> Result<ParamId, ConstructionError> {
        let id = self.insert_param(graph, name, ParamKind::Dynamic { value: None })?;
        self.graph_mut(graph).dynamic = true;
        Ok(id)
    }

    pub fn create_derived_param(
        &mut self,
        graph: &GraphHandle,
        name: &str,
        expression: &str,
    ) -> Result<ParamId, ConstructionError> {
        let expr = {
            let scope = self.scope(graph);
            Expression::parse(expression, &scope).map_err(|err| {
                ConstructionError::RateExpressionInvalid {
                    text: expression.to_string(),
                    reason: err.to_string(),
                }
            })?
        };
        let dynamic = expr.is_dynamic();
        let id = self.insert_param(graph, name, ParamKind::Derived { expression: expr })?;
        if dynamic {
            self.graph_mut(graph).dynamic = true;
        }
        Ok(id)
    }

    pub fn create_inherited_param(
        &mut self,
        graph: &GraphHandle,
        name: &str,
        parent_param: &str,
    ) -> Result<ParamId, ConstructionError> {
        let parent_lower = parent_param.to_ascii_lowercase();
        let dynamic = {
            let scope = self.scope(graph);
            if !crate::expr::ParamScope::contains(&scope, &parent_lower) {
                return Err(ConstructionError::NullParent(parent_lower));
            }
            crate::expr::ParamScope::is_dynamic(&scope, &parent_lower)
        };
        let id = self.insert_param(
            graph,
            name,
            ParamKind::Inherited {
                parent: parent_lower,
            },
        )?;
        if dynamic {
            self.graph_mut(graph).dynamic = true;
        }
        Ok(id)
    }

    /// Attach a parameter to a vertex's input parameter vector.
    pub fn add_input_param(&mut self, graph: &GraphHandle, vertex: VertexId, param: ParamId) {
        self.graph_mut(graph).vertex_mut(vertex).input_params.push(param);
    }

    pub fn add_refinement_param(&mut self, graph: &GraphHandle, vertex: VertexId, param: ParamId) {
        self.graph_mut(graph)
            .vertex_mut(vertex)
            .refinement_params
            .push(param);
    }

    /// Attach an output parameter; only configuration actors may own one.
    pub fn add_output_param(
        &mut self,
        graph: &GraphHandle,
        vertex: VertexId,
        param: ParamId,
    ) -> Result<(), ConstructionError> {
        let g = self.graph_mut(graph);
        let v = g.vertex(vertex);
        if !v.kind.may_own_output_params() {
            return Err(ConstructionError::SubtypeMismatch {
                name: v.name.clone(),
                expected: VertexKind::Config,
                actual: v.kind,
            });
        }
        g.vertex_mut(vertex).output_params.push(param);
        Ok(())
    }

    /// Write a dynamic parameter's value for the current iteration.
    pub fn set_dynamic_value(
        &mut self,
        graph: &GraphHandle,
        name: &str,
        value: i64,
    ) -> Result<(), ConstructionError> {
        let g = self.graph_mut(graph);
        match g.param_mut(name) {
            Some(param) => match &mut param.kind {
                ParamKind::Dynamic { value: slot } => {
                    *slot = Some(value);
                    Ok(())
                }
                _ => Err(ConstructionError::NotDynamic(name.to_string())),
            },
            None => Err(ConstructionError::NullParent(name.to_string())),
        }
    }

    /// True iff every dynamic parameter in the graph's closure is written.
    pub fn is_resolved(&self, graph: &GraphHandle) -> bool {
        fn resolved(graph: &Graph) -> bool {
            graph.params.iter().all(Param::is_resolved)
                && (0..graph.subgraphs.len())
                    .filter_map(|ix| graph.subgraph_opt(ix))
                    .all(resolved)
        }
        resolved(self.graph(graph))
    }

    /// Clear every dynamic value; called at end of iteration.
    pub fn reset_iteration(&mut self) {
        fn reset(graph: &mut Graph) {
            for param in &mut graph.params {
                if let ParamKind::Dynamic { value } = &mut param.kind {
                    *value = None;
                }
            }
            for ix in 0..graph.subgraphs.len() {
                if graph.subgraph_opt(ix).is_some() {
                    reset(graph.subgraph_mut(ix));
                }
            }
        }
        reset(&mut self.root);
    }

    // === Delays ===

    /// Persistent delay: tokens survive iterations in storage identified
    /// by a stable, first-creation-ordered memory address.
    pub fn create_persistent_delay(
        &mut self,
        graph: &GraphHandle,
        edge: EdgeId,
        expression: &str,
    ) -> Result<(), ConstructionError> {
        self.attach_delay(graph, edge, expression, Persistence::Persistent, None, None)
    }

    pub fn create_locally_persistent_delay(
        &mut self,
        graph: &GraphHandle,
        edge: EdgeId,
        expression: &str,
        levels: i32,
    ) -> Result<(), ConstructionError> {
        self.attach_delay(
            graph,
            edge,
            expression,
            Persistence::LocallyPersistent(levels),
            None,
            None,
        )
    }

    /// Non-persistent delay with optional setter and getter actors.
    #[allow(clippy::too_many_arguments)]
    pub fn create_local_delay(
        &mut self,
        graph: &GraphHandle,
        edge: EdgeId,
        expression: &str,
        setter: Option<(VertexId, usize, i64)>,
        getter: Option<(VertexId, usize, i64)>,
    ) -> Result<(), ConstructionError> {
        self.attach_delay(
            graph,
            edge,
            expression,
            Persistence::NonPersistent,
            setter,
            getter,
        )
    }

    fn attach_delay(
        &mut self,
        graph: &GraphHandle,
        edge: EdgeId,
        expression: &str,
        persistence: Persistence,
        setter: Option<(VertexId, usize, i64)>,
        getter: Option<(VertexId, usize, i64)>,
    ) -> Result<(), ConstructionError> {
        let expr = {
            let scope = self.scope(graph);
            Expression::parse(expression, &scope).map_err(|err| {
                ConstructionError::RateExpressionInvalid {
                    text: expression.to_string(),
                    reason: err.to_string(),
                }
            })?
        };
        let edge_name = self.graph(graph).edge_name(edge);
        if expr.is_dynamic() {
            return Err(ConstructionError::DynamicDelay(edge_name));
        }
        let memory_address = match persistence {
            Persistence::NonPersistent => None,
            _ => {
                let address = self.next_delay_address;
                self.next_delay_address += 1;
                Some(address)
            }
        };

        // A setter or getter requires a materialized delay vertex so the
        // single-rate linkage can treat its edges like any other.
        let g = self.graph_mut(graph);
        let delay_vertex = if setter.is_some() || getter.is_some() {
            let vertex = g.add_vertex(&format!("delay::{edge_name}"), VertexKind::Delay, 1, 1)?;
            if let Some((setter_vertex, port, rate)) = setter {
                g.add_edge(Edge {
                    ix: EdgeId(0),
                    source: setter_vertex,
                    source_port: port,
                    source_rate: Expression::constant(rate),
                    sink: vertex,
                    sink_port: 0,
                    sink_rate: Expression::constant(rate),
                    delay: None,
                })?;
            }
            if let Some((getter_vertex, port, rate)) = getter {
                g.add_edge(Edge {
                    ix: EdgeId(0),
                    source: vertex,
                    source_port: 0,
                    source_rate: Expression::constant(rate),
                    sink: getter_vertex,
                    sink_port: port,
                    sink_rate: Expression::constant(rate),
                    delay: None,
                })?;
            }
            Some(vertex)
        } else {
            None
        };

        g.edge_mut(edge).delay = Some(Delay {
            expression: expr,
            persistence,
            setter: setter.map(|(vertex, port, rate)| DelayEndpoint {
                vertex,
                port,
                rate: Expression::constant(rate),
            }),
            getter: getter.map(|(vertex, port, rate)| DelayEndpoint {
                vertex,
                port,
                rate: Expression::constant(rate),
            }),
            delay_vertex,
            memory_address,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subgraph_creation_wires_interfaces_and_vertex() {
        let mut app = PisdfApp::new("top");
        let root = app.root_handle();
        let (sub, vertex) = app.create_subgraph(&root, "sub", 2, 1).expect("subgraph");
        assert_eq!(app.graph(&sub).input_interfaces.len(), 2);
        assert_eq!(app.graph(&sub).output_interfaces.len(), 1);
        let v = app.graph(&root).vertex(vertex);
        assert_eq!(v.kind, VertexKind::Graph);
        assert_eq!(v.inputs.len(), 2);
        assert_eq!(v.outputs.len(), 1);
        assert_eq!(v.subgraph, Some(0));
    }

    #[test]
    fn duplicate_param_names_are_rejected() {
        let mut app = PisdfApp::new("top");
        let root = app.root_handle();
        app.create_static_param(&root, "width", 4).expect("param");
        let err = app.create_static_param(&root, "WIDTH", 5).unwrap_err();
        assert!(matches!(err, ConstructionError::ParamNameDuplicate(..)));
    }

    #[test]
    fn dynamic_param_marks_graph_dynamic() {
        let mut app = PisdfApp::new("top");
        let root = app.root_handle();
        let (sub, _) = app.create_subgraph(&root, "sub", 0, 0).expect("subgraph");
        assert!(!app.graph(&sub).dynamic);
        app.create_dynamic_param(&sub, "width").expect("param");
        assert!(app.graph(&sub).dynamic);
        assert!(!app.graph(&root).dynamic);
    }

    #[test]
    fn inherited_param_resolves_through_ancestors() {
        let mut app = PisdfApp::new("top");
        let root = app.root_handle();
        app.create_static_param(&root, "n", 8).expect("param");
        let (sub, _) = app.create_subgraph(&root, "sub", 0, 0).expect("subgraph");
        app.create_inherited_param(&sub, "m", "n").expect("param");
        let scope = app.scope(&sub);
        assert_eq!(crate::expr::ParamScope::value(&scope, "m"), Some(8.0));
    }

    #[test]
    fn output_params_are_config_only() {
        let mut app = PisdfApp::new("top");
        let root = app.root_handle();
        let actor = app.create_actor(&root, "a", 0, 1).expect("actor");
        let param = app.create_dynamic_param(&root, "w").expect("param");
        let err = app.add_output_param(&root, actor, param).unwrap_err();
        assert!(matches!(err, ConstructionError::SubtypeMismatch { .. }));

        let cfg = app.create_config_actor(&root, "cfg", 0, 0).expect("config");
        app.add_output_param(&root, cfg, param).expect("output param");
    }

    #[test]
    fn set_dynamic_value_rejects_static_params() {
        let mut app = PisdfApp::new("top");
        let root = app.root_handle();
        app.create_static_param(&root, "n", 8).expect("param");
        app.create_dynamic_param(&root, "w").expect("param");
        assert!(app.set_dynamic_value(&root, "n", 3).is_err());
        assert!(!app.is_resolved(&root));
        app.set_dynamic_value(&root, "w", 3).expect("set");
        assert!(app.is_resolved(&root));
        app.reset_iteration();
        assert!(!app.is_resolved(&root));
    }

    #[test]
    fn rate_expressions_parse_against_scope() {
        let mut app = PisdfApp::new("top");
        let root = app.root_handle();
        app.create_static_param(&root, "n", 4).expect("param");
        let a = app.create_actor(&root, "a", 0, 1).expect("actor");
        let b = app.create_actor(&root, "b", 1, 0).expect("actor");
        let edge = app
            .create_edge_expr(&root, a, 0, "n", b, 0, "1")
            .expect("edge");
        let scope = app.scope(&root);
        assert_eq!(
            app.graph(&root).edge(edge).source_rate_value(&scope).unwrap(),
            4
        );
        let err = app
            .create_edge_expr(&root, a, 0, "unknown", b, 0, "1")
            .unwrap_err();
        assert!(matches!(err, ConstructionError::RateExpressionInvalid { .. }));
    }

    #[test]
    fn persistent_delay_addresses_are_ordered() {
        let mut app = PisdfApp::new("top");
        let root = app.root_handle();
        let a = app.create_actor(&root, "a", 1, 1).expect("actor");
        let b = app.create_actor(&root, "b", 1, 1).expect("actor");
        let e0 = app.create_edge(&root, a, 0, 1, b, 0, 1).expect("edge");
        let e1 = app.create_edge(&root, b, 0, 1, a, 0, 1).expect("edge");
        app.create_persistent_delay(&root, e0, "2").expect("delay");
        app.create_persistent_delay(&root, e1, "4").expect("delay");
        let g = app.root();
        assert_eq!(g.edge(e0).delay.as_ref().unwrap().memory_address, Some(0));
        assert_eq!(g.edge(e1).delay.as_ref().unwrap().memory_address, Some(1));
    }

    #[test]
    fn dynamic_delay_expression_is_rejected() {
        let mut app = PisdfApp::new("top");
        let root = app.root_handle();
        app.create_dynamic_param(&root, "w").expect("param");
        let a = app.create_actor(&root, "a", 1, 1).expect("actor");
        let e = app.create_edge(&root, a, 0, 1, a, 0, 1).expect("edge");
        let err = app.create_local_delay(&root, e, "w", None, None).unwrap_err();
        assert!(matches!(err, ConstructionError::DynamicDelay(_)));
    }
}

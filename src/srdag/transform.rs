// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Single-rate transformation.
//!
//! Transformation is driven by a worklist of jobs, one per (sub)graph
//! instance. A job splits dynamic subgraphs, solves the repetition vector,
//! replaces the enclosing instance's interfaces with `Repeat`/`Tail`
//! adapters, clones every internal vertex `RV` times into the single-rate
//! graph, and links every edge through [`crate::srdag::linker`]. Subgraph
//! clones become placeholder vertices plus follow-up jobs, queued as ready
//! or pending depending on whether their parameters are resolved.

use tracing::debug;

use crate::errors::TransfoError;
use crate::expr::Expression;
use crate::pisdf::{
    Edge, EdgeId, Graph, JobParams, ParamId, ParamKind, PisdfApp, ProtoRef, VertexId, VertexKind,
};
use crate::srdag::brv;
use crate::srdag::linker::{self, EdgeLinker, ResolvedEdge};

/// One unit of transformation work: a (sub)graph instance.
#[derive(Debug, Clone)]
pub struct TransfoJob {
    /// Chain of subgraph indices from the root graph.
    pub path: Vec<usize>,
    /// The instance placeholder in the single-rate graph; `None` for the
    /// root job.
    pub srdag_ix: Option<VertexId>,
    /// Instance ordinal among the graph's firings.
    pub instance: u32,
    /// Parameter snapshot the job's rates evaluate against.
    pub params: JobParams,
}

impl TransfoJob {
    pub fn root(params: JobParams) -> TransfoJob {
        TransfoJob {
            path: Vec::new(),
            srdag_ix: None,
            instance: 0,
            params,
        }
    }
}

/// Routing record binding a single-rate config clone to the pending job
/// whose dynamic parameters it will feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamRoute {
    pub sr_vertex: VertexId,
    pub graph_path: Vec<usize>,
    pub instance: u32,
    pub param_names: Vec<String>,
}

/// Output of one job: follow-up work plus parameter routes.
#[derive(Debug, Default)]
pub struct TransfoResult {
    /// Jobs whose parameters are already resolved.
    pub next_jobs: Vec<TransfoJob>,
    /// Jobs waiting on dynamic parameters.
    pub dyna_jobs: Vec<TransfoJob>,
    pub param_routes: Vec<ParamRoute>,
}

/// Build the parameter snapshot of a graph from its parent's snapshot:
/// ancestor names come first, then the graph's own parameters (shadowing
/// as they go). Derived parameters evaluate against the snapshot built so
/// far and stay `None` when an operand is pending.
pub fn snapshot_params(graph: &Graph, parent: &JobParams) -> JobParams {
    let mut params = JobParams::new();
    for name in parent.names() {
        params.insert(name, parent.get(name));
    }
    for param in &graph.params {
        let value = match &param.kind {
            ParamKind::Static { value } => Some(*value),
            ParamKind::Dynamic { value } => *value,
            ParamKind::Inherited { parent: parent_name } => parent.get(parent_name),
            ParamKind::Derived { expression } => expression.evaluate_i64(&params).ok(),
        };
        params.insert(&param.name, value);
    }
    params
}

/// Re-evaluate derived parameters after a dynamic value arrived.
pub fn rederive_params(graph: &Graph, params: &mut JobParams) {
    for param in &graph.params {
        if let ParamKind::Derived { expression } = &param.kind {
            if params.get(&param.name).is_none() {
                if let Ok(value) = expression.evaluate_i64(&*params) {
                    params.set(&param.name, value);
                }
            }
        }
    }
}

/// Split a dynamic subgraph containing configuration actors into an init
/// graph (configs and their interfaces) and a run graph (everything
/// else). Config-sourced values become new interface pairs wired through
/// the parent. Returns the two new subgraph indices, or `None` when no
/// split applies. Splitting an already-split graph is a no-op by
/// construction: the init half carries no parameters and the run half no
/// configs.
pub fn split_dynamic_graph(
    graph: &mut Graph,
    sub_ix: usize,
) -> Result<Option<(usize, usize)>, TransfoError> {
    let needs_split = {
        let sub = match graph.subgraph_opt(sub_ix) {
            Some(sub) => sub,
            None => return Ok(None),
        };
        sub.dynamic && sub.config_vertices().next().is_some()
    };
    if !needs_split {
        return Ok(None);
    }

    let parent_vertex = graph
        .vertices()
        .find(|v| v.subgraph == Some(sub_ix))
        .map(|v| v.ix)
        .ok_or_else(|| TransfoError::Internal("subgraph without parent vertex".into()))?;
    let mut run = graph
        .remove_subgraph(sub_ix)
        .ok_or_else(|| TransfoError::Internal("subgraph disappeared".into()))?;
    let base_name = run.name.clone();

    // Classify interfaces: those adjacent to a config actor move to the
    // init graph, the rest stay with the run graph.
    let config_ids: Vec<VertexId> = run.config_vertices().map(|v| v.ix).collect();
    let is_config = |id: VertexId, g: &Graph| g.vertex(id).kind == VertexKind::Config;

    let mut init = Graph::new(&format!("ginit-{base_name}"));

    // Input interfaces.
    let original_inputs = run.input_interfaces.clone();
    let mut init_input_of: Vec<Option<usize>> = vec![None; original_inputs.len()];
    let mut run_input_of: Vec<Option<usize>> = vec![None; original_inputs.len()];
    let mut init_inputs = 0usize;
    let mut run_inputs = 0usize;
    for (pos, &iface) in original_inputs.iter().enumerate() {
        let inner_edge = run.vertex(iface).outputs[0];
        let feeds_config = match inner_edge {
            Some(e) => is_config(run.edge(e).sink, &run),
            None => false,
        };
        if feeds_config {
            init_input_of[pos] = Some(init_inputs);
            init_inputs += 1;
        } else {
            run_input_of[pos] = Some(run_inputs);
            run_inputs += 1;
        }
    }

    // Output interfaces.
    let original_outputs = run.output_interfaces.clone();
    let mut init_output_of: Vec<Option<usize>> = vec![None; original_outputs.len()];
    let mut run_output_of: Vec<Option<usize>> = vec![None; original_outputs.len()];
    let mut init_outputs = 0usize;
    let mut run_outputs = 0usize;
    for (pos, &iface) in original_outputs.iter().enumerate() {
        let inner_edge = run.vertex(iface).inputs[0];
        let fed_by_config = match inner_edge {
            Some(e) => is_config(run.edge(e).source, &run),
            None => false,
        };
        if fed_by_config {
            init_output_of[pos] = Some(init_outputs);
            init_outputs += 1;
        } else {
            run_output_of[pos] = Some(run_outputs);
            run_outputs += 1;
        }
    }

    // Rebuild the config actors inside the init graph.
    let mut cfg_value_edges: Vec<(usize, usize, i64)> = Vec::new(); // (init out, run in, rate)
    let mut init_cfg_of: Vec<(VertexId, VertexId)> = Vec::new(); // (old id, new id)
    for &cfg_id in &config_ids {
        let (name, in_count, out_count) = {
            let cfg = run.vertex(cfg_id);
            (cfg.name.clone(), cfg.inputs.len(), cfg.outputs.len())
        };
        let new_cfg = init
            .add_vertex(&name, VertexKind::Config, in_count, out_count)
            .map_err(|err| TransfoError::Internal(err.to_string()))?;
        {
            let old = run.vertex(cfg_id);
            let (input_params, refinement_params, output_params, kernel_ix) = (
                old.input_params.clone(),
                old.refinement_params.clone(),
                old.output_params.clone(),
                old.kernel_ix,
            );
            let fresh = init.vertex_mut(new_cfg);
            fresh.input_params = input_params;
            fresh.refinement_params = refinement_params;
            fresh.output_params = output_params;
            fresh.kernel_ix = kernel_ix;
        }
        init_cfg_of.push((cfg_id, new_cfg));
    }

    // Init-graph interfaces, in the same relative order as the original.
    let mut init_if_inputs: Vec<VertexId> = Vec::new();
    for (pos, &iface) in original_inputs.iter().enumerate() {
        if init_input_of[pos].is_some() {
            let name = run.vertex(iface).name.clone();
            let id = init
                .add_vertex(&name, VertexKind::InputInterface, 0, 1)
                .map_err(|err| TransfoError::Internal(err.to_string()))?;
            init_if_inputs.push(id);
        }
    }
    let mut init_if_outputs: Vec<VertexId> = Vec::new();
    for (pos, &iface) in original_outputs.iter().enumerate() {
        if init_output_of[pos].is_some() {
            let name = run.vertex(iface).name.clone();
            let id = init
                .add_vertex(&name, VertexKind::OutputInterface, 1, 0)
                .map_err(|err| TransfoError::Internal(err.to_string()))?;
            init_if_outputs.push(id);
        }
    }

    // Move config edges into the init graph and rewire the run graph.
    let edge_ids = run.edge_ids();
    for edge_id in edge_ids {
        let (source, sink, src_port, snk_port) = {
            let e = run.edge(edge_id);
            (e.source, e.sink, e.source_port, e.sink_port)
        };
        let source_is_cfg = is_config(source, &run);
        let sink_is_cfg = is_config(sink, &run);
        if !source_is_cfg && !sink_is_cfg {
            continue;
        }
        if sink_is_cfg {
            // Interface -> config input; must come from an input interface.
            let src_vertex = run.vertex(source);
            if !src_vertex.kind.is_input_interface() {
                return Err(TransfoError::Internal(format!(
                    "config actor '{}' fed by non-interface '{}'",
                    run.vertex(sink).name,
                    src_vertex.name
                )));
            }
            let pos = original_inputs
                .iter()
                .position(|&v| v == source)
                .expect("interface is registered");
            let init_pos = init_input_of[pos].expect("classified as init input");
            let new_cfg = init_cfg_of
                .iter()
                .find(|(old, _)| *old == sink)
                .map(|(_, new)| *new)
                .expect("config was rebuilt");
            let (src_rate, snk_rate) = {
                let e = run.edge(edge_id);
                (e.source_rate.clone(), e.sink_rate.clone())
            };
            init.add_edge(Edge {
                ix: EdgeId(0),
                source: init_if_inputs[init_pos],
                source_port: 0,
                source_rate: src_rate,
                sink: new_cfg,
                sink_port: snk_port,
                sink_rate: snk_rate,
                delay: None,
            })
            .map_err(|err| TransfoError::Internal(err.to_string()))?;
            run.remove_edge(edge_id);
        } else {
            // Config output: either an outer output or a value feeding the
            // run graph through a fresh interface pair. The rate is frozen
            // to a constant here; config rates may not depend on the
            // dynamic parameters they produce.
            let rate = {
                let scope = crate::pisdf::ScopeChain::new(vec![&run.params]);
                run.edge(edge_id)
                    .source_rate_value(&scope)
                    .map_err(TransfoError::Expression)?
            };
            let new_cfg = init_cfg_of
                .iter()
                .find(|(old, _)| *old == source)
                .map(|(_, new)| *new)
                .expect("config was rebuilt");
            let sink_vertex = run.vertex(sink);
            if sink_vertex.kind.is_output_interface() {
                let pos = original_outputs
                    .iter()
                    .position(|&v| v == sink)
                    .expect("interface is registered");
                let init_pos = init_output_of[pos].expect("classified as init output");
                init.add_edge(Edge {
                    ix: EdgeId(0),
                    source: new_cfg,
                    source_port: src_port,
                    source_rate: Expression::constant(rate),
                    sink: init_if_outputs[init_pos],
                    sink_port: 0,
                    sink_rate: Expression::constant(rate),
                    delay: None,
                })
                .map_err(|err| TransfoError::Internal(err.to_string()))?;
                run.remove_edge(edge_id);
            } else {
                let cfg_name = init.vertex(new_cfg).name.clone();
                let if_name = format!("{cfg_name}_out-{src_port}");
                // Init side: config -> new output interface.
                let init_out = init
                    .add_vertex(&if_name, VertexKind::OutputInterface, 1, 0)
                    .map_err(|err| TransfoError::Internal(err.to_string()))?;
                init.add_edge(Edge {
                    ix: EdgeId(0),
                    source: new_cfg,
                    source_port: src_port,
                    source_rate: Expression::constant(rate),
                    sink: init_out,
                    sink_port: 0,
                    sink_rate: Expression::constant(rate),
                    delay: None,
                })
                .map_err(|err| TransfoError::Internal(err.to_string()))?;
                init_if_outputs.push(init_out);
                init_outputs += 1;
                // Run side: new input interface takes over the edge.
                let run_in = run
                    .add_vertex(&if_name, VertexKind::InputInterface, 0, 1)
                    .map_err(|err| TransfoError::Internal(err.to_string()))?;
                run.set_edge_source(edge_id, run_in, 0, Expression::constant(rate))
                    .map_err(|err| TransfoError::Internal(err.to_string()))?;
                cfg_value_edges.push((init_outputs - 1, run_inputs, rate));
                run_inputs += 1;
            }
        }
    }

    // Drop the config actors and the interfaces that moved to init.
    for &cfg_id in &config_ids {
        run.remove_vertex(cfg_id);
    }
    for (pos, &iface) in original_inputs.iter().enumerate() {
        if init_input_of[pos].is_some() {
            run.remove_vertex(iface);
        }
    }
    for (pos, &iface) in original_outputs.iter().enumerate() {
        if init_output_of[pos].is_some() {
            run.remove_vertex(iface);
        }
    }
    run.name = format!("grun-{base_name}");

    // Re-insert both halves and rewire the parent.
    let run_ix = graph.add_subgraph(run);
    init.run_counterpart = Some(run_ix);
    let init_ix = graph.add_subgraph(init);

    let init_vertex = graph
        .add_vertex(
            &format!("ginit-{base_name}"),
            VertexKind::Graph,
            init_inputs,
            init_outputs,
        )
        .map_err(|err| TransfoError::Internal(err.to_string()))?;
    graph.vertex_mut(init_vertex).subgraph = Some(init_ix);
    let run_vertex = graph
        .add_vertex(
            &format!("grun-{base_name}"),
            VertexKind::Graph,
            run_inputs,
            run_outputs,
        )
        .map_err(|err| TransfoError::Internal(err.to_string()))?;
    graph.vertex_mut(run_vertex).subgraph = Some(run_ix);

    // Outer edges of the old subgraph vertex move to the matching half.
    let (old_inputs, old_outputs) = {
        let old = graph.vertex(parent_vertex);
        (old.inputs.clone(), old.outputs.clone())
    };
    for (pos, edge) in old_inputs.iter().enumerate() {
        if let Some(edge_id) = edge {
            let rate = graph.edge(*edge_id).sink_rate.clone();
            let (target, port) = match init_input_of[pos] {
                Some(p) => (init_vertex, p),
                None => (run_vertex, run_input_of[pos].expect("classified")),
            };
            graph
                .set_edge_sink(*edge_id, target, port, rate)
                .map_err(|err| TransfoError::Internal(err.to_string()))?;
        }
    }
    for (pos, edge) in old_outputs.iter().enumerate() {
        if let Some(edge_id) = edge {
            let rate = graph.edge(*edge_id).source_rate.clone();
            let (target, port) = match init_output_of[pos] {
                Some(p) => (init_vertex, p),
                None => (run_vertex, run_output_of[pos].expect("classified")),
            };
            graph
                .set_edge_source(*edge_id, target, port, rate)
                .map_err(|err| TransfoError::Internal(err.to_string()))?;
        }
    }
    // Config values flow init -> run through the parent.
    for (init_out, run_in, rate) in cfg_value_edges {
        graph
            .add_edge(Edge {
                ix: EdgeId(0),
                source: init_vertex,
                source_port: init_out,
                source_rate: Expression::constant(rate),
                sink: run_vertex,
                sink_port: run_in,
                sink_rate: Expression::constant(rate),
                delay: None,
            })
            .map_err(|err| TransfoError::Internal(err.to_string()))?;
    }
    graph.remove_vertex(parent_vertex);

    debug!(graph = %graph.name, init = init_ix, run = run_ix, "split dynamic subgraph");
    Ok(Some((init_ix, run_ix)))
}

struct Transfo<'a> {
    root: &'a Graph,
    graph: &'a Graph,
    job: &'a TransfoJob,
    /// First single-rate clone per pisdf vertex index.
    tracker: Vec<Option<VertexId>>,
    result: TransfoResult,
    parent_name: String,
}

/// Transform one job into the accumulating single-rate graph.
pub fn single_rate_transformation(
    app: &mut PisdfApp,
    job: &TransfoJob,
    srdag: &mut Graph,
) -> Result<TransfoResult, TransfoError> {
    // Dynamic graphs must have every parameter settled before their rates
    // can be trusted.
    {
        let graph = app.root().descend(&job.path);
        if graph.dynamic && !job.params.is_resolved() {
            let param = job
                .params
                .unresolved()
                .into_iter()
                .next()
                .unwrap_or_default();
            return Err(TransfoError::UnresolvedParameter {
                graph: graph.name.clone(),
                param,
            });
        }
    }

    // Split child graphs and solve the repetition vector.
    {
        let graph = app.root_mut().descend_mut(&job.path);
        for sub_ix in 0..graph.subgraphs.len() {
            split_dynamic_graph(graph, sub_ix)?;
        }
        if graph.dynamic || job.instance == 0 || job.srdag_ix.is_none() {
            brv::compute(graph, &job.params)?;
        }
    }

    let root = app.root();
    let graph = root.descend(&job.path);
    let parent_name = match job.srdag_ix {
        Some(ix) => srdag.vertex(ix).name.clone(),
        None => graph.name.clone(),
    };
    let mut transfo = Transfo {
        root,
        graph,
        job,
        tracker: vec![None; graph.vertex_capacity()],
        result: TransfoResult::default(),
        parent_name,
    };

    transfo.replace_job_interfaces(srdag)?;
    let vertex_ids = graph.vertex_ids();
    for vertex_id in &vertex_ids {
        transfo.fetch_or_clone(*vertex_id, srdag)?;
    }
    transfo.register_param_routes();
    for edge in graph.edges() {
        transfo.link_edge(edge.ix, srdag)?;
    }

    // The placeholder served its purpose; its ports were all rewired to
    // the Repeat/Tail adapters.
    if let Some(instance) = job.srdag_ix {
        srdag.remove_vertex(instance);
    }
    Ok(transfo.result)
}

impl<'a> Transfo<'a> {
    fn clone_name(&self, vertex_name: &str, instance: u32) -> String {
        format!("{}-{}_{}", self.parent_name, vertex_name, instance)
    }

    /// Swap the enclosing instance's interfaces for Repeat/Tail adapters.
    fn replace_job_interfaces(&mut self, srdag: &mut Graph) -> Result<(), TransfoError> {
        let instance = match self.job.srdag_ix {
            Some(ix) => ix,
            None => return Ok(()),
        };
        let instance_name = srdag.vertex(instance).name.clone();
        for (port, &iface) in self.graph.input_interfaces.iter().enumerate() {
            let edge_id = srdag.vertex(instance).inputs[port].ok_or_else(|| {
                TransfoError::Internal(format!(
                    "instance '{instance_name}' input {port} is unconnected"
                ))
            })?;
            let name = format!("{}_{}", instance_name, self.graph.vertex(iface).name);
            let adapter = srdag
                .add_vertex(&name, VertexKind::Repeat, 1, 1)
                .map_err(|err| TransfoError::Internal(err.to_string()))?;
            let rate = srdag.edge(edge_id).sink_rate.clone();
            srdag
                .set_edge_sink(edge_id, adapter, 0, rate)
                .map_err(|err| TransfoError::Internal(err.to_string()))?;
            self.tracker[iface.0] = Some(adapter);
        }
        for (port, &iface) in self.graph.output_interfaces.iter().enumerate() {
            let edge_id = srdag.vertex(instance).outputs[port].ok_or_else(|| {
                TransfoError::Internal(format!(
                    "instance '{instance_name}' output {port} is unconnected"
                ))
            })?;
            let name = format!("{}_{}", instance_name, self.graph.vertex(iface).name);
            let adapter = srdag
                .add_vertex(&name, VertexKind::Tail, 1, 1)
                .map_err(|err| TransfoError::Internal(err.to_string()))?;
            let rate = srdag.edge(edge_id).source_rate.clone();
            srdag
                .set_edge_source(edge_id, adapter, 0, rate)
                .map_err(|err| TransfoError::Internal(err.to_string()))?;
            self.tracker[iface.0] = Some(adapter);
        }
        Ok(())
    }

    /// Clone a vertex `RV` times (idempotent via the tracker).
    fn fetch_or_clone(
        &mut self,
        vertex_id: VertexId,
        srdag: &mut Graph,
    ) -> Result<(), TransfoError> {
        if self.tracker[vertex_id.0].is_some() {
            return Ok(());
        }
        let vertex = self.graph.vertex(vertex_id);
        match vertex.kind {
            VertexKind::Delay | VertexKind::InputInterface | VertexKind::OutputInterface => Ok(()),
            VertexKind::Graph => self.clone_graph_vertex(vertex_id, srdag),
            _ => {
                let proto_ref = ProtoRef {
                    path: self.job.path.clone(),
                    vertex: vertex_id,
                };
                // Refinement parameter values freeze here; the runner only
                // ever sees resolved integers.
                let resolved: Vec<i64> = vertex
                    .refinement_params
                    .iter()
                    .map(|&ParamId(ix)| {
                        let name = &self.graph.params[ix].name;
                        self.job.params.get(name).unwrap_or(0)
                    })
                    .collect();
                let mut first = None;
                for instance in 0..vertex.rv {
                    let clone = srdag
                        .add_vertex(
                            &self.clone_name(&vertex.name, instance),
                            vertex.kind,
                            vertex.inputs.len(),
                            vertex.outputs.len(),
                        )
                        .map_err(|err| TransfoError::Internal(err.to_string()))?;
                    srdag
                        .vertex_mut(clone)
                        .set_as_reference(vertex, proto_ref.clone(), instance);
                    srdag.vertex_mut(clone).resolved_params = resolved.clone();
                    first.get_or_insert(clone);
                }
                if let Some(first) = first {
                    self.tracker[vertex_id.0] = Some(first);
                }
                Ok(())
            }
        }
    }

    /// Clone a subgraph instance: placeholder vertices plus follow-up
    /// jobs. The init half of a split graph shares its parameter snapshot
    /// with the run half and registers parameter routes for its configs.
    fn clone_graph_vertex(
        &mut self,
        vertex_id: VertexId,
        srdag: &mut Graph,
    ) -> Result<(), TransfoError> {
        let vertex = self.graph.vertex(vertex_id);
        let sub_ix = vertex
            .subgraph
            .ok_or_else(|| TransfoError::Internal("graph vertex without body".into()))?;
        let sub = self.graph.subgraph(sub_ix);

        // Init halves need the run half cloned first so both job lists pair
        // up instance by instance.
        if let Some(run_ix) = sub.run_counterpart {
            let run_vertex = self
                .graph
                .vertices()
                .find(|v| v.subgraph == Some(run_ix))
                .map(|v| v.ix)
                .ok_or_else(|| TransfoError::Internal("run graph without parent vertex".into()))?;
            self.fetch_or_clone(run_vertex, srdag)?;
        }

        let mut sub_path = self.job.path.clone();
        sub_path.push(sub_ix);
        let is_init_half = sub.run_counterpart.is_some();
        let run_path = sub.run_counterpart.map(|run_ix| {
            let mut p = self.job.path.clone();
            p.push(run_ix);
            p
        });

        let mut first = None;
        for instance in 0..vertex.rv {
            let clone = srdag
                .add_vertex(
                    &self.clone_name(&vertex.name, instance),
                    VertexKind::Graph,
                    vertex.inputs.len(),
                    vertex.outputs.len(),
                )
                .map_err(|err| TransfoError::Internal(err.to_string()))?;
            srdag.vertex_mut(clone).instance = instance;
            srdag.vertex_mut(clone).reference = Some(ProtoRef {
                path: self.job.path.clone(),
                vertex: vertex_id,
            });
            first.get_or_insert(clone);

            let params = if let Some(run_path) = &run_path {
                // Share the run half's snapshot so the init job evaluates
                // against the same static values.
                self.result
                    .dyna_jobs
                    .iter()
                    .find(|j| &j.path == run_path && j.instance == instance)
                    .map(|j| j.params.clone())
                    .unwrap_or_else(|| snapshot_params(self.graph.subgraph(sub_ix), &self.job.params))
            } else {
                snapshot_params(sub, &self.job.params)
            };
            let follow_up = TransfoJob {
                path: sub_path.clone(),
                srdag_ix: Some(clone),
                instance,
                params,
            };
            if sub.dynamic && !is_init_half {
                self.result.dyna_jobs.push(follow_up);
            } else {
                self.result.next_jobs.push(follow_up);
            }
        }
        if let Some(first) = first {
            self.tracker[vertex_id.0] = Some(first);
        }
        Ok(())
    }

    /// Register parameter routes for the config clones of an init half:
    /// their output values feed the dynamic parameters of the run half's
    /// pending job with the same instance ordinal.
    fn register_param_routes(&mut self) {
        let run_ix = match self.graph.run_counterpart {
            Some(ix) => ix,
            None => return,
        };
        let mut run_path = self.job.path[..self.job.path.len() - 1].to_vec();
        run_path.push(run_ix);
        let run_graph = self.root.descend(&run_path);
        for vertex in self.graph.config_vertices() {
            let Some(first_clone) = self.tracker[vertex.ix.0] else {
                continue;
            };
            if vertex.output_params.is_empty() {
                continue;
            }
            let param_names: Vec<String> = vertex
                .output_params
                .iter()
                .map(|&ParamId(ix)| run_graph.params[ix].name.clone())
                .collect();
            self.result.param_routes.push(ParamRoute {
                sr_vertex: first_clone,
                graph_path: run_path.clone(),
                instance: self.job.instance,
                param_names,
            });
        }
    }

    /// Link one pisdf edge into the single-rate graph.
    fn link_edge(&mut self, edge_id: EdgeId, srdag: &mut Graph) -> Result<(), TransfoError> {
        let graph = self.graph;
        let edge = graph.edge(edge_id);
        let source = graph.vertex(edge.source);
        let sink = graph.vertex(edge.sink);
        if source.kind == VertexKind::Delay || sink.kind == VertexKind::Delay {
            return Ok(());
        }
        let edge_name = graph.edge_name(edge_id);
        let params = &self.job.params;

        let raw_src_rate = edge.source_rate_value(params)?;
        let raw_snk_rate = edge.sink_rate_value(params)?;
        let delay_value = edge.delay_value(params)?;

        if edge.is_self_loop() {
            if edge.delay.is_none() {
                return Err(TransfoError::IllegalLoop(edge_name));
            }
            if delay_value < raw_snk_rate {
                return Err(TransfoError::InsufficientDelay {
                    edge: edge_name,
                    delay: delay_value,
                    rate: raw_snk_rate,
                });
            }
        }
        if raw_src_rate == 0 && raw_snk_rate == 0 {
            return Ok(());
        }

        // Interface endpoints expose the total traffic of the inner side.
        let src_rate = if source.kind.is_input_interface() && !self.job.path.is_empty() {
            raw_snk_rate * i64::from(sink.rv)
        } else {
            raw_src_rate
        };
        let snk_rate = if sink.kind.is_output_interface() && !self.job.path.is_empty() {
            raw_src_rate * i64::from(source.rv)
        } else {
            raw_snk_rate
        };

        let mut src_vector: Vec<EdgeLinker> = Vec::new();
        self.fill_linker_vector(&mut src_vector, edge.source, src_rate, edge.source_port)?;
        let mut setter_rate = 0;
        let mut setter_rv = 0u32;
        if let Some(delay) = &edge.delay {
            match &delay.setter {
                Some(setter) => {
                    setter_rate = setter.rate.evaluate_i64(params)?;
                    setter_rv = graph.vertex(setter.vertex).rv;
                    self.fill_linker_vector(&mut src_vector, setter.vertex, setter_rate, setter.port)?;
                }
                None => {
                    let init = linker::make_init_vertex(
                        srdag,
                        &edge_name,
                        delay.is_persistent(),
                        delay.memory_address,
                        delay_value,
                    )?;
                    src_vector.push(EdgeLinker {
                        vertex: init,
                        rate: delay_value,
                        port: 0,
                        lower: u32::MAX,
                        upper: 0,
                    });
                    setter_rate = delay_value;
                    setter_rv = 1;
                }
            }
        }

        let mut snk_vector: Vec<EdgeLinker> = Vec::new();
        let mut getter_rate = 0;
        let mut getter_rv = 0u32;
        if let Some(delay) = &edge.delay {
            match &delay.getter {
                Some(getter) => {
                    getter_rate = getter.rate.evaluate_i64(params)?;
                    getter_rv = graph.vertex(getter.vertex).rv;
                    self.fill_linker_vector(&mut snk_vector, getter.vertex, getter_rate, getter.port)?;
                }
                None => {
                    let end = linker::make_end_vertex(
                        srdag,
                        &edge_name,
                        delay.is_persistent(),
                        delay.memory_address,
                        delay_value,
                    )?;
                    snk_vector.push(EdgeLinker {
                        vertex: end,
                        rate: delay_value,
                        port: 0,
                        lower: u32::MAX,
                        upper: 0,
                    });
                    getter_rate = delay_value;
                    getter_rv = 1;
                }
            }
        }
        self.fill_linker_vector(&mut snk_vector, edge.sink, snk_rate, edge.sink_port)?;

        let snk_rv = if sink.kind.is_output_interface() {
            1
        } else {
            sink.rv
        };
        let resolved = ResolvedEdge {
            edge_name,
            src_rate,
            snk_rate,
            delay: delay_value,
            setter_rate,
            setter_rv,
            getter_rate,
            getter_rv,
            snk_rv,
        };
        linker::link_edge(&resolved, src_vector, snk_vector, srdag)
    }

    /// Push the single-rate clones of `vertex` in reverse instance order,
    /// so the vector's back is the first firing.
    fn fill_linker_vector(
        &self,
        vector: &mut Vec<EdgeLinker>,
        vertex: VertexId,
        rate: i64,
        port: usize,
    ) -> Result<(), TransfoError> {
        let reference = self.graph.vertex(vertex);
        let first = self.tracker[vertex.0].ok_or_else(|| {
            TransfoError::Internal(format!("vertex '{}' was never cloned", reference.name))
        })?;
        let rv = if reference.kind.is_interface() { 1 } else { reference.rv };
        // Interface adapters have a single port on the inner side.
        let port = if reference.kind.is_interface() { 0 } else { port };
        for instance in (0..rv).rev() {
            vector.push(EdgeLinker {
                vertex: VertexId(first.0 + instance as usize),
                rate,
                port,
                lower: u32::MAX,
                upper: 0,
            });
        }
        Ok(())
    }
}

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! End-to-end scenarios for the single-rate transformation and the
//! peephole optimizer, using real application graphs.

use crate::errors::TransfoError;
use crate::pisdf::{Graph, JobParams, PisdfApp, VertexKind};
use crate::srdag::transform::{
    single_rate_transformation, snapshot_params, TransfoJob, TransfoResult,
};
use crate::srdag::optims;

/// Drain every ready job of a static application into one SR graph.
fn transform_static(app: &mut PisdfApp) -> Result<Graph, TransfoError> {
    let mut srdag = Graph::new("srdag");
    let root_params = snapshot_params(app.root(), &JobParams::new());
    let mut jobs = vec![TransfoJob::root(root_params)];
    while let Some(job) = jobs.pop() {
        let result = single_rate_transformation(app, &job, &mut srdag)?;
        assert!(result.dyna_jobs.is_empty(), "static app produced dynamic jobs");
        jobs.extend(result.next_jobs);
    }
    Ok(srdag)
}

fn count_kind(graph: &Graph, kind: VertexKind) -> usize {
    graph.vertices().filter(|v| v.kind == kind).count()
}

fn find_by_name<'a>(graph: &'a Graph, name: &str) -> Option<&'a crate::pisdf::Vertex> {
    graph.vertices().find(|v| v.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Flat static graph: V0 produces 4, V1 consumes 1 -> RV(V1) = 4 and a
    /// four-way fork between them.
    #[test]
    fn s1_flat_static_fork() {
        let mut app = PisdfApp::new("top");
        let root = app.root_handle();
        let v0 = app.create_actor(&root, "v0", 0, 1).unwrap();
        let v1 = app.create_actor(&root, "v1", 1, 0).unwrap();
        app.create_edge(&root, v0, 0, 4, v1, 0, 1).unwrap();

        let mut srdag = transform_static(&mut app).unwrap();
        assert_eq!(app.root().vertex(v1).rv, 4);
        assert_eq!(srdag.vertex_count(), 6); // v0_0, 4x v1, fork
        assert_eq!(srdag.edge_count(), 5);
        let fork = srdag
            .vertices()
            .find(|v| v.kind == VertexKind::Fork)
            .expect("fork inserted");
        assert_eq!(fork.outputs.len(), 4);
        // Consumers come out of the fork in firing order.
        for (port, expected) in ["top-v1_0", "top-v1_1", "top-v1_2", "top-v1_3"]
            .iter()
            .enumerate()
        {
            let edge = fork.outputs[port].expect("connected");
            assert_eq!(&srdag.vertex(srdag.edge(edge).sink).name, expected);
        }

        optims::optimize(&mut srdag);
        // Nothing to collapse: the fork stays.
        assert_eq!(srdag.vertex_count(), 6);
        assert_eq!(srdag.edge_count(), 5);
    }

    /// Delay of two tokens on a 1:1 edge: the init data forks into the
    /// consumer and a join gathering the producer's last tokens for the
    /// end actor.
    #[test]
    fn s2_delay_fork_join_then_parallel_ends() {
        let mut app = PisdfApp::new("top");
        let root = app.root_handle();
        let v0 = app.create_actor(&root, "v0", 0, 1).unwrap();
        let v1 = app.create_actor(&root, "v1", 1, 0).unwrap();
        let e = app.create_edge(&root, v0, 0, 1, v1, 0, 1).unwrap();
        app.create_local_delay(&root, e, "2", None, None).unwrap();

        let mut srdag = transform_static(&mut app).unwrap();
        assert_eq!(srdag.vertex_count(), 6);
        assert_eq!(srdag.edge_count(), 5);
        assert_eq!(count_kind(&srdag, VertexKind::Fork), 1);
        assert_eq!(count_kind(&srdag, VertexKind::Join), 1);
        assert_eq!(count_kind(&srdag, VertexKind::Init), 1);
        assert_eq!(count_kind(&srdag, VertexKind::End), 1);

        optims::optimize(&mut srdag);
        // The join/end pair splits into one end per producer.
        assert_eq!(count_kind(&srdag, VertexKind::Join), 0);
        assert_eq!(count_kind(&srdag, VertexKind::End), 2);
        // v1_0 still receives the init data through the fork.
        let v1_0 = find_by_name(&srdag, "top-v1_0").expect("consumer clone");
        let producer = srdag.edge(v1_0.inputs[0].unwrap()).source;
        assert_eq!(srdag.vertex(producer).kind, VertexKind::Fork);
    }

    /// Self-loop with a delay equal to one firing's consumption is legal
    /// and expands to init -> actor -> end.
    #[test]
    fn s3_self_loop_with_delay() {
        let mut app = PisdfApp::new("top");
        let root = app.root_handle();
        let v = app.create_actor(&root, "v", 1, 1).unwrap();
        let e = app.create_edge(&root, v, 0, 2, v, 0, 2).unwrap();
        app.create_local_delay(&root, e, "2", None, None).unwrap();

        let srdag = transform_static(&mut app).unwrap();
        assert_eq!(app.root().vertex(v).rv, 1);
        assert_eq!(srdag.vertex_count(), 3);
        assert_eq!(srdag.edge_count(), 2);
        let v_0 = find_by_name(&srdag, "top-v_0").expect("clone");
        let producer = srdag.edge(v_0.inputs[0].unwrap()).source;
        let consumer = srdag.edge(v_0.outputs[0].unwrap()).sink;
        assert_eq!(srdag.vertex(producer).kind, VertexKind::Init);
        assert_eq!(srdag.vertex(consumer).kind, VertexKind::End);
    }

    #[test]
    fn s3_self_loop_insufficient_delay() {
        let mut app = PisdfApp::new("top");
        let root = app.root_handle();
        let v = app.create_actor(&root, "v", 1, 1).unwrap();
        let e = app.create_edge(&root, v, 0, 2, v, 0, 2).unwrap();
        app.create_local_delay(&root, e, "1", None, None).unwrap();
        assert!(matches!(
            transform_static(&mut app),
            Err(TransfoError::InsufficientDelay { delay: 1, rate: 2, .. })
        ));
    }

    #[test]
    fn s3_self_loop_without_delay() {
        let mut app = PisdfApp::new("top");
        let root = app.root_handle();
        let v = app.create_actor(&root, "v", 1, 1).unwrap();
        app.create_edge(&root, v, 0, 2, v, 0, 2).unwrap();
        assert!(matches!(
            transform_static(&mut app),
            Err(TransfoError::IllegalLoop(_))
        ));
    }

    /// Hierarchy: V0 -> Sub(V2) -> V1 flattens to a three-vertex chain
    /// once the unitary Repeat/Tail adapters are bypassed.
    #[test]
    fn s4_hierarchical_static() {
        let mut app = PisdfApp::new("top");
        let root = app.root_handle();
        let v0 = app.create_actor(&root, "v0", 0, 1).unwrap();
        let (sub, sub_vertex) = app.create_subgraph(&root, "sub", 1, 1).unwrap();
        let v1 = app.create_actor(&root, "v1", 1, 0).unwrap();
        app.create_edge(&root, v0, 0, 1, sub_vertex, 0, 1).unwrap();
        app.create_edge(&root, sub_vertex, 0, 1, v1, 0, 1).unwrap();

        let in_if = app.input_interface(&sub, 0);
        let out_if = app.output_interface(&sub, 0);
        let v2 = app.create_actor(&sub, "v2", 1, 1).unwrap();
        app.create_edge(&sub, in_if, 0, 1, v2, 0, 1).unwrap();
        app.create_edge(&sub, v2, 0, 1, out_if, 0, 1).unwrap();

        let mut srdag = transform_static(&mut app).unwrap();
        // Pre-optimization: v0_0, v1_0, v2_0 plus the two adapters.
        assert_eq!(srdag.vertex_count(), 5);
        optims::optimize(&mut srdag);
        assert_eq!(srdag.vertex_count(), 3);
        assert_eq!(srdag.edge_count(), 2);
        let v2_0 = srdag
            .vertices()
            .find(|v| v.name.contains("v2"))
            .expect("inner clone");
        let producer = srdag.edge(v2_0.inputs[0].unwrap()).source;
        let consumer = srdag.edge(v2_0.outputs[0].unwrap()).sink;
        assert_eq!(srdag.vertex(producer).name, "top-v0_0");
        assert_eq!(srdag.vertex(consumer).name, "top-v1_0");
    }

    /// Dynamic subgraph: the config half runs first; once its parameter
    /// value lands, the run half links against the resolved rate.
    #[test]
    fn s5_dynamic_subgraph_two_passes() {
        let mut app = PisdfApp::new("top");
        let root = app.root_handle();
        let (sub, sub_vertex) = app.create_subgraph(&root, "sub", 0, 1).unwrap();
        let v1 = app.create_actor(&root, "v1", 1, 0).unwrap();
        app.create_edge(&root, sub_vertex, 0, 3, v1, 0, 3).unwrap();

        let width = app.create_dynamic_param(&sub, "width").unwrap();
        let cfg = app.create_config_actor(&sub, "cfg", 0, 0).unwrap();
        app.add_output_param(&sub, cfg, width).unwrap();
        let v2 = app.create_actor(&sub, "v2", 0, 1).unwrap();
        let out_if = app.output_interface(&sub, 0);
        app.create_edge_expr(&sub, v2, 0, "width", out_if, 0, "width")
            .unwrap();

        let mut srdag = Graph::new("srdag");
        let root_params = snapshot_params(app.root(), &JobParams::new());
        let root_job = TransfoJob::root(root_params);
        let TransfoResult {
            next_jobs,
            mut dyna_jobs,
            ..
        } = single_rate_transformation(&mut app, &root_job, &mut srdag).unwrap();

        // First pass: the init half is ready, the run half is pending.
        assert_eq!(next_jobs.len(), 1);
        assert_eq!(dyna_jobs.len(), 1);
        let ginit_job = &next_jobs[0];
        let result = single_rate_transformation(&mut app, ginit_job, &mut srdag).unwrap();
        assert_eq!(result.param_routes.len(), 1);
        let route = &result.param_routes[0];
        assert_eq!(route.param_names, vec!["width".to_string()]);
        assert_eq!(route.graph_path, dyna_jobs[0].path);
        assert!(find_by_name(&srdag, "top-ginit-sub_0-cfg_0").is_some());

        // The run half cannot transform yet.
        let err = single_rate_transformation(&mut app, &dyna_jobs[0], &mut srdag).unwrap_err();
        assert!(matches!(err, TransfoError::UnresolvedParameter { .. }));

        // Simulate the config actor posting width = 3.
        assert!(dyna_jobs[0].params.set("width", 3));
        let result = single_rate_transformation(&mut app, &dyna_jobs[0], &mut srdag).unwrap();
        assert!(result.next_jobs.is_empty() && result.dyna_jobs.is_empty());

        optims::optimize(&mut srdag);
        // v2_0 now feeds v1_0 directly at rate 3.
        let v2_0 = srdag
            .vertices()
            .find(|v| v.name.contains("v2"))
            .expect("run clone");
        let out_edge = srdag.edge(v2_0.outputs[0].unwrap());
        assert_eq!(out_edge.source_rate.value(), Some(3));
        assert_eq!(srdag.vertex(out_edge.sink).name, "top-v1_0");
    }

    /// Two nested three-way forks collapse into one six-output fork that
    /// preserves the order of the leaf consumers.
    #[test]
    fn s6_fork_fork_collapse_preserves_sink_order() {
        let mut srdag = Graph::new("srdag");
        let v = srdag.add_vertex("v", VertexKind::Normal, 0, 1).unwrap();
        let sinks: Vec<_> = (1..=6)
            .map(|i| {
                srdag
                    .add_vertex(&format!("v{i}"), VertexKind::Normal, 1, 0)
                    .unwrap()
            })
            .collect();
        let fork = srdag.add_vertex("fork", VertexKind::Fork, 1, 2).unwrap();
        let fork_0 = srdag.add_vertex("fork_0", VertexKind::Fork, 1, 3).unwrap();
        let fork_1 = srdag.add_vertex("fork_1", VertexKind::Fork, 1, 2).unwrap();
        let fork_2 = srdag.add_vertex("fork_2", VertexKind::Fork, 1, 2).unwrap();

        let edge = |g: &mut Graph, src, sp, rate, snk, kp| {
            g.add_edge(crate::pisdf::Edge {
                ix: crate::pisdf::EdgeId(0),
                source: src,
                source_port: sp,
                source_rate: crate::expr::Expression::constant(rate),
                sink: snk,
                sink_port: kp,
                sink_rate: crate::expr::Expression::constant(rate),
                delay: None,
            })
            .unwrap();
        };
        edge(&mut srdag, v, 0, 6, fork, 0);
        edge(&mut srdag, fork, 0, 5, fork_0, 0);
        edge(&mut srdag, fork, 1, 1, sinks[0], 0); // v1
        edge(&mut srdag, fork_0, 0, 2, fork_1, 0);
        edge(&mut srdag, fork_0, 1, 1, sinks[1], 0); // v2
        edge(&mut srdag, fork_0, 2, 2, fork_2, 0);
        edge(&mut srdag, fork_1, 0, 1, sinks[2], 0); // v3
        edge(&mut srdag, fork_1, 1, 1, sinks[3], 0); // v4
        edge(&mut srdag, fork_2, 0, 1, sinks[4], 0); // v5
        edge(&mut srdag, fork_2, 1, 1, sinks[5], 0); // v6

        optims::reduce_fork_fork(&mut srdag);
        assert_eq!(count_kind(&srdag, VertexKind::Fork), 1);
        let merged = srdag
            .vertices()
            .find(|v| v.kind == VertexKind::Fork)
            .expect("merged fork");
        assert_eq!(merged.outputs.len(), 6);
        let order: Vec<String> = merged
            .outputs
            .iter()
            .map(|edge| srdag.vertex(srdag.edge(edge.unwrap()).sink).name.clone())
            .collect();
        assert_eq!(order, vec!["v3", "v4", "v2", "v5", "v6", "v1"]);
    }

    /// The optimizer's fixed point does not depend on rule order.
    #[test]
    fn optimizer_is_confluent_on_delay_graph() {
        let build = || {
            let mut app = PisdfApp::new("top");
            let root = app.root_handle();
            let v0 = app.create_actor(&root, "v0", 0, 1).unwrap();
            let v1 = app.create_actor(&root, "v1", 1, 0).unwrap();
            let e = app.create_edge(&root, v0, 0, 1, v1, 0, 1).unwrap();
            app.create_local_delay(&root, e, "2", None, None).unwrap();
            transform_static(&mut app).unwrap()
        };

        let mut forward = build();
        optims::optimize(&mut forward);

        let mut shuffled = build();
        // Different order: late rules first, then the standard driver.
        optims::reduce_join_end(&mut shuffled);
        optims::reduce_init_end(&mut shuffled);
        optims::optimize(&mut shuffled);

        assert_eq!(forward.vertex_count(), shuffled.vertex_count());
        assert_eq!(forward.edge_count(), shuffled.edge_count());
        for kind in [
            VertexKind::Fork,
            VertexKind::Join,
            VertexKind::Init,
            VertexKind::End,
        ] {
            assert_eq!(count_kind(&forward, kind), count_kind(&shuffled, kind));
        }
    }

    /// Token conservation: for every SR edge the producer writes exactly
    /// what the consumer reads, and each port is used once.
    #[test]
    fn sr_graph_conserves_tokens() {
        let mut app = PisdfApp::new("top");
        let root = app.root_handle();
        let a = app.create_actor(&root, "a", 0, 1).unwrap();
        let b = app.create_actor(&root, "b", 1, 1).unwrap();
        let c = app.create_actor(&root, "c", 1, 0).unwrap();
        app.create_edge(&root, a, 0, 3, b, 0, 2).unwrap();
        app.create_edge(&root, b, 0, 3, c, 0, 2).unwrap();

        let srdag = transform_static(&mut app).unwrap();
        for edge in srdag.edges() {
            assert_eq!(
                edge.source_rate.value(),
                edge.sink_rate.value(),
                "rate mismatch on {}",
                srdag.edge_name(edge.ix)
            );
        }
        // Every connected port holds exactly one edge by construction;
        // check the totals balance per original vertex pair.
        let produced: i64 = srdag
            .vertices()
            .filter(|v| v.name.contains("-a_"))
            .map(|v| {
                v.outputs
                    .iter()
                    .flatten()
                    .map(|e| srdag.edge(*e).source_rate.value().unwrap())
                    .sum::<i64>()
            })
            .sum();
        assert_eq!(produced, 12); // 4 firings x 3 tokens
    }
}

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! End-to-end runtime tests: whole applications executed through the JIT
//! master-slave loop on an in-process platform.

use crate::config::RuntimeConfig;
use crate::pisdf::PisdfApp;
use crate::runtime::jitms::{JitmsRuntime, Runtime};
use crate::runtime::kernel::KernelRegistry;

#[cfg(test)]
mod tests {
    use super::*;

    /// Producer writes four bytes straight into an external buffer.
    #[tokio::test]
    async fn flat_pipeline_reaches_external_buffer() {
        let mut app = PisdfApp::new("app");
        let root = app.root_handle();
        let buffer = app.register_external_buffer(vec![0; 4]);
        let producer = app.create_actor(&root, "producer", 0, 1).unwrap();
        let out = app
            .create_extern_output_interface(&root, "out", buffer)
            .unwrap();
        app.create_edge(&root, producer, 0, 4, out, 0, 4).unwrap();

        let mut kernels = KernelRegistry::new();
        let ix = kernels.register(|_, _, _, outputs| {
            outputs[0].copy_from_slice(&[1, 2, 3, 4]);
        });
        app.set_kernel(&root, producer, ix);

        let mut runtime = JitmsRuntime::start(app, kernels, RuntimeConfig::single_cluster(2));
        runtime.execute().await.expect("iteration");
        assert_eq!(runtime.iteration(), 1);
        let app = runtime.quit().await;
        assert_eq!(app.external_buffers()[buffer], vec![1, 2, 3, 4]);
    }

    /// Rate mismatch: the producer's four tokens fork into four firings
    /// of the doubling consumer, whose results join back into the
    /// external buffer.
    #[tokio::test]
    async fn fork_join_pipeline_doubles_every_byte() {
        let mut app = PisdfApp::new("app");
        let root = app.root_handle();
        let buffer = app.register_external_buffer(vec![0; 4]);
        let producer = app.create_actor(&root, "producer", 0, 1).unwrap();
        let consumer = app.create_actor(&root, "consumer", 1, 1).unwrap();
        let out = app
            .create_extern_output_interface(&root, "out", buffer)
            .unwrap();
        app.create_edge(&root, producer, 0, 4, consumer, 0, 1).unwrap();
        app.create_edge(&root, consumer, 0, 1, out, 0, 4).unwrap();

        let mut kernels = KernelRegistry::new();
        let produce = kernels.register(|_, _, _, outputs| {
            outputs[0].copy_from_slice(&[1, 2, 3, 4]);
        });
        let double = kernels.register(|_, _, inputs, outputs| {
            outputs[0][0] = inputs[0][0] * 2;
        });
        app.set_kernel(&root, producer, produce);
        app.set_kernel(&root, consumer, double);

        let mut runtime = JitmsRuntime::start(app, kernels, RuntimeConfig::single_cluster(2));
        runtime.execute().await.expect("iteration");
        let app = runtime.quit().await;
        assert_eq!(app.external_buffers()[buffer], vec![2, 4, 6, 8]);
    }

    /// Dynamic subgraph: the config actor resolves `width` in the first
    /// round, the run half executes in the second.
    #[tokio::test]
    async fn dynamic_subgraph_resolves_and_runs() {
        let mut app = PisdfApp::new("app");
        let root = app.root_handle();
        let buffer = app.register_external_buffer(vec![0; 3]);
        let (sub, sub_vertex) = app.create_subgraph(&root, "sub", 0, 1).unwrap();
        let out = app
            .create_extern_output_interface(&root, "out", buffer)
            .unwrap();
        app.create_edge(&root, sub_vertex, 0, 3, out, 0, 3).unwrap();

        let width = app.create_dynamic_param(&sub, "width").unwrap();
        let cfg = app.create_config_actor(&sub, "cfg", 0, 0).unwrap();
        app.add_output_param(&sub, cfg, width).unwrap();
        let v2 = app.create_actor(&sub, "v2", 0, 1).unwrap();
        let out_if = app.output_interface(&sub, 0);
        app.create_edge_expr(&sub, v2, 0, "width", out_if, 0, "width")
            .unwrap();

        let mut kernels = KernelRegistry::new();
        let set_width = kernels.register(|_, output_params, _, _| {
            output_params[0] = 3;
        });
        let fill = kernels.register(|_, _, _, outputs| {
            outputs[0].fill(7);
        });
        app.set_kernel(&sub, cfg, set_width);
        app.set_kernel(&sub, v2, fill);

        let mut runtime = JitmsRuntime::start(app, kernels, RuntimeConfig::single_cluster(2));
        runtime.execute().await.expect("iteration");
        let app = runtime.quit().await;
        assert_eq!(app.external_buffers()[buffer], vec![7, 7, 7]);
    }

    /// Persistent delay: loop-carried state survives across iterations.
    #[tokio::test]
    async fn persistent_delay_carries_state_across_iterations() {
        let mut app = PisdfApp::new("app");
        let root = app.root_handle();
        let buffer = app.register_external_buffer(vec![0; 2]);
        // v has a self loop (state) and an observer output.
        let v = app.create_actor(&root, "v", 1, 2).unwrap();
        let out = app
            .create_extern_output_interface(&root, "out", buffer)
            .unwrap();
        let state_edge = app.create_edge(&root, v, 0, 2, v, 0, 2).unwrap();
        app.create_edge(&root, v, 1, 2, out, 0, 2).unwrap();
        app.create_persistent_delay(&root, state_edge, "2").unwrap();

        let mut kernels = KernelRegistry::new();
        let step = kernels.register(|_, _, inputs, outputs| {
            let next: Vec<u8> = inputs[0].iter().map(|&b| b + 1).collect();
            outputs[0].copy_from_slice(&next);
            outputs[1].copy_from_slice(&next);
        });
        app.set_kernel(&root, v, step);

        let mut runtime = JitmsRuntime::start(app, kernels, RuntimeConfig::single_cluster(1));
        runtime.execute().await.expect("first iteration");
        runtime.execute().await.expect("second iteration");
        assert_eq!(runtime.iteration(), 2);
        let app = runtime.quit().await;
        // Zeroed storage, +1 per iteration.
        assert_eq!(app.external_buffers()[buffer], vec![2, 2]);
    }

    /// End-of-iteration cleanup leaves no scratch buffers behind.
    #[tokio::test]
    async fn scratch_memory_is_reclaimed_between_iterations() {
        let mut app = PisdfApp::new("app");
        let root = app.root_handle();
        let producer = app.create_actor(&root, "producer", 0, 1).unwrap();
        let consumer = app.create_actor(&root, "consumer", 1, 0).unwrap();
        app.create_edge(&root, producer, 0, 2, consumer, 0, 1).unwrap();

        let mut kernels = KernelRegistry::new();
        let produce = kernels.register(|_, _, _, outputs| {
            outputs[0].fill(5);
        });
        let consume = kernels.register(|_, _, _, _| {});
        app.set_kernel(&root, producer, produce);
        app.set_kernel(&root, consumer, consume);

        let mut runtime = JitmsRuntime::start(app, kernels, RuntimeConfig::single_cluster(2));
        runtime.execute().await.expect("iteration");
        assert_eq!(runtime.platform().memory.allocated_regions(), 0);
        let _ = runtime.quit().await;
    }

    /// A missing kernel is a runtime fault that terminates the iteration.
    #[tokio::test]
    async fn missing_kernel_is_a_runtime_fault() {
        let mut app = PisdfApp::new("app");
        let root = app.root_handle();
        let producer = app.create_actor(&root, "producer", 0, 1).unwrap();
        let consumer = app.create_actor(&root, "consumer", 1, 0).unwrap();
        app.create_edge(&root, producer, 0, 1, consumer, 0, 1).unwrap();
        // No kernels bound at all.
        let kernels = KernelRegistry::new();

        let mut runtime = JitmsRuntime::start(app, kernels, RuntimeConfig::single_cluster(1));
        let err = runtime.execute().await.unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }
}

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Demo driver: builds a small PiSDF application with a dynamic subgraph,
//! runs it through the JIT runtime and prints the observable output.
//!
//! Usage: `spindle [config.yaml] [iterations]`
//!
//! Exit codes: 0 success, 1 graph construction error, 2 transformation
//! error, 3 scheduling error, 4 runtime error.

use std::env;
use std::process::ExitCode;

use anyhow::Context;

use spindle::config::{load_and_validate_config, RuntimeConfig};
use spindle::errors::SpindleError;
use spindle::pisdf::PisdfApp;
use spindle::runtime::{JitmsRuntime, KernelRegistry, Runtime};

struct DemoApp {
    app: PisdfApp,
    kernels: KernelRegistry,
    buffer: usize,
}

/// Producer feeding a width-configured subgraph; the config actor picks
/// the width at run time and the runtime links the second half once the
/// value lands.
fn build_demo_app() -> Result<DemoApp, SpindleError> {
    let mut app = PisdfApp::new("demo");
    let root = app.root_handle();
    let buffer = app.register_external_buffer(vec![0; 6]);

    let (sub, sub_vertex) = app.create_subgraph(&root, "stage", 0, 1)?;
    let sink = app.create_actor(&root, "sink", 1, 1)?;
    let out = app.create_extern_output_interface(&root, "out", buffer)?;
    app.create_edge(&root, sub_vertex, 0, 6, sink, 0, 6)?;
    app.create_edge(&root, sink, 0, 6, out, 0, 6)?;

    let width = app.create_dynamic_param(&sub, "width")?;
    let cfg = app.create_config_actor(&sub, "detect_width", 0, 0)?;
    app.add_output_param(&sub, cfg, width)?;
    let source = app.create_actor(&sub, "source", 0, 1)?;
    let out_if = app.output_interface(&sub, 0);
    app.create_edge_expr(&sub, source, 0, "width", out_if, 0, "width")?;

    let mut kernels = KernelRegistry::new();
    let detect = kernels.register(|_, output_params, _, _| {
        output_params[0] = 6;
    });
    let generate = kernels.register(|_, _, _, outputs| {
        for (i, byte) in outputs[0].iter_mut().enumerate() {
            *byte = i as u8 + 1;
        }
    });
    let amplify = kernels.register(|_, _, inputs, outputs| {
        for (o, i) in outputs[0].iter_mut().zip(&inputs[0]) {
            *o = i * 10;
        }
    });
    app.set_kernel(&sub, cfg, detect);
    app.set_kernel(&sub, source, generate);
    app.set_kernel(&root, sink, amplify);

    Ok(DemoApp {
        app,
        kernels,
        buffer,
    })
}

fn load_config(args: &[String]) -> anyhow::Result<RuntimeConfig> {
    match args.first() {
        Some(path) => load_and_validate_config(path)
            .map_err(|err| anyhow::anyhow!("{err}"))
            .with_context(|| format!("loading config '{path}'")),
        None => Ok(RuntimeConfig::single_cluster(4)),
    }
}

async fn run(config: RuntimeConfig, iterations: usize) -> Result<(), SpindleError> {
    let demo = build_demo_app()?;
    let mut runtime = JitmsRuntime::start(demo.app, demo.kernels, config);
    for _ in 0..iterations {
        runtime.execute().await?;
    }
    let app = runtime.quit().await;
    println!(
        "demo output after {iterations} iteration(s): {:?}",
        app.external_buffers()[demo.buffer]
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err:#}");
            return ExitCode::from(1);
        }
    };
    let iterations = args
        .get(1)
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(1);

    match run(config, iterations).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Single-rate machinery: repetition-vector solver, dependency solver,
//! hierarchical transformation and the peephole optimizer.

pub mod brv;
pub mod deps;
pub mod linker;
pub mod optims;
pub mod transform;

#[cfg(test)]
mod integration_tests;

pub use transform::{
    single_rate_transformation, snapshot_params, split_dynamic_graph, ParamRoute, TransfoJob,
    TransfoResult,
};

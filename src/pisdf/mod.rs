// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! PiSDF model: typed vertices, rate-annotated edges with optional delays,
//! interfaces, parameters and hierarchical graphs.

pub mod api;
pub mod dot;
pub mod edge;
pub mod graph;
pub mod param;
pub mod vertex;

pub use api::{GraphHandle, PisdfApp};
pub use edge::{Delay, DelayEndpoint, Edge, Persistence};
pub use graph::Graph;
pub use param::{JobParams, Param, ParamId, ParamKind, ScopeChain};
pub use vertex::{DelayInfo, EdgeId, ProtoRef, Vertex, VertexId, VertexKind};

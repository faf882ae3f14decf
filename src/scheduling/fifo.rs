// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! FIFO descriptors and virtual-address allocation for single-rate edges.
//!
//! Every edge of the SR graph gets a descriptor naming a region of the
//! memory interface's virtual address space. Fork/duplicate outputs alias
//! their input's buffer at an accumulated offset instead of copying;
//! release counting frees a buffer after its last reader.

use std::collections::HashMap;

use crate::pisdf::{EdgeId, Graph, VertexKind};

/// Ownership/visibility class of a FIFO region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FifoAttribute {
    /// Aliased view into another edge's buffer; readers release it.
    ReadOnly,
    /// Runtime-allocated buffer; the last reader deallocates.
    ReadWriteOwn,
    /// Caller-registered or persistent storage; never freed by a runner.
    ReadWriteExternal,
}

/// One FIFO region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fifo {
    pub virtual_address: u64,
    pub offset: u32,
    pub size: u32,
    /// Reader releases this view contributes to the backing buffer. Every
    /// single-rate port has exactly one counterpart, so owned and aliased
    /// views carry 1; external storage is never released. Fork/duplicate
    /// tasks arm their aliasing readers at execution time, which keeps the
    /// arithmetic correct even when consumers join in a later round.
    pub count: u32,
    pub attribute: FifoAttribute,
}

impl Fifo {
    pub fn empty() -> Fifo {
        Fifo {
            virtual_address: 0,
            offset: 0,
            size: 0,
            count: 0,
            attribute: FifoAttribute::ReadWriteOwn,
        }
    }
}

/// External buffers registered by the host live above this address.
pub const EXTERNAL_BASE: u64 = 1 << 62;
/// Persistent-delay storage lives above this address and survives
/// iterations.
pub const PERSISTENT_BASE: u64 = 1 << 61;

/// Per-edge descriptors of one iteration's SR graph.
#[derive(Debug, Default)]
pub struct FifoPlan {
    fifos: HashMap<usize, Fifo>,
}

impl FifoPlan {
    pub fn new() -> FifoPlan {
        FifoPlan::default()
    }

    pub fn get(&self, edge: EdgeId) -> Option<Fifo> {
        self.fifos.get(&edge.0).copied()
    }

    pub fn contains(&self, edge: EdgeId) -> bool {
        self.fifos.contains_key(&edge.0)
    }
}

/// Virtual-address allocator; addresses advance monotonically so they
/// stay unique across the scheduling rounds of one iteration.
#[derive(Debug)]
pub struct FifoAllocator {
    next_address: u64,
}

impl Default for FifoAllocator {
    fn default() -> Self {
        FifoAllocator { next_address: 1 }
    }
}

impl FifoAllocator {
    pub fn new() -> FifoAllocator {
        FifoAllocator::default()
    }

    /// Assign a descriptor to every edge that does not have one yet.
    pub fn allocate(&mut self, srdag: &Graph, plan: &mut FifoPlan) {
        for edge_id in srdag.edge_ids() {
            self.fifo_for(srdag, plan, edge_id);
        }
    }

    fn fifo_for(&mut self, srdag: &Graph, plan: &mut FifoPlan, edge_id: EdgeId) -> Fifo {
        if let Some(fifo) = plan.get(edge_id) {
            return fifo;
        }
        let edge = srdag.edge(edge_id);
        let source = srdag.vertex(edge.source);
        let sink = srdag.vertex(edge.sink);
        let size = edge.source_rate.value().unwrap_or(0).max(0) as u32;

        let fifo = if let (VertexKind::ExternInputInterface, Some(buffer)) =
            (source.kind, source.external_buffer)
        {
            Fifo {
                virtual_address: EXTERNAL_BASE + buffer as u64,
                offset: 0,
                size,
                count: 0,
                attribute: FifoAttribute::ReadWriteExternal,
            }
        } else if let (VertexKind::ExternOutputInterface, Some(buffer)) =
            (sink.kind, sink.external_buffer)
        {
            Fifo {
                virtual_address: EXTERNAL_BASE + buffer as u64,
                offset: 0,
                size,
                count: 0,
                attribute: FifoAttribute::ReadWriteExternal,
            }
        } else if matches!(source.kind, VertexKind::Fork | VertexKind::Duplicate) {
            // Alias the fork's input buffer at the accumulated offset; a
            // duplicate aliases at offset zero for every output.
            let input_edge = source.inputs[0].expect("fork input connected");
            let input = self.fifo_for(srdag, plan, input_edge);
            let offset = if source.kind == VertexKind::Fork {
                let mut acc = 0u32;
                for prior in source.outputs.iter().flatten() {
                    if *prior == edge_id {
                        break;
                    }
                    acc += srdag.edge(*prior).source_rate.value().unwrap_or(0).max(0) as u32;
                }
                acc
            } else {
                0
            };
            Fifo {
                virtual_address: input.virtual_address,
                offset: input.offset + offset,
                size,
                count: 1,
                attribute: FifoAttribute::ReadOnly,
            }
        } else {
            let address = self.next_address;
            self.next_address += u64::from(size.max(1));
            Fifo {
                virtual_address: address,
                offset: 0,
                size,
                count: 1,
                attribute: FifoAttribute::ReadWriteOwn,
            }
        };
        plan.fifos.insert(edge_id.0, fifo);
        fifo
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expression;
    use crate::pisdf::Edge;

    fn edge(src: crate::pisdf::VertexId, sp: usize, rate: i64, snk: crate::pisdf::VertexId, kp: usize) -> Edge {
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
    fn direct_edges_get_fresh_owned_buffers() {
        let mut g = Graph::new("srdag");
        let a = g.add_vertex("a", VertexKind::Normal, 0, 2).unwrap();
        let b = g.add_vertex("b", VertexKind::Normal, 1, 0).unwrap();
        let c = g.add_vertex("c", VertexKind::Normal, 1, 0).unwrap();
        let e0 = g.add_edge(edge(a, 0, 8, b, 0)).unwrap();
        let e1 = g.add_edge(edge(a, 1, 4, c, 0)).unwrap();

        let mut plan = FifoPlan::new();
        FifoAllocator::new().allocate(&g, &mut plan);
        let f0 = plan.get(e0).unwrap();
        let f1 = plan.get(e1).unwrap();
        assert_eq!(f0.attribute, FifoAttribute::ReadWriteOwn);
        assert_eq!(f0.size, 8);
        assert_eq!(f0.count, 1);
        assert_ne!(f0.virtual_address, f1.virtual_address);
    }

    #[test]
    fn fork_outputs_alias_the_input_buffer() {
        let mut g = Graph::new("srdag");
        let a = g.add_vertex("a", VertexKind::Normal, 0, 1).unwrap();
        let fork = g.add_vertex("f", VertexKind::Fork, 1, 2).unwrap();
        let b = g.add_vertex("b", VertexKind::Normal, 1, 0).unwrap();
        let c = g.add_vertex("c", VertexKind::Normal, 1, 0).unwrap();
        let into = g.add_edge(edge(a, 0, 6, fork, 0)).unwrap();
        let out0 = g.add_edge(edge(fork, 0, 2, b, 0)).unwrap();
        let out1 = g.add_edge(edge(fork, 1, 4, c, 0)).unwrap();

        let mut plan = FifoPlan::new();
        FifoAllocator::new().allocate(&g, &mut plan);
        let f_in = plan.get(into).unwrap();
        let f0 = plan.get(out0).unwrap();
        let f1 = plan.get(out1).unwrap();
        assert_eq!(f_in.count, 1);
        assert_eq!(f0.attribute, FifoAttribute::ReadOnly);
        assert_eq!(f0.virtual_address, f_in.virtual_address);
        assert_eq!((f0.offset, f1.offset), (0, 2));
        assert_eq!(f1.size, 4);
    }

    #[test]
    fn external_interfaces_keep_registered_buffers() {
        let mut g = Graph::new("srdag");
        let src = g
            .add_vertex("ext_in", VertexKind::ExternInputInterface, 0, 1)
            .unwrap();
        g.vertex_mut(src).external_buffer = Some(2);
        let b = g.add_vertex("b", VertexKind::Normal, 1, 0).unwrap();
        let e = g.add_edge(edge(src, 0, 4, b, 0)).unwrap();

        let mut plan = FifoPlan::new();
        FifoAllocator::new().allocate(&g, &mut plan);
        let fifo = plan.get(e).unwrap();
        assert_eq!(fifo.attribute, FifoAttribute::ReadWriteExternal);
        assert_eq!(fifo.virtual_address, EXTERNAL_BASE + 2);
    }

    #[test]
    fn allocation_is_incremental_across_rounds() {
        let mut g = Graph::new("srdag");
        let a = g.add_vertex("a", VertexKind::Normal, 0, 1).unwrap();
        let b = g.add_vertex("b", VertexKind::Normal, 1, 1).unwrap();
        let e0 = g.add_edge(edge(a, 0, 2, b, 0)).unwrap();

        let mut plan = FifoPlan::new();
        let mut allocator = FifoAllocator::new();
        allocator.allocate(&g, &mut plan);
        let before = plan.get(e0).unwrap();

        let c = g.add_vertex("c", VertexKind::Normal, 1, 0).unwrap();
        let e1 = g.add_edge(edge(b, 0, 2, c, 0)).unwrap();
        allocator.allocate(&g, &mut plan);
        // The first edge keeps its address; the new one gets a fresh one.
        assert_eq!(plan.get(e0).unwrap(), before);
        assert_ne!(plan.get(e1).unwrap().virtual_address, before.virtual_address);
    }
}

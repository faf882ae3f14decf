// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Vertices of a PiSDF graph.
//!
//! The deep vertex hierarchy of classical PiSDF models is flattened into a
//! single record plus a subtype tag; per-subtype constraints (fixed port
//! counts, locked repetition values) are enforced at construction through
//! [`VertexKind`] queries.

use crate::errors::ConstructionError;
use crate::pisdf::param::ParamId;

/// Index of a vertex within its owning graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexId(pub usize);

/// Index of an edge within its owning graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeId(pub usize);

/// Subtype tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexKind {
    Normal,
    Config,
    Fork,
    Join,
    Head,
    Tail,
    Duplicate,
    Repeat,
    Init,
    End,
    Delay,
    Graph,
    InputInterface,
    OutputInterface,
    ExternInputInterface,
    ExternOutputInterface,
}

impl VertexKind {
    /// Input edge count forced by the subtype, if any.
    pub fn fixed_input_count(self) -> Option<usize> {
        use VertexKind::*;
        match self {
            Fork | Duplicate | Repeat | Delay | End => Some(1),
            Init | InputInterface | ExternInputInterface => Some(0),
            OutputInterface | ExternOutputInterface => Some(1),
            _ => None,
        }
    }

    /// Output edge count forced by the subtype, if any.
    pub fn fixed_output_count(self) -> Option<usize> {
        use VertexKind::*;
        match self {
            Join | Head | Tail | Repeat | Delay => Some(1),
            End | OutputInterface | ExternOutputInterface => Some(0),
            Init | InputInterface | ExternInputInterface => Some(1),
            _ => None,
        }
    }

    /// Subtypes whose repetition value is pinned to 1.
    pub fn locked_repetition(self) -> bool {
        use VertexKind::*;
        matches!(
            self,
            Config
                | Delay
                | InputInterface
                | OutputInterface
                | ExternInputInterface
                | ExternOutputInterface
        )
    }

    pub fn is_interface(self) -> bool {
        use VertexKind::*;
        matches!(
            self,
            InputInterface | OutputInterface | ExternInputInterface | ExternOutputInterface
        )
    }

    pub fn is_input_interface(self) -> bool {
        matches!(self, VertexKind::InputInterface | VertexKind::ExternInputInterface)
    }

    pub fn is_output_interface(self) -> bool {
        matches!(self, VertexKind::OutputInterface | VertexKind::ExternOutputInterface)
    }

    /// Glue vertices synthesized by the single-rate transformation.
    pub fn is_glue(self) -> bool {
        use VertexKind::*;
        matches!(self, Fork | Join | Head | Tail | Duplicate | Repeat | Init | End)
    }

    /// Only configuration actors own output parameters.
    pub fn may_own_output_params(self) -> bool {
        matches!(self, VertexKind::Config)
    }
}

/// Reference from a single-rate clone back to its PiSDF prototype.
///
/// `path` is the chain of subgraph indices from the root graph; `vertex`
/// the prototype's index inside that graph. Kept as plain indices so the
/// single-rate graph never owns its prototypes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoRef {
    pub path: Vec<usize>,
    pub vertex: VertexId,
}

/// One vertex record; see [`VertexKind`] for subtype semantics.
#[derive(Debug, Clone)]
pub struct Vertex {
    pub name: String,
    pub kind: VertexKind,
    pub ix: VertexId,
    /// One slot per input port; `None` until an edge connects.
    pub inputs: Vec<Option<EdgeId>>,
    /// One slot per output port.
    pub outputs: Vec<Option<EdgeId>>,
    pub input_params: Vec<ParamId>,
    pub refinement_params: Vec<ParamId>,
    /// Dynamic parameters written by this vertex; config actors only.
    pub output_params: Vec<ParamId>,
    /// Refinement parameter values frozen at single-rate cloning time.
    pub resolved_params: Vec<i64>,
    /// Repetition value, recomputed by the BRV solver; defaults to 1.
    pub rv: u32,
    /// Prototype reference for single-rate clones; `None` for prototypes.
    pub reference: Option<ProtoRef>,
    /// Clone ordinal among its prototype's firings.
    pub instance: u32,
    /// For `Graph` vertices: index into the owning graph's subgraph table.
    pub subgraph: Option<usize>,
    /// Kernel registered for this actor, if any.
    pub kernel_ix: Option<usize>,
    /// Index of the schedule task once dispatched; peephole rules skip
    /// vertices that already have one.
    pub schedule_task_ix: Option<usize>,
    /// Restriction of the mappable PE set; `None` means every PE.
    pub mappable_pes: Option<Vec<usize>>,
    /// Init/End bookkeeping for delays.
    pub delay_info: Option<DelayInfo>,
    /// Registered buffer index for external interfaces.
    pub external_buffer: Option<usize>,
}

/// Persistence bookkeeping carried by `Init`/`End` single-rate vertices.
#[derive(Debug, Clone, PartialEq)]
pub struct DelayInfo {
    pub persistent: bool,
    /// Stable identifier of the persistent backing store; assigned in
    /// first-creation order and reused across iterations.
    pub memory_address: Option<u64>,
    /// Token count of the delay.
    pub value: i64,
}

impl Vertex {
    pub fn new(
        name: &str,
        kind: VertexKind,
        ix: VertexId,
        input_count: usize,
        output_count: usize,
    ) -> Result<Vertex, ConstructionError> {
        if let Some(fixed) = kind.fixed_input_count() {
            if input_count != fixed {
                return Err(ConstructionError::FixedPortCount {
                    name: name.to_string(),
                    kind,
                    expected: fixed,
                    direction: "input",
                });
            }
        }
        if let Some(fixed) = kind.fixed_output_count() {
            if output_count != fixed {
                return Err(ConstructionError::FixedPortCount {
                    name: name.to_string(),
                    kind,
                    expected: fixed,
                    direction: "output",
                });
            }
        }
        Ok(Vertex {
            name: name.to_string(),
            kind,
            ix,
            inputs: vec![None; input_count],
            outputs: vec![None; output_count],
            input_params: Vec::new(),
            refinement_params: Vec::new(),
            output_params: Vec::new(),
            resolved_params: Vec::new(),
            rv: 1,
            reference: None,
            instance: 0,
            subgraph: None,
            kernel_ix: None,
            schedule_task_ix: None,
            mappable_pes: None,
            delay_info: None,
            external_buffer: None,
        })
    }

    /// Tag-checked downcast: succeeds only when the subtype matches.
    pub fn check_kind(&self, expected: VertexKind) -> Result<&Vertex, ConstructionError> {
        if self.kind == expected {
            Ok(self)
        } else {
            Err(ConstructionError::SubtypeMismatch {
                name: self.name.clone(),
                expected,
                actual: self.kind,
            })
        }
    }

    /// Number of connected input edges.
    pub fn connected_inputs(&self) -> usize {
        self.inputs.iter().filter(|slot| slot.is_some()).count()
    }

    /// Number of connected output edges.
    pub fn connected_outputs(&self) -> usize {
        self.outputs.iter().filter(|slot| slot.is_some()).count()
    }

    /// Initialize a clone from its prototype: parameter vectors, kernel
    /// binding and back-reference.
    pub fn set_as_reference(&mut self, proto: &Vertex, proto_ref: ProtoRef, instance: u32) {
        self.input_params = proto.input_params.clone();
        self.refinement_params = proto.refinement_params.clone();
        self.output_params = proto.output_params.clone();
        self.kernel_ix = proto.kernel_ix;
        self.mappable_pes = proto.mappable_pes.clone();
        self.external_buffer = proto.external_buffer;
        self.reference = Some(proto_ref);
        self.instance = instance;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fork_requires_exactly_one_input() {
        assert!(Vertex::new("f", VertexKind::Fork, VertexId(0), 1, 4).is_ok());
        assert!(Vertex::new("f", VertexKind::Fork, VertexId(0), 2, 4).is_err());
    }

    #[test]
    fn init_has_no_input_end_has_no_output() {
        assert!(Vertex::new("i", VertexKind::Init, VertexId(0), 0, 1).is_ok());
        assert!(Vertex::new("i", VertexKind::Init, VertexId(0), 1, 1).is_err());
        assert!(Vertex::new("e", VertexKind::End, VertexId(0), 1, 0).is_ok());
        assert!(Vertex::new("e", VertexKind::End, VertexId(0), 1, 1).is_err());
    }

    #[test]
    fn repetition_locked_kinds() {
        assert!(VertexKind::Config.locked_repetition());
        assert!(VertexKind::Delay.locked_repetition());
        assert!(VertexKind::ExternInputInterface.locked_repetition());
        assert!(!VertexKind::Normal.locked_repetition());
        assert!(!VertexKind::Fork.locked_repetition());
    }

    #[test]
    fn kind_checked_downcast() {
        let vertex = Vertex::new("v", VertexKind::Normal, VertexId(3), 1, 1).expect("vertex");
        assert!(vertex.check_kind(VertexKind::Normal).is_ok());
        let err = vertex.check_kind(VertexKind::Config).unwrap_err();
        assert!(matches!(err, ConstructionError::SubtypeMismatch { .. }));
    }
}

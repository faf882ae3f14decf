// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Schedule tasks and their job-message form.
//!
//! A task is either one single-rate vertex firing or a synchronization
//! stub inserted between runners. Input parameter arrays follow the glue
//! kernels' conventions (see `runtime::kernel`).

use crate::pisdf::{Graph, VertexId, VertexKind};
use crate::runtime::kernel::BuiltinKernels;
use crate::runtime::message::{JobConstraint, JobMessage};
use crate::scheduling::fifo::{Fifo, FifoAttribute, FifoPlan, PERSISTENT_BASE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Vertex,
    SyncSend,
    SyncReceive,
}

/// Lifecycle of a task inside the master loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    NotSchedulable,
    NotRunnable,
    Skipped,
    Pending,
    Ready,
    Running,
}

/// One entry of the schedule timeline.
#[derive(Debug, Clone)]
pub struct ScheduleTask {
    pub task_type: TaskType,
    /// Backing single-rate vertex; `None` for sync stubs.
    pub vertex: Option<VertexId>,
    pub name: String,
    pub mapped_pe: usize,
    pub start_time: u64,
    pub end_time: u64,
    /// Job stamp on the mapped runner.
    pub job_ix: usize,
    /// Per-runner constraint: greatest job stamp to await, `-1` for none.
    pub execution_constraints: Vec<i64>,
    /// Per-runner flag: publish this task's stamp there.
    pub notification_flags: Vec<bool>,
    pub state: TaskState,
    pub kernel_ix: usize,
    pub input_params: Vec<i64>,
    pub output_param_count: usize,
    pub input_fifos: Vec<Fifo>,
    pub output_fifos: Vec<Fifo>,
    /// Whether the job message already went out to its runner.
    pub dispatched: bool,
}

impl ScheduleTask {
    pub fn new(task_type: TaskType, lrt_count: usize) -> ScheduleTask {
        ScheduleTask {
            task_type,
            vertex: None,
            name: String::new(),
            mapped_pe: 0,
            start_time: 0,
            end_time: 0,
            job_ix: 0,
            execution_constraints: vec![-1; lrt_count],
            notification_flags: vec![false; lrt_count],
            state: TaskState::Pending,
            kernel_ix: 0,
            input_params: Vec::new(),
            output_param_count: 0,
            input_fifos: Vec::new(),
            output_fifos: Vec::new(),
            dispatched: false,
        }
    }

    /// Wire form pushed to the runner.
    pub fn create_job_message(&self) -> JobMessage {
        let constraints = self
            .execution_constraints
            .iter()
            .enumerate()
            .filter_map(|(lrt, &job)| {
                (job >= 0).then_some(JobConstraint {
                    lrt,
                    job: job as usize,
                })
            })
            .collect();
        JobMessage {
            kernel_ix: self.kernel_ix,
            name: self.name.clone(),
            vertex_ix: self.vertex.map(|v| v.0),
            job_ix: self.job_ix,
            input_params: self.input_params.clone(),
            output_param_count: self.output_param_count,
            input_fifos: self.input_fifos.clone(),
            output_fifos: self.output_fifos.clone(),
            constraints,
            notification_flags: self.notification_flags.clone(),
        }
    }
}

/// Fill a vertex task's kernel binding, parameter array and FIFOs from
/// the single-rate graph and the allocation plan.
pub fn populate_vertex_task(
    task: &mut ScheduleTask,
    srdag: &Graph,
    vertex_id: VertexId,
    plan: &FifoPlan,
    builtin: &BuiltinKernels,
) {
    let vertex = srdag.vertex(vertex_id);
    task.vertex = Some(vertex_id);
    task.name = vertex.name.clone();
    task.output_param_count = vertex.output_params.len();

    task.input_fifos = vertex
        .inputs
        .iter()
        .flatten()
        .map(|&edge| plan.get(edge).unwrap_or_else(Fifo::empty))
        .collect();
    task.output_fifos = vertex
        .outputs
        .iter()
        .flatten()
        .map(|&edge| plan.get(edge).unwrap_or_else(Fifo::empty))
        .collect();

    let in_rate = |port: usize| -> i64 {
        vertex.inputs[port]
            .map(|edge| srdag.edge(edge).sink_rate.value().unwrap_or(0))
            .unwrap_or(0)
    };
    let out_rate = |port: usize| -> i64 {
        vertex.outputs[port]
            .map(|edge| srdag.edge(edge).source_rate.value().unwrap_or(0))
            .unwrap_or(0)
    };

    task.kernel_ix = match vertex.kind {
        VertexKind::Normal | VertexKind::Config => vertex.kernel_ix.unwrap_or(usize::MAX),
        kind => builtin.for_kind(kind),
    };

    task.input_params = match vertex.kind {
        VertexKind::Normal | VertexKind::Config => vertex.resolved_params.clone(),
        VertexKind::Fork => {
            let mut params = vec![in_rate(0), vertex.outputs.len() as i64];
            params.extend((0..vertex.outputs.len()).map(&out_rate));
            params
        }
        VertexKind::Join => {
            let mut params = vec![out_rate(0), vertex.inputs.len() as i64];
            params.extend((0..vertex.inputs.len()).map(&in_rate));
            params
        }
        VertexKind::Repeat => vec![in_rate(0), out_rate(0)],
        VertexKind::Duplicate => vec![vertex.outputs.len() as i64, in_rate(0)],
        VertexKind::Head => {
            let mut params = vec![vertex.outputs.len() as i64, in_rate(0)];
            params.extend((0..vertex.outputs.len()).map(&out_rate));
            params
        }
        VertexKind::Tail => {
            let mut params = vec![vertex.inputs.len() as i64, out_rate(0)];
            params.extend((0..vertex.inputs.len()).map(&in_rate));
            params
        }
        VertexKind::Init | VertexKind::End => {
            let info = vertex.delay_info.as_ref();
            let persistent = info.map(|i| i.persistent).unwrap_or(false);
            let value = info.map(|i| i.value).unwrap_or(0);
            let address = info
                .and_then(|i| i.memory_address)
                .map(|a| a as i64)
                .unwrap_or(-1);
            // Persistent delays read from / write back to their stable
            // storage region through an extra FIFO.
            if persistent {
                let storage = Fifo {
                    virtual_address: PERSISTENT_BASE + address as u64,
                    offset: 0,
                    size: value.max(0) as u32,
                    count: 0,
                    attribute: FifoAttribute::ReadWriteExternal,
                };
                if vertex.kind == VertexKind::Init {
                    task.input_fifos.push(storage);
                } else {
                    task.output_fifos.push(storage);
                }
            }
            vec![i64::from(persistent), value, address]
        }
        _ => Vec::new(),
    };
}

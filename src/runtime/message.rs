// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Messages exchanged between the master loop and the runners.

use crate::scheduling::Fifo;

/// Cross-runner ordering constraint: wait until `lrt` has published a job
/// stamp of at least `job`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobConstraint {
    pub lrt: usize,
    pub job: usize,
}

/// Everything a runner needs to execute one task.
#[derive(Debug, Clone)]
pub struct JobMessage {
    pub kernel_ix: usize,
    /// Task name, for traces and diagnostics.
    pub name: String,
    /// Single-rate vertex index, or `None` for send/receive stubs.
    pub vertex_ix: Option<usize>,
    /// Job stamp on the executing runner.
    pub job_ix: usize,
    pub input_params: Vec<i64>,
    pub output_param_count: usize,
    pub input_fifos: Vec<Fifo>,
    pub output_fifos: Vec<Fifo>,
    pub constraints: Vec<JobConstraint>,
    /// One flag per runner: publish this job's stamp there on completion.
    pub notification_flags: Vec<bool>,
}

/// Execution trace record for the Gantt export.
#[derive(Debug, Clone)]
pub struct TraceMessage {
    pub runner: usize,
    pub name: String,
    pub start: u64,
    pub end: u64,
}

/// Notification protocol. Master-only kinds received by a runner are
/// logged and dropped, and vice versa.
#[derive(Debug, Clone)]
pub enum Notification {
    StartIteration,
    EndIteration,
    ClearIteration,
    ResetIteration,
    /// Runner -> master: queue drained for this iteration.
    FinishedIteration { runner: usize },
    RepeatEnable,
    RepeatDisable,
    Stop,
    Pause,
    Resume,
    TraceEnable,
    TraceDisable,
    AddJob(Box<JobMessage>),
    ClearJobQueue,
    /// Send the local job stamp to every other runner now.
    BroadcastJobStamp,
    /// Defer the broadcast until the iteration's last job finishes.
    DelayedBroadcast,
    UpdateJobStamp { lrt: usize, job: usize },
    /// Runner -> master: a config actor produced its output parameters.
    ParamValue { vertex_ix: usize, values: Vec<i64> },
    /// Runner -> master: trace record.
    Trace(TraceMessage),
    /// Runner -> master: unrecoverable fault; terminates the runtime.
    RunnerFault { runner: usize, message: String },
}

impl Notification {
    /// Short name used when logging unhandled notifications.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Notification::StartIteration => "StartIteration",
            Notification::EndIteration => "EndIteration",
            Notification::ClearIteration => "ClearIteration",
            Notification::ResetIteration => "ResetIteration",
            Notification::FinishedIteration { .. } => "FinishedIteration",
            Notification::RepeatEnable => "RepeatEnable",
            Notification::RepeatDisable => "RepeatDisable",
            Notification::Stop => "Stop",
            Notification::Pause => "Pause",
            Notification::Resume => "Resume",
            Notification::TraceEnable => "TraceEnable",
            Notification::TraceDisable => "TraceDisable",
            Notification::AddJob(_) => "AddJob",
            Notification::ClearJobQueue => "ClearJobQueue",
            Notification::BroadcastJobStamp => "BroadcastJobStamp",
            Notification::DelayedBroadcast => "DelayedBroadcast",
            Notification::UpdateJobStamp { .. } => "UpdateJobStamp",
            Notification::ParamValue { .. } => "ParamValue",
            Notification::Trace(_) => "Trace",
            Notification::RunnerFault { .. } => "RunnerFault",
        }
    }
}

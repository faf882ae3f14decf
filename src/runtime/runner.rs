// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-PE cooperative runner.
//!
//! A runner owns its notification queue and a FIFO job queue. It blocks
//! only on the queue pop; jobs execute synchronously once their
//! cross-runner constraints are met through the locally cached job stamps
//! of the other runners.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

use crate::observability::messages::runner::{
    IterationFinished, JobCompleted, UnhandledNotification,
};
use crate::observability::messages::StructuredLog;
use crate::runtime::message::{JobMessage, Notification, TraceMessage};
use crate::runtime::platform::Platform;
use crate::scheduling::fifo::FifoAttribute;

/// Outcome of one notification.
enum Handled {
    /// Keep draining the queue.
    Continue,
    /// The notification was requeued; stop draining and run jobs first.
    Requeued,
}

pub struct JitRunner {
    ix: usize,
    platform: Arc<Platform>,
    receiver: UnboundedReceiver<Notification>,
    job_queue: Vec<JobMessage>,
    queue_pos: usize,
    job_count: usize,
    /// Last published job stamp per runner; `None` until first publish.
    local_job_stamps: Vec<Option<usize>>,
    last_job_stamp: Option<usize>,
    start: bool,
    finished: bool,
    received_end: bool,
    repeat: bool,
    stop: bool,
    pause: bool,
    trace: bool,
    should_broadcast: bool,
}

impl JitRunner {
    pub fn new(
        ix: usize,
        platform: Arc<Platform>,
        receiver: UnboundedReceiver<Notification>,
    ) -> JitRunner {
        let lrt_count = platform.lrt_count();
        JitRunner {
            ix,
            platform,
            receiver,
            job_queue: Vec::new(),
            queue_pos: 0,
            job_count: 0,
            local_job_stamps: vec![None; lrt_count],
            last_job_stamp: None,
            start: false,
            finished: true,
            received_end: false,
            repeat: false,
            stop: false,
            pause: false,
            trace: false,
            should_broadcast: false,
        }
    }

    /// Cooperative loop; returns when `Stop` arrives or every sender is
    /// gone.
    pub async fn run(mut self) {
        let mut wait_for_job = false;
        loop {
            // Drain notifications; block when idle, paused or stuck on a
            // constraint.
            let mut blocking = self.finished || wait_for_job || self.pause;
            loop {
                let notification = if blocking {
                    debug!(runner = self.ix, "waiting for notification");
                    match self.receiver.recv().await {
                        Some(n) => n,
                        None => return,
                    }
                } else {
                    match self.receiver.try_recv() {
                        Ok(n) => n,
                        Err(_) => break,
                    }
                };
                match self.handle(notification) {
                    Handled::Continue => {}
                    Handled::Requeued => break,
                }
                if self.stop {
                    debug!(runner = self.ix, "received stop notification");
                    return;
                }
                blocking = self.pause;
            }
            wait_for_job = false;

            if self.start && self.queue_pos < self.job_queue.len() {
                let job = self.job_queue[self.queue_pos].clone();
                match self.is_job_runnable(&job) {
                    Ok(true) => {
                        if let Err(err) = self.run_job(&job) {
                            self.platform.send_master(Notification::RunnerFault {
                                runner: self.ix,
                                message: err,
                            });
                            return;
                        }
                        self.last_job_stamp = Some(job.job_ix);
                        self.queue_pos += 1;
                        JobCompleted {
                            runner: self.ix,
                            job: job.job_ix,
                            total: self.job_count,
                        }
                        .log();
                    }
                    Ok(false) => wait_for_job = true,
                    Err(message) => {
                        self.platform
                            .send_master(Notification::RunnerFault { runner: self.ix, message });
                        return;
                    }
                }
            }

            let finished_iteration = self.received_end && self.queue_pos == self.job_count;
            if finished_iteration {
                if self.should_broadcast {
                    self.should_broadcast = false;
                    self.broadcast_job_stamp();
                }
                self.platform
                    .send_master(Notification::FinishedIteration { runner: self.ix });
                IterationFinished {
                    runner: self.ix,
                    jobs_done: self.queue_pos,
                }
                .log();
                if !self.repeat {
                    self.job_queue.clear();
                    self.queue_pos = 0;
                }
                self.finished = true;
                self.start = false;
                self.received_end = false;
            }
        }
    }

    fn handle(&mut self, notification: Notification) -> Handled {
        match notification {
            Notification::StartIteration => {
                if self.finished {
                    self.start = true;
                    self.finished = false;
                    self.job_count = 0;
                    self.queue_pos = 0;
                } else {
                    // Next round arrived early; put it back and finish the
                    // current queue first.
                    let _ = self.platform.send_to(self.ix, Notification::StartIteration);
                    return Handled::Requeued;
                }
            }
            Notification::EndIteration => {
                self.received_end = true;
                self.job_count = self.job_queue.len();
            }
            Notification::ClearIteration => self.clear(),
            Notification::ResetIteration => self.reset(),
            Notification::RepeatEnable => self.repeat = true,
            Notification::RepeatDisable => self.repeat = false,
            Notification::Stop => self.stop = true,
            Notification::Pause => self.pause = true,
            Notification::Resume => self.pause = false,
            Notification::TraceEnable => self.trace = true,
            Notification::TraceDisable => self.trace = false,
            Notification::AddJob(job) => {
                if self.start {
                    self.job_queue.push(*job);
                }
            }
            Notification::ClearJobQueue => {
                self.job_queue.clear();
                self.queue_pos = 0;
                self.job_count = 0;
            }
            Notification::BroadcastJobStamp => self.broadcast_job_stamp(),
            Notification::DelayedBroadcast => self.should_broadcast = true,
            Notification::UpdateJobStamp { lrt, job } => self.update_job_stamp(lrt, job),
            other => {
                UnhandledNotification {
                    runner: self.ix,
                    kind: other.kind_name(),
                }
                .log();
            }
        }
        Handled::Continue
    }

    fn update_job_stamp(&mut self, lrt: usize, job: usize) {
        if let Some(slot) = self.local_job_stamps.get_mut(lrt) {
            if slot.map(|current| current < job).unwrap_or(true) {
                *slot = Some(job);
                debug!(runner = self.ix, from = lrt, stamp = job, "updated local job stamp");
            }
        }
    }

    fn broadcast_job_stamp(&self) {
        if let Some(stamp) = self.last_job_stamp {
            self.platform.broadcast_from(
                self.ix,
                &Notification::UpdateJobStamp {
                    lrt: self.ix,
                    job: stamp,
                },
            );
        }
    }

    /// A job is runnable once every constrained runner has published a
    /// stamp at least as large as required. A constraint on this runner's
    /// own future is unsatisfiable and reported as an error.
    fn is_job_runnable(&self, job: &JobMessage) -> Result<bool, String> {
        for constraint in &job.constraints {
            let stamp = self
                .local_job_stamps
                .get(constraint.lrt)
                .copied()
                .flatten();
            let satisfied = stamp.map(|s| s >= constraint.job).unwrap_or(false);
            if !satisfied {
                if constraint.lrt == self.ix {
                    return Err(format!(
                        "runner #{} has a constraint on its own future job {}",
                        self.ix, constraint.job
                    ));
                }
                debug!(
                    runner = self.ix,
                    waiting_on = constraint.lrt,
                    job = constraint.job,
                    "job not runnable yet"
                );
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn run_job(&mut self, job: &JobMessage) -> Result<(), String> {
        let start_time = self.platform.now();

        // Input buffers by FIFO attribute; output buffers staged locally
        // and written back after the kernel returns.
        let mut inputs: Vec<Vec<u8>> = Vec::with_capacity(job.input_fifos.len());
        for fifo in &job.input_fifos {
            inputs.push(
                self.platform
                    .read_fifo(self.ix, fifo)
                    .map_err(|err| err.to_string())?,
            );
        }
        let mut outputs: Vec<Vec<u8>> = job
            .output_fifos
            .iter()
            .map(|fifo| {
                self.platform.allocate_output(fifo);
                vec![0; fifo.size as usize]
            })
            .collect();
        let mut output_params = vec![0i64; job.output_param_count];

        let kernel = self
            .platform
            .kernels
            .get(job.kernel_ix)
            .ok_or_else(|| format!("no kernel registered at index {}", job.kernel_ix))?;
        let invocation = catch_unwind(AssertUnwindSafe(|| {
            kernel(&job.input_params, &mut output_params, &inputs, &mut outputs);
        }));
        if invocation.is_err() {
            return Err(format!("kernel {} panicked", job.kernel_ix));
        }

        for (fifo, data) in job.output_fifos.iter().zip(&outputs) {
            if fifo.attribute != FifoAttribute::ReadOnly {
                self.platform
                    .write_fifo(self.ix, fifo, data)
                    .map_err(|err| err.to_string())?;
            }
        }
        // Read-only outputs alias an input buffer; arm one release per
        // aliasing reader before dropping this task's own claim so the
        // region outlives the handoff.
        for fifo in &job.output_fifos {
            if fifo.attribute == FifoAttribute::ReadOnly
                && fifo.virtual_address < crate::scheduling::fifo::PERSISTENT_BASE
            {
                self.platform.memory.add_releases(fifo.virtual_address, 1);
            }
        }
        // Last-reader deallocation of the inputs.
        for fifo in &job.input_fifos {
            self.platform.release_input(fifo);
        }

        // Publish this job's stamp wherever a later job waits on it.
        self.update_job_stamp(self.ix, job.job_ix);
        for (lrt, &flagged) in job.notification_flags.iter().enumerate() {
            if flagged && lrt != self.ix {
                let _ = self.platform.send_to(
                    lrt,
                    Notification::UpdateJobStamp {
                        lrt: self.ix,
                        job: job.job_ix,
                    },
                );
            }
        }

        if job.output_param_count > 0 {
            if let Some(vertex_ix) = job.vertex_ix {
                self.platform.send_master(Notification::ParamValue {
                    vertex_ix,
                    values: output_params,
                });
            }
        }

        if self.trace {
            self.platform.send_master(Notification::Trace(TraceMessage {
                runner: self.ix,
                name: job.name.clone(),
                start: start_time,
                end: self.platform.now(),
            }));
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.local_job_stamps = vec![None; self.platform.lrt_count()];
        self.job_queue.clear();
        self.queue_pos = 0;
        self.job_count = 0;
        self.last_job_stamp = None;
        self.should_broadcast = false;
        self.start = false;
        self.received_end = false;
        self.finished = true;
    }

    fn reset(&mut self) {
        self.job_count = 0;
        self.queue_pos = 0;
        self.last_job_stamp = None;
        self.should_broadcast = false;
        self.start = false;
        self.received_end = false;
        self.finished = true;
    }
}

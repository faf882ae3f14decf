// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Just-in-time master-slave runtime loop.
//!
//! One application iteration interleaves transformation, optimization,
//! FIFO allocation, scheduling and dispatch: ready jobs are flattened
//! into the accumulating single-rate graph, the new tasks go out to the
//! runners, and configuration actors feed parameter values back so that
//! pending dynamic subgraphs can join the next round. The iteration ends
//! when no pending work remains.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::config::{RuntimeConfig, TraceFormat};
use crate::errors::{RuntimeError, SpindleError, TransfoError};
use crate::observability::messages::schedule::{JobsDispatched, ScheduleComputed};
use crate::observability::messages::transfo::{JobTransformed, ParamValueReceived};
use crate::observability::messages::StructuredLog;
use crate::pisdf::{Graph, JobParams, PisdfApp};
use crate::runtime::kernel::KernelRegistry;
use crate::runtime::message::Notification;
use crate::runtime::platform::Platform;
use crate::runtime::runner::JitRunner;
use crate::scheduling::gantt::{self, GanttTask};
use crate::scheduling::scheduler::{make_policy, schedule_round, MappingPolicy, Schedule};
use crate::scheduling::fifo::{FifoAllocator, FifoPlan};
use crate::srdag::transform::{
    rederive_params, single_rate_transformation, snapshot_params, ParamRoute, TransfoJob,
};
use crate::srdag::optims;

/// Runtime algorithm driving one application.
#[async_trait]
pub trait Runtime {
    /// Run a single application iteration.
    async fn execute(&mut self) -> Result<(), SpindleError>;

    /// Run iterations until the provided count is exhausted.
    async fn execute_iterations(&mut self, count: usize) -> Result<(), SpindleError> {
        for _ in 0..count {
            self.execute().await?;
        }
        Ok(())
    }

    /// Run iterations until `stop` is raised.
    async fn execute_forever(
        &mut self,
        stop: Arc<std::sync::atomic::AtomicBool>,
    ) -> Result<(), SpindleError> {
        while !stop.load(std::sync::atomic::Ordering::Acquire) {
            self.execute().await?;
        }
        Ok(())
    }
}

pub struct JitmsRuntime {
    app: PisdfApp,
    platform: Arc<Platform>,
    master_rx: UnboundedReceiver<Notification>,
    runner_handles: Vec<JoinHandle<()>>,
    policy: Box<dyn MappingPolicy>,
    iteration: usize,
    traces: Vec<GanttTask>,
}

impl JitmsRuntime {
    /// Initialize the platform and spawn one runner per PE.
    pub fn start(app: PisdfApp, kernels: KernelRegistry, config: RuntimeConfig) -> JitmsRuntime {
        let policy = make_policy(config.scheduler);
        let external = app.external_buffers().to_vec();
        let (platform, receivers, master_rx) = Platform::new(config, kernels, external);
        let platform = Arc::new(platform);
        let runner_handles = receivers
            .into_iter()
            .enumerate()
            .map(|(ix, receiver)| {
                let runner = JitRunner::new(ix, Arc::clone(&platform), receiver);
                tokio::spawn(runner.run())
            })
            .collect();
        if platform.config.trace != TraceFormat::None {
            platform.broadcast(&Notification::TraceEnable);
        }
        JitmsRuntime {
            app,
            platform,
            master_rx,
            runner_handles,
            policy,
            iteration: 0,
            traces: Vec::new(),
        }
    }

    pub fn app(&self) -> &PisdfApp {
        &self.app
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Stop every runner and join them; hands the application back.
    pub async fn quit(mut self) -> PisdfApp {
        self.platform.broadcast(&Notification::Stop);
        for handle in self.runner_handles.drain(..) {
            let _ = handle.await;
        }
        for (ix, buffer) in self.app.external_buffers_mut().iter_mut().enumerate() {
            if let Some(data) = self.platform.external_buffer(ix) {
                *buffer = data;
            }
        }
        self.app
    }

    /// Apply a config actor's output values to the pending job they feed.
    fn apply_param_values(
        routes: &[ParamRoute],
        pending: &mut [TransfoJob],
        app: &PisdfApp,
        vertex_ix: usize,
        values: &[i64],
    ) {
        let Some(route) = routes.iter().find(|r| r.sr_vertex.0 == vertex_ix) else {
            warn!(vertex_ix, "parameter values from unknown config vertex");
            return;
        };
        let Some(job) = pending
            .iter_mut()
            .find(|j| j.path == route.graph_path && j.instance == route.instance)
        else {
            warn!(vertex_ix, "no pending job for parameter route");
            return;
        };
        let graph = app.root().descend(&route.graph_path);
        for (name, &value) in route.param_names.iter().zip(values) {
            job.params.set(name, value);
            ParamValueReceived {
                graph: &graph.name,
                param: name,
                value,
            }
            .log();
        }
        rederive_params(graph, &mut job.params);
    }

    fn export_gantt(&self, schedule: &Schedule) {
        let Some(path) = &self.platform.config.gantt_path else {
            return;
        };
        let tasks = if self.traces.is_empty() {
            gantt::tasks_of_schedule(schedule)
        } else {
            self.traces.clone()
        };
        let result = match self.platform.config.trace {
            TraceFormat::Xml => gantt::export_xml(&tasks, path),
            TraceFormat::Svg => gantt::export_svg(&tasks, path),
            TraceFormat::None => Ok(()),
        };
        if let Err(err) = result {
            warn!(error = %err, "gantt export failed");
        }
    }
}

#[async_trait]
impl Runtime for JitmsRuntime {
    async fn execute(&mut self) -> Result<(), SpindleError> {
        let config = self.platform.config.clone();
        let lrt_count = self.platform.lrt_count();
        let builtins = self.platform.kernels.builtins();

        let mut srdag = Graph::new(&format!("srdag-{}", self.app.root().name));
        let mut plan = FifoPlan::new();
        let mut allocator = FifoAllocator::new();
        let mut schedule = Schedule::new(lrt_count);
        let mut routes: Vec<ParamRoute> = Vec::new();
        let mut pending: Vec<TransfoJob> = Vec::new();
        self.traces.clear();

        let root_params = snapshot_params(self.app.root(), &JobParams::new());
        let mut ready: VecDeque<TransfoJob> = VecDeque::new();
        ready.push_back(TransfoJob::root(root_params));

        while !ready.is_empty() {
            // Transformation of every ready job, then the peephole pass
            // over the not-yet-dispatched part of the graph.
            while let Some(job) = ready.pop_front() {
                let result = single_rate_transformation(&mut self.app, &job, &mut srdag)?;
                JobTransformed {
                    graph: &self.app.root().descend(&job.path).name,
                    instance: job.instance,
                    ready_jobs: result.next_jobs.len(),
                    pending_jobs: result.dyna_jobs.len(),
                }
                .log();
                ready.extend(result.next_jobs);
                for dyna in result.dyna_jobs {
                    if dyna.params.is_resolved() {
                        ready.push_back(dyna);
                    } else {
                        pending.push(dyna);
                    }
                }
                routes.extend(result.param_routes);
            }
            optims::optimize(&mut srdag);

            // Allocation and mapping of the new tasks.
            allocator.allocate(&srdag, &mut plan);
            let created =
                schedule_round(self.policy.as_ref(), &mut srdag, &plan, &mut schedule, &config, &builtins)?;
            ScheduleComputed {
                scheduler: self.policy.name(),
                task_count: created.len(),
                makespan: schedule.makespan(),
            }
            .log();

            // Dispatch round: StartIteration, jobs in schedule order, the
            // deferred stamp broadcast, EndIteration.
            let mut awaited_params = 0usize;
            self.platform.broadcast(&Notification::StartIteration);
            for &task_ix in &created {
                let task = &mut schedule.tasks[task_ix];
                task.dispatched = true;
                awaited_params += usize::from(task.output_param_count > 0);
                let message = task.create_job_message();
                self.platform
                    .send_to(task.mapped_pe, Notification::AddJob(Box::new(message)))
                    .map_err(SpindleError::Runtime)?;
            }
            JobsDispatched {
                job_count: created.len(),
                runner_count: lrt_count,
            }
            .log();
            self.platform.broadcast(&Notification::DelayedBroadcast);
            self.platform.broadcast(&Notification::EndIteration);

            // Collect end-of-round notifications and parameter values.
            let mut finished: HashSet<usize> = HashSet::new();
            while finished.len() < lrt_count || awaited_params > 0 {
                let notification = self.master_rx.recv().await.ok_or_else(|| {
                    SpindleError::Runtime(RuntimeError::RunnerUnreachable(usize::MAX))
                })?;
                match notification {
                    Notification::FinishedIteration { runner } => {
                        finished.insert(runner);
                    }
                    Notification::ParamValue { vertex_ix, values } => {
                        Self::apply_param_values(
                            &routes,
                            &mut pending,
                            &self.app,
                            vertex_ix,
                            &values,
                        );
                        awaited_params = awaited_params.saturating_sub(1);
                    }
                    Notification::Trace(trace) => {
                        self.traces.push(GanttTask {
                            pe: trace.runner,
                            start: trace.start,
                            end: trace.end,
                            name: trace.name,
                            color: 0x006c_7a89,
                        });
                    }
                    Notification::RunnerFault { runner, message } => {
                        return Err(SpindleError::Runtime(RuntimeError::Fault { runner, message }));
                    }
                    other => {
                        warn!(kind = other.kind_name(), "master dropped notification");
                    }
                }
            }

            // Pending jobs whose parameters arrived enter the next round.
            let (resolved, still_pending): (Vec<_>, Vec<_>) = pending
                .drain(..)
                .partition(|job| job.params.is_resolved());
            pending = still_pending;
            ready.extend(resolved);

            if ready.is_empty() && !pending.is_empty() {
                let job = &pending[0];
                let graph = self.app.root().descend(&job.path);
                let param = job.params.unresolved().into_iter().next().unwrap_or_default();
                return Err(SpindleError::Transfo(TransfoError::UnresolvedParameter {
                    graph: graph.name.clone(),
                    param,
                }));
            }
        }

        // End of iteration: reset transient state, keep persistent delay
        // storage, export traces.
        self.export_gantt(&schedule);
        self.platform.broadcast(&Notification::ClearIteration);
        self.platform.memory.clear();
        self.app.reset_iteration();
        self.iteration += 1;
        Ok(())
    }
}

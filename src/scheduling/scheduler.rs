// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Mapping of single-rate tasks onto processing elements.
//!
//! A scheduling round picks up every vertex that is not yet scheduled and
//! not blocked behind a pending subgraph placeholder, orders it with the
//! selected policy, and places it on a PE timeline. Cross-runner data
//! edges get either send/receive barrier stubs or bare job-stamp
//! constraints, depending on the allocator strategy. The result is
//! deterministic for a given graph and platform: ties break on vertex
//! index, then PE index.

use std::collections::{HashMap, VecDeque};

use crate::config::{AllocatorType, RuntimeConfig, SchedulerType};
use crate::errors::SchedulingError;
use crate::pisdf::{Graph, VertexId, VertexKind};
use crate::runtime::kernel::BuiltinKernels;
use crate::scheduling::fifo::FifoPlan;
use crate::scheduling::task::{populate_vertex_task, ScheduleTask, TaskState, TaskType};

/// Accumulating timeline of one iteration.
#[derive(Debug)]
pub struct Schedule {
    pub tasks: Vec<ScheduleTask>,
    pub lrt_count: usize,
    lrt_job_counters: Vec<usize>,
    pe_available: Vec<u64>,
}

impl Schedule {
    pub fn new(lrt_count: usize) -> Schedule {
        Schedule {
            tasks: Vec::new(),
            lrt_count,
            lrt_job_counters: vec![0; lrt_count],
            pe_available: vec![0; lrt_count],
        }
    }

    pub fn makespan(&self) -> u64 {
        self.tasks.iter().map(|t| t.end_time).max().unwrap_or(0)
    }

    fn push_task(&mut self, mut task: ScheduleTask) -> usize {
        let pe = task.mapped_pe;
        task.job_ix = self.lrt_job_counters[pe];
        self.lrt_job_counters[pe] += 1;
        self.pe_available[pe] = self.pe_available[pe].max(task.end_time);
        self.tasks.push(task);
        self.tasks.len() - 1
    }
}

/// Mapping policy behind [`schedule_round`].
pub trait MappingPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Order the candidate vertices; `order` arrives topologically sorted.
    fn prioritize(&self, srdag: &Graph, order: &mut Vec<VertexId>);

    /// Pick the PE for a task given when its data is ready.
    fn choose_pe(&self, data_ready: u64, duration: u64, pe_available: &[u64], mappable: &[usize])
        -> usize;
}

/// Priority list scheduling: longest path to a sink first, then earliest
/// finish time across the mappable PEs.
pub struct ListScheduler;

impl MappingPolicy for ListScheduler {
    fn name(&self) -> &'static str {
        "list"
    }

    fn prioritize(&self, srdag: &Graph, order: &mut Vec<VertexId>) {
        let mut level: HashMap<usize, u64> = HashMap::new();
        for &vertex in order.iter().rev() {
            let mut best = 0;
            for edge in srdag.vertex(vertex).outputs.iter().flatten() {
                let sink = srdag.edge(*edge).sink;
                best = best.max(level.get(&sink.0).copied().unwrap_or(0) + 1);
            }
            level.insert(vertex.0, best);
        }
        order.sort_by_key(|v| (std::cmp::Reverse(level.get(&v.0).copied().unwrap_or(0)), v.0));
    }

    fn choose_pe(
        &self,
        data_ready: u64,
        duration: u64,
        pe_available: &[u64],
        mappable: &[usize],
    ) -> usize {
        mappable
            .iter()
            .copied()
            .min_by_key(|&pe| (data_ready.max(pe_available[pe]) + duration, pe))
            .expect("non-empty mappable set")
    }
}

/// Greedy mapping: plain topological order, earliest-available PE.
pub struct GreedyScheduler;

impl MappingPolicy for GreedyScheduler {
    fn name(&self) -> &'static str {
        "greedy"
    }

    fn prioritize(&self, _srdag: &Graph, _order: &mut Vec<VertexId>) {}

    fn choose_pe(
        &self,
        _data_ready: u64,
        _duration: u64,
        pe_available: &[u64],
        mappable: &[usize],
    ) -> usize {
        mappable
            .iter()
            .copied()
            .min_by_key(|&pe| (pe_available[pe], pe))
            .expect("non-empty mappable set")
    }
}

pub fn make_policy(ty: SchedulerType) -> Box<dyn MappingPolicy> {
    match ty {
        SchedulerType::List => Box::new(ListScheduler),
        SchedulerType::Greedy => Box::new(GreedyScheduler),
    }
}

fn schedulable_candidates(srdag: &Graph) -> Vec<VertexId> {
    // Anything downstream of a pending subgraph placeholder cannot be
    // scheduled yet.
    let mut blocked = vec![false; srdag.vertex_capacity()];
    let mut queue: VecDeque<VertexId> = srdag
        .vertices()
        .filter(|v| v.kind == VertexKind::Graph)
        .map(|v| v.ix)
        .collect();
    for v in &queue {
        blocked[v.0] = true;
    }
    while let Some(vertex) = queue.pop_front() {
        for edge in srdag.vertex(vertex).outputs.iter().flatten() {
            let sink = srdag.edge(*edge).sink;
            if !blocked[sink.0] {
                blocked[sink.0] = true;
                queue.push_back(sink);
            }
        }
    }
    srdag
        .vertices()
        .filter(|v| {
            v.schedule_task_ix.is_none()
                && !blocked[v.ix.0]
                && v.kind != VertexKind::Graph
                && !matches!(
                    v.kind,
                    VertexKind::ExternInputInterface | VertexKind::ExternOutputInterface
                )
        })
        .map(|v| v.ix)
        .collect()
}

/// Kahn's algorithm over the candidate set; dependencies on vertices
/// scheduled in earlier rounds count as satisfied.
fn topological_order(srdag: &Graph, candidates: &[VertexId]) -> Vec<VertexId> {
    let in_candidates: std::collections::HashSet<usize> =
        candidates.iter().map(|v| v.0).collect();
    let mut in_degree: HashMap<usize, usize> = HashMap::new();
    for &vertex in candidates {
        let count = srdag
            .vertex(vertex)
            .inputs
            .iter()
            .flatten()
            .filter(|&&edge| in_candidates.contains(&srdag.edge(edge).source.0))
            .count();
        in_degree.insert(vertex.0, count);
    }
    let mut queue: VecDeque<VertexId> = candidates
        .iter()
        .copied()
        .filter(|v| in_degree[&v.0] == 0)
        .collect();
    let mut order = Vec::with_capacity(candidates.len());
    while let Some(vertex) = queue.pop_front() {
        order.push(vertex);
        for edge in srdag.vertex(vertex).outputs.iter().flatten() {
            let sink = srdag.edge(*edge).sink;
            if let Some(deg) = in_degree.get_mut(&sink.0) {
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(sink);
                }
            }
        }
    }
    order
}

/// Map every schedulable vertex and insert synchronization between
/// runners. Returns the indices of the tasks created in this round.
pub fn schedule_round(
    policy: &dyn MappingPolicy,
    srdag: &mut Graph,
    plan: &FifoPlan,
    schedule: &mut Schedule,
    cfg: &RuntimeConfig,
    builtin: &BuiltinKernels,
) -> Result<Vec<usize>, SchedulingError> {
    if schedule.lrt_count == 0 {
        return Err(SchedulingError::EmptyPlatform);
    }
    let candidates = schedulable_candidates(srdag);
    let mut order = topological_order(srdag, &candidates);
    policy.prioritize(srdag, &mut order);

    let all_pes: Vec<usize> = (0..schedule.lrt_count).collect();
    let mut created = Vec::new();

    for vertex_id in order {
        let (mappable, duration) = {
            let vertex = srdag.vertex(vertex_id);
            let mappable: Vec<usize> = match &vertex.mappable_pes {
                Some(pes) => pes
                    .iter()
                    .copied()
                    .filter(|&pe| pe < schedule.lrt_count)
                    .collect(),
                None => all_pes.clone(),
            };
            if mappable.is_empty() {
                return Err(SchedulingError::NoMappablePe(vertex.name.clone()));
            }
            (mappable, cfg.timing.default_duration)
        };

        // Producer tasks feeding this vertex.
        let producers: Vec<usize> = srdag
            .vertex(vertex_id)
            .inputs
            .iter()
            .flatten()
            .filter_map(|&edge| {
                let source = srdag.edge(edge).source;
                srdag.vertex(source).schedule_task_ix
            })
            .collect();
        let data_ready = producers
            .iter()
            .map(|&task| schedule.tasks[task].end_time)
            .max()
            .unwrap_or(0);
        let pe = policy.choose_pe(data_ready, duration, &schedule.pe_available, &mappable);

        // Synchronize with producers on other runners.
        let mut ready = data_ready;
        for producer_task in producers {
            let (producer_pe, producer_end, producer_dispatched) = {
                let t = &schedule.tasks[producer_task];
                (t.mapped_pe, t.end_time, t.dispatched)
            };
            if producer_pe == pe {
                continue;
            }
            let same_cluster = cfg.cluster_of(producer_pe) == cfg.cluster_of(pe);
            let barrier = match cfg.allocator {
                AllocatorType::Default => true,
                AllocatorType::DefaultNoSync | AllocatorType::ArchiAware => !same_cluster,
            };
            if barrier {
                let mut send = ScheduleTask::new(TaskType::SyncSend, schedule.lrt_count);
                send.name = "send-task".to_string();
                send.mapped_pe = producer_pe;
                send.kernel_ix = builtin.sync_send;
                send.start_time = schedule.pe_available[producer_pe].max(producer_end);
                send.end_time = send.start_time + cfg.timing.sync_duration;
                send.notification_flags[pe] = true;
                send.state = TaskState::Ready;
                let send_ix = schedule.push_task(send);
                created.push(send_ix);

                let send_job = schedule.tasks[send_ix].job_ix;
                let send_end = schedule.tasks[send_ix].end_time;
                let mut receive = ScheduleTask::new(TaskType::SyncReceive, schedule.lrt_count);
                receive.name = "receive-task".to_string();
                receive.mapped_pe = pe;
                receive.kernel_ix = builtin.sync_receive;
                receive.execution_constraints[producer_pe] = send_job as i64;
                receive.start_time = schedule.pe_available[pe].max(send_end);
                receive.end_time = receive.start_time + cfg.timing.sync_duration;
                receive.state = TaskState::Ready;
                ready = ready.max(receive.end_time);
                let receive_ix = schedule.push_task(receive);
                created.push(receive_ix);
            } else {
                // Job-stamp constraint only; producers dispatched in an
                // earlier round are covered by the round-end broadcast.
                ready = ready.max(producer_end);
                if !producer_dispatched {
                    schedule.tasks[producer_task].notification_flags[pe] = true;
                }
            }
        }

        let mut task = ScheduleTask::new(TaskType::Vertex, schedule.lrt_count);
        populate_vertex_task(&mut task, srdag, vertex_id, plan, builtin);
        task.mapped_pe = pe;
        task.start_time = schedule.pe_available[pe].max(ready);
        task.end_time = task.start_time + duration;
        task.state = TaskState::Ready;
        // Constraint entries for non-barrier cross-runner producers.
        for edge in srdag.vertex(vertex_id).inputs.iter().flatten() {
            let source = srdag.edge(*edge).source;
            if let Some(producer_task) = srdag.vertex(source).schedule_task_ix {
                let producer = &schedule.tasks[producer_task];
                if producer.task_type == TaskType::Vertex && producer.mapped_pe != pe {
                    let same_cluster =
                        cfg.cluster_of(producer.mapped_pe) == cfg.cluster_of(pe);
                    let barrier = match cfg.allocator {
                        AllocatorType::Default => true,
                        AllocatorType::DefaultNoSync | AllocatorType::ArchiAware => !same_cluster,
                    };
                    if !barrier {
                        let slot = &mut task.execution_constraints[producer.mapped_pe];
                        *slot = (*slot).max(producer.job_ix as i64);
                    }
                }
            }
        }
        let task_ix = schedule.push_task(task);
        created.push(task_ix);
        srdag.vertex_mut(vertex_id).schedule_task_ix = Some(task_ix);
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expression;
    use crate::pisdf::Edge;
    use crate::scheduling::fifo::{FifoAllocator, FifoPlan};

    fn chain_graph(n: usize) -> Graph {
        let mut g = Graph::new("srdag");
        let mut prev = None;
        for i in 0..n {
            let v = g
                .add_vertex(
                    &format!("v{i}"),
                    VertexKind::Normal,
                    usize::from(prev.is_some()),
                    usize::from(i + 1 < n),
                )
                .unwrap();
            if let Some(p) = prev {
                g.add_edge(Edge {
                    ix: crate::pisdf::EdgeId(0),
                    source: p,
                    source_port: 0,
                    source_rate: Expression::constant(1),
                    sink: v,
                    sink_port: 0,
                    sink_rate: Expression::constant(1),
                    delay: None,
                })
                .unwrap();
            }
            prev = Some(v);
        }
        g
    }

    fn run(
        srdag: &mut Graph,
        cfg: &RuntimeConfig,
        policy: &dyn MappingPolicy,
    ) -> Schedule {
        let mut plan = FifoPlan::new();
        FifoAllocator::new().allocate(srdag, &mut plan);
        let mut schedule = Schedule::new(cfg.pe_count());
        let builtins = crate::runtime::kernel::KernelRegistry::new().builtins();
        schedule_round(policy, srdag, &plan, &mut schedule, cfg, &builtins).unwrap();
        schedule
    }

    #[test]
    fn chain_stays_ordered_on_the_timeline() {
        let mut g = chain_graph(3);
        let cfg = RuntimeConfig::single_cluster(2);
        let schedule = run(&mut g, &cfg, &ListScheduler);
        let vertex_tasks: Vec<&ScheduleTask> = schedule
            .tasks
            .iter()
            .filter(|t| t.task_type == TaskType::Vertex)
            .collect();
        assert_eq!(vertex_tasks.len(), 3);
        for pair in vertex_tasks.windows(2) {
            assert!(pair[0].end_time <= pair[1].start_time);
        }
    }

    #[test]
    fn parallel_tasks_spread_over_pes() {
        // Two independent chains on a two-PE platform.
        let mut g = Graph::new("srdag");
        for i in 0..2 {
            g.add_vertex(&format!("a{i}"), VertexKind::Normal, 0, 0).unwrap();
        }
        let cfg = RuntimeConfig::single_cluster(2);
        let schedule = run(&mut g, &cfg, &GreedyScheduler);
        let pes: Vec<usize> = schedule.tasks.iter().map(|t| t.mapped_pe).collect();
        assert_eq!(pes, vec![0, 1]);
    }

    #[test]
    fn cross_runner_edge_gets_sync_pair_by_default() {
        let mut g = chain_graph(2);
        // Force the two vertices onto different PEs.
        let ids = g.vertex_ids();
        g.vertex_mut(ids[0]).mappable_pes = Some(vec![0]);
        g.vertex_mut(ids[1]).mappable_pes = Some(vec![1]);
        let cfg = RuntimeConfig::single_cluster(2);
        let schedule = run(&mut g, &cfg, &ListScheduler);
        let types: Vec<TaskType> = schedule.tasks.iter().map(|t| t.task_type).collect();
        assert!(types.contains(&TaskType::SyncSend));
        assert!(types.contains(&TaskType::SyncReceive));
        let send = schedule
            .tasks
            .iter()
            .find(|t| t.task_type == TaskType::SyncSend)
            .unwrap();
        let receive = schedule
            .tasks
            .iter()
            .find(|t| t.task_type == TaskType::SyncReceive)
            .unwrap();
        assert_eq!(send.mapped_pe, 0);
        assert_eq!(receive.mapped_pe, 1);
        assert!(send.notification_flags[1]);
        assert_eq!(receive.execution_constraints[0], send.job_ix as i64);
        assert!(send.end_time <= receive.end_time);
    }

    #[test]
    fn no_sync_strategy_uses_job_stamp_constraints() {
        let mut g = chain_graph(2);
        let ids = g.vertex_ids();
        g.vertex_mut(ids[0]).mappable_pes = Some(vec![0]);
        g.vertex_mut(ids[1]).mappable_pes = Some(vec![1]);
        let mut cfg = RuntimeConfig::single_cluster(2);
        cfg.allocator = AllocatorType::DefaultNoSync;
        let schedule = run(&mut g, &cfg, &ListScheduler);
        assert!(schedule
            .tasks
            .iter()
            .all(|t| t.task_type == TaskType::Vertex));
        let consumer = schedule
            .tasks
            .iter()
            .find(|t| t.name == "v1")
            .expect("consumer task");
        assert_eq!(consumer.execution_constraints[0], 0);
        let producer = schedule.tasks.iter().find(|t| t.name == "v0").unwrap();
        assert!(producer.notification_flags[1]);
    }

    #[test]
    fn empty_mappable_set_is_an_error() {
        let mut g = chain_graph(1);
        let ids = g.vertex_ids();
        g.vertex_mut(ids[0]).mappable_pes = Some(vec![7]);
        let cfg = RuntimeConfig::single_cluster(2);
        let mut plan = FifoPlan::new();
        FifoAllocator::new().allocate(&g, &mut plan);
        let mut schedule = Schedule::new(cfg.pe_count());
        let builtins = crate::runtime::kernel::KernelRegistry::new().builtins();
        let err = schedule_round(&ListScheduler, &mut g, &plan, &mut schedule, &cfg, &builtins)
            .unwrap_err();
        assert!(matches!(err, SchedulingError::NoMappablePe(_)));
    }

    #[test]
    fn pending_subgraph_blocks_downstream_tasks() {
        let mut g = Graph::new("srdag");
        let a = g.add_vertex("a", VertexKind::Normal, 0, 1).unwrap();
        let sub = g.add_vertex("sub", VertexKind::Graph, 1, 1).unwrap();
        let b = g.add_vertex("b", VertexKind::Normal, 1, 0).unwrap();
        for (src, snk) in [(a, sub), (sub, b)] {
            g.add_edge(Edge {
                ix: crate::pisdf::EdgeId(0),
                source: src,
                source_port: 0,
                source_rate: Expression::constant(1),
                sink: snk,
                sink_port: 0,
                sink_rate: Expression::constant(1),
                delay: None,
            })
            .unwrap();
        }
        let cfg = RuntimeConfig::single_cluster(1);
        let schedule = run(&mut g, &cfg, &ListScheduler);
        // Only the producer is schedulable; the placeholder and its
        // consumer wait for the next round.
        assert_eq!(schedule.tasks.len(), 1);
        assert_eq!(schedule.tasks[0].name, "a");
        assert!(g.vertex(b).schedule_task_ix.is_none());
    }
}

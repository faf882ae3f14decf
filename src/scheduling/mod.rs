// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Scheduling: FIFO allocation, task construction, PE mapping and Gantt
//! export.

pub mod fifo;
pub mod gantt;
pub mod scheduler;
pub mod task;

pub use fifo::{Fifo, FifoAllocator, FifoAttribute, FifoPlan, EXTERNAL_BASE, PERSISTENT_BASE};
pub use scheduler::{make_policy, schedule_round, GreedyScheduler, ListScheduler, MappingPolicy, Schedule};
pub use task::{ScheduleTask, TaskState, TaskType};

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Runtime kernel: platform, runners and the JIT master-slave loop.

pub mod jitms;
pub mod kernel;
pub mod memory;
pub mod message;
pub mod platform;
pub mod runner;

#[cfg(test)]
mod integration_tests;

pub use jitms::{JitmsRuntime, Runtime};
pub use kernel::{BuiltinKernels, Kernel, KernelRegistry};
pub use memory::MemoryInterface;
pub use message::{JobConstraint, JobMessage, Notification, TraceMessage};
pub use platform::Platform;
pub use runner::JitRunner;

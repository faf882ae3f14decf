// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Scheduling and execution errors, and the process-level error wrapper
//! that maps every failure class to a CLI exit code.

use thiserror::Error;

use super::{ConstructionError, ExpressionError, TransfoError};

/// No processing element accepts a task.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulingError {
    /// The mappable set of a task is empty.
    #[error("No processing element accepts task '{0}'")]
    NoMappablePe(String),

    /// The platform description holds no processing element at all.
    #[error("Platform has no processing elements")]
    EmptyPlatform,
}

/// A runner saw a job it cannot satisfy. Terminates the runtime.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// Job references a kernel index that was never registered.
    #[error("Runner #{runner}: no kernel registered at index {kernel}")]
    KernelMissing { runner: usize, kernel: usize },

    /// A job carries an execution constraint on its own runner for a job
    /// stamp that has not been reached, which can never resolve.
    #[error("Runner #{runner}: constraint on own runner for future job {job}")]
    ConstraintOnSelf { runner: usize, job: usize },

    /// A kernel panicked; the vertex name is attached for diagnostics.
    #[error("Kernel of vertex '{0}' panicked")]
    KernelPanic(String),

    /// Notification channel to a runner is gone.
    #[error("Runner #{0} is unreachable")]
    RunnerUnreachable(usize),

    /// A job message referenced a buffer the memory interface does not hold.
    #[error("Runner #{runner}: no buffer at virtual address {address}")]
    BufferMissing { runner: usize, address: u64 },

    /// A runner aborted with the given diagnostic.
    #[error("Runner #{runner}: {message}")]
    Fault { runner: usize, message: String },
}

/// Top-level error for the binary, one variant per exit code.
#[derive(Error, Debug)]
pub enum SpindleError {
    #[error(transparent)]
    Construction(#[from] ConstructionError),

    #[error(transparent)]
    Transfo(#[from] TransfoError),

    #[error(transparent)]
    Scheduling(#[from] SchedulingError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl From<ExpressionError> for SpindleError {
    fn from(err: ExpressionError) -> Self {
        SpindleError::Transfo(TransfoError::Expression(err))
    }
}

impl SpindleError {
    /// CLI exit code: 1 construction, 2 transformation, 3 scheduling,
    /// 4 runtime (0 is success).
    pub fn exit_code(&self) -> i32 {
        match self {
            SpindleError::Construction(_) => 1,
            SpindleError::Transfo(_) => 2,
            SpindleError::Scheduling(_) => 3,
            SpindleError::Runtime(_) => 4,
        }
    }
}

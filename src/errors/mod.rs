// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod construction;
mod expression;
mod runtime;
mod transfo;

pub use construction::ConstructionError;
pub use expression::ExpressionError;
pub use runtime::{RuntimeError, SchedulingError, SpindleError};
pub use transfo::TransfoError;

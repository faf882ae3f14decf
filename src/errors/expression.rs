// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors raised by the expression engine.

use thiserror::Error;

/// Parsing or evaluation failure for a rate/delay/parameter expression.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    /// Structurally invalid infix text: unbalanced parenthesis, adjacent
    /// binary operators, operator at either end, or a leading `-`.
    #[error("Ill-formed expression '{text}': {reason}")]
    IllFormed { text: String, reason: String },

    /// A token that is neither a number, an operator, a function, nor a
    /// parameter known to the evaluation environment.
    #[error("Unknown symbol '{0}' in expression")]
    UnknownSymbol(String),
}

impl ExpressionError {
    pub fn ill_formed(text: impl Into<String>, reason: impl Into<String>) -> Self {
        ExpressionError::IllFormed {
            text: text.into(),
            reason: reason.into(),
        }
    }
}

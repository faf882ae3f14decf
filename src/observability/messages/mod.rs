// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Each message type implements `Display` for the human-readable line and
//! [`StructuredLog`] for machine-readable fields and span creation.

pub mod runner;
pub mod schedule;
pub mod transfo;

use tracing::Span;

/// Messages that support structured logging and span creation.
pub trait StructuredLog {
    /// Emit a log event carrying both the `Display` text and the
    /// structured fields; the level is fixed per message type.
    fn log(&self);

    /// Create a span with this message's fields as attributes.
    fn span(&self, name: &str) -> Span;
}

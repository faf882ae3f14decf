// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! Message types follow a struct-based pattern with a `Display`
//! implementation plus the [`messages::StructuredLog`] trait, keeping the
//! log text and the machine-readable fields in one place per event.
//!
//! Messages are organized by subsystem:
//! * `messages::transfo` - transformation and repetition-vector events
//! * `messages::schedule` - mapping and dispatch events
//! * `messages::runner` - per-runner lifecycle events

pub mod messages;

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod config; // platform config + validation
pub mod errors; // error taxonomy
pub mod expr; // rate/parameter expression engine
pub mod math; // rational + integer helpers
pub mod observability;
pub mod pisdf; // application model + construction API
pub mod runtime; // JIT master-slave loop and runners
pub mod scheduling; // FIFO allocation, mapping, gantt export
pub mod srdag; // single-rate transformation stack

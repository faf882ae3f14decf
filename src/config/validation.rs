// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Configuration validation.
//!
//! Checks run in order: structural checks on the platform first, then
//! cross-field checks that assume a well-formed platform.

use std::collections::HashSet;
use std::fmt;

use crate::config::RuntimeConfig;

/// Errors surfaced while validating a runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Platform has no clusters or only empty clusters.
    NoProcessingElements,
    /// Two clusters carry the same name.
    DuplicateClusterName { name: String },
    /// A cluster declares zero PEs.
    EmptyCluster { name: String },
    /// The master PE index is outside the platform.
    MasterPeOutOfRange { master_pe: usize, pe_count: usize },
    /// Gantt export requested without a target path.
    MissingGanttPath,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::NoProcessingElements => {
                write!(f, "Platform declares no processing elements")
            }
            ValidationError::DuplicateClusterName { name } => {
                write!(f, "Duplicate cluster name: '{name}'")
            }
            ValidationError::EmptyCluster { name } => {
                write!(f, "Cluster '{name}' declares zero processing elements")
            }
            ValidationError::MasterPeOutOfRange { master_pe, pe_count } => {
                write!(
                    f,
                    "Master PE {master_pe} is out of range for a platform with {pe_count} PEs"
                )
            }
            ValidationError::MissingGanttPath => {
                write!(f, "Gantt trace requested but no gantt_path configured")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a configuration; returns every problem found.
pub fn validate_config(cfg: &RuntimeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut names: HashSet<&str> = HashSet::new();
    for cluster in &cfg.platform.clusters {
        if !names.insert(cluster.name.as_str()) {
            errors.push(ValidationError::DuplicateClusterName {
                name: cluster.name.clone(),
            });
        }
        if cluster.pe_count == 0 {
            errors.push(ValidationError::EmptyCluster {
                name: cluster.name.clone(),
            });
        }
    }
    let pe_count = cfg.pe_count();
    if pe_count == 0 {
        errors.push(ValidationError::NoProcessingElements);
    } else if cfg.master_pe >= pe_count {
        errors.push(ValidationError::MasterPeOutOfRange {
            master_pe: cfg.master_pe,
            pe_count,
        });
    }
    if cfg.trace != crate::config::TraceFormat::None && cfg.gantt_path.is_none() {
        errors.push(ValidationError::MissingGanttPath);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

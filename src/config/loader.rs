// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Runtime configuration, typically loaded from a YAML platform file.
//!
//! # Example
//! ```yaml
//! platform:
//!   name: quad
//!   clusters:
//!     - name: cpu
//!       pe_count: 4
//!       memory_size: 1048576
//! master_pe: 0
//! scheduler: list
//! allocator: default
//! trace: none
//! timing:
//!   default_duration: 100
//!   sync_duration: 10
//! ```

use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Complete runtime configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    pub platform: PlatformConfig,
    #[serde(default)]
    pub master_pe: usize,
    #[serde(default)]
    pub scheduler: SchedulerType,
    #[serde(default)]
    pub allocator: AllocatorType,
    #[serde(default)]
    pub trace: TraceFormat,
    /// Base path for Gantt exports; the format extension is appended.
    #[serde(default)]
    pub gantt_path: Option<String>,
    #[serde(default)]
    pub timing: TimingConfig,
}

/// Processing resources: clusters of PEs with cluster-local memory.
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    pub name: String,
    pub clusters: Vec<ClusterConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    pub name: String,
    pub pe_count: usize,
    #[serde(default = "default_memory_size")]
    pub memory_size: u64,
}

fn default_memory_size() -> u64 {
    1 << 20
}

/// Mapping policy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerType {
    /// Priority list scheduling (longest path first).
    #[default]
    List,
    /// Greedy earliest-finish-time.
    Greedy,
}

/// FIFO allocation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AllocatorType {
    /// Fresh virtual address per edge, sync barrier tasks on every
    /// cross-runner edge.
    #[default]
    Default,
    /// Same allocation, but same-cluster edges synchronize through job
    /// stamps only.
    DefaultNoSync,
    /// Cluster-aware: receive tasks re-allocate in their own cluster.
    ArchiAware,
}

/// Gantt trace selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TraceFormat {
    #[default]
    None,
    Xml,
    Svg,
}

/// Per-task duration estimates used by the scheduler timeline.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_duration")]
    pub default_duration: u64,
    #[serde(default = "default_sync_duration")]
    pub sync_duration: u64,
}

fn default_duration() -> u64 {
    100
}

fn default_sync_duration() -> u64 {
    10
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            default_duration: default_duration(),
            sync_duration: default_sync_duration(),
        }
    }
}

impl RuntimeConfig {
    /// Single-cluster configuration used by tests and demos.
    pub fn single_cluster(pe_count: usize) -> RuntimeConfig {
        RuntimeConfig {
            platform: PlatformConfig {
                name: "default".to_string(),
                clusters: vec![ClusterConfig {
                    name: "cpu".to_string(),
                    pe_count,
                    memory_size: default_memory_size(),
                }],
            },
            master_pe: 0,
            scheduler: SchedulerType::default(),
            allocator: AllocatorType::default(),
            trace: TraceFormat::default(),
            gantt_path: None,
            timing: TimingConfig::default(),
        }
    }

    pub fn pe_count(&self) -> usize {
        self.platform.clusters.iter().map(|c| c.pe_count).sum()
    }

    /// Cluster index of a PE; PEs are numbered cluster by cluster.
    pub fn cluster_of(&self, pe: usize) -> usize {
        let mut base = 0;
        for (ix, cluster) in self.platform.clusters.iter().enumerate() {
            if pe < base + cluster.pe_count {
                return ix;
            }
            base += cluster.pe_count;
        }
        self.platform.clusters.len().saturating_sub(1)
    }
}

/// Load a configuration from a YAML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RuntimeConfig, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)?;
    let cfg: RuntimeConfig = serde_yaml::from_str(&content)?;
    Ok(cfg)
}

/// Load and validate a configuration from a YAML file.
pub fn load_and_validate_config<P: AsRef<Path>>(
    path: P,
) -> Result<RuntimeConfig, Box<dyn std::error::Error>> {
    let cfg = load_config(path)?;
    if let Err(errors) = crate::config::validate_config(&cfg) {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        return Err(format!("Configuration validation failed:\n{}", messages.join("\n")).into());
    }
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let yaml = r#"
platform:
  name: quad
  clusters:
    - name: cpu
      pe_count: 4
master_pe: 1
scheduler: greedy
allocator: default_no_sync
trace: xml
gantt_path: /tmp/gantt
timing:
  default_duration: 50
  sync_duration: 5
"#;
        let cfg: RuntimeConfig = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(cfg.pe_count(), 4);
        assert_eq!(cfg.master_pe, 1);
        assert_eq!(cfg.scheduler, SchedulerType::Greedy);
        assert_eq!(cfg.allocator, AllocatorType::DefaultNoSync);
        assert_eq!(cfg.trace, TraceFormat::Xml);
        assert_eq!(cfg.timing.default_duration, 50);
    }

    #[test]
    fn defaults_are_applied() {
        let yaml = r#"
platform:
  name: mono
  clusters:
    - name: cpu
      pe_count: 1
"#;
        let cfg: RuntimeConfig = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(cfg.master_pe, 0);
        assert_eq!(cfg.scheduler, SchedulerType::List);
        assert_eq!(cfg.allocator, AllocatorType::Default);
        assert_eq!(cfg.trace, TraceFormat::None);
        assert_eq!(cfg.timing.default_duration, 100);
    }

    #[test]
    fn cluster_of_maps_pes_in_order() {
        let yaml = r#"
platform:
  name: hetero
  clusters:
    - name: big
      pe_count: 2
    - name: little
      pe_count: 3
"#;
        let cfg: RuntimeConfig = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(cfg.pe_count(), 5);
        assert_eq!(cfg.cluster_of(0), 0);
        assert_eq!(cfg.cluster_of(1), 0);
        assert_eq!(cfg.cluster_of(2), 1);
        assert_eq!(cfg.cluster_of(4), 1);
    }
}

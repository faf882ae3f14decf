// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Graph parameters: static values, dynamic values fed by configuration
//! actors, inheritance from the enclosing graph, and derived expressions.
//!
//! Parameters are identified by `(owning graph, lowercase name)`. Lookup
//! escalates through the chain of containing graphs, which is modeled here
//! as a stack of scope frames ([`ScopeChain`]).

use std::collections::HashMap;

use crate::expr::{Expression, ParamScope};

/// Index of a parameter within its owning graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamId(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    /// Fixed at construction.
    Static { value: i64 },
    /// Written by a configuration actor once per iteration; `None` until
    /// the actor has executed.
    Dynamic { value: Option<i64> },
    /// Delegates to a parameter of an ancestor graph, by name.
    Inherited { parent: String },
    /// Computed from other parameters of the scope chain.
    Derived { expression: Expression },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
}

impl Param {
    pub fn new(name: &str, kind: ParamKind) -> Param {
        Param {
            name: name.to_ascii_lowercase(),
            kind,
        }
    }

    /// A dynamic parameter is resolved once written; every other kind is
    /// resolved by construction.
    pub fn is_resolved(&self) -> bool {
        !matches!(self.kind, ParamKind::Dynamic { value: None })
    }
}

/// Parameter frames from the root graph down to the graph under
/// evaluation; the last frame is the innermost graph.
///
/// Implements [`ParamScope`] so rate expressions parse and evaluate
/// directly against it.
pub struct ScopeChain<'a> {
    frames: Vec<&'a [Param]>,
}

impl<'a> ScopeChain<'a> {
    pub fn new(frames: Vec<&'a [Param]>) -> ScopeChain<'a> {
        ScopeChain { frames }
    }

    /// Find a parameter and the index of the frame holding it, searching
    /// innermost-first.
    fn find(&self, name: &str) -> Option<(usize, &'a Param)> {
        for (level, frame) in self.frames.iter().enumerate().rev() {
            if let Some(param) = frame.iter().find(|p| p.name == name) {
                return Some((level, param));
            }
        }
        None
    }

    /// Scope restricted to the outer `levels + 1` frames; used to resolve
    /// inherited parameters in their defining graph.
    fn outer(&self, levels: usize) -> ScopeChain<'a> {
        ScopeChain {
            frames: self.frames[..=levels].to_vec(),
        }
    }

    fn resolve(&self, name: &str) -> Option<f64> {
        let (level, param) = self.find(name)?;
        match &param.kind {
            ParamKind::Static { value } => Some(*value as f64),
            ParamKind::Dynamic { value } => value.map(|v| v as f64),
            ParamKind::Inherited { parent } => {
                if level == 0 {
                    return None;
                }
                self.outer(level - 1).resolve(parent)
            }
            ParamKind::Derived { expression } => {
                expression.evaluate(&self.outer(level)).ok()
            }
        }
    }

    fn dynamic_rooted(&self, name: &str) -> bool {
        match self.find(name) {
            None => false,
            Some((level, param)) => match &param.kind {
                ParamKind::Static { .. } => false,
                ParamKind::Dynamic { .. } => true,
                ParamKind::Inherited { parent } => {
                    level > 0 && self.outer(level - 1).dynamic_rooted(parent)
                }
                ParamKind::Derived { expression } => expression.is_dynamic(),
            },
        }
    }
}

impl ParamScope for ScopeChain<'_> {
    fn value(&self, name: &str) -> Option<f64> {
        self.resolve(name)
    }

    fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    fn is_dynamic(&self, name: &str) -> bool {
        self.dynamic_rooted(name)
    }
}

/// Per-job parameter snapshot: every parameter of the job's graph, by
/// name, with `None` for values still pending.
#[derive(Debug, Clone, Default)]
pub struct JobParams {
    values: HashMap<String, Option<i64>>,
}

impl JobParams {
    pub fn new() -> JobParams {
        JobParams::default()
    }

    pub fn insert(&mut self, name: &str, value: Option<i64>) {
        self.values.insert(name.to_ascii_lowercase(), value);
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.values.get(name).copied().flatten()
    }

    pub fn is_resolved(&self) -> bool {
        self.values.values().all(|v| v.is_some())
    }

    pub fn unresolved(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .values
            .iter()
            .filter_map(|(name, value)| value.is_none().then(|| name.clone()))
            .collect();
        names.sort();
        names
    }

    pub fn set(&mut self, name: &str, value: i64) -> bool {
        match self.values.get_mut(&name.to_ascii_lowercase()) {
            Some(slot) => {
                *slot = Some(value);
                true
            }
            None => false,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }
}

impl ParamScope for JobParams {
    fn value(&self, name: &str) -> Option<f64> {
        self.get(name).map(|v| v as f64)
    }

    fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    fn is_dynamic(&self, name: &str) -> bool {
        // Snapshot values are frozen for the lifetime of a job.
        let _ = name;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::EmptyScope;

    fn static_param(name: &str, value: i64) -> Param {
        Param::new(name, ParamKind::Static { value })
    }

    #[test]
    fn lookup_escalates_to_outer_frames() {
        let outer = vec![static_param("width", 8)];
        let inner = vec![Param::new(
            "w",
            ParamKind::Inherited {
                parent: "width".into(),
            },
        )];
        let chain = ScopeChain::new(vec![&outer, &inner]);
        assert_eq!(chain.value("w"), Some(8.0));
        assert_eq!(chain.value("width"), Some(8.0));
        assert!(!chain.is_dynamic("w"));
    }

    #[test]
    fn inner_frame_shadows_outer() {
        let outer = vec![static_param("n", 1)];
        let inner = vec![static_param("n", 2)];
        let chain = ScopeChain::new(vec![&outer, &inner]);
        assert_eq!(chain.value("n"), Some(2.0));
    }

    #[test]
    fn dynamic_parameter_is_undefined_until_written() {
        let mut frame = vec![Param::new("size", ParamKind::Dynamic { value: None })];
        {
            let chain = ScopeChain::new(vec![&frame]);
            assert_eq!(chain.value("size"), None);
            assert!(chain.is_dynamic("size"));
            assert!(!frame_resolved(&frame));
        }
        frame[0].kind = ParamKind::Dynamic { value: Some(3) };
        let chain = ScopeChain::new(vec![&frame]);
        assert_eq!(chain.value("size"), Some(3.0));
        assert!(frame_resolved(&frame));
    }

    fn frame_resolved(frame: &[Param]) -> bool {
        frame.iter().all(Param::is_resolved)
    }

    #[test]
    fn derived_parameter_evaluates_in_its_scope() {
        let expr = Expression::parse(
            "2*3",
            &EmptyScope,
        )
        .expect("parse");
        let frame = vec![
            static_param("n", 4),
            Param::new("m", ParamKind::Derived { expression: expr }),
        ];
        let chain = ScopeChain::new(vec![&frame]);
        assert_eq!(chain.value("m"), Some(6.0));
    }

    #[test]
    fn job_params_track_resolution() {
        let mut params = JobParams::new();
        params.insert("width", None);
        params.insert("height", Some(2));
        assert!(!params.is_resolved());
        assert_eq!(params.unresolved(), vec!["width".to_string()]);
        assert!(params.set("width", 5));
        assert!(params.is_resolved());
        assert_eq!(params.get("width"), Some(5));
        assert!(!params.set("depth", 1));
    }
}

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Run predicates.
//!
//! Every task is gated by a predicate evaluated right before dispatch. An
//! unset predicate is the explicit [`Predicate::Always`] value, so a missing
//! `when` can never silently disable a task.
//!
//! In YAML a predicate is written as:
//!
//! ```yaml
//! when: true                                  # constant
//! when: { param: build_tree }                 # truthiness of a runtime param
//! when: { ext: enabled }                      # truthiness of a task ext value
//! when: { param: tree_engine, equals: fasttree }
//! when: { not: { param: skip_alignment } }
//! when: { all: [ { param: a }, { any: [ { param: b }, { ext: c } ] } ] }
//! ```

use crate::errors::PredicateError;
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::BTreeMap;

/// Runtime configuration visible to predicates and templates (`params.*`).
pub type Params = BTreeMap<String, Value>;

/// Per-task extension values (`ext.*`), including `args`.
pub type ExtValues = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Predicate {
    Constant(bool),
    Equals { param: String, equals: Value },
    Param { param: String },
    Ext { ext: String },
    Not { not: Box<Predicate> },
    All { all: Vec<Predicate> },
    Any { any: Vec<Predicate> },
}

impl Predicate {
    #[allow(non_upper_case_globals)]
    pub const Always: Predicate = Predicate::Constant(true);

    /// Both predicates must hold.
    pub fn and(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::Constant(true), p) | (p, Predicate::Constant(true)) => p,
            (a, b) => Predicate::All { all: vec![a, b] },
        }
    }

    /// Evaluate against runtime params and task ext values.
    ///
    /// `all`/`any` short-circuit, but every referenced key of an evaluated
    /// branch must exist: unknown keys are errors rather than `false`.
    pub fn evaluate(&self, params: &Params, ext: &ExtValues) -> Result<bool, PredicateError> {
        match self {
            Predicate::Constant(value) => Ok(*value),
            Predicate::Param { param } => params
                .get(param)
                .map(truthy)
                .ok_or_else(|| PredicateError::UnknownParam { key: param.clone() }),
            Predicate::Equals { param, equals } => params
                .get(param)
                .map(|value| value == equals)
                .ok_or_else(|| PredicateError::UnknownParam { key: param.clone() }),
            Predicate::Ext { ext: key } => ext
                .get(key)
                .map(truthy)
                .ok_or_else(|| PredicateError::UnknownExt { key: key.clone() }),
            Predicate::Not { not } => Ok(!not.evaluate(params, ext)?),
            Predicate::All { all } => {
                for predicate in all {
                    if !predicate.evaluate(params, ext)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Predicate::Any { any } => {
                for predicate in any {
                    if predicate.evaluate(params, ext)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

impl Default for Predicate {
    fn default() -> Self {
        Predicate::Always
    }
}

/// Truthiness of a config value: null, false, zero and empty are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Sequence(seq) => !seq.is_empty(),
        Value::Mapping(map) => !map.is_empty(),
        Value::Tagged(tagged) => truthy(&tagged.value),
    }
}

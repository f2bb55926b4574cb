// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parameter interpolation over JSON trees.
//!
//! Two reference syntaxes, resolved against the run context:
//! `${path.to.value}` and bare `$path.to.value`. A string that is
//! exactly one reference resolves to the referenced value itself (a
//! number stays a number); embedded references are textualized in
//! place. Unresolvable references stay verbatim.

use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::LazyLock;

/// One pattern for both syntaxes: group 1 is a braced path, group 2 a
/// bare path. Braced segments additionally allow hyphens and digits at
/// the start, matching what step names tend to look like.
// Allow expect here as the regex is compile-time verified to be valid
#[allow(clippy::expect_used)]
static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\$\{([A-Za-z0-9_-]+(?:\.[A-Za-z0-9_-]+)*)\}|\$([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)",
    )
    .expect("constant regex pattern is valid")
});

/// Walk a dotted path through objects (by key) and arrays (by index).
fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Textual form used when a reference is embedded in a larger string.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// The whole string as a single reference path, if it is one.
fn full_reference(s: &str) -> Option<&str> {
    let caps = REFERENCE.captures(s)?;
    let whole = caps.get(0)?;
    if whole.start() != 0 || whole.end() != s.len() {
        return None;
    }
    caps.get(1).or_else(|| caps.get(2)).map(|g| g.as_str())
}

fn interpolate_string(s: &str, ctx: &Value) -> Value {
    // A lone reference yields the referenced value itself.
    if let Some(path) = full_reference(s) {
        if let Some(value) = resolve_path(ctx, path) {
            return value.clone();
        }
        return Value::String(s.to_string());
    }

    let replaced = REFERENCE.replace_all(s, |caps: &regex::Captures| {
        let path = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|g| g.as_str())
            .unwrap_or_default();
        match resolve_path(ctx, path) {
            Some(value) => value_to_string(value),
            None => caps[0].to_string(),
        }
    });
    Value::String(replaced.into_owned())
}

/// Interpolate every string leaf of `params` against `ctx`.
pub fn interpolate_params(params: &Value, ctx: &Value) -> Value {
    match params {
        Value::String(s) => interpolate_string(s, ctx),
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| interpolate_params(item, ctx)).collect())
        }
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, value) in map {
                out.insert(key.clone(), interpolate_params(value, ctx));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Interpolate a condition or other bare template string; the result is
/// textualized.
pub fn interpolate_text(s: &str, ctx: &Value) -> String {
    value_to_string(&interpolate_string(s, ctx))
}

/// Build the interpolation root for a run.
///
/// Recognized roots: `input`, `steps.<name>.result`, `workflowId`,
/// `variables.<key>`, `metadata.<key>`.
pub fn context_value(run: &sb_core::WorkflowRun) -> Value {
    let mut steps = Map::with_capacity(run.steps.len());
    for (name, execution) in &run.steps {
        steps.insert(
            name.clone(),
            json!({
                "state": execution.state,
                "result": execution.result.clone().unwrap_or(Value::Null),
                "error": execution.error.clone().map(Value::String).unwrap_or(Value::Null),
            }),
        );
    }
    json!({
        "workflowId": run.id.as_str(),
        "workflow": run.workflow,
        "input": run.input,
        "steps": steps,
        "variables": run.variables,
        "metadata": run.metadata,
    })
}

/// Context for a compensation call: the run context plus the original
/// outcome of the step being compensated.
pub fn compensation_context(
    run: &sb_core::WorkflowRun,
    original_result: Option<&Value>,
    original_error: Option<&str>,
) -> Value {
    let mut ctx = context_value(run);
    if let Value::Object(map) = &mut ctx {
        map.insert(
            "compensation".to_string(),
            json!({
                "original_result": original_result.cloned().unwrap_or(Value::Null),
                "original_error": original_error.map(|s| Value::String(s.to_string())).unwrap_or(Value::Null),
            }),
        );
    }
    ctx
}

#[cfg(test)]
#[path = "interpolate_tests.rs"]
mod tests;

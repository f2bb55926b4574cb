// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Routing-rule glob compilation for the gateway.
//!
//! Patterns compile to anchored regexes: `**` matches across path
//! segments, `*` within one segment.

use crate::file::RoutingRules;
use regex::Regex;
use sb_core::OrchestratorError;

/// Compiled `pattern → capabilities` rules, in declaration order.
pub struct CompiledRoutes {
    rules: Vec<(Regex, Vec<String>)>,
}

impl CompiledRoutes {
    pub fn compile(rules: &RoutingRules) -> Result<Self, OrchestratorError> {
        let mut compiled = Vec::with_capacity(rules.patterns.len());
        for (glob, capabilities) in &rules.patterns {
            let regex = Regex::new(&glob_to_regex(glob)).map_err(|e| {
                OrchestratorError::Validation(format!("routing pattern '{glob}': {e}"))
            })?;
            compiled.push((regex, capabilities.clone()));
        }
        Ok(Self { rules: compiled })
    }

    /// Capabilities required by every pattern matching `path`,
    /// deduplicated, in rule order.
    pub fn capabilities_for(&self, path: &str) -> Vec<String> {
        let mut result: Vec<String> = Vec::new();
        for (regex, capabilities) in &self.rules {
            if regex.is_match(path) {
                for capability in capabilities {
                    if !result.contains(capability) {
                        result.push(capability.clone());
                    }
                }
            }
        }
        result
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Translate one glob into an anchored regex.
fn glob_to_regex(glob: &str) -> String {
    let mut regex = String::with_capacity(glob.len() + 8);
    regex.push('^');
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    regex.push_str(".*");
                } else {
                    regex.push_str("[^/]+");
                }
            }
            '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '?' | '\\' => {
                regex.push('\\');
                regex.push(c);
            }
            other => regex.push(other),
        }
    }
    regex.push('$');
    regex
}

#[cfg(test)]
#[path = "routing_tests.rs"]
mod tests;

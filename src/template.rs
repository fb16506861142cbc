//! Placeholder resolution for `{{...}}` tokens in template
//! strings.
//!
//! Every substitution in the engine goes through [`render`]: a
//! call site describes *which* scopes apply and in what order,
//! and this module owns *how* a token is classified and looked
//! up. A token that no scope can resolve is left verbatim:
//! misses are cosmetic, never fatal.

use crate::history::ExecutionHistory;
use crate::model::StepResult;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// One source of replacement values, consulted in the order the
/// caller lists them. First hit wins.
pub enum Scope<'a> {
    /// Plain-name lookup (global variables, step vars, a test
    /// case's cumulative result).
    Vars(&'a HashMap<String, String>),
    /// `input.<key>` against the current resolved input map.
    Input(&'a HashMap<String, String>),
    /// `result.<field>` against a step result: `statusCode`,
    /// `body`, `headers`, `headers.<name>`, or an output key.
    Result(&'a StepResult),
    /// `<entry>.<field>` against outputs recorded earlier in the
    /// run.
    History(&'a ExecutionHistory),
}

// Matches {{ body }} and captures the trimmed body (group 1).
static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}")
        .expect("failed to compile placeholder regex")
});

/// Substitute every resolvable placeholder in `template`.
///
/// Unresolvable tokens pass through unchanged, so rendering text
/// that contains no recognized placeholders is the identity.
pub fn render(template: &str, scopes: &[Scope<'_>]) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &regex::Captures| {
            let body = &caps[1];
            for scope in scopes {
                if let Some(value) = lookup(scope, body) {
                    return value;
                }
            }
            caps[0].to_string()
        })
        .into_owned()
}

fn lookup(scope: &Scope<'_>, body: &str) -> Option<String> {
    match scope {
        Scope::Vars(map) => map.get(body).cloned(),
        Scope::Input(map) => {
            let key = body.strip_prefix("input.")?;
            map.get(key).cloned()
        }
        Scope::Result(result) => {
            let field = body.strip_prefix("result.")?;
            result_field(result, field)
        }
        Scope::History(history) => {
            let (entry, field) = entry_ref(body)?;
            history.lookup(entry, field)
        }
    }
}

fn result_field(result: &StepResult, field: &str) -> Option<String> {
    match field {
        "statusCode" => Some(result.status_code.to_string()),
        "body" => Some(result.body.clone()),
        "headers" => Some(format_headers(&result.headers)),
        _ => {
            if let Some(name) = field.strip_prefix("headers.") {
                result.headers.get(name).cloned()
            } else {
                result.output.get(field).cloned()
            }
        }
    }
}

/// Split `<entry>.<field>` references; bodies with more or fewer
/// than one dot are not history references.
fn entry_ref(body: &str) -> Option<(&str, &str)> {
    let (entry, field) = body.split_once('.')?;
    if entry.is_empty() || field.is_empty() || field.contains('.') {
        return None;
    }
    Some((entry, field))
}

/// Render a full header map for `{{result.headers}}`, sorted so
/// the output is stable.
fn format_headers(headers: &HashMap<String, String>) -> String {
    let mut pairs: Vec<_> = headers.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    let inner = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{inner}}}")
}

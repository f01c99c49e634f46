//! Helpers for tessent object names and Tcl list output.

use std::sync::LazyLock;

use regex::Regex;

static LIST_ELEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^}]+\}|[^{\s]+").expect("list regex is valid"));

/// Verilog-safe identifier for a hierarchical tessent name.
///
/// Hierarchy separators become `__`; names that still contain characters
/// illegal in a simple identifier are written as escaped identifiers.
pub fn verilog_name(name: &str) -> String {
    let flat = name.replace('/', "__");
    if flat.chars().any(|c| "[](){}$".contains(c)) {
        format!("\\{flat}")
    } else {
        flat
    }
}

/// Strip Tcl quoting (spaces, backslashes, braces) from a single name.
pub fn parse_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, ' ' | '\\' | '{' | '}'))
        .collect()
}

/// Split a Tcl list into cleaned names. Brace groups count as one element.
pub fn parse_name_list(list: &str) -> Vec<String> {
    LIST_ELEMENT
        .find_iter(list)
        .map(|m| parse_name(m.as_str()))
        .filter(|name| !name.is_empty())
        .collect()
}

/// Unwrap one level of braces from a printed collection, e.g. `{net_12}`.
pub fn strip_braces(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix('{')
        .and_then(|inner| inner.strip_suffix('}'))
        .unwrap_or(trimmed)
        .trim()
}

//! Tolerant JSON extraction from model output.
//!
//! Local models wrap JSON in prose or code fences, and truncate mid-object
//! when they hit a token limit. Strategies are tried in order; the last one
//! structurally repairs a truncated object by closing the open string and
//! balancing brackets.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn fence_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)```").unwrap())
}

fn try_parse(s: &str) -> Option<Value> {
    serde_json::from_str::<Value>(s)
        .ok()
        .filter(|v| v.is_object())
}

/// Extract a JSON object from free-form model output. Returns `None` when
/// every strategy fails.
pub fn extract_json(content: &str) -> Option<Value> {
    let mut content = content.trim().to_string();
    if content.is_empty() {
        return None;
    }

    // Strip a wrapping code fence (optional language tag)
    if let Some(stripped) = content.strip_prefix("```json").or_else(|| content.strip_prefix("```")) {
        let stripped = stripped.strip_suffix("```").unwrap_or(stripped);
        content = stripped.trim().to_string();
    }
    if let Some(parsed) = try_parse(&content) {
        return Some(parsed);
    }

    // A fenced block anywhere in the text
    if let Some(caps) = fence_block_re().captures(&content) {
        if let Some(parsed) = try_parse(caps.get(1).unwrap().as_str().trim()) {
            return Some(parsed);
        }
    }

    // First '{' to end of string (handles leading prose), then repair
    if let Some(start) = content.find('{') {
        let candidate = &content[start..];
        if let Some(parsed) = try_parse(candidate) {
            return Some(parsed);
        }
        if let Some(repaired) = repair_truncated_json(candidate) {
            if let Some(parsed) = try_parse(&repaired) {
                return Some(parsed);
            }
        }
    }

    None
}

/// Close a truncated JSON object: scan tracking quoted strings (with
/// backslash escapes) and a stack of open braces/brackets, then append a
/// closing quote if a string was left open plus the reversed stack.
fn repair_truncated_json(s: &str) -> Option<String> {
    if !s.trim_start().starts_with('{') {
        return None;
    }

    let mut in_string = false;
    let mut escape = false;
    let mut stack: Vec<char> = Vec::new();

    for c in s.chars() {
        if escape {
            escape = false;
            continue;
        }
        if in_string {
            match c {
                '\\' => escape = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' if stack.last() == Some(&c) => {
                stack.pop();
            }
            _ => {}
        }
    }

    let mut suffix = String::new();
    if in_string {
        suffix.push('"');
    }
    for closer in stack.iter().rev() {
        suffix.push(*closer);
    }
    if suffix.is_empty() {
        return None;
    }
    Some(format!("{}{}", s, suffix))
}

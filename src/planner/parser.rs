//! Tolerant field-block parser and parameter sanitizer (§4.4, §4.5 steps 3/3).
//!
//! The AI Adapter is asked for numbered `SUBTASK_`/`ACTION_` blocks rather
//! than strict JSON — models drift on formatting under free-text prompting,
//! so both parsers here are line-oriented and forgiving: a line is either a
//! new field (`Known Label: value`) or a continuation of whatever field
//! came before it.

use std::collections::HashMap;

use crate::domain::{Complexity, OperationMode, Priority, SubTask};

const SUBTASK_FIELD_LABELS: &[&str] = &[
    "description",
    "expected outcome",
    "priority",
    "complexity",
    "dependencies",
    "commands",
    "code language",
    "code content",
    "file path",
    "file content",
    "operation mode",
];

/// Splits a decomposition response on `SUBTASK_` markers and parses each
/// block's fields. Blocks with no recognizable `Description` are skipped.
pub fn parse_subtasks(response: &str) -> Vec<SubTask> {
    split_blocks(response, "SUBTASK_")
        .iter()
        .filter_map(|block| subtask_from_fields(parse_fields(block)))
        .collect()
}

/// An AI-chosen action in structured-block form (§4.5 step 3, Act).
#[derive(Debug, Clone, Default)]
pub struct ParsedAction {
    pub action_type: Option<String>,
    pub action_description: String,
    pub parameters: HashMap<String, String>,
    pub expected_outcome: String,
}

const ACTION_FIELD_LABELS: &[&str] = &["action_type", "action_description", "parameters", "expected_outcome"];

pub fn parse_action(response: &str) -> Option<ParsedAction> {
    let fields = parse_fields_with_labels(response, ACTION_FIELD_LABELS);
    if fields.is_empty() {
        return None;
    }
    let parameters = fields
        .get("parameters")
        .map(|raw| sanitize_parameters(raw))
        .unwrap_or_default();

    Some(ParsedAction {
        action_type: fields.get("action_type").map(|s| s.trim().to_string()),
        action_description: fields.get("action_description").cloned().unwrap_or_default(),
        parameters,
        expected_outcome: fields.get("expected_outcome").cloned().unwrap_or_default(),
    })
}

fn split_blocks(response: &str, marker: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current = String::new();
    let mut in_block = false;

    for line in response.lines() {
        if line.trim_start().starts_with(marker) {
            if in_block && !current.trim().is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
            in_block = true;
            continue;
        }
        if in_block {
            current.push_str(line);
            current.push('\n');
        }
    }
    if in_block && !current.trim().is_empty() {
        blocks.push(current);
    }
    blocks
}

fn parse_fields(block: &str) -> HashMap<String, String> {
    parse_fields_with_labels(block, SUBTASK_FIELD_LABELS)
}

/// Line-oriented tolerant parser: a line matching `<label>:` (case
/// insensitive, known labels only) starts a new field; any other line
/// appends to whichever field is currently open.
fn parse_fields_with_labels(block: &str, labels: &[&str]) -> HashMap<String, String> {
    let mut fields: HashMap<String, String> = HashMap::new();
    let mut current_label: Option<String> = None;

    for raw_line in block.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some((label, rest)) = match_known_label(line, labels) {
            current_label = Some(label.clone());
            fields.entry(label).or_default();
            if !rest.trim().is_empty() {
                append_line(&mut fields, current_label.as_deref().unwrap(), rest.trim());
            }
            continue;
        }

        if let Some(label) = &current_label {
            append_line(&mut fields, label, line);
        }
    }

    fields
}

fn append_line(fields: &mut HashMap<String, String>, label: &str, line: &str) {
    let entry = fields.entry(label.to_string()).or_default();
    if !entry.is_empty() {
        entry.push(' ');
    }
    entry.push_str(line);
}

fn match_known_label<'a>(line: &'a str, labels: &[&str]) -> Option<(String, &'a str)> {
    let (candidate, rest) = line.split_once(':')?;
    let normalized = candidate.trim().to_lowercase().replace('_', " ");
    labels
        .iter()
        .find(|l| **l == normalized)
        .map(|l| (l.to_string(), rest))
}

fn subtask_from_fields(fields: HashMap<String, String>) -> Option<SubTask> {
    let description = fields.get("description")?.trim().to_string();
    if description.is_empty() {
        return None;
    }
    let expected_outcome = fields.get("expected outcome").cloned().unwrap_or_default();

    let mut subtask = SubTask::new(description, expected_outcome);
    subtask.priority = fields
        .get("priority")
        .and_then(|s| parse_priority(s))
        .unwrap_or(Priority::Medium);
    subtask.complexity = fields
        .get("complexity")
        .and_then(|s| parse_complexity(s))
        .unwrap_or_default();
    subtask.dependencies = fields
        .get("dependencies")
        .map(|s| split_csv(s))
        .unwrap_or_default();
    subtask.commands = fields.get("commands").map(|s| split_csv(s)).unwrap_or_default();
    subtask.code_language = fields.get("code language").map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    subtask.code_content = fields.get("code content").cloned().filter(|s| !s.is_empty());
    subtask.file_path = fields.get("file path").map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    subtask.file_content = fields.get("file content").cloned().filter(|s| !s.is_empty());
    subtask.operation_mode = fields
        .get("operation mode")
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or_default();

    Some(subtask)
}

fn parse_priority(s: &str) -> Option<Priority> {
    match s.trim().to_uppercase().as_str() {
        "CRITICAL" => Some(Priority::Critical),
        "HIGH" => Some(Priority::High),
        "MEDIUM" => Some(Priority::Medium),
        "LOW" => Some(Priority::Low),
        _ => None,
    }
}

fn parse_complexity(s: &str) -> Option<Complexity> {
    match s.trim().to_uppercase().as_str() {
        "SIMPLE" => Some(Complexity::Simple),
        "MODERATE" => Some(Complexity::Moderate),
        "COMPLEX" => Some(Complexity::Complex),
        _ => None,
    }
}

fn split_csv(s: &str) -> Vec<String> {
    s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect()
}

/// Strips Markdown decoration an AI tends to wrap values in before they
/// reach an ActionSpec (§4.4 Parameter sanitization).
pub fn sanitize_value(raw: &str) -> String {
    let mut s = raw.trim().to_string();

    if s.starts_with("```") {
        s = s.trim_start_matches('`').to_string();
        if let Some(idx) = s.find('\n') {
            // Drop an optional language tag on the fence's opening line.
            let first_line = &s[..idx];
            if !first_line.trim().is_empty() && !first_line.contains(' ') {
                s = s[idx + 1..].to_string();
            }
        }
        s = s.trim_end_matches('`').trim().to_string();
    }

    let strip_pairs: &[(&str, &str)] = &[("**", "**"), ("*", "*"), ("`", "`"), ("\"", "\""), ("'", "'")];
    for (prefix, suffix) in strip_pairs {
        if s.len() >= prefix.len() + suffix.len() && s.starts_with(prefix) && s.ends_with(suffix) {
            s = s[prefix.len()..s.len() - suffix.len()].to_string();
        }
    }

    s = s.trim_start_matches(['-', '*', '•']).trim().to_string();

    let collapsed: Vec<&str> = s.split_whitespace().collect();
    collapsed.join(" ")
}

/// Splits a `k1=v1, k2=v2` parameter string on commas that precede a
/// `key=` token, sanitizing each value, per the worked example in §8:
/// `command=**\`npm install express\`**, working_directory=**/app**` →
/// `{command: "npm install express", working_directory: "/app"}`.
pub fn sanitize_parameters(raw: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let segments = split_on_key_boundaries(raw);

    for segment in segments {
        let parts: Vec<&str> = segment.splitn(2, '=').map(str::trim).collect();
        let [key, value] = parts[..] else { continue };
        params.insert(key.to_string(), sanitize_value(value));
    }

    params
}

/// Splits `"k1=v1, k2=v2"` into `["k1=v1", "k2=v2"]`, only breaking on a
/// comma that is followed (after optional whitespace) by an identifier and
/// `=` — a comma embedded inside a value never splits.
fn split_on_key_boundaries(raw: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = raw.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == ',' {
            if let Some(rest_len) = key_equals_ahead(&chars[i + 1..]) {
                segments.push(std::mem::take(&mut current));
                i += 1 + rest_len;
                continue;
            }
        }
        current.push(c);
        i += 1;
    }
    if !current.trim().is_empty() {
        segments.push(current);
    }
    segments
}

/// If `chars` (after skipping leading whitespace) starts with an
/// identifier followed by `=`, returns how many of the leading whitespace
/// chars to also consume; otherwise `None`.
fn key_equals_ahead(chars: &[char]) -> Option<usize> {
    let mut i = 0;
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    let start = i;
    while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
        i += 1;
    }
    if i > start && chars.get(i) == Some(&'=') {
        Some(start)
    } else {
        None
    }
}

//! Context-aware FILE_WRITE merge algorithm (§4.3 steps 3-7).
//!
//! Chooses how new content reconciles with what is already on disk, based
//! on the resolved `OperationMode` and the target file's extension.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;

use crate::domain::OperationMode;
use crate::error::AgentError;

const CODE_EXTENSIONS: &[&str] = &["py", "java", "ts", "js", "go", "rs"];

pub fn merge_content(
    path: &Path,
    original: Option<&str>,
    new_content: &str,
    mode: OperationMode,
) -> Result<String, AgentError> {
    match mode {
        OperationMode::Create | OperationMode::Replace => Ok(new_content.to_string()),
        OperationMode::Append => {
            let original = original.unwrap_or("");
            if original.is_empty() || original.ends_with('\n') {
                Ok(format!("{original}{new_content}"))
            } else {
                Ok(format!("{original}\n{new_content}"))
            }
        }
        OperationMode::Modify => {
            let Some(original) = original else {
                return Ok(new_content.to_string());
            };
            merge_modify(path, original, new_content)
        }
        OperationMode::Auto => unreachable!("resolve_operation_mode never returns Auto"),
    }
}

fn merge_modify(path: &Path, original: &str, new_content: &str) -> Result<String, AgentError> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    if CODE_EXTENSIONS.contains(&extension) {
        return Ok(merge_code(original, new_content));
    }

    if matches!(extension, "json") {
        if let (Ok(orig), Ok(new)) = (
            serde_json::from_str::<Value>(original),
            serde_json::from_str::<Value>(new_content),
        ) {
            let merged = deep_merge(orig, new);
            return serde_json::to_string_pretty(&merged).map_err(|e| AgentError::ParseError(e.to_string()));
        }
        return Ok(append_with_separator(original, new_content));
    }

    if matches!(extension, "yaml" | "yml") {
        if let (Ok(orig), Ok(new)) = (
            serde_yaml::from_str::<serde_yaml::Value>(original),
            serde_yaml::from_str::<serde_yaml::Value>(new_content),
        ) {
            let merged = deep_merge_yaml(orig, new);
            return serde_yaml::to_string(&merged).map_err(|e| AgentError::ParseError(e.to_string()));
        }
        return Ok(append_with_separator(original, new_content));
    }

    if matches!(extension, "ini" | "properties" | "conf") || looks_like_key_value(original) {
        return Ok(merge_key_value(original, new_content));
    }

    Ok(append_with_separator(original, new_content))
}

/// Structure-aware merge for brace/indentation-style code files: new
/// definitions replace existing ones by symbol name; unmatched new
/// definitions are appended after the import/use block.
fn merge_code(original: &str, new_content: &str) -> String {
    let def_re = regex::Regex::new(r"(?m)^\s*(?:pub\s+|export\s+|async\s+)*(?:fn|def|func|function|class)\s+(\w+)")
        .expect("valid regex");

    let new_defs: Vec<(String, String)> = split_definitions(new_content, &def_re);
    let mut original_lines: Vec<String> = original.lines().map(str::to_string).collect();

    let mut replaced_symbols = std::collections::HashSet::new();
    for (symbol, new_body) in &new_defs {
        if let Some((start, end)) = find_definition_span(&original_lines, &def_re, symbol) {
            original_lines.splice(start..end, new_body.lines().map(str::to_string));
            replaced_symbols.insert(symbol.clone());
        }
    }

    let mut result = original_lines.join("\n");
    if !result.ends_with('\n') && !result.is_empty() {
        result.push('\n');
    }

    for (symbol, new_body) in &new_defs {
        if !replaced_symbols.contains(symbol) {
            result.push('\n');
            result.push_str(new_body);
            if !new_body.ends_with('\n') {
                result.push('\n');
            }
        }
    }

    result
}

fn split_definitions(content: &str, def_re: &regex::Regex) -> Vec<(String, String)> {
    let lines: Vec<&str> = content.lines().collect();
    let mut starts = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if let Some(cap) = def_re.captures(line) {
            starts.push((i, cap.get(1).unwrap().as_str().to_string()));
        }
    }
    let mut defs = Vec::new();
    for (idx, (start, symbol)) in starts.iter().enumerate() {
        let end = starts.get(idx + 1).map(|(next, _)| *next).unwrap_or(lines.len());
        defs.push((symbol.clone(), lines[*start..end].join("\n")));
    }
    defs
}

fn find_definition_span(lines: &[String], def_re: &regex::Regex, symbol: &str) -> Option<(usize, usize)> {
    let start = lines.iter().position(|l| {
        def_re
            .captures(l)
            .map(|c| c.get(1).unwrap().as_str() == symbol)
            .unwrap_or(false)
    })?;
    let end = lines
        .iter()
        .enumerate()
        .skip(start + 1)
        .find(|(_, l)| def_re.is_match(l))
        .map(|(i, _)| i)
        .unwrap_or(lines.len());
    Some((start, end))
}

fn looks_like_key_value(content: &str) -> bool {
    let lines: Vec<&str> = content
        .lines()
        .filter(|l| !l.trim().is_empty() && !l.trim_start().starts_with(['#', ';']))
        .collect();
    !lines.is_empty() && lines.iter().all(|l| l.contains('='))
}

fn merge_key_value(original: &str, new_content: &str) -> String {
    let mut entries: BTreeMap<String, String> = BTreeMap::new();
    let mut order: Vec<String> = Vec::new();

    for line in original.lines() {
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim().to_string();
            if !entries.contains_key(&key) {
                order.push(key.clone());
            }
            entries.insert(key, value.trim().to_string());
        }
    }
    for line in new_content.lines() {
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim().to_string();
            if !entries.contains_key(&key) {
                order.push(key.clone());
            }
            entries.insert(key, value.trim().to_string());
        }
    }

    order
        .into_iter()
        .map(|k| {
            let v = entries.get(&k).cloned().unwrap_or_default();
            format!("{k} = {v}")
        })
        .collect::<Vec<_>>()
        .join("\n")
        + "\n"
}

fn append_with_separator(original: &str, new_content: &str) -> String {
    format!("{original}\n\n# --- appended ---\n\n{new_content}")
}

/// New scalars win on conflicting keys; arrays are replaced wholesale.
fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (k, v) in overlay_map {
                let merged = match base_map.remove(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => v,
                };
                base_map.insert(k, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

fn deep_merge_yaml(base: serde_yaml::Value, overlay: serde_yaml::Value) -> serde_yaml::Value {
    use serde_yaml::Value as Y;
    match (base, overlay) {
        (Y::Mapping(mut base_map), Y::Mapping(overlay_map)) => {
            for (k, v) in overlay_map {
                let merged = match base_map.remove(&k) {
                    Some(existing) => deep_merge_yaml(existing, v),
                    None => v,
                };
                base_map.insert(k, merged);
            }
            Y::Mapping(base_map)
        }
        (_, overlay) => overlay,
    }
}

//! FILE_READ / FILE_WRITE / FILE_COPY / FILE_DELETE / DIRECTORY_SCAN /
//! LOG_ANALYSIS handlers (§4.3).

use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::domain::OperationMode;
use crate::environment::Environment;
use crate::error::AgentError;

use super::merge;

const MAX_READ_BYTES: usize = 64 * 1024;

fn require_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, AgentError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AgentError::Validation(format!("missing required parameter `{key}`")))
}

pub async fn read(environment: &Environment, params: &Value) -> Result<Value, AgentError> {
    let file_path = require_str(params, "filePath")?;
    let path = environment.validate_path(Path::new(file_path))?;
    let bytes = tokio::fs::read(&path).await.map_err(AgentError::from)?;

    let truncated = bytes.len() > MAX_READ_BYTES;
    let boundary = floor_char_boundary(&bytes, MAX_READ_BYTES.min(bytes.len()));
    let content = String::from_utf8_lossy(&bytes[..boundary]).to_string();

    Ok(serde_json::json!({
        "output": content,
        "outputTruncated": truncated,
        "bytesRead": bytes.len(),
    }))
}

pub async fn write(environment: &Environment, params: &Value) -> Result<Value, AgentError> {
    let file_path = require_str(params, "filePath")?;
    let content = require_str(params, "content")?;
    let preserve_context = params.get("preserveContext").and_then(Value::as_bool).unwrap_or(true);
    let explicit_mode = params.get("operationMode").and_then(Value::as_str);
    let description = params.get("description").and_then(Value::as_str).unwrap_or("");

    let path = environment.validate_path(Path::new(file_path))?;
    let existed = path.exists();

    let original_content = if existed {
        Some(tokio::fs::read_to_string(&path).await.map_err(AgentError::from)?)
    } else {
        None
    };

    let mut backup_path_str = None;
    if existed && preserve_context {
        if let Some(original) = &original_content {
            let backup_path =
                PathBuf::from(format!("{}.backup_{}", path.display(), chrono::Utc::now().timestamp_millis()));
            tokio::fs::write(&backup_path, original).await.map_err(AgentError::from)?;
            backup_path_str = Some(backup_path.display().to_string());
        }
    }

    let mode = resolve_operation_mode(explicit_mode, existed, description);
    let final_content = merge::merge_content(&path, original_content.as_deref(), content, mode)?;
    atomic_write(&path, &final_content).await?;

    let mut metadata = serde_json::Map::new();
    if existed {
        metadata.insert("filesModified".into(), serde_json::json!([file_path]));
    } else {
        metadata.insert("filesCreated".into(), serde_json::json!([file_path]));
    }
    if let Some(backup) = backup_path_str {
        metadata.insert("backupPath".into(), Value::String(backup));
    }
    metadata.insert("operationMode".into(), Value::String(mode.to_string()));
    metadata.insert("bytesWritten".into(), serde_json::json!(final_content.len()));

    Ok(Value::Object(metadata))
}

pub async fn copy(environment: &Environment, params: &Value) -> Result<Value, AgentError> {
    let source = require_str(params, "sourcePath")?;
    let target = require_str(params, "targetPath")?;
    let overwrite = params.get("overwrite").and_then(Value::as_bool).unwrap_or(false);

    let source_path = environment.validate_path(Path::new(source))?;
    let target_path = environment.validate_path(Path::new(target))?;

    if target_path.exists() && !overwrite {
        return Err(AgentError::Validation(format!(
            "target {} already exists; pass overwrite=true to replace it",
            target
        )));
    }

    if let Some(parent) = target_path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(AgentError::from)?;
    }
    tokio::fs::copy(&source_path, &target_path).await.map_err(AgentError::from)?;

    Ok(serde_json::json!({
        "filesCreated": [target],
        "sourcePath": source,
        "targetPath": target,
    }))
}

pub async fn delete(environment: &Environment, params: &Value) -> Result<Value, AgentError> {
    let file_path = require_str(params, "filePath")?;
    let path = environment.validate_path(Path::new(file_path))?;

    if path.is_dir() {
        tokio::fs::remove_dir_all(&path).await.map_err(AgentError::from)?;
    } else {
        tokio::fs::remove_file(&path).await.map_err(AgentError::from)?;
    }

    Ok(serde_json::json!({ "filesDeleted": [file_path] }))
}

pub async fn scan_directory(environment: &Environment, params: &Value) -> Result<Value, AgentError> {
    let directory_path = require_str(params, "directoryPath")?;
    let max_depth = params.get("maxDepth").and_then(Value::as_u64).unwrap_or(3) as usize;
    let include_hidden = params.get("includeHidden").and_then(Value::as_bool).unwrap_or(false);

    let root = environment.validate_path(Path::new(directory_path))?;
    let mut entries = Vec::new();

    for entry in walkdir::WalkDir::new(&root)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|e| include_hidden || !is_hidden(e))
        .filter_map(Result::ok)
    {
        let relative = entry.path().strip_prefix(&root).unwrap_or(entry.path());
        if relative.as_os_str().is_empty() {
            continue;
        }
        entries.push(serde_json::json!({
            "path": relative.display().to_string(),
            "isDirectory": entry.file_type().is_dir(),
        }));
    }

    Ok(serde_json::json!({
        "directoryPath": directory_path,
        "entries": entries,
        "entryCount": entries.len(),
    }))
}

pub async fn analyze_log(environment: &Environment, params: &Value) -> Result<Value, AgentError> {
    let log_file = require_str(params, "logFile")?;
    let tail_lines = params.get("tailLines").and_then(Value::as_u64).unwrap_or(200) as usize;

    let path = environment.validate_path(Path::new(log_file))?;
    let content = tokio::fs::read_to_string(&path).await.map_err(AgentError::from)?;

    let lines: Vec<&str> = content.lines().collect();
    let tail: Vec<&str> = lines.iter().rev().take(tail_lines).rev().copied().collect();
    let error_count = tail.iter().filter(|l| l.to_lowercase().contains("error")).count();
    let warning_count = tail.iter().filter(|l| l.to_lowercase().contains("warn")).count();

    Ok(serde_json::json!({
        "output": tail.join("\n"),
        "totalLines": lines.len(),
        "errorCount": error_count,
        "warningCount": warning_count,
    }))
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.') && s != ".")
        .unwrap_or(false)
}

fn resolve_operation_mode(explicit: Option<&str>, existed: bool, description: &str) -> OperationMode {
    if let Some(explicit) = explicit {
        if let Ok(mode) = explicit.parse::<OperationMode>() {
            if mode != OperationMode::Auto {
                return mode;
            }
        }
    }
    if !existed {
        return OperationMode::Create;
    }
    let lower = description.to_lowercase();
    if lower.contains("replace") || lower.contains("rewrite") {
        OperationMode::Replace
    } else if lower.contains("append") {
        OperationMode::Append
    } else {
        OperationMode::Modify
    }
}

async fn atomic_write(path: &Path, content: &str) -> Result<(), AgentError> {
    let dir = path
        .parent()
        .ok_or_else(|| AgentError::FileIoError("target path has no parent".into()))?;
    tokio::fs::create_dir_all(dir).await.map_err(AgentError::from)?;

    let tmp_name = format!(
        ".{}.tmp.{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("file"),
        rand::random::<u32>()
    );
    let tmp_path = dir.join(tmp_name);

    let mut file = tokio::fs::File::create(&tmp_path).await.map_err(AgentError::from)?;
    file.write_all(content.as_bytes()).await.map_err(AgentError::from)?;
    file.sync_all().await.map_err(AgentError::from)?;
    drop(file);

    tokio::fs::rename(&tmp_path, path).await.map_err(AgentError::from)?;
    debug!(path = %path.display(), "atomic write complete");
    Ok(())
}

fn floor_char_boundary(bytes: &[u8], index: usize) -> usize {
    let mut idx = index.min(bytes.len());
    while idx > 0 && (bytes[idx] & 0b1100_0000) == 0b1000_0000 {
        idx -= 1;
    }
    idx
}

//! tree tool - display directory structure as a tree

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use walkdir::WalkDir;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Display directory structure as a tree
pub struct TreeTool;

#[async_trait]
impl Tool for TreeTool {
    fn name(&self) -> &'static str {
        "tree"
    }

    fn description(&self) -> &'static str {
        "Display directory structure as a tree"
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory path (default: current directory)"
                },
                "depth": {
                    "type": "integer",
                    "description": "Maximum depth to traverse (default: 3)"
                },
                "show_hidden": {
                    "type": "boolean",
                    "description": "Show hidden files (default: false)"
                }
            }
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let path = input["path"].as_str().unwrap_or(".");
        let depth = input["depth"].as_u64().unwrap_or(3) as usize;
        let show_hidden = input["show_hidden"].as_bool().unwrap_or(false);

        let full_path = match ctx.validate_path(Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        if !full_path.is_dir() {
            return ToolResult::error(format!("{} is not a directory", path));
        }

        let mut output = Vec::new();

        // Add root directory name
        let root_name = full_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| ".".to_string());
        output.push(format!("{}/", root_name));

        // Walk directory tree
        let root_for_filter = full_path.clone();
        let walker = WalkDir::new(&full_path)
            .max_depth(depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |e| {
                // Always include the root directory
                if e.path() == root_for_filter {
                    return true;
                }
                if show_hidden {
                    true
                } else {
                    // Skip hidden files/directories (starting with .)
                    e.file_name().to_str().map(|s| !s.starts_with('.')).unwrap_or(true)
                }
            });

        for entry in walker.filter_map(|e| e.ok()) {
            // Skip the root directory itself
            if entry.path() == full_path {
                continue;
            }

            let current_depth = entry.depth();
            let is_dir = entry.file_type().is_dir();
            let name = entry.file_name().to_string_lossy();
            let suffix = if is_dir { "/" } else { "" };

            // Build tree prefix using typical tree characters
            let indent = "    ".repeat(current_depth.saturating_sub(1));
            let connector = if current_depth > 0 { "├── " } else { "" };

            output.push(format!("{}{}{}{}", indent, connector, name, suffix));
        }

        // Limit output size
        let max_lines = 500;
        if output.len() > max_lines {
            output.truncate(max_lines);
            output.push(format!("... (truncated, {} entries total)", output.len()));
        }

        ToolResult::success(output.join("\n"))
    }
}

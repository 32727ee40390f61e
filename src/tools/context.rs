//! ToolContext - execution context for tools

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::environment::Environment;

use super::ToolError;

/// Execution context for tools - scopes every tool invocation to a single
/// sandbox directory.
///
/// Each caller gets its own `ToolContext` bound to an `allow_root`-style
/// directory. This provides sandboxing - tools cannot escape it unless
/// explicitly disabled. Containment is delegated to `Environment`, which
/// owns the single canonical sandboxing check (§5 `validatePath`).
#[derive(Clone)]
pub struct ToolContext {
    /// Directory all file ops are constrained to.
    pub sandbox_root: PathBuf,

    /// Identifier for the call site this context was created for.
    pub exec_id: String,

    /// Files read this iteration (for edit validation)
    read_files: Arc<Mutex<HashSet<PathBuf>>>,

    /// Whether sandbox mode is enabled (default: true)
    pub sandbox_enabled: bool,
}

impl ToolContext {
    /// Create a new tool context
    pub fn new(sandbox_root: PathBuf, exec_id: String) -> Self {
        Self {
            sandbox_root,
            exec_id,
            read_files: Arc::new(Mutex::new(HashSet::new())),
            sandbox_enabled: true,
        }
    }

    /// Create a context with sandbox disabled (for testing)
    pub fn new_unsandboxed(sandbox_root: PathBuf, exec_id: String) -> Self {
        Self {
            sandbox_root,
            exec_id,
            read_files: Arc::new(Mutex::new(HashSet::new())),
            sandbox_enabled: false,
        }
    }

    /// Track that a file was read (enables edit validation)
    pub async fn track_read(&self, path: &Path) {
        let mut read_files = self.read_files.lock().await;
        read_files.insert(self.normalize_path(path));
    }

    /// Check if a file was read (required before edit)
    pub async fn was_read(&self, path: &Path) -> bool {
        let read_files = self.read_files.lock().await;
        read_files.contains(&self.normalize_path(path))
    }

    /// Clear read tracking (called at iteration start)
    pub async fn clear_reads(&self) {
        let mut read_files = self.read_files.lock().await;
        read_files.clear();
    }

    /// Normalize a path relative to the sandbox root.
    fn normalize_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() { path.to_path_buf() } else { self.sandbox_root.join(path) }
    }

    /// Validate path is within the sandbox root, via `Environment`'s
    /// canonicalize-and-prefix-check (sandbox enforcement).
    pub fn validate_path(&self, path: &Path) -> Result<PathBuf, ToolError> {
        if !self.sandbox_enabled {
            return Ok(self.normalize_path(path));
        }

        Environment::new(self.sandbox_root.clone())
            .validate_path(path)
            .map_err(|_| ToolError::SandboxViolation {
                path: path.to_path_buf(),
                sandbox_root: self.sandbox_root.clone(),
            })
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("sandbox_root", &self.sandbox_root)
            .field("exec_id", &self.exec_id)
            .field("sandbox_enabled", &self.sandbox_enabled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_track_and_check_read() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test-exec".to_string());

        let file_path = Path::new("src/lib.rs");

        // Initially not read
        assert!(!ctx.was_read(file_path).await);

        // Track read
        ctx.track_read(file_path).await;

        // Now it's marked as read
        assert!(ctx.was_read(file_path).await);
    }

    #[tokio::test]
    async fn test_clear_reads() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test-exec".to_string());

        ctx.track_read(Path::new("a.rs")).await;
        ctx.track_read(Path::new("b.rs")).await;

        ctx.clear_reads().await;

        assert!(!ctx.was_read(Path::new("a.rs")).await);
        assert!(!ctx.was_read(Path::new("b.rs")).await);
    }

    #[tokio::test]
    async fn test_validate_path_within_sandbox_root() {
        let temp = tempdir().unwrap();
        let sandbox_root = temp.path().to_path_buf();

        // Create a file inside the sandbox root
        let file_path = sandbox_root.join("test.txt");
        fs::write(&file_path, "content").unwrap();

        let ctx = ToolContext::new(sandbox_root, "test-exec".to_string());

        // Relative path should work
        let result = ctx.validate_path(Path::new("test.txt"));
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_validate_path_outside_sandbox_root() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test-exec".to_string());

        // Absolute path outside the sandbox root should fail
        let result = ctx.validate_path(Path::new("/etc/passwd"));
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), ToolError::SandboxViolation { .. }));
    }

    #[tokio::test]
    async fn test_validate_path_with_sandbox_disabled() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new_unsandboxed(temp.path().to_path_buf(), "test-exec".to_string());

        // With sandbox disabled, any path should work
        let result = ctx.validate_path(Path::new("/etc/passwd"));
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_validate_new_file_path() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test-exec".to_string());

        // Non-existent file within the sandbox root should be allowed
        let result = ctx.validate_path(Path::new("new_file.txt"));
        assert!(result.is_ok());
    }
}
